//! `correct-npk`: re-estimate nutrients in an exported table.

use anyhow::Context;
use desert_data::correction::{apply_npk_correction, CecUnit, Table};
use desert_data::report::render_report;
use desert_soil::nutrients::NutrientParams;
use desert_utils::dates::now_iso;
use log::info;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Correct `input` into `output` and write the comparison report.
pub fn run_correction(
    input: &Path,
    output: &Path,
    report: &Path,
    params: &NutrientParams,
    cec_unit: CecUnit,
) -> anyhow::Result<usize> {
    info!("Loading data from {}", input.display());
    let file = File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let original = Table::read(BufReader::new(file))
        .with_context(|| format!("failed to read {}", input.display()))?;
    info!(
        "Loaded {} rows, {} columns",
        original.rows.len(),
        original.headers.len()
    );

    info!("Reading CEC as {}", cec_unit);
    let outcome = apply_npk_correction(&original, params, cec_unit, &now_iso())?;

    for path in [output, report] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let out = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    outcome.table.write(out)?;
    info!("Saved {} corrected rows to {}", outcome.table.rows.len(), output.display());

    fs::write(report, render_report(&original, &outcome))
        .with_context(|| format!("failed to write report {}", report.display()))?;
    info!("Detailed report: {}", report.display());

    Ok(outcome.table.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::{collector, tanta, FakeSource};
    use desert_db::{Database, InsertMode};

    const EXPORT: &str = "\
location_name,year,month,soc,cec,clay,silt,ph,nitrogen,phosphorus,potassium
Tanta_Farms,2020,1,3.64,214,25.4,29.3,7.6,0.15,12,200
Siwa_Grasslands,2020,1,,,,,,,,
";

    #[test]
    fn writes_corrected_table_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("export.csv");
        let output = dir.path().join("out/corrected.csv");
        let report = dir.path().join("out/report.txt");
        fs::write(&input, EXPORT).unwrap();

        let rows = run_correction(
            &input,
            &output,
            &report,
            &NutrientParams::default(),
            CecUnit::MmolPerKg,
        )
        .unwrap();
        assert_eq!(rows, 2);

        let corrected = Table::read(File::open(&output).unwrap()).unwrap();
        let n = corrected.column("nitrogen");
        assert_eq!(corrected.number(0, n), Some(0.317));
        assert_eq!(corrected.number(1, n), Some(0.15));
        assert_eq!(corrected.number(0, corrected.column("soc")), Some(36.4));
        assert!(corrected.column("npk_estimation_method").is_some());

        let text = fs::read_to_string(&report).unwrap();
        assert!(text.contains("NPK CORRECTION"));
        assert!(text.contains("Tanta_Farms"));
    }

    #[test]
    fn missing_columns_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("export.csv");
        fs::write(&input, "location_name,soc,clay\nTanta_Farms,3.6,25\n").unwrap();
        let err = run_correction(
            &input,
            &dir.path().join("o.csv"),
            &dir.path().join("r.txt"),
            &NutrientParams::default(),
            CecUnit::default(),
        )
        .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("cec"));
        assert!(message.contains("ph"));
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_correction(
            &dir.path().join("absent.csv"),
            &dir.path().join("o.csv"),
            &dir.path().join("r.txt"),
            &NutrientParams::default(),
            CecUnit::default(),
        )
        .is_err());
    }

    #[tokio::test]
    async fn exported_rows_keep_cec_and_potassium() {
        let mut collector = collector(FakeSource::default());
        let obs = collector.collect(&tanta(), 2020, 6).await.unwrap();

        let db = Database::new().unwrap();
        db.bulk_insert(&[obs.clone()], "historical_data", InsertMode::Append)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export.csv");
        db.export_csv(&export).unwrap();

        let output = dir.path().join("corrected.csv");
        run_correction(
            &export,
            &output,
            &dir.path().join("report.txt"),
            &NutrientParams::default(),
            CecUnit::default(),
        )
        .unwrap();

        let corrected = Table::read(File::open(&output).unwrap()).unwrap();
        let value = |name: &str| corrected.number(0, corrected.column(name));
        assert_eq!(value("cec"), obs.cec);
        let close = |a: Option<f64>, b: Option<f64>| (a.unwrap() - b.unwrap()).abs() < 1e-9;
        assert!(close(value("potassium"), obs.potassium));
        assert!(close(value("phosphorus"), obs.phosphorus));
        assert!(close(value("soc"), obs.soc.map(|s| s * 10.0)));
    }
}
