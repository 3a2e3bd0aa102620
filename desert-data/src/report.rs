use std::fmt::Write;

use crate::correction::{CecUnit, ColumnStats, CorrectionOutcome, Table};

const RULE: &str = "================================================================================";

fn opt(value: Option<f64>, places: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", places, v),
        None => "n/a".to_string(),
    }
}

fn stats_line(label: &str, stats: Option<&ColumnStats>, places: usize) -> String {
    match stats {
        Some(s) => format!(
            "  {}Min={:.*}, Max={:.*}, Mean={:.*}, Std={}\n",
            label,
            places,
            s.min,
            places,
            s.max,
            places,
            s.mean,
            opt(s.std, places)
        ),
        None => format!("  {}Values were minimum defaults\n", label),
    }
}

/// Plain-text before/after report for an NPK correction run.
pub fn render_report(original: &Table, outcome: &CorrectionOutcome) -> String {
    let table = &outcome.table;
    let p = &outcome.params;
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "SCIENTIFIC NPK CORRECTION - DETAILED COMPARISON REPORT");
    let _ = writeln!(out, "{}\n", RULE);

    let _ = writeln!(out, "UNIT CONVERSIONS APPLIED:");
    let _ = writeln!(out, "  SOC: % -> g/kg (multiplied by 10)");
    match outcome.cec_unit {
        CecUnit::MmolPerKg => {
            let _ = writeln!(out, "  CEC: mmol/kg -> cmol/kg (divided by 10)\n");
        }
        CecUnit::CmolPerKg => {
            let _ = writeln!(out, "  CEC: already cmol/kg (unchanged)\n");
        }
    }

    let _ = writeln!(out, "DATASET INFO:");
    let _ = writeln!(out, "  Total rows: {}", table.rows.len());
    let years = table.numbers("year");
    if let Some(s) = ColumnStats::of(&years) {
        let _ = writeln!(out, "  Date range: {}-{}", s.min, s.max);
    }
    if table.column("location_name").is_some() {
        let _ = writeln!(out, "  Locations: {}", table.distinct("location_name").len());
    }
    let _ = writeln!(out, "  Columns: {}\n", table.headers.len());

    let _ = writeln!(out, "FINAL UNITS IN DATASET:");
    for line in [
        "SOC: g/kg",
        "CEC: cmol/kg",
        "Clay/Silt: %",
        "pH: pH units",
        "Nitrogen: %",
        "Phosphorus: mg/kg",
        "Potassium: mg/kg",
    ] {
        let _ = writeln!(out, "  {}", line);
    }
    out.push('\n');

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "SCIENTIFIC FORMULAS APPLIED:");
    let _ = writeln!(out, "{}\n", RULE);
    let _ = writeln!(out, "NITROGEN (%):");
    let _ = writeln!(out, "  Formula: N (%) = SOC (g/kg) / 10 / {}", p.n_cn_ratio);
    let _ = writeln!(out, "  Where: {} is the C:N ratio (Brady & Weil, 2008)", p.n_cn_ratio);
    let _ = writeln!(out, "  Range: {}% - {}%\n", p.n_bounds.0, p.n_bounds.1);
    let _ = writeln!(out, "PHOSPHORUS (mg/kg):");
    let _ = writeln!(out, "  Formula: P = Base_P x CEC_factor x Clay_factor x pH_factor");
    let _ = writeln!(
        out,
        "  Where: Base_P = SOC(%) x {}, SOC(%) = SOC(g/kg) / 10",
        p.p_base_factor
    );
    let _ = writeln!(out, "  Range: {}-{} mg/kg\n", p.p_bounds.0, p.p_bounds.1);
    let _ = writeln!(out, "POTASSIUM (mg/kg):");
    let _ = writeln!(out, "  Formula: K = CEC_base x Clay_factor x Silt_factor x SOC_factor");
    let _ = writeln!(
        out,
        "  Where: CEC_base = CEC(cmol/kg) x {} + {}",
        p.k_cec_multiplier, p.k_base_offset
    );
    let _ = writeln!(out, "  Range: {}-{} mg/kg\n", p.k_bounds.0, p.k_bounds.1);

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "STATISTICAL COMPARISON:");
    let _ = writeln!(out, "{}\n", RULE);
    let sections = [
        ("NITROGEN (%):", outcome.before.nitrogen, outcome.after.nitrogen, 3),
        ("PHOSPHORUS (mg/kg):", outcome.before.phosphorus, outcome.after.phosphorus, 1),
        ("POTASSIUM (mg/kg):", outcome.before.potassium, outcome.after.potassium, 1),
    ];
    for (title, before, after, places) in sections {
        let _ = writeln!(out, "{}", title);
        out.push_str(&stats_line("Before: ", before.as_ref(), places));
        out.push_str(&stats_line("After:  ", after.as_ref(), places));
        out.push('\n');
    }

    let _ = writeln!(out, "DISTRIBUTION:");
    for dist in &outcome.distributions {
        let _ = writeln!(out, "  {} ({}):", dist.nutrient, dist.unit);
        for bin in &dist.bins {
            let _ = writeln!(
                out,
                "    {}-{}: {:5} rows ({:5.1}%)",
                bin.low, bin.high, bin.count, bin.percent
            );
        }
    }
    out.push('\n');

    let _ = writeln!(out, "UNIT CHANGES:");
    if original.column("soc").is_some() {
        let _ = writeln!(
            out,
            "  SOC: {} % -> {} g/kg",
            opt(outcome.soc_mean_before, 2),
            opt(outcome.soc_mean_after, 2)
        );
    }
    if original.column("cec").is_some() {
        let _ = writeln!(
            out,
            "  CEC: {} {} -> {} cmol/kg",
            opt(outcome.cec_mean_before, 2),
            outcome.cec_unit,
            opt(outcome.cec_mean_after, 2)
        );
    }

    let _ = writeln!(out, "\n{}", RULE);
    let _ = writeln!(out, "EXAMPLE CALCULATIONS (first row per location):");
    let _ = writeln!(out, "{}\n", RULE);
    for ex in &outcome.examples {
        let soc_pct = ex.soc.map(|s| s / 10.0);
        let _ = writeln!(out, "Location: {}", ex.location);
        let _ = writeln!(out, "  SOC: {} g/kg ({}%)", opt(ex.soc, 2), opt(soc_pct, 2));
        let _ = writeln!(out, "  CEC: {} cmol/kg", opt(ex.cec, 1));
        let _ = writeln!(out, "  Clay: {}%", opt(ex.clay, 1));
        let _ = writeln!(out, "  Silt: {}%", opt(ex.silt, 1));
        let _ = writeln!(out, "  pH: {}", opt(ex.ph, 1));
        let _ = writeln!(out, "  N = SOC% / {} = {:.3}%", p.n_cn_ratio, ex.nitrogen);
        let _ = writeln!(
            out,
            "  Base P = SOC% x {} = {}",
            p.p_base_factor,
            opt(soc_pct.map(|s| s * p.p_base_factor), 1)
        );
        let _ = writeln!(out, "  Final P (with factors) = {:.1} mg/kg", ex.phosphorus);
        let _ = writeln!(
            out,
            "  Base K = CEC x {} + {} = {}",
            p.k_cec_multiplier,
            p.k_base_offset,
            opt(ex.cec.map(|c| c * p.k_cec_multiplier + p.k_base_offset), 1)
        );
        let _ = writeln!(out, "  Final K (with factors) = {:.1} mg/kg\n", ex.potassium);
    }

    let _ = writeln!(out, "{}", RULE);
    out
}
