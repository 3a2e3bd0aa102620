//! Re-derive nutrient columns of an exported `historical_data` table.
//!
//! Exported tables carry SOC in %, which the estimators take as g/kg. CEC is
//! already in cmol/kg in tables written by `desert-db`; older exports in
//! mmol/kg are read with [`CecUnit::MmolPerKg`]. Both columns are written
//! back in estimator units.

use csv::{ReaderBuilder, WriterBuilder};
use desert_soil::nutrients::{NutrientInputs, NutrientParams};
use log::info;
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use thiserror::Error;

pub const REQUIRED_COLUMNS: [&str; 5] = ["soc", "cec", "clay", "silt", "ph"];

pub const ESTIMATION_METHOD: &str = "Scientific (Brady&Weil 2008, Sparks 2003, Havlin 2014)";

const PROGRESS_EVERY: usize = 500;

/// Unit of the `cec` column in the input table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CecUnit {
    #[default]
    CmolPerKg,
    MmolPerKg,
}

impl CecUnit {
    /// Value in cmol/kg.
    pub fn to_cmol(self, value: f64) -> f64 {
        match self {
            CecUnit::CmolPerKg => value,
            CecUnit::MmolPerKg => value / 10.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CecUnit::CmolPerKg => "cmol/kg",
            CecUnit::MmolPerKg => "mmol/kg",
        }
    }
}

impl fmt::Display for CecUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CecUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cmol/kg" | "cmol" => Ok(CecUnit::CmolPerKg),
            "mmol/kg" | "mmol" => Ok(CecUnit::MmolPerKg),
            other => Err(format!("unknown CEC unit {:?} (expected cmol/kg or mmol/kg)", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("input is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Header row plus string cells, kept as read so unrelated columns pass
/// through untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read<R: Read>(reader: R) -> Result<Self, CorrectionError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Table { headers, rows })
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<(), CorrectionError> {
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }

    /// Numeric cell; blank, `NaN` and unparseable cells are missing.
    pub fn number(&self, row: usize, column: Option<usize>) -> Option<f64> {
        column
            .and_then(|c| self.cell(row, c))
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| !v.is_nan())
    }

    pub fn numbers(&self, name: &str) -> Vec<f64> {
        let column = self.column(name);
        (0..self.rows.len())
            .filter_map(|r| self.number(r, column))
            .collect()
    }

    /// Overwrite `name` with `values`, appending the column when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        let column = match self.column(name) {
            Some(c) => c,
            None => {
                self.headers.push(name.to_string());
                self.headers.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            if row.len() <= column {
                row.resize(column + 1, String::new());
            }
            row[column] = value;
        }
    }

    pub fn distinct(&self, name: &str) -> Vec<String> {
        let Some(column) = self.column(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter_map(|r| r.get(column))
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; `None` below two values.
    pub std: Option<f64>,
}

impl ColumnStats {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = (count > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });
        Some(ColumnStats {
            count,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NpkStats {
    pub nitrogen: Option<ColumnStats>,
    pub phosphorus: Option<ColumnStats>,
    pub potassium: Option<ColumnStats>,
}

impl NpkStats {
    fn of(table: &Table) -> Self {
        let stats = |name: &str| {
            table
                .column(name)
                .and_then(|_| ColumnStats::of(&table.numbers(name)))
        };
        NpkStats {
            nitrogen: stats("nitrogen"),
            phosphorus: stats("phosphorus"),
            potassium: stats("potassium"),
        }
    }
}

/// Rows whose value falls in `[low, high]`; bounds are inclusive on both
/// ends so a boundary value counts in both neighbouring bins.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub low: f64,
    pub high: f64,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub nutrient: &'static str,
    pub unit: &'static str,
    pub bins: Vec<Bin>,
}

pub const NITROGEN_BINS: [(f64, f64); 4] = [(0.0, 0.1), (0.1, 0.2), (0.2, 0.3), (0.3, 0.5)];
pub const PHOSPHORUS_BINS: [(f64, f64); 4] = [(0.0, 10.0), (10.0, 20.0), (20.0, 30.0), (30.0, 40.0)];
pub const POTASSIUM_BINS: [(f64, f64); 4] =
    [(0.0, 100.0), (100.0, 200.0), (200.0, 300.0), (300.0, 400.0)];

fn distribution(
    nutrient: &'static str,
    unit: &'static str,
    values: &[f64],
    edges: &[(f64, f64)],
) -> Distribution {
    let total = values.len();
    let bins = edges
        .iter()
        .map(|&(low, high)| {
            let count = values.iter().filter(|v| low <= **v && **v <= high).count();
            let percent = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            };
            Bin {
                low,
                high,
                count,
                percent,
            }
        })
        .collect();
    Distribution {
        nutrient,
        unit,
        bins,
    }
}

/// First corrected row of a location, for the report's worked examples.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkedExample {
    pub location: String,
    /// g/kg
    pub soc: Option<f64>,
    /// cmol/kg
    pub cec: Option<f64>,
    pub clay: Option<f64>,
    pub silt: Option<f64>,
    pub ph: Option<f64>,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub table: Table,
    pub before: NpkStats,
    pub after: NpkStats,
    pub soc_mean_before: Option<f64>,
    pub soc_mean_after: Option<f64>,
    pub cec_mean_before: Option<f64>,
    pub cec_mean_after: Option<f64>,
    pub distributions: Vec<Distribution>,
    pub examples: Vec<WorkedExample>,
    pub params: NutrientParams,
    pub cec_unit: CecUnit,
}

pub fn missing_columns(table: &Table) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|c| table.column(c).is_none())
        .map(|c| c.to_string())
        .collect()
}

/// Shortest decimal for `value` after rounding to six places.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        rounded.to_string()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    ColumnStats::of(values).map(|s| s.mean)
}

/// Convert units, re-estimate N, P and K for every row and tag the table.
pub fn apply_npk_correction(
    original: &Table,
    params: &NutrientParams,
    cec_unit: CecUnit,
    correction_date: &str,
) -> Result<CorrectionOutcome, CorrectionError> {
    let missing = missing_columns(original);
    if !missing.is_empty() {
        return Err(CorrectionError::MissingColumns(missing));
    }

    let soc_col = original.column("soc");
    let cec_col = original.column("cec");
    let clay_col = original.column("clay");
    let silt_col = original.column("silt");
    let ph_col = original.column("ph");
    let location_col = original.column("location_name");

    let total = original.rows.len();
    let mut soc_out = Vec::with_capacity(total);
    let mut cec_out = Vec::with_capacity(total);
    let mut n_out = Vec::with_capacity(total);
    let mut p_out = Vec::with_capacity(total);
    let mut k_out = Vec::with_capacity(total);
    let mut examples: Vec<WorkedExample> = Vec::new();
    let mut seen_locations = HashSet::new();

    for row in 0..total {
        // % → g/kg
        let soc = original.number(row, soc_col).map(|v| v * 10.0);
        let cec = original.number(row, cec_col).map(|v| cec_unit.to_cmol(v));
        let inputs = NutrientInputs {
            soc,
            cec,
            clay: original.number(row, clay_col),
            silt: original.number(row, silt_col),
            ph: original.number(row, ph_col),
        };
        let est = params.estimate(&inputs);

        if let Some(location) = location_col.and_then(|c| original.cell(row, c)) {
            if seen_locations.insert(location.to_string()) {
                examples.push(WorkedExample {
                    location: location.to_string(),
                    soc,
                    cec,
                    clay: inputs.clay,
                    silt: inputs.silt,
                    ph: inputs.ph,
                    nitrogen: est.nitrogen,
                    phosphorus: est.phosphorus,
                    potassium: est.potassium,
                });
            }
        }

        soc_out.push(soc);
        cec_out.push(cec);
        n_out.push(est.nitrogen);
        p_out.push(est.phosphorus);
        k_out.push(est.potassium);

        if (row + 1) % PROGRESS_EVERY == 0 {
            info!("Processed {}/{} rows...", row + 1, total);
        }
    }

    let optional = |values: &[Option<f64>]| -> Vec<String> {
        values
            .iter()
            .map(|v| v.map(format_number).unwrap_or_default())
            .collect()
    };
    let numeric = |values: &[f64]| -> Vec<String> { values.iter().map(|v| v.to_string()).collect() };
    let constant = |value: &str| -> Vec<String> { vec![value.to_string(); total] };

    let mut table = original.clone();
    table.set_column("nitrogen", numeric(&n_out));
    table.set_column("phosphorus", numeric(&p_out));
    table.set_column("potassium", numeric(&k_out));
    table.set_column("soc", optional(&soc_out));
    table.set_column("cec", optional(&cec_out));
    table.set_column("npk_estimation_method", constant(ESTIMATION_METHOD));
    table.set_column("npk_correction_date", constant(correction_date));
    table.set_column("soc_unit", constant("g/kg"));
    table.set_column("cec_unit", constant("cmol/kg"));

    let distributions = vec![
        distribution("Nitrogen", "%", &n_out, &NITROGEN_BINS),
        distribution("Phosphorus", "mg/kg", &p_out, &PHOSPHORUS_BINS),
        distribution("Potassium", "mg/kg", &k_out, &POTASSIUM_BINS),
    ];

    let flat = |values: &[Option<f64>]| -> Vec<f64> { values.iter().flatten().copied().collect() };

    Ok(CorrectionOutcome {
        before: NpkStats::of(original),
        after: NpkStats::of(&table),
        soc_mean_before: mean(&original.numbers("soc")),
        soc_mean_after: mean(&flat(&soc_out)),
        cec_mean_before: mean(&original.numbers("cec")),
        cec_mean_after: mean(&flat(&cec_out)),
        table,
        distributions,
        examples,
        params: params.clone(),
        cec_unit,
    })
}
