use desert_soil::location::Location;
use desert_soil::sample::SoilSample;
use serde::{Deserialize, Serialize};

/// One row of `historical_data`, keyed by (location, year, month).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyObservation {
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub year: i32,
    pub month: u32,

    pub sand: Option<f64>,
    pub silt: Option<f64>,
    pub clay: Option<f64>,
    pub soc: Option<f64>,
    pub ph: Option<f64>,
    pub bdod: Option<f64>,
    pub cec: Option<f64>,
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub potassium: Option<f64>,

    pub ndvi: Option<f64>,
    /// Air temperature at 2 m, °C
    pub t2m_c: Option<f64>,
    /// Dewpoint at 2 m, °C
    pub td2m_c: Option<f64>,
    pub rh_pct: Option<f64>,
    /// Monthly precipitation total, m
    pub tp_m: Option<f64>,
    /// Monthly downward solar radiation total, J/m²
    pub ssrd_jm2: Option<f64>,
    /// ESA WorldCover class
    pub lc_type1: Option<i64>,

    pub ndvi_source: Option<String>,
    pub climate_source: Option<String>,
    pub lc_source: Option<String>,

    pub soil_version_year: Option<i32>,
    pub soil_data_year: Option<i32>,
    pub data_quality_score: f64,
}

impl MonthlyObservation {
    /// Row seeded with the soil sample; vegetation and climate left empty.
    pub fn new(location: &Location, year: i32, month: u32, soil: &SoilSample) -> Self {
        MonthlyObservation {
            location_name: location.name.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            year,
            month,
            sand: soil.sand,
            silt: soil.silt,
            clay: soil.clay,
            soc: soil.soc,
            ph: soil.ph,
            bdod: soil.bdod,
            cec: soil.cec,
            nitrogen: soil.nitrogen,
            phosphorus: soil.phosphorus,
            potassium: soil.potassium,
            ndvi: None,
            t2m_c: None,
            td2m_c: None,
            rh_pct: None,
            tp_m: None,
            ssrd_jm2: None,
            lc_type1: None,
            ndvi_source: None,
            climate_source: None,
            lc_source: None,
            soil_version_year: Some(soil.metadata.soilgrids_release_used),
            soil_data_year: Some(soil.metadata.data_represented_year),
            data_quality_score: 0.0,
        }
    }

    /// Recompute `data_quality_score` from the present fields.
    pub fn score(&mut self) -> f64 {
        self.data_quality_score = crate::quality::quality_score(self);
        self.data_quality_score
    }
}
