use log::debug;
use serde::{Deserialize, Serialize};

use crate::source::BandValues;
use crate::version::{band_name, VersionWindow};

/// Soil properties as encoded upstream (fixed-point integers).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSoilFields {
    pub sand: Option<f64>,
    pub silt: Option<f64>,
    pub clay: Option<f64>,
    pub soc: Option<f64>,
    pub ph: Option<f64>,
    pub bdod: Option<f64>,
    pub cec: Option<f64>,
    pub nitrogen: Option<f64>,
}

impl RawSoilFields {
    /// Pick each property's band out of a reduced region.
    pub fn from_bands(values: &BandValues, window: &VersionWindow) -> Self {
        let get = |property: &str| {
            values
                .get(&band_name(window, property))
                .copied()
                .flatten()
                .filter(|v| v.is_finite())
        };
        RawSoilFields {
            sand: get("sand"),
            silt: get("silt"),
            clay: get("clay"),
            soc: get("soc"),
            ph: get("ph"),
            bdod: get("bdod"),
            cec: get("cec"),
            nitrogen: get("nitrogen"),
        }
    }

    /// Sand is the primary field; without it the fetch counts as empty.
    pub fn has_data(&self) -> bool {
        self.sand.is_some()
    }
}

/// Soil properties in physical units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalFields {
    /// %
    pub sand: Option<f64>,
    /// %
    pub silt: Option<f64>,
    /// %
    pub clay: Option<f64>,
    /// Organic carbon, %
    pub soc: Option<f64>,
    pub ph: Option<f64>,
    /// Bulk density, g/cm³
    pub bdod: Option<f64>,
    /// Cation exchange capacity, cmol/kg
    pub cec: Option<f64>,
    /// %
    pub nitrogen: Option<f64>,
}

impl PhysicalFields {
    pub fn texture_sum(&self) -> f64 {
        [self.sand, self.silt, self.clay]
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .sum()
    }
}

/// Decode upstream fixed-point values. Missing stays missing.
pub fn convert_units(raw: &RawSoilFields) -> PhysicalFields {
    let fields = PhysicalFields {
        sand: raw.sand.map(|v| v / 10.0),
        silt: raw.silt.map(|v| v / 10.0),
        clay: raw.clay.map(|v| v / 10.0),
        soc: raw.soc.map(|v| v / 100.0),
        ph: raw.ph.map(|v| v / 10.0),
        bdod: raw.bdod.map(|v| v / 100.0),
        cec: raw.cec.map(|v| v / 10.0),
        nitrogen: raw.nitrogen.map(|v| v / 1000.0),
    };
    debug!("Soil conversion raw={:?} converted={:?}", raw, fields);
    debug!("Soil texture sum: {:.1}%", fields.texture_sum());
    fields
}

/// Provenance of a [`SoilSample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilMetadata {
    pub soilgrids_release_used: i32,
    pub data_represented_year: i32,
    pub temporal_reasoning: String,
    pub fetch_date: String,
    pub scale_used: Option<u32>,
    pub collection_used: String,
    #[serde(default)]
    pub is_alternative: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_longitude: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
    pub npk_source: String,
    pub historically_accurate: bool,
}

pub const NPK_SOURCE: &str = "N from SoilGrids/estimated, P&K estimated";

/// Resolved soil record for one (location, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSample {
    pub sand: Option<f64>,
    pub silt: Option<f64>,
    pub clay: Option<f64>,
    pub soc: Option<f64>,
    pub ph: Option<f64>,
    pub bdod: Option<f64>,
    pub cec: Option<f64>,
    pub nitrogen: Option<f64>,
    /// mg/kg
    pub phosphorus: Option<f64>,
    /// mg/kg
    pub potassium: Option<f64>,
    #[serde(rename = "_metadata")]
    pub metadata: SoilMetadata,
}

impl SoilSample {
    pub fn from_fields(
        fields: &PhysicalFields,
        phosphorus: Option<f64>,
        potassium: Option<f64>,
        metadata: SoilMetadata,
    ) -> Self {
        SoilSample {
            sand: fields.sand,
            silt: fields.silt,
            clay: fields.clay,
            soc: fields.soc,
            ph: fields.ph,
            bdod: fields.bdod,
            cec: fields.cec,
            nitrogen: fields.nitrogen,
            phosphorus,
            potassium,
            metadata,
        }
    }

    /// Sand and clay present and positive.
    pub fn has_texture(&self) -> bool {
        matches!(self.sand, Some(s) if s > 0.0) && matches!(self.clay, Some(c) if c > 0.0)
    }

    pub fn texture_sum(&self) -> f64 {
        [self.sand, self.silt, self.clay]
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .sum()
    }
}
