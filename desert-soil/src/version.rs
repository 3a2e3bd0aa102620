//! SoilGrids release windows.
//!
//! Each window maps an inclusive span of calendar years onto the release that
//! was the newest one available during those years. Years outside every
//! window are served by the latest window.

use crate::error::VersionTableError;
use log::warn;
use serde::{Deserialize, Serialize};

pub const SOILGRIDS_COLLECTION: &str = "projects/soilgrids-isric";

/// Soil properties read from SoilGrids, in storage order.
pub const SOIL_PROPERTIES: [&str; 8] = [
    "sand", "silt", "clay", "soc", "ph", "bdod", "cec", "nitrogen",
];

/// Depth interval every band is read at.
pub const DEPTH: &str = "0-5cm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionWindow {
    pub start_year: i32,
    pub end_year: i32,
    pub collection: String,
    pub suffix: String,
    pub release_year: i32,
    pub reasoning: String,
}

impl VersionWindow {
    pub fn contains(&self, year: i32) -> bool {
        self.start_year <= year && year <= self.end_year
    }
}

/// Sorted, non-overlapping list of [`VersionWindow`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionTable {
    windows: Vec<VersionWindow>,
}

impl VersionTable {
    pub fn new(mut windows: Vec<VersionWindow>) -> Result<Self, VersionTableError> {
        if windows.is_empty() {
            return Err(VersionTableError::Empty);
        }
        if let Some(w) = windows.iter().find(|w| w.end_year < w.start_year) {
            return Err(VersionTableError::Inverted {
                start: w.start_year,
                end: w.end_year,
            });
        }
        windows.sort_by_key(|w| w.start_year);
        for pair in windows.windows(2) {
            if pair[1].start_year <= pair[0].end_year {
                return Err(VersionTableError::Overlap {
                    first_start: pair[0].start_year,
                    first_end: pair[0].end_year,
                    second_start: pair[1].start_year,
                    second_end: pair[1].end_year,
                });
            }
        }
        Ok(VersionTable { windows })
    }

    pub fn windows(&self) -> &[VersionWindow] {
        &self.windows
    }

    /// Window with the highest end year.
    pub fn latest(&self) -> &VersionWindow {
        // new() rejects an empty list and keeps windows sorted without overlap
        &self.windows[self.windows.len() - 1]
    }

    /// The window containing `year`, or the latest window when none does.
    pub fn resolve(&self, year: i32) -> &VersionWindow {
        match self.windows.iter().find(|w| w.contains(year)) {
            Some(w) => w,
            None => {
                let latest = self.latest();
                warn!(
                    "Year {} is outside every SoilGrids window, using release {}",
                    year, latest.release_year
                );
                latest
            }
        }
    }
}

impl Default for VersionTable {
    fn default() -> Self {
        VersionTable {
            windows: default_windows(),
        }
    }
}

pub fn default_windows() -> Vec<VersionWindow> {
    let window = |start_year, end_year, release_year, reasoning: &str| VersionWindow {
        start_year,
        end_year,
        collection: SOILGRIDS_COLLECTION.to_string(),
        suffix: "_mean".to_string(),
        release_year,
        reasoning: reasoning.to_string(),
    };
    vec![
        window(2017, 2019, 2017, "2017_data_was_only_available"),
        window(2020, 2021, 2020, "2020_data_became_available"),
        window(2022, 2025, 2022, "2022_data_is_latest"),
    ]
}

/// Upstream image holding `property`; pH lives in `phh2o`.
pub fn image_name(property: &str) -> &str {
    match property {
        "ph" => "phh2o",
        other => other,
    }
}

/// Asset id of the image holding `property` in `window`'s collection.
pub fn image_asset(window: &VersionWindow, property: &str) -> String {
    format!("{}/{}_mean", window.collection, image_name(property))
}

/// Band name for `property` at the surface depth, e.g. `sand_0-5cm_mean`.
pub fn band_name(window: &VersionWindow, property: &str) -> String {
    format!("{}_{}{}", image_name(property), DEPTH, window.suffix)
}

/// `(property, asset, band)` for every soil property in storage order.
pub fn band_names(window: &VersionWindow) -> Vec<(&'static str, String, String)> {
    SOIL_PROPERTIES
        .iter()
        .map(|p| (*p, image_asset(window, p), band_name(window, p)))
        .collect()
}
