use crate::error::LocationError;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

/// Default sites: Delta farmland, Nile valley, deserts, coasts and wetlands.
pub const DEFAULT_LOCATIONS_CSV: &str = include_str!("../../fixtures/locations.csv");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region: String,
}

/// Parse a `name,latitude,longitude,region` CSV with a header row.
pub fn parse_location_csv(csv_data: &str) -> Result<Vec<Location>, LocationError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());
    let locations = reader
        .deserialize::<Location>()
        .collect::<Result<Vec<_>, _>>()?;
    if locations.is_empty() {
        return Err(LocationError::Empty);
    }
    Ok(locations)
}

pub fn default_locations() -> Result<Vec<Location>, LocationError> {
    parse_location_csv(DEFAULT_LOCATIONS_CSV)
}
