use crate::error::SourceError;
use crate::sample::{SoilMetadata, SoilSample, NPK_SOURCE};
use crate::source::{BandValues, CollectionWindow, GeoSource, Geometry, RegionQuery};
use std::cell::RefCell;

type Responder = Box<dyn Fn(&RegionQuery) -> Result<BandValues, SourceError>>;

/// GeoSource double that records every query and answers from a closure.
pub struct RecordingSource {
    respond: Responder,
    pub queries: RefCell<Vec<RegionQuery>>,
}

impl RecordingSource {
    pub fn new(respond: impl Fn(&RegionQuery) -> Result<BandValues, SourceError> + 'static) -> Self {
        RecordingSource {
            respond: Box::new(respond),
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.borrow().len()
    }
}

impl GeoSource for RecordingSource {
    async fn reduce_region(&self, query: &RegionQuery) -> Result<BandValues, SourceError> {
        self.queries.borrow_mut().push(query.clone());
        (self.respond)(query)
    }

    async fn collection_size(&self, _window: &CollectionWindow) -> Result<u64, SourceError> {
        Ok(1)
    }
}

pub fn query_point(query: &RegionQuery) -> (f64, f64) {
    match query.geometry {
        Geometry::Point {
            latitude,
            longitude,
        }
        | Geometry::Buffer {
            latitude,
            longitude,
            ..
        } => (latitude, longitude),
    }
}

/// Encoded SoilGrids bands for a loamy sample.
pub fn loam_bands() -> BandValues {
    [
        ("sand_0-5cm_mean", Some(452.0)),
        ("silt_0-5cm_mean", Some(293.0)),
        ("clay_0-5cm_mean", Some(255.0)),
        ("soc_0-5cm_mean", Some(364.0)),
        ("phh2o_0-5cm_mean", Some(76.0)),
        ("bdod_0-5cm_mean", Some(138.0)),
        ("cec_0-5cm_mean", Some(214.0)),
        ("nitrogen_0-5cm_mean", None),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn empty_bands() -> BandValues {
    BandValues::new()
}

pub fn sample_with_texture(release: i32, year: i32) -> SoilSample {
    SoilSample {
        sand: Some(45.0),
        silt: Some(30.0),
        clay: Some(25.0),
        soc: Some(1.2),
        ph: Some(7.8),
        bdod: Some(1.4),
        cec: Some(18.0),
        nitrogen: Some(0.1),
        phosphorus: Some(10.0),
        potassium: Some(300.0),
        metadata: SoilMetadata {
            soilgrids_release_used: release,
            data_represented_year: year,
            temporal_reasoning: "cached".to_string(),
            fetch_date: "2024-01-01T00:00:00.000000".to_string(),
            scale_used: Some(1000),
            collection_used: "projects/soilgrids-isric".to_string(),
            is_alternative: false,
            original_latitude: None,
            original_longitude: None,
            latitude: 31.1501,
            longitude: 29.9187,
            npk_source: NPK_SOURCE.to_string(),
            historically_accurate: true,
        },
    }
}
