//! Narrow interface to a geospatial raster service.
//!
//! Queries are plain data so that a live client and a test double can
//! implement [`GeoSource`] side by side.

use crate::error::SourceError;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Named band to reduced value; a band that was not covered maps to `None`.
pub type BandValues = HashMap<String, Option<f64>>;

pub const DEFAULT_MAX_PIXELS: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    Point { latitude: f64, longitude: f64 },
    /// Point buffered by `meters`.
    Buffer {
        latitude: f64,
        longitude: f64,
        meters: f64,
    },
}

impl Geometry {
    pub fn point(latitude: f64, longitude: f64) -> Self {
        Geometry::Point {
            latitude,
            longitude,
        }
    }

    pub fn buffered(latitude: f64, longitude: f64, meters: f64) -> Self {
        Geometry::Buffer {
            latitude,
            longitude,
            meters,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    First,
    Mean,
    Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    Mean,
    Sum,
}

/// Images of `collection` acquired in `[start, end)` that intersect `bounds`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionWindow {
    pub collection: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bounds: Geometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandSelection {
    pub asset: String,
    pub band: String,
}

impl BandSelection {
    pub fn new(asset: impl Into<String>, band: impl Into<String>) -> Self {
        BandSelection {
            asset: asset.into(),
            band: band.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// One band from each listed image, stacked into a single image.
    Image(Vec<BandSelection>),
    /// One band composited over a filtered collection, optionally rescaled.
    Composite {
        window: CollectionWindow,
        band: String,
        composite: Composite,
        scale_factor: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionQuery {
    pub layer: Layer,
    pub geometry: Geometry,
    pub reducer: Reducer,
    /// Nominal pixel size in meters.
    pub scale: u32,
    pub best_effort: bool,
    pub max_pixels: f64,
}

impl RegionQuery {
    pub fn new(layer: Layer, geometry: Geometry, reducer: Reducer, scale: u32) -> Self {
        RegionQuery {
            layer,
            geometry,
            reducer,
            scale,
            best_effort: true,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

pub trait GeoSource {
    async fn reduce_region(&self, query: &RegionQuery) -> Result<BandValues, SourceError>;

    /// Number of images in the window.
    async fn collection_size(&self, window: &CollectionWindow) -> Result<u64, SourceError>;
}

impl<S: GeoSource> GeoSource for &S {
    async fn reduce_region(&self, query: &RegionQuery) -> Result<BandValues, SourceError> {
        (**self).reduce_region(query).await
    }

    async fn collection_size(&self, window: &CollectionWindow) -> Result<u64, SourceError> {
        (**self).collection_size(window).await
    }
}
