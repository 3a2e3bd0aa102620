//! Core types and the temporal soil resolver for the desertification toolkit.
//!
//! The resolver maps a (location, year) request onto the SoilGrids release
//! that was available in that year, queries a [`source::GeoSource`] across
//! several resolutions and fallback coordinates, converts the encoded values
//! to physical units and fills in nutrient estimates before caching the
//! result.
#![allow(async_fn_in_trait)]

pub mod cache;
#[cfg(feature = "api")]
pub mod earth_engine;
pub mod error;
pub mod location;
pub mod nutrients;
pub mod resolver;
pub mod sample;
pub mod source;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;
