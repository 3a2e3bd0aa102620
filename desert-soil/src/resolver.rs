//! Temporal soil resolver.
//!
//! Soil properties are treated as static within a calendar year, so one
//! sample serves all twelve months. A cached sample is reused only while its
//! release matches the release the version table assigns to its year.

use desert_utils::{dates::now_iso, keys::cache_key};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::SoilCache;
use crate::error::CacheError;
use crate::nutrients::NutrientParams;
use crate::sample::{convert_units, PhysicalFields, RawSoilFields, SoilMetadata, SoilSample, NPK_SOURCE};
use crate::source::{BandSelection, GeoSource, Geometry, Layer, Reducer, RegionQuery};
use crate::version::{band_names, VersionTable};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }
}

/// Bounding box where SoilGrids is known to be empty at the requested
/// point, with nearby coordinates to try instead, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackArea {
    pub name: String,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub alternates: Vec<Coordinate>,
}

impl FallbackArea {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&latitude)
            && (self.lon_min..=self.lon_max).contains(&longitude)
    }

    /// Urban Alexandria, where the fine-resolution rasters are masked.
    pub fn alexandria() -> Self {
        FallbackArea {
            name: "Alexandria".to_string(),
            lat_min: 30.8,
            lat_max: 31.5,
            lon_min: 29.5,
            lon_max: 30.2,
            alternates: vec![
                Coordinate::new(31.2150, 29.9500),
                Coordinate::new(31.1800, 29.8900),
                Coordinate::new(31.2500, 29.9800),
                Coordinate::new(31.2000, 30.0000),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    /// Candidate pixel sizes in meters, fine to coarse.
    pub resolutions: Vec<u32>,
    pub fallback_areas: Vec<FallbackArea>,
    pub nutrients: NutrientParams,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            resolutions: vec![1000, 2000, 5000],
            fallback_areas: vec![FallbackArea::alexandria()],
            nutrients: NutrientParams::default(),
        }
    }
}

/// Encoded soil values plus where they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFetch {
    pub fields: RawSoilFields,
    pub scale_used: Option<u32>,
    /// Requested point, set only when an alternate coordinate supplied the values.
    pub substituted_from: Option<Coordinate>,
}

impl RawFetch {
    pub fn has_data(&self) -> bool {
        self.fields.has_data()
    }
}

/// Nitrogen (%) from organic carbon when the direct measurement is absent.
///
/// `fields.soc` is in %, the estimator takes g/kg.
pub fn estimate_missing_nitrogen(fields: &PhysicalFields, params: &NutrientParams) -> Option<f64> {
    if fields.nitrogen.is_some() {
        return None;
    }
    let soc = fields.soc.filter(|s| *s > 0.0)?;
    Some(params.estimate_nitrogen(Some(soc * 10.0)))
}

/// Phosphorus and potassium (mg/kg); never missing.
pub fn estimate_phosphorus_potassium(fields: &PhysicalFields, params: &NutrientParams) -> (f64, f64) {
    let soc_g_kg = fields.soc.map(|s| s * 10.0);
    let phosphorus = params.estimate_phosphorus(soc_g_kg, fields.cec, fields.clay, fields.ph);
    let potassium = params.estimate_potassium(fields.cec, fields.clay, fields.silt, soc_g_kg);
    debug!("Estimated P={} mg/kg, K={} mg/kg", phosphorus, potassium);
    (phosphorus, potassium)
}

pub struct TemporalSoilResolver<S, C> {
    source: S,
    cache: C,
    versions: VersionTable,
    settings: ResolverSettings,
}

impl<S: GeoSource, C: SoilCache> TemporalSoilResolver<S, C> {
    pub fn new(source: S, cache: C, versions: VersionTable, settings: ResolverSettings) -> Self {
        info!("Soil cache holds {} entries", cache.len());
        for w in versions.windows() {
            info!(
                "Years {}-{} use SoilGrids release {} ({})",
                w.start_year, w.end_year, w.release_year, w.reasoning
            );
        }
        TemporalSoilResolver {
            source,
            cache,
            versions,
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn clear_cache(&mut self) -> Result<(), CacheError> {
        self.cache.clear()?;
        info!("Soil cache cleared");
        Ok(())
    }

    /// Query each resolution in turn until sand comes back.
    ///
    /// Upstream errors end the search with an empty result.
    pub async fn fetch_raw(&self, latitude: f64, longitude: f64, year: i32) -> RawFetch {
        let window = self.versions.resolve(year);
        let layer = Layer::Image(
            band_names(window)
                .into_iter()
                .map(|(_, asset, band)| BandSelection::new(asset, band))
                .collect(),
        );

        for &scale in &self.settings.resolutions {
            let query = RegionQuery::new(
                layer.clone(),
                Geometry::point(latitude, longitude),
                Reducer::First,
                scale,
            );
            match self.source.reduce_region(&query).await {
                Ok(values) => {
                    let fields = RawSoilFields::from_bands(&values, window);
                    if fields.has_data() {
                        debug!("Got soil data at scale {}m for {}", scale, year);
                        return RawFetch {
                            fields,
                            scale_used: Some(scale),
                            substituted_from: None,
                        };
                    }
                    debug!("No soil data at scale {}m for {}", scale, year);
                }
                Err(e) => {
                    error!(
                        "Soil fetch failed at ({:.3}, {:.3}) for {}: {}",
                        latitude, longitude, year, e
                    );
                    return RawFetch::default();
                }
            }
        }
        RawFetch::default()
    }

    /// [`Self::fetch_raw`] at the requested point, then at the alternates of
    /// the first fallback area containing it.
    pub async fn fetch_with_fallback(&self, latitude: f64, longitude: f64, year: i32) -> RawFetch {
        let original = self.fetch_raw(latitude, longitude, year).await;
        if original.has_data() {
            return original;
        }

        let Some(area) = self
            .settings
            .fallback_areas
            .iter()
            .find(|a| a.contains(latitude, longitude))
        else {
            return original;
        };

        info!("{} area detected, trying alternative coordinates", area.name);
        for (i, alt) in area.alternates.iter().enumerate() {
            info!(
                "Trying alternative {}: ({:.3}, {:.3})",
                i + 1,
                alt.latitude,
                alt.longitude
            );
            let mut fetch = self.fetch_raw(alt.latitude, alt.longitude, year).await;
            if fetch.has_data() {
                info!("Found soil data at alternative location {}", i + 1);
                fetch.substituted_from = Some(Coordinate::new(latitude, longitude));
                return fetch;
            }
        }
        original
    }

    /// Soil sample for `(latitude, longitude)` as it looked in `year`.
    ///
    /// Never fails for lack of data: the sample's soil fields are then all
    /// `None` and only the nutrient defaults are filled.
    pub async fn get_soil_data_for_date(
        &mut self,
        latitude: f64,
        longitude: f64,
        year: i32,
        month: u32,
        force_refresh: bool,
    ) -> SoilSample {
        let key = cache_key(latitude, longitude, year);
        let window = self.versions.resolve(year).clone();

        if !force_refresh {
            if let Some(cached) = self.cache.get(&key) {
                let cached_release = cached.metadata.soilgrids_release_used;
                if cached_release == window.release_year && cached.has_texture() {
                    debug!("Using cached soil data for {}-{:02}", year, month);
                    return cached.clone();
                }
                if cached_release != window.release_year {
                    warn!(
                        "Cached soil data version mismatch: {} vs expected {}",
                        cached_release, window.release_year
                    );
                }
            }
        }

        info!(
            "Fetching soil data for ({:.3}, {:.3}) - Year {}",
            latitude, longitude, year
        );
        let fetch = self.fetch_with_fallback(latitude, longitude, year).await;
        let mut fields = convert_units(&fetch.fields);

        if fields.sand.is_some() {
            if let Some(n) = estimate_missing_nitrogen(&fields, &self.settings.nutrients) {
                info!("Using estimated nitrogen: {:.3}%", n);
                fields.nitrogen = Some(n);
            }
        }
        let (phosphorus, potassium) = estimate_phosphorus_potassium(&fields, &self.settings.nutrients);

        let metadata = SoilMetadata {
            soilgrids_release_used: window.release_year,
            data_represented_year: year,
            temporal_reasoning: window.reasoning.clone(),
            fetch_date: now_iso(),
            scale_used: fetch.scale_used,
            collection_used: window.collection.clone(),
            is_alternative: fetch.substituted_from.is_some(),
            original_latitude: fetch.substituted_from.map(|c| c.latitude),
            original_longitude: fetch.substituted_from.map(|c| c.longitude),
            latitude,
            longitude,
            npk_source: NPK_SOURCE.to_string(),
            historically_accurate: true,
        };
        let sample = SoilSample::from_fields(&fields, Some(phosphorus), Some(potassium), metadata);

        match sample.sand {
            Some(sand) if sand > 0.0 => {
                let note = if year < window.release_year {
                    "contemporary"
                } else {
                    "current"
                };
                info!(
                    "Soil data for {}: Sand={:.1}%, Silt={:.1}%, Clay={:.1}% (Total: {:.1}%) using {} {} data | N={:.3}%, P={}mg/kg, K={}mg/kg",
                    year,
                    sand,
                    sample.silt.unwrap_or(0.0),
                    sample.clay.unwrap_or(0.0),
                    sample.texture_sum(),
                    note,
                    window.release_year,
                    sample.nitrogen.unwrap_or(0.0),
                    phosphorus,
                    potassium
                );
                self.cache.put(key, sample.clone());
                if let Err(e) = self.cache.flush() {
                    warn!("Soil cache write skipped: {}", e);
                }
            }
            _ => error!("No valid soil data available for {}", year),
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::JsonFileCache;
    use crate::error::SourceError;
    use crate::testing::{empty_bands, loam_bands, query_point, sample_with_texture, RecordingSource};
    use std::collections::HashMap;

    type MemoryCache = HashMap<String, SoilSample>;

    fn resolver(
        source: RecordingSource,
        cache: MemoryCache,
    ) -> TemporalSoilResolver<RecordingSource, MemoryCache> {
        TemporalSoilResolver::new(source, cache, VersionTable::default(), ResolverSettings::default())
    }

    #[tokio::test]
    async fn first_resolution_with_sand_wins() {
        let source = RecordingSource::new(|q| {
            if q.scale == 2000 {
                Ok(loam_bands())
            } else {
                Ok(empty_bands())
            }
        });
        let r = resolver(source, MemoryCache::new());
        let fetch = r.fetch_raw(27.18, 31.18, 2018).await;
        assert_eq!(fetch.scale_used, Some(2000));
        assert_eq!(fetch.fields.sand, Some(452.0));
        assert_eq!(r.source().calls(), 2);

        let q = &r.source().queries.borrow()[0];
        assert_eq!(q.reducer, Reducer::First);
        assert!(q.best_effort);
        assert_eq!(q.max_pixels, 1e9);
    }

    #[tokio::test]
    async fn upstream_error_is_empty_result() {
        let source = RecordingSource::new(|_| Err(SourceError::Upstream("bad asset".into())));
        let r = resolver(source, MemoryCache::new());
        let fetch = r.fetch_raw(27.18, 31.18, 2018).await;
        assert!(!fetch.has_data());
        assert_eq!(fetch.scale_used, None);
        assert_eq!(r.source().calls(), 1);
    }

    #[tokio::test]
    async fn alternate_coordinate_supplies_values() {
        // Only the second Alexandria alternate has data.
        let source = RecordingSource::new(|q| {
            let (lat, lon) = query_point(q);
            if lat == 31.1800 && lon == 29.8900 {
                Ok(loam_bands())
            } else {
                Ok(empty_bands())
            }
        });
        let mut r = resolver(source, MemoryCache::new());
        let sample = r.get_soil_data_for_date(31.1501, 29.9187, 2021, 5, false).await;

        assert!(sample.metadata.is_alternative);
        assert_eq!(sample.metadata.original_latitude, Some(31.1501));
        assert_eq!(sample.metadata.original_longitude, Some(29.9187));
        assert_eq!(sample.sand, Some(45.2));
        assert_eq!(sample.metadata.soilgrids_release_used, 2020);
        // 3 scales at the origin, 3 at the first alternate, 1 at the second
        assert_eq!(r.source().calls(), 7);
    }

    #[tokio::test]
    async fn no_fallback_outside_area() {
        let source = RecordingSource::new(|_| Ok(empty_bands()));
        let mut r = resolver(source, MemoryCache::new());
        let sample = r.get_soil_data_for_date(23.5, 32.5, 2019, 1, false).await;

        assert_eq!(r.source().calls(), 3);
        assert!(!sample.metadata.is_alternative);
        assert_eq!(sample.sand, None);
        assert_eq!(sample.nitrogen, None);
        assert_eq!(sample.phosphorus, Some(12.0));
        assert_eq!(sample.potassium, Some(200.0));
        assert!(r.cache().is_empty(), "empty samples are not cached");
    }

    #[tokio::test]
    async fn second_request_in_year_is_cached() {
        let source = RecordingSource::new(|_| Ok(loam_bands()));
        let mut r = resolver(source, MemoryCache::new());

        let first = r.get_soil_data_for_date(30.8865, 31.1004, 2023, 1, false).await;
        let calls = r.source().calls();
        let second = r.get_soil_data_for_date(30.8865, 31.1004, 2023, 7, false).await;

        assert_eq!(r.source().calls(), calls);
        assert_eq!(first, second);
        // nitrogen band was empty, estimated from SOC 3.64%
        assert_eq!(first.nitrogen, Some(0.317));
        assert_eq!(first.phosphorus, Some(30.5));
        assert_eq!(first.potassium, Some(350.0));
        assert_eq!(first.metadata.scale_used, Some(1000));
    }

    #[tokio::test]
    async fn force_refresh_queries_again() {
        let source = RecordingSource::new(|_| Ok(loam_bands()));
        let mut r = resolver(source, MemoryCache::new());
        r.get_soil_data_for_date(30.8865, 31.1004, 2023, 1, false).await;
        r.get_soil_data_for_date(30.8865, 31.1004, 2023, 2, true).await;
        assert_eq!(r.source().calls(), 2);
    }

    #[tokio::test]
    async fn stale_release_is_refreshed() {
        let mut cache = MemoryCache::new();
        cache.insert(cache_key(30.8865, 31.1004, 2018), sample_with_texture(2022, 2018));

        let source = RecordingSource::new(|_| Ok(loam_bands()));
        let mut r = resolver(source, cache);
        let sample = r.get_soil_data_for_date(30.8865, 31.1004, 2018, 3, false).await;

        assert_eq!(r.source().calls(), 1);
        assert_eq!(sample.metadata.soilgrids_release_used, 2017);
        assert_eq!(sample.sand, Some(45.2));
    }

    #[tokio::test]
    async fn cached_sample_without_clay_is_refreshed() {
        let mut stale = sample_with_texture(2017, 2018);
        stale.clay = Some(0.0);
        let mut cache = MemoryCache::new();
        cache.insert(cache_key(30.8865, 31.1004, 2018), stale);

        let source = RecordingSource::new(|_| Ok(loam_bands()));
        let mut r = resolver(source, cache);
        let sample = r.get_soil_data_for_date(30.8865, 31.1004, 2018, 3, false).await;
        assert_eq!(r.source().calls(), 1);
        assert_eq!(sample.clay, Some(25.5));
    }

    #[tokio::test]
    async fn write_through_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soil_cache.json");
        let source = RecordingSource::new(|_| Ok(loam_bands()));
        let mut r = TemporalSoilResolver::new(
            source,
            JsonFileCache::open(&path),
            VersionTable::default(),
            ResolverSettings::default(),
        );
        r.get_soil_data_for_date(29.4084, 30.7428, 2020, 4, false).await;

        let reopened = JsonFileCache::open(&path);
        assert!(reopened.get("29.408_30.743_2020").is_some());

        r.clear_cache().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn nitrogen_fallback_only_when_missing() {
        let params = NutrientParams::default();
        let mut fields = PhysicalFields {
            soc: Some(2.3),
            ..Default::default()
        };
        assert_eq!(estimate_missing_nitrogen(&fields, &params), Some(0.2));
        fields.soc = Some(0.0);
        assert_eq!(estimate_missing_nitrogen(&fields, &params), None);
        fields.soc = Some(2.3);
        fields.nitrogen = Some(0.12);
        assert_eq!(estimate_missing_nitrogen(&fields, &params), None);
    }

    #[test]
    fn alexandria_box_is_inclusive() {
        let area = FallbackArea::alexandria();
        assert!(area.contains(31.1501, 29.9187));
        assert!(area.contains(30.8, 30.2));
        assert!(!area.contains(31.3675, 31.7144));
    }
}
