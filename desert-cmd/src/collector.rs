//! One (location, year, month) task: soil, NDVI, climate and land cover.

use crate::config::{DatasetConfig, PipelineConfig};
use anyhow::Context;
use desert_data::climate::{kelvin_to_celsius, relative_humidity};
use desert_data::observation::MonthlyObservation;
use desert_soil::cache::SoilCache;
use desert_soil::error::SourceError;
use desert_soil::location::Location;
use desert_soil::resolver::TemporalSoilResolver;
use desert_soil::source::{
    BandSelection, BandValues, CollectionWindow, Composite, GeoSource, Geometry, Layer, Reducer,
    RegionQuery,
};
use desert_utils::dates::{month_window, shift_months};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use std::time::Duration;

pub const NDVI_SOURCE: &str = "MODIS/MOD13A2";
pub const NDVI_EXTENDED_SOURCE: &str = "MODIS/MOD13A2_extended";
pub const CLIMATE_SOURCE: &str = "ERA5_LAND";
pub const LAND_COVER_SOURCE: &str = "ESA/WorldCover";

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    pub datasets: DatasetConfig,
    pub force_refresh: bool,
    pub retry_attempts: u32,
    pub retry_base: Duration,
}

impl CollectorSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        CollectorSettings {
            datasets: config.datasets.clone(),
            force_refresh: config.force_refresh,
            retry_attempts: config.retry_attempts.max(1),
            retry_base: config.retry_base(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateFields {
    pub t2m_c: Option<f64>,
    pub td2m_c: Option<f64>,
    pub rh_pct: Option<f64>,
    pub tp_m: Option<f64>,
    pub ssrd_jm2: Option<f64>,
    pub source: Option<String>,
}

pub struct MonthlyCollector<S, C> {
    resolver: TemporalSoilResolver<S, C>,
    settings: CollectorSettings,
}

fn band(values: &BandValues, name: &str) -> Option<f64> {
    values.get(name).copied().flatten().filter(|v| v.is_finite())
}

impl<S: GeoSource, C: SoilCache> MonthlyCollector<S, C> {
    pub fn new(resolver: TemporalSoilResolver<S, C>, settings: CollectorSettings) -> Self {
        MonthlyCollector { resolver, settings }
    }

    pub fn resolver(&self) -> &TemporalSoilResolver<S, C> {
        &self.resolver
    }

    fn source(&self) -> &S {
        self.resolver.source()
    }

    /// Collect every covariate for one month and score the row.
    pub async fn collect(
        &mut self,
        location: &Location,
        year: i32,
        month: u32,
    ) -> anyhow::Result<MonthlyObservation> {
        let (start, end) = month_window(year, month)?;
        let (lat, lon) = (location.latitude, location.longitude);

        let soil = self
            .resolver
            .get_soil_data_for_date(lat, lon, year, month, self.settings.force_refresh)
            .await;
        let mut obs = MonthlyObservation::new(location, year, month, &soil);

        let (ndvi, ndvi_source) = self
            .ndvi(lat, lon, start, end)
            .await
            .with_context(|| format!("NDVI for {} {}-{:02}", location.name, year, month))?;
        obs.ndvi = ndvi;
        obs.ndvi_source = ndvi_source;

        let climate = self
            .climate(lat, lon, start, end)
            .await
            .with_context(|| format!("ERA5 for {} {}-{:02}", location.name, year, month))?;
        obs.t2m_c = climate.t2m_c;
        obs.td2m_c = climate.td2m_c;
        obs.rh_pct = climate.rh_pct;
        obs.tp_m = climate.tp_m;
        obs.ssrd_jm2 = climate.ssrd_jm2;
        obs.climate_source = climate.source;

        let land_cover = self
            .land_cover(lat, lon)
            .await
            .with_context(|| format!("land cover for {}", location.name))?;
        obs.lc_source = land_cover.map(|_| LAND_COVER_SOURCE.to_string());
        obs.lc_type1 = land_cover;

        let score = obs.score();
        debug!(
            "{} {}-{:02}: quality {:.1}%",
            location.name, year, month, score
        );
        Ok(obs)
    }

    fn composite_query(
        &self,
        window: CollectionWindow,
        band: &str,
        composite: Composite,
        scale_factor: Option<f64>,
        geometry: Geometry,
        scale: u32,
    ) -> RegionQuery {
        RegionQuery::new(
            Layer::Composite {
                window,
                band: band.to_string(),
                composite,
                scale_factor,
            },
            geometry,
            Reducer::Mean,
            scale,
        )
    }

    /// Mean NDVI for the month; the window is widened backwards once when empty.
    pub async fn ndvi(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Option<f64>, Option<String>), SourceError> {
        let ds = &self.settings.datasets;
        let point = Geometry::point(lat, lon);
        let mut window = CollectionWindow {
            collection: ds.ndvi_collection.clone(),
            start,
            end,
            bounds: point,
        };
        let mut source = NDVI_SOURCE;

        if self.source().collection_size(&window).await? == 0 {
            let extended = shift_months(start, -ds.ndvi_lookback_months)
                .map_err(|e| SourceError::Setup(e.to_string()))?;
            debug!("No NDVI images {}..{}, extending window to {}", start, end, extended);
            window.start = extended;
            if self.source().collection_size(&window).await? == 0 {
                return Ok((None, None));
            }
            source = NDVI_EXTENDED_SOURCE;
        }

        let query = self.composite_query(
            window,
            &ds.ndvi_band,
            Composite::Mean,
            Some(ds.ndvi_scale_factor),
            point,
            ds.scale_m,
        );
        let values = self.source().reduce_region(&query).await?;
        Ok((band(&values, &ds.ndvi_band), Some(source.to_string())))
    }

    /// Monthly ERA5-Land climate over a buffered point.
    pub async fn climate(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ClimateFields, SourceError> {
        let ds = &self.settings.datasets;
        let area = Geometry::buffered(lat, lon, ds.climate_buffer_m);
        let window = CollectionWindow {
            collection: ds.climate_collection.clone(),
            start,
            end,
            bounds: Geometry::point(lat, lon),
        };

        if self.source().collection_size(&window).await? == 0 {
            warn!("No ERA5 images for {}..{}", start, end);
            return Ok(ClimateFields::default());
        }

        let field = |name: &str, composite: Composite| {
            self.composite_query(window.clone(), name, composite, None, area, ds.climate_scale_m)
        };

        let t2m_c = self
            .field_value("temperature_2m", &field("temperature_2m", Composite::Mean))
            .await
            .map(kelvin_to_celsius);
        let td2m_c = self
            .field_value(
                "dewpoint_temperature_2m",
                &field("dewpoint_temperature_2m", Composite::Mean),
            )
            .await
            .map(kelvin_to_celsius);
        let rh_pct = match (t2m_c, td2m_c) {
            (Some(t), Some(td)) => relative_humidity(t, td),
            _ => None,
        };
        let tp_m = self
            .accumulation("total_precipitation", &field("total_precipitation", Composite::Sum))
            .await;
        let ssrd_jm2 = self
            .accumulation(
                "surface_solar_radiation_downwards",
                &field("surface_solar_radiation_downwards", Composite::Sum),
            )
            .await;

        Ok(ClimateFields {
            t2m_c,
            td2m_c,
            rh_pct,
            tp_m,
            ssrd_jm2,
            source: Some(CLIMATE_SOURCE.to_string()),
        })
    }

    /// Band value after retries; a failure becomes `None`.
    async fn field_value(&self, name: &str, query: &RegionQuery) -> Option<f64> {
        match self.reduce_with_retry(query).await {
            Ok(values) => band(&values, name),
            Err(e) => {
                error!("Failed to fetch {}: {}", name, e);
                None
            }
        }
    }

    /// Like `field_value`, but a missing sum counts as zero.
    async fn accumulation(&self, name: &str, query: &RegionQuery) -> Option<f64> {
        match self.reduce_with_retry(query).await {
            Ok(values) => Some(band(&values, name).unwrap_or(0.0)),
            Err(e) => {
                error!("Failed to fetch {}: {}", name, e);
                None
            }
        }
    }

    /// Retry transient faults, waiting `attempt × retry_base` between tries.
    pub async fn reduce_with_retry(&self, query: &RegionQuery) -> Result<BandValues, SourceError> {
        let attempts = self.settings.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.source().reduce_region(query).await {
                Ok(values) => return Ok(values),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let wait = self.settings.retry_base * attempt;
                    warn!(
                        "Network error (attempt {}/{}), retrying in {:?}: {}",
                        attempt, attempts, wait, e
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Modal land cover class at the point; class 0 means no data.
    pub async fn land_cover(&self, lat: f64, lon: f64) -> Result<Option<i64>, SourceError> {
        let ds = &self.settings.datasets;
        let query = RegionQuery::new(
            Layer::Image(vec![BandSelection::new(
                ds.land_cover_image.as_str(),
                ds.land_cover_band.as_str(),
            )]),
            Geometry::point(lat, lon),
            Reducer::Mode,
            ds.scale_m,
        );
        let values = self.source().reduce_region(&query).await?;
        let class = band(&values, &ds.land_cover_band)
            .filter(|v| *v != 0.0)
            .map(|v| v.round() as i64);
        if class.is_none() {
            info!("No land cover class at ({:.3}, {:.3})", lat, lon);
        }
        Ok(class)
    }
}
