//! Pipeline configuration.
//!
//! Loaded from an optional TOML file and `DESERT_*` environment variables
//! (nested keys use `__`, e.g. `DESERT_EARTH_ENGINE__PROJECT`). Every field
//! has a default, so an empty configuration runs the full 2017-2025 job.

use anyhow::{bail, Context};
use desert_soil::location::{default_locations, Location};
use desert_soil::nutrients::NutrientParams;
use desert_soil::resolver::{FallbackArea, ResolverSettings};
use desert_soil::version::{default_windows, VersionTable, VersionWindow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub start_year: i32,
    pub end_year: i32,
    /// Rows buffered before a bulk insert.
    pub batch_size: usize,
    /// Pause between tasks.
    pub request_delay_secs: f64,
    pub retry_attempts: u32,
    /// Wait before retry `n` is `n × retry_base_secs`.
    pub retry_base_secs: f64,
    /// Bypass the soil cache on every request.
    pub force_refresh: bool,

    pub database_path: PathBuf,
    pub table_name: String,
    pub cache_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub export_path: PathBuf,

    pub earth_engine: EarthEngineConfig,
    pub datasets: DatasetConfig,
    pub soil: SoilConfig,
    /// Sites to collect; the embedded list when absent.
    pub locations: Option<Vec<Location>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            start_year: 2017,
            end_year: 2025,
            batch_size: 2,
            request_delay_secs: 2.0,
            retry_attempts: 3,
            retry_base_secs: 5.0,
            force_refresh: false,
            database_path: PathBuf::from("data/historical.db"),
            table_name: "historical_data".to_string(),
            cache_path: PathBuf::from("cache/soil_cache.json"),
            checkpoint_path: PathBuf::from("checkpoint.json"),
            export_path: PathBuf::from("historical_data_export.csv"),
            earth_engine: EarthEngineConfig::default(),
            datasets: DatasetConfig::default(),
            soil: SoilConfig::default(),
            locations: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EarthEngineConfig {
    pub project: String,
    /// Bearer token; `EARTHENGINE_TOKEN` when unset.
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EarthEngineConfig {
    fn default() -> Self {
        EarthEngineConfig {
            project: String::new(),
            token: None,
            base_url: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub ndvi_collection: String,
    pub ndvi_band: String,
    pub ndvi_scale_factor: f64,
    /// Months the NDVI window is widened backwards when the month is empty.
    pub ndvi_lookback_months: i32,
    pub climate_collection: String,
    pub climate_buffer_m: f64,
    pub climate_scale_m: u32,
    pub land_cover_image: String,
    pub land_cover_band: String,
    /// Pixel size for NDVI and land cover.
    pub scale_m: u32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            ndvi_collection: "MODIS/061/MOD13A2".to_string(),
            ndvi_band: "NDVI".to_string(),
            ndvi_scale_factor: 0.0001,
            ndvi_lookback_months: 2,
            climate_collection: "ECMWF/ERA5_LAND/HOURLY".to_string(),
            climate_buffer_m: 10_000.0,
            climate_scale_m: 11_132,
            land_cover_image: "ESA/WorldCover/v100/2020".to_string(),
            land_cover_band: "Map".to_string(),
            scale_m: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SoilConfig {
    pub resolutions: Vec<u32>,
    pub versions: Vec<VersionWindow>,
    pub fallback_areas: Vec<FallbackArea>,
    pub nutrients: NutrientParams,
}

impl Default for SoilConfig {
    fn default() -> Self {
        let settings = ResolverSettings::default();
        SoilConfig {
            resolutions: settings.resolutions,
            versions: default_windows(),
            fallback_areas: settings.fallback_areas,
            nutrients: settings.nutrients,
        }
    }
}

impl SoilConfig {
    pub fn version_table(&self) -> anyhow::Result<VersionTable> {
        VersionTable::new(self.versions.clone()).context("invalid SoilGrids version table")
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            resolutions: self.resolutions.clone(),
            fallback_areas: self.fallback_areas.clone(),
            nutrients: self.nutrients.clone(),
        }
    }
}

impl PipelineConfig {
    /// Read `path` (if it exists) layered under `DESERT_*` variables.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("DESERT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: PipelineConfig = settings
            .try_deserialize()
            .context("failed to deserialise PipelineConfig")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.start_year > self.end_year {
            bail!("start_year {} is after end_year {}", self.start_year, self.end_year);
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.retry_attempts == 0 {
            bail!("retry_attempts must be at least 1");
        }
        if self.soil.resolutions.is_empty() {
            bail!("soil.resolutions is empty");
        }
        if !self.request_delay_secs.is_finite() || self.request_delay_secs < 0.0 {
            bail!("request_delay_secs must be a non-negative number");
        }
        if !self.retry_base_secs.is_finite() || self.retry_base_secs < 0.0 {
            bail!("retry_base_secs must be a non-negative number");
        }
        self.soil.version_table()?;
        Ok(())
    }

    pub fn locations(&self) -> anyhow::Result<Vec<Location>> {
        match &self.locations {
            Some(list) if !list.is_empty() => Ok(list.clone()),
            Some(_) => bail!("locations list is empty"),
            None => default_locations().context("embedded location list"),
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs_f64(self.retry_base_secs)
    }
}
