//! Command implementations for the desertification data CLI.
//!
//! `collect` runs the monthly collection job into SQLite, `export` dumps the
//! table to CSV, `correct-npk` re-derives nutrient columns of an export and
//! `clear-cache` drops the persisted soil cache.

use anyhow::Context;
use clap::Subcommand;
use desert_data::correction::CecUnit;
use desert_db::Database;
use desert_soil::cache::{JsonFileCache, SoilCache};
use desert_soil::earth_engine::EarthEngineClient;
use desert_soil::resolver::TemporalSoilResolver;
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod correct;
pub mod pipeline;

use checkpoint::CheckpointManager;
use collector::{CollectorSettings, MonthlyCollector};
use config::PipelineConfig;
use pipeline::{interrupt_flag, Pipeline, RunOptions};

#[derive(Subcommand)]
pub enum Command {
    /// Collect monthly soil, vegetation and climate records into the database
    Collect {
        /// Pipeline configuration file (TOML, optional)
        #[arg(short, long, default_value = "pipeline.toml")]
        config: PathBuf,

        /// Ignore the checkpoint and revisit every task
        #[arg(long)]
        no_resume: bool,

        /// Refetch soil data even when a cached sample exists
        #[arg(long)]
        force_refresh: bool,
    },

    /// Re-estimate N, P and K in an exported CSV and write a comparison report
    CorrectNpk {
        /// Exported historical data CSV
        #[arg(short, long, default_value = "historical_data_export.csv")]
        input: PathBuf,

        /// Corrected CSV
        #[arg(short, long, default_value = "historical_data_npk_corrected.csv")]
        output: PathBuf,

        /// Text report
        #[arg(short, long, default_value = "npk_correction_report.txt")]
        report: PathBuf,

        /// Configuration providing the nutrient parameters
        #[arg(short, long, default_value = "pipeline.toml")]
        config: PathBuf,

        /// Unit of the input `cec` column (`mmol/kg` for legacy exports)
        #[arg(long, default_value = "cmol/kg")]
        cec_unit: CecUnit,
    },

    /// Export the historical_data table to CSV
    Export {
        #[arg(short, long, default_value = "pipeline.toml")]
        config: PathBuf,

        /// Output path; `export_path` from the configuration when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete the persisted soil cache
    ClearCache {
        #[arg(short, long, default_value = "pipeline.toml")]
        config: PathBuf,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Collect {
            config,
            no_resume,
            force_refresh,
        } => run_collect(&config, !no_resume, force_refresh).await,
        Command::CorrectNpk {
            input,
            output,
            report,
            config,
            cec_unit,
        } => {
            let cfg = PipelineConfig::load(&config)?;
            correct::run_correction(&input, &output, &report, &cfg.soil.nutrients, cec_unit)?;
            Ok(())
        }
        Command::Export { config, output } => {
            let cfg = PipelineConfig::load(&config)?;
            let path = output.unwrap_or_else(|| cfg.export_path.clone());
            let db = Database::open(&cfg.database_path)?;
            let rows = db.export_csv(&path)?;
            info!("Exported {} rows to {}", rows, path.display());
            Ok(())
        }
        Command::ClearCache { config } => {
            let cfg = PipelineConfig::load(&config)?;
            let mut cache = JsonFileCache::open(cfg.cache_path.clone());
            cache
                .clear()
                .with_context(|| format!("failed to clear {}", cfg.cache_path.display()))?;
            info!("Soil cache cleared: {}", cfg.cache_path.display());
            Ok(())
        }
    }
}

async fn run_collect(config_path: &Path, resume: bool, force_refresh: bool) -> anyhow::Result<()> {
    let mut cfg = PipelineConfig::load(config_path)?;
    cfg.force_refresh |= force_refresh;

    let locations = cfg.locations()?;
    let versions = cfg.soil.version_table()?;
    let db = Database::open(&cfg.database_path)?;

    let ee = &cfg.earth_engine;
    let client = EarthEngineClient::new(
        &ee.project,
        ee.token.clone(),
        ee.base_url.as_deref(),
        Duration::from_secs(ee.timeout_secs),
    )
    .context("failed to initialise Earth Engine client")?;
    info!("Earth Engine client ready for project {}", ee.project);

    let cache = JsonFileCache::open(cfg.cache_path.clone());
    let resolver = TemporalSoilResolver::new(client, cache, versions, cfg.soil.resolver_settings());
    let collector = MonthlyCollector::new(resolver, CollectorSettings::from_config(&cfg));
    let checkpoint = CheckpointManager::load(cfg.checkpoint_path.clone());

    let options = RunOptions::from_config(&cfg, resume);

    let mut pipeline = Pipeline::new(collector, db, checkpoint, interrupt_flag());
    pipeline.run(&locations, &options).await?;
    Ok(())
}
