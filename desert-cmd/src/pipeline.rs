//! Batch walk over locations × years × months.

use crate::checkpoint::CheckpointManager;
use crate::collector::MonthlyCollector;
use crate::config::PipelineConfig;
use anyhow::Context;
use desert_data::observation::MonthlyObservation;
use desert_db::{Database, InsertMode};
use desert_soil::cache::SoilCache;
use desert_soil::location::Location;
use desert_soil::source::GeoSource;
use desert_utils::keys::task_id;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub start_year: i32,
    pub end_year: i32,
    pub batch_size: usize,
    pub request_delay: Duration,
    pub table_name: String,
    pub resume: bool,
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig, resume: bool) -> Self {
        RunOptions {
            start_year: config.start_year,
            end_year: config.end_year,
            batch_size: config.batch_size,
            request_delay: config.request_delay(),
            table_name: config.table_name.clone(),
            resume,
        }
    }

    /// Tasks in one full run: locations × years × 12 months.
    pub fn total_tasks(&self, locations: usize) -> usize {
        let years = (self.end_year - self.start_year + 1).max(0) as usize;
        locations * years * 12
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub total_tasks: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows_inserted: usize,
    pub duration: Duration,
    pub interrupted: bool,
}

impl PipelineStats {
    /// Seconds per completed task, 0 when nothing completed.
    pub fn average_secs(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.duration.as_secs_f64() / self.completed as f64
    }

    /// Completed share of all tasks, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total_tasks as f64 * 100.0
    }

    pub fn log_summary(&self) {
        info!("{}", "=".repeat(70));
        info!("PIPELINE SUMMARY");
        info!("{}", "=".repeat(70));
        info!("Total Tasks: {}", self.total_tasks);
        info!("Completed: {}", self.completed);
        info!("Skipped: {}", self.skipped);
        info!("Failed: {}", self.failed);
        info!("Rows Inserted: {}", self.rows_inserted);
        info!("Duration: {}", format_duration(self.duration));
        info!("Avg/Task: {:.1}s", self.average_secs());
        info!("Success Rate: {:.1}%", self.success_rate());
        if self.interrupted {
            warn!("Run was interrupted; rerun to resume from the checkpoint");
        }
        info!("{}", "=".repeat(70));
    }
}

/// `H:MM:SS` for a run duration.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub struct Pipeline<S, C> {
    collector: MonthlyCollector<S, C>,
    db: Database,
    checkpoint: CheckpointManager,
    interrupted: Arc<AtomicBool>,
}

impl<S: GeoSource, C: SoilCache> Pipeline<S, C> {
    pub fn new(
        collector: MonthlyCollector<S, C>,
        db: Database,
        checkpoint: CheckpointManager,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Pipeline {
            collector,
            db,
            checkpoint,
            interrupted,
        }
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Run every task. Only setup and batch insert failures abort the run.
    pub async fn run(
        &mut self,
        locations: &[Location],
        options: &RunOptions,
    ) -> anyhow::Result<PipelineStats> {
        let started = Instant::now();
        let mut stats = PipelineStats {
            total_tasks: options.total_tasks(locations.len()),
            ..Default::default()
        };

        info!(
            "Starting collection: {} locations, {}-{}, {} tasks (resume: {})",
            locations.len(),
            options.start_year,
            options.end_year,
            stats.total_tasks,
            options.resume
        );

        for (index, location) in locations.iter().enumerate() {
            if self.is_interrupted() {
                break;
            }
            info!(
                "[{}/{}] {} ({}) at ({:.4}, {:.4})",
                index + 1,
                locations.len(),
                location.name,
                location.region,
                location.latitude,
                location.longitude
            );
            self.process_location(location, options, &mut stats).await?;
        }

        if self.is_interrupted() {
            warn!("Pipeline interrupted by user");
            stats.interrupted = true;
        }
        if let Err(e) = self.checkpoint.save() {
            error!("Failed to save checkpoint: {:#}", e);
        }

        stats.duration = started.elapsed();
        stats.log_summary();
        Ok(stats)
    }

    async fn process_location(
        &mut self,
        location: &Location,
        options: &RunOptions,
        stats: &mut PipelineStats,
    ) -> anyhow::Result<()> {
        let mut batch: Vec<MonthlyObservation> = Vec::with_capacity(options.batch_size);

        'years: for year in options.start_year..=options.end_year {
            for month in 1..=12u32 {
                if self.is_interrupted() {
                    break 'years;
                }
                let id = task_id(&location.name, year, month);

                if options.resume && self.checkpoint.is_completed(&id) {
                    stats.skipped += 1;
                    continue;
                }
                if self.db.check_existing_data(&location.name, year, month) {
                    self.record_completed(&id);
                    stats.skipped += 1;
                    continue;
                }

                match self.collector.collect(location, year, month).await {
                    Ok(obs) => {
                        batch.push(obs);
                        if batch.len() >= options.batch_size {
                            stats.rows_inserted += self.insert_batch(&mut batch, options)?;
                        }
                        self.record_completed(&id);
                        stats.completed += 1;
                        info!("✓ {} {}-{:02}", location.name, year, month);
                        if !options.request_delay.is_zero() {
                            tokio::time::sleep(options.request_delay).await;
                        }
                    }
                    Err(e) => {
                        error!("✗ {} {}-{:02}: {:#}", location.name, year, month, e);
                        stats.failed += 1;
                        if let Err(e) = self.checkpoint.mark_failed(&id) {
                            error!("Failed to save checkpoint: {:#}", e);
                        }
                    }
                }
            }
        }

        if !batch.is_empty() {
            stats.rows_inserted += self.insert_batch(&mut batch, options)?;
        }
        Ok(())
    }

    fn record_completed(&mut self, id: &str) {
        if let Err(e) = self.checkpoint.mark_completed(id) {
            error!("Failed to save checkpoint: {:#}", e);
        }
    }

    fn insert_batch(
        &self,
        batch: &mut Vec<MonthlyObservation>,
        options: &RunOptions,
    ) -> anyhow::Result<usize> {
        let inserted = self
            .db
            .bulk_insert(batch, &options.table_name, InsertMode::Append)
            .with_context(|| format!("batch insert of {} rows failed", batch.len()))?;
        info!("Inserted {} records", inserted);
        batch.clear();
        Ok(inserted)
    }
}

/// Flag set once Ctrl-C is received.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current task");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}
