//! Process logger for the pipeline binaries.
//!
//! Writes short `HH:MM:SS | LEVEL | message` lines to stdout and, when a log
//! directory is given, detailed `date time | LEVEL | target | message` lines
//! to `pipeline_<stamp>.log` inside it.

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct PipelineLogger {
    console_level: LevelFilter,
    file_level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl PipelineLogger {
    pub fn console_only(console_level: LevelFilter) -> Self {
        PipelineLogger {
            console_level,
            file_level: LevelFilter::Off,
            file: None,
        }
    }

    /// Console logger plus a debug-level log file at `path`.
    pub fn with_file(console_level: LevelFilter, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(PipelineLogger {
            console_level,
            file_level: LevelFilter::Debug,
            file: Some(Mutex::new(file)),
        })
    }

    fn max_level(&self) -> LevelFilter {
        self.console_level.max(self.file_level)
    }

    fn console_line(record: &Record) -> String {
        format!(
            "{} | {:<8} | {}",
            Local::now().format("%H:%M:%S"),
            record.level(),
            record.args()
        )
    }

    fn file_line(record: &Record) -> String {
        format!(
            "{} | {:<8} | {:<20} | {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl log::Log for PipelineLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record) {
        let level = record.level();
        if level <= self.console_level {
            if level <= Level::Warn {
                eprintln!("{}", Self::console_line(record));
            } else {
                println!("{}", Self::console_line(record));
            }
        }
        if level <= self.file_level {
            if let Some(file) = &self.file {
                if let Ok(mut f) = file.lock() {
                    let _ = writeln!(f, "{}", Self::file_line(record));
                }
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

/// Path of the log file for a run started at `stamp`.
pub fn log_file_path(log_dir: &Path, stamp: &str) -> PathBuf {
    log_dir.join(format!("pipeline_{}.log", stamp))
}

/// Install the global logger.
///
/// With `log_dir` set, the directory is created and a per-run file is opened;
/// its path is returned. Fails if a logger is already installed.
pub fn init(
    console_level: LevelFilter,
    log_dir: Option<&Path>,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
    let (logger, path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = log_file_path(dir, &Local::now().format("%Y%m%d_%H%M%S").to_string());
            (PipelineLogger::with_file(console_level, &path)?, Some(path))
        }
        None => (PipelineLogger::console_only(console_level), None),
    };
    let max = logger.max_level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn console_only_respects_level() {
        let logger = PipelineLogger::console_only(LevelFilter::Info);
        let info = Metadata::builder().level(Level::Info).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&info));
        assert!(!logger.enabled(&debug));
    }

    #[test]
    fn file_receives_debug_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_file_path(dir.path(), "20240101_000000");
        let logger = PipelineLogger::with_file(LevelFilter::Info, &path).unwrap();

        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&debug), "file sink should accept debug");

        logger.log(
            &Record::builder()
                .args(format_args!("scale 2000m tried"))
                .level(Level::Debug)
                .target("desert_soil::resolver")
                .build(),
        );
        logger.flush();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("DEBUG"));
        assert!(contents.contains("desert_soil::resolver"));
        assert!(contents.contains("scale 2000m tried"));
    }

    #[test]
    fn log_file_name_uses_stamp() {
        let path = log_file_path(Path::new("logs"), "20250102_030405");
        assert_eq!(path, PathBuf::from("logs/pipeline_20250102_030405.log"));
    }
}
