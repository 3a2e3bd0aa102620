//! Resumable progress file.
//!
//! The checkpoint is a small JSON document listing finished task ids. It is
//! rewritten after every change, so an interrupted run resumes at the first
//! task it had not yet completed.

use anyhow::Context;
use desert_utils::dates::now_iso;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub last_update: Option<String>,
}

pub struct CheckpointManager {
    path: PathBuf,
    data: Checkpoint,
    completed: HashSet<String>,
}

impl CheckpointManager {
    /// Load `path`; a missing or unreadable file starts an empty checkpoint.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Checkpoint>(&text) {
                Ok(data) => {
                    info!("Loaded checkpoint: {} completed", data.completed.len());
                    data
                }
                Err(e) => {
                    warn!("Failed to load checkpoint {}: {}", path.display(), e);
                    Checkpoint::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Checkpoint::default(),
            Err(e) => {
                warn!("Failed to load checkpoint {}: {}", path.display(), e);
                Checkpoint::default()
            }
        };
        let completed = data.completed.iter().cloned().collect();
        CheckpointManager {
            path,
            data,
            completed,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &Checkpoint {
        &self.data
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed.contains(task_id)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Record `task_id` as done and persist.
    pub fn mark_completed(&mut self, task_id: &str) -> anyhow::Result<()> {
        if self.completed.insert(task_id.to_string()) {
            self.data.completed.push(task_id.to_string());
        }
        self.data.failed.retain(|t| t != task_id);
        self.save()
    }

    /// Record `task_id` as failed and persist. A later success clears it.
    pub fn mark_failed(&mut self, task_id: &str) -> anyhow::Result<()> {
        if !self.data.failed.iter().any(|t| t == task_id) {
            self.data.failed.push(task_id.to_string());
        }
        self.save()
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        self.data.last_update = Some(now_iso());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write checkpoint {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::load(dir.path().join("checkpoint.json"));
        assert_eq!(manager.completed_count(), 0);
        assert!(manager.data().last_update.is_none());
    }

    #[test]
    fn completed_tasks_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/checkpoint.json");

        let mut manager = CheckpointManager::load(&path);
        manager.mark_completed("Tanta_Farms_2019_03").unwrap();
        manager.mark_completed("Tanta_Farms_2019_03").unwrap();
        manager.mark_failed("Siwa_Grasslands_2020_01").unwrap();

        let reloaded = CheckpointManager::load(&path);
        assert!(reloaded.is_completed("Tanta_Farms_2019_03"));
        assert!(!reloaded.is_completed("Tanta_Farms_2019_04"));
        assert_eq!(reloaded.data().completed.len(), 1);
        assert_eq!(reloaded.data().failed, vec!["Siwa_Grasslands_2020_01"]);
        assert!(reloaded.data().last_update.is_some());
    }

    #[test]
    fn success_clears_earlier_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = CheckpointManager::load(dir.path().join("checkpoint.json"));
        manager.mark_failed("Suez_Canal_2021_07").unwrap();
        manager.mark_completed("Suez_Canal_2021_07").unwrap();
        assert!(manager.data().failed.is_empty());
        assert!(manager.is_completed("Suez_Canal_2021_07"));
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "{not json").unwrap();
        let manager = CheckpointManager::load(&path);
        assert_eq!(manager.completed_count(), 0);
    }

    #[test]
    fn file_layout_matches_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let mut manager = CheckpointManager::load(&path);
        manager.mark_completed("Cairo_Urban_2017_01").unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["completed"][0], "Cairo_Urban_2017_01");
        assert!(value["failed"].as_array().unwrap().is_empty());
        assert!(value["last_update"].is_string());
    }
}
