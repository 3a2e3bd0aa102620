//! Durable soil-sample cache keyed by rounded coordinates and year.

use crate::error::CacheError;
use crate::sample::SoilSample;
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub trait SoilCache {
    fn get(&self, key: &str) -> Option<&SoilSample>;

    fn put(&mut self, key: String, sample: SoilSample);

    /// Persist all entries.
    fn flush(&mut self) -> Result<(), CacheError>;

    /// Drop every entry, including the persisted copy.
    fn clear(&mut self) -> Result<(), CacheError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Volatile cache, used where nothing should outlive the process.
impl SoilCache for HashMap<String, SoilSample> {
    fn get(&self, key: &str) -> Option<&SoilSample> {
        HashMap::get(self, key)
    }

    fn put(&mut self, key: String, sample: SoilSample) {
        self.insert(key, sample);
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        HashMap::clear(self);
        Ok(())
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// Cache stored as one JSON object on disk.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    entries: BTreeMap<String, SoilSample>,
}

impl JsonFileCache {
    /// Load `path`; a missing or unreadable file yields an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read(&path) {
            Ok(entries) => {
                info!("Loaded soil cache with {} entries from {}", entries.len(), path.display());
                entries
            }
            Err(CacheError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                BTreeMap::new()
            }
            Err(e) => {
                warn!("Could not load soil cache, starting empty: {}", e);
                BTreeMap::new()
            }
        };
        JsonFileCache { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<BTreeMap<String, SoilSample>, CacheError> {
        let text = fs::read_to_string(path).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl SoilCache for JsonFileCache {
    fn get(&self, key: &str) -> Option<&SoilSample> {
        self.entries.get(key)
    }

    fn put(&mut self, key: String, sample: SoilSample) {
        self.entries.insert(key, sample);
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let text = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, text).map_err(|e| self.io_error(e))
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed soil cache {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_with_texture;

    #[test]
    fn missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::open(dir.path().join("soil_cache.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn corrupt_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soil_cache.json");
        fs::write(&path, "{ not json").unwrap();
        let cache = JsonFileCache::open(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn flush_then_reopen_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("soil_cache.json");

        let mut cache = JsonFileCache::open(&path);
        cache.put("31.150_29.919_2018".to_string(), sample_with_texture(2017, 2018));
        cache.flush().unwrap();

        let reopened = JsonFileCache::open(&path);
        assert_eq!(reopened.len(), 1);
        let sample = reopened.get("31.150_29.919_2018").unwrap();
        assert_eq!(sample.metadata.soilgrids_release_used, 2017);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["31.150_29.919_2018"]["_metadata"].is_object());
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soil_cache.json");
        let mut cache = JsonFileCache::open(&path);
        cache.put("k".to_string(), sample_with_texture(2022, 2023));
        cache.flush().unwrap();
        assert!(path.exists());

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(!path.exists());
        // clearing twice is fine
        cache.clear().unwrap();
    }
}
