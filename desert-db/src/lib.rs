//! SQLite store for monthly desertification records.
//!
//! One table, `historical_data`, holds a row per (location, year, month).
//! Rows are appended in batches and never updated in place.
//!
//! # Usage
//!
//! ```rust
//! use desert_db::Database;
//!
//! let db = Database::new().unwrap();
//! assert!(!db.check_existing_data("Tanta_Farms", 2020, 1));
//! assert_eq!(db.count_rows().unwrap(), 0);
//! ```

pub mod schema;
mod loader;
mod queries;
pub mod models;

pub use loader::InsertMode;

use anyhow::Context;
use rusqlite::Connection;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Handle to the pipeline database.
///
/// Cheaply cloneable; clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Rc<RefCell<Connection>>,
}

impl Database {
    /// In-memory database with the schema applied.
    pub fn new() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    /// Open or create the database file at `path` and apply the schema.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        log::info!("Database connection established: {}", path.display());
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(schema::create_schema())?;
        Ok(Self {
            conn: Rc::new(RefCell::new(conn)),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use desert_data::observation::MonthlyObservation;

    pub(crate) fn row(location: &str, year: i32, month: u32) -> MonthlyObservation {
        MonthlyObservation {
            location_name: location.to_string(),
            latitude: 30.8865,
            longitude: 31.1004,
            year,
            month,
            sand: Some(32.1),
            silt: Some(30.4),
            clay: Some(37.5),
            soc: Some(1.1),
            ph: Some(7.9),
            bdod: Some(1.35),
            cec: Some(28.0),
            nitrogen: Some(0.096),
            phosphorus: Some(9.8),
            potassium: Some(350.0),
            ndvi: Some(0.41),
            t2m_c: Some(27.3),
            td2m_c: Some(16.2),
            rh_pct: Some(50.4),
            tp_m: Some(0.0),
            ssrd_jm2: None,
            lc_type1: Some(40),
            ndvi_source: Some("MODIS/MOD13A2".to_string()),
            climate_source: Some("ERA5_LAND".to_string()),
            lc_source: None,
            soil_version_year: Some(2020),
            soil_data_year: Some(year),
            data_quality_score: 88.88888888888889,
        }
    }

    #[test]
    fn database_creates_successfully() {
        assert!(Database::new().is_ok());
    }

    #[test]
    fn database_is_cloneable() {
        let db = Database::new().unwrap();
        let db2 = db.clone();
        db.bulk_insert(&[row("Tanta_Farms", 2020, 1)], "historical_data", InsertMode::Append)
            .unwrap();
        assert_eq!(db2.count_rows().unwrap(), 1, "clone should share the connection");
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("pipeline.db");
        {
            let db = Database::open(&path).unwrap();
            db.bulk_insert(&[row("Suez_Canal", 2018, 4)], "historical_data", InsertMode::Append)
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.check_existing_data("Suez_Canal", 2018, 4));
    }
}
