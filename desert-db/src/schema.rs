//! SQL schema for the pipeline database.

/// Returns the full SQL schema as a single batch string.
///
/// `historical_data` carries the 28 dataset columns (see
/// [`crate::models::HISTORICAL_COLUMNS`]) plus a surrogate `id`. The
/// (location, year, month) index backs the existence check run before
/// every task.
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS historical_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        location_name TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        sand REAL,
        silt REAL,
        clay REAL,
        soc REAL,
        ph REAL,
        bdod REAL,
        cec REAL,
        nitrogen REAL,
        phosphorus REAL,
        potassium REAL,
        ndvi REAL,
        t2m_c REAL,
        td2m_c REAL,
        rh_pct REAL,
        tp_m REAL,
        ssrd_jm2 REAL,
        lc_type1 INTEGER,
        ndvi_source TEXT,
        climate_source TEXT,
        lc_source TEXT,
        soil_version_year INTEGER,
        soil_data_year INTEGER,
        data_quality_score REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_historical_task
        ON historical_data(location_name, year, month);
    "#
}
