//! Reads over `historical_data`.

use crate::models::{column_list, HISTORICAL_TABLE};
use crate::Database;
use anyhow::Context;
use desert_data::observation::MonthlyObservation;
use rusqlite::{params, Row};
use std::path::Path;

fn observation_from_row(row: &Row) -> rusqlite::Result<MonthlyObservation> {
    Ok(MonthlyObservation {
        location_name: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        year: row.get(3)?,
        month: row.get(4)?,
        sand: row.get(5)?,
        silt: row.get(6)?,
        clay: row.get(7)?,
        soc: row.get(8)?,
        ph: row.get(9)?,
        bdod: row.get(10)?,
        cec: row.get(11)?,
        nitrogen: row.get(12)?,
        phosphorus: row.get(13)?,
        potassium: row.get(14)?,
        ndvi: row.get(15)?,
        t2m_c: row.get(16)?,
        td2m_c: row.get(17)?,
        rh_pct: row.get(18)?,
        tp_m: row.get(19)?,
        ssrd_jm2: row.get(20)?,
        lc_type1: row.get(21)?,
        ndvi_source: row.get(22)?,
        climate_source: row.get(23)?,
        lc_source: row.get(24)?,
        soil_version_year: row.get(25)?,
        soil_data_year: row.get(26)?,
        data_quality_score: row.get(27)?,
    })
}

impl Database {
    /// Whether a row exists for the task. Query errors count as "no".
    pub fn check_existing_data(&self, location: &str, year: i32, month: u32) -> bool {
        let conn = self.conn.borrow();
        let result: rusqlite::Result<i64> = conn.query_row(
            "SELECT COUNT(*) FROM historical_data
             WHERE location_name = ?1 AND year = ?2 AND month = ?3",
            params![location, year, month],
            |row| row.get(0),
        );
        match result {
            Ok(count) => count > 0,
            Err(e) => {
                log::warn!("Error checking existing data: {}", e);
                false
            }
        }
    }

    pub fn count_rows(&self) -> anyhow::Result<i64> {
        let conn = self.conn.borrow();
        let count = conn.query_row("SELECT COUNT(*) FROM historical_data", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Every row, ordered by location, year and month.
    pub fn query_observations(&self) -> anyhow::Result<Vec<MonthlyObservation>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY location_name, year, month, id",
            column_list(),
            HISTORICAL_TABLE
        ))?;
        let rows = stmt
            .query_map([], observation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("query_observations returned {} records", rows.len());
        Ok(rows)
    }

    /// Write the table to `path` as CSV in column order. Returns the row count.
    pub fn export_csv(&self, path: &Path) -> anyhow::Result<usize> {
        let rows = self.query_observations()?;
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        for r in &rows {
            wtr.serialize(r)?;
        }
        if rows.is_empty() {
            wtr.write_record(crate::models::HISTORICAL_COLUMNS)?;
        }
        wtr.flush()?;
        log::info!("Exported {} rows to {}", rows.len(), path.display());
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::models::HISTORICAL_COLUMNS;
    use crate::tests::row;
    use crate::{Database, InsertMode};

    #[test]
    fn existence_check_matches_full_key() {
        let db = Database::new().unwrap();
        db.bulk_insert(&[row("Manzala_Wetland", 2019, 7)], "historical_data", InsertMode::Append)
            .unwrap();
        assert!(db.check_existing_data("Manzala_Wetland", 2019, 7));
        assert!(!db.check_existing_data("Manzala_Wetland", 2019, 8));
        assert!(!db.check_existing_data("Manzala_Wetland", 2020, 7));
        assert!(!db.check_existing_data("Burullus_Wetland", 2019, 7));
    }

    #[test]
    fn observations_round_trip_through_store() {
        let db = Database::new().unwrap();
        let original = vec![row("B_Site", 2021, 2), row("A_Site", 2022, 1), row("A_Site", 2021, 11)];
        db.bulk_insert(&original, "historical_data", InsertMode::Append)
            .unwrap();

        let stored = db.query_observations().unwrap();
        let keys: Vec<_> = stored
            .iter()
            .map(|o| (o.location_name.as_str(), o.year, o.month))
            .collect();
        assert_eq!(keys, vec![("A_Site", 2021, 11), ("A_Site", 2022, 1), ("B_Site", 2021, 2)]);
        assert_eq!(stored[2], original[0]);
    }

    #[test]
    fn export_writes_header_in_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical_data_export.csv");
        let db = Database::new().unwrap();
        db.bulk_insert(&[row("Tanta_Farms", 2020, 5)], "historical_data", InsertMode::Append)
            .unwrap();

        assert_eq!(db.export_csv(&path).unwrap(), 1);

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, HISTORICAL_COLUMNS);
        let record = rdr.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "Tanta_Farms");
        assert_eq!(&record[20], "", "missing solar radiation exports blank");
        assert_eq!(&record[21], "40");
    }

    #[test]
    fn empty_export_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let db = Database::new().unwrap();
        assert_eq!(db.export_csv(&path).unwrap(), 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("location_name,latitude,longitude,year,month,"));
    }
}
