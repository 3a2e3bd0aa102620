//! Batch inserts into `historical_data`.

use crate::models::{column_list, is_valid_table_name, placeholder_list};
use crate::Database;
use anyhow::bail;
use desert_data::observation::MonthlyObservation;
use rusqlite::params;

/// What to do with rows already in the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    Append,
    /// Delete every existing row first, in the same transaction.
    Replace,
}

impl Database {
    /// Insert `rows` into `table` in one transaction. Returns the row count.
    pub fn bulk_insert(
        &self,
        rows: &[MonthlyObservation],
        table: &str,
        mode: InsertMode,
    ) -> anyhow::Result<usize> {
        if !is_valid_table_name(table) {
            bail!("invalid table name {:?}", table);
        }
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        if mode == InsertMode::Replace {
            let deleted = tx.execute(&format!("DELETE FROM {}", table), [])?;
            log::debug!("Replacing {} rows in {}", deleted, table);
        }
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                column_list(),
                placeholder_list()
            ))?;
            for r in rows {
                stmt.execute(params![
                    r.location_name,
                    r.latitude,
                    r.longitude,
                    r.year,
                    r.month,
                    r.sand,
                    r.silt,
                    r.clay,
                    r.soc,
                    r.ph,
                    r.bdod,
                    r.cec,
                    r.nitrogen,
                    r.phosphorus,
                    r.potassium,
                    r.ndvi,
                    r.t2m_c,
                    r.td2m_c,
                    r.rh_pct,
                    r.tp_m,
                    r.ssrd_jm2,
                    r.lc_type1,
                    r.ndvi_source,
                    r.climate_source,
                    r.lc_source,
                    r.soil_version_year,
                    r.soil_data_year,
                    r.data_quality_score,
                ])?;
            }
        }
        tx.commit()?;
        log::info!("Inserted {} rows into {}", rows.len(), table);
        Ok(rows.len())
    }
}
