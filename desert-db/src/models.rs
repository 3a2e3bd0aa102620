//! Column layout of `historical_data`.

/// Dataset columns in storage and export order.
pub const HISTORICAL_COLUMNS: [&str; 28] = [
    "location_name",
    "latitude",
    "longitude",
    "year",
    "month",
    "sand",
    "silt",
    "clay",
    "soc",
    "ph",
    "bdod",
    "cec",
    "nitrogen",
    "phosphorus",
    "potassium",
    "ndvi",
    "t2m_c",
    "td2m_c",
    "rh_pct",
    "tp_m",
    "ssrd_jm2",
    "lc_type1",
    "ndvi_source",
    "climate_source",
    "lc_source",
    "soil_version_year",
    "soil_data_year",
    "data_quality_score",
];

pub const HISTORICAL_TABLE: &str = "historical_data";

/// `a, b, c` for SELECT and INSERT lists.
pub fn column_list() -> String {
    HISTORICAL_COLUMNS.join(", ")
}

/// `?1, ?2, ... ?28`.
pub fn placeholder_list() -> String {
    (1..=HISTORICAL_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Table names are spliced into SQL, so only plain identifiers pass.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_match_columns() {
        assert!(placeholder_list().ends_with("?28"));
        assert_eq!(placeholder_list().split(", ").count(), HISTORICAL_COLUMNS.len());
    }

    #[test]
    fn table_names_are_plain_identifiers() {
        assert!(is_valid_table_name("historical_data"));
        assert!(!is_valid_table_name("historical_data; DROP TABLE x"));
        assert!(!is_valid_table_name("1abc"));
        assert!(!is_valid_table_name(""));
    }
}
