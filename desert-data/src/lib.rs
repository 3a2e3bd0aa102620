//! Processing for monthly desertification records.
//!
//! This crate turns upstream values into dataset rows and re-derives
//! nutrient columns of exported tables.

pub mod correction;
pub mod observation;
pub mod report;

/// ERA5 unit handling.
pub mod climate {
    pub const KELVIN_OFFSET: f64 = 273.15;

    pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
        kelvin - KELVIN_OFFSET
    }

    /// Saturation vapour pressure (hPa), August-Roche-Magnus.
    fn vapour_pressure(celsius: f64) -> f64 {
        6.112 * (17.67 * celsius / (celsius + 243.5)).exp()
    }

    /// Relative humidity (%) from air and dewpoint temperature (°C),
    /// clamped to [0, 100]. `None` when the inputs give no finite answer.
    pub fn relative_humidity(t_celsius: f64, td_celsius: f64) -> Option<f64> {
        let rh = vapour_pressure(td_celsius) / vapour_pressure(t_celsius) * 100.0;
        if rh.is_finite() {
            Some(rh.max(0.0).min(100.0))
        } else {
            None
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn converts_kelvin() {
            assert!((kelvin_to_celsius(300.0) - 26.85).abs() < 1e-9);
            assert_eq!(kelvin_to_celsius(273.15), 0.0);
        }

        #[test]
        fn saturated_air_is_full_humidity() {
            let rh = relative_humidity(21.3, 21.3).unwrap();
            assert!((rh - 100.0).abs() < 1e-9);
        }

        #[test]
        fn humidity_for_dry_afternoon() {
            // 30 °C air, 10 °C dewpoint
            let rh = relative_humidity(30.0, 10.0).unwrap();
            assert!((rh - 28.9).abs() < 0.1, "rh {}", rh);
        }

        #[test]
        fn humidity_is_clamped() {
            // dewpoint above air temperature is supersaturated
            assert_eq!(relative_humidity(10.0, 15.0), Some(100.0));
            assert_eq!(relative_humidity(f64::NAN, 10.0), None);
        }
    }
}

/// Completeness score for monthly rows.
pub mod quality {
    use crate::observation::MonthlyObservation;

    /// Fields a complete row must carry.
    pub const REQUIRED_FIELDS: [&str; 9] = [
        "sand", "clay", "ndvi", "t2m_c", "td2m_c", "rh_pct", "tp_m", "ssrd_jm2", "lc_type1",
    ];

    /// Percentage of [`REQUIRED_FIELDS`] present on `obs`.
    pub fn quality_score(obs: &MonthlyObservation) -> f64 {
        let present = [
            obs.sand.is_some(),
            obs.clay.is_some(),
            obs.ndvi.is_some(),
            obs.t2m_c.is_some(),
            obs.td2m_c.is_some(),
            obs.rh_pct.is_some(),
            obs.tp_m.is_some(),
            obs.ssrd_jm2.is_some(),
            obs.lc_type1.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        present as f64 / REQUIRED_FIELDS.len() as f64 * 100.0
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::observation::tests::complete_observation;

        #[test]
        fn complete_row_scores_full() {
            assert_eq!(quality_score(&complete_observation()), 100.0);
        }

        #[test]
        fn missing_fields_lower_score_proportionally() {
            let mut obs = complete_observation();
            obs.ndvi = None;
            obs.lc_type1 = None;
            let score = quality_score(&obs);
            assert!((score - 7.0 / 9.0 * 100.0).abs() < 1e-9);

            obs.sand = None;
            obs.clay = None;
            obs.t2m_c = None;
            obs.td2m_c = None;
            obs.rh_pct = None;
            obs.tp_m = None;
            obs.ssrd_jm2 = None;
            assert_eq!(quality_score(&obs), 0.0);
        }

        #[test]
        fn optional_soil_fields_do_not_count() {
            let mut obs = complete_observation();
            obs.silt = None;
            obs.bdod = None;
            obs.phosphorus = None;
            assert_eq!(quality_score(&obs), 100.0);
        }
    }
}
