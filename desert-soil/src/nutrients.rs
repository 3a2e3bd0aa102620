//! Nutrient estimates for Egyptian soils.
//!
//! Inputs use exported-table units: organic carbon in g/kg, CEC in cmol/kg,
//! clay and silt in %, pH in pH units. Every estimator is total: missing,
//! non-positive, infinite and NaN inputs all yield a bounded finite value.
//!
//! References: Brady & Weil (2008) for the C:N ratio, Sparks (2003) and
//! Abdel-Fattah (2012) for phosphorus, El-Baroudy (2016) for potassium.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutrientParams {
    pub n_cn_ratio: f64,
    pub p_base_factor: f64,
    pub k_cec_multiplier: f64,
    pub k_base_offset: f64,
    pub n_default: f64,
    pub p_default: f64,
    pub k_default: f64,
    pub n_bounds: (f64, f64),
    pub p_bounds: (f64, f64),
    pub k_bounds: (f64, f64),
}

impl Default for NutrientParams {
    fn default() -> Self {
        NutrientParams {
            n_cn_ratio: 11.5,
            p_base_factor: 8.5,
            k_cec_multiplier: 40.0,
            k_base_offset: 50.0,
            n_default: 0.15,
            p_default: 12.0,
            k_default: 200.0,
            n_bounds: (0.05, 0.5),
            p_bounds: (5.0, 35.0),
            k_bounds: (120.0, 350.0),
        }
    }
}

/// Soil properties feeding the estimators, in exported-table units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NutrientInputs {
    /// g/kg
    pub soc: Option<f64>,
    /// cmol/kg
    pub cec: Option<f64>,
    pub clay: Option<f64>,
    pub silt: Option<f64>,
    pub ph: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutrientEstimate {
    /// %
    pub nitrogen: f64,
    /// mg/kg
    pub phosphorus: f64,
    /// mg/kg
    pub potassium: f64,
}

/// Positive values only; NaN counts as missing.
fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

// f64::clamp panics when lo > hi, and bounds come from configuration.
fn bound(value: f64, (lo, hi): (f64, f64)) -> f64 {
    value.max(lo).min(hi)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl NutrientParams {
    /// Nitrogen (%) from organic carbon (g/kg).
    pub fn estimate_nitrogen(&self, soc: Option<f64>) -> f64 {
        let Some(soc) = positive(soc) else {
            return self.n_default;
        };
        let soc_percent = soc / 10.0;
        round_to(bound(soc_percent / self.n_cn_ratio, self.n_bounds), 3)
    }

    /// Available phosphorus (mg/kg).
    ///
    /// `P = SOC% × p_base_factor × CEC factor × clay factor × pH factor`.
    pub fn estimate_phosphorus(
        &self,
        soc: Option<f64>,
        cec: Option<f64>,
        clay: Option<f64>,
        ph: Option<f64>,
    ) -> f64 {
        let Some(soc) = positive(soc) else {
            return self.p_default;
        };
        let base_p = soc / 10.0 * self.p_base_factor;

        let cec_factor = match positive(cec) {
            Some(cec) if cec > 20.0 => bound(1.0 - (cec - 20.0) / 200.0, (0.7, 1.3)),
            Some(cec) => bound(1.0 + (20.0 - cec) / 100.0, (0.7, 1.3)),
            None => 1.0,
        };

        let clay_factor = match positive(clay) {
            Some(clay) if clay > 30.0 => bound(1.0 - (clay - 30.0) / 150.0, (0.6, 1.2)),
            Some(_) => 1.0,
            None => 1.0,
        };

        let ph_factor = match ph.filter(|p| !p.is_nan()) {
            Some(ph) if (6.0..=7.5).contains(&ph) => 1.25,
            Some(ph) if ph < 6.0 => bound(0.85 - (6.0 - ph) * 0.05, (0.5, 1.25)),
            Some(ph) => bound(1.0 - (ph - 7.5) * 0.08, (0.5, 1.25)),
            None => 1.0,
        };

        let phosphorus = base_p * cec_factor * clay_factor * ph_factor;
        round_to(bound(phosphorus, self.p_bounds), 1)
    }

    /// Exchangeable potassium (mg/kg).
    ///
    /// `K = (CEC × k_cec_multiplier + k_base_offset) × clay × silt × SOC factors`.
    pub fn estimate_potassium(
        &self,
        cec: Option<f64>,
        clay: Option<f64>,
        silt: Option<f64>,
        soc: Option<f64>,
    ) -> f64 {
        let Some(cec) = positive(cec) else {
            return self.k_default;
        };
        let base_k = cec * self.k_cec_multiplier + self.k_base_offset;

        let clay_factor = match positive(clay) {
            Some(clay) if clay < 20.0 => 0.8,
            Some(clay) if clay <= 40.0 => bound(1.0 + (clay - 30.0) / 100.0, (0.7, 1.2)),
            Some(_) => 0.9,
            None => 1.0,
        };

        let silt_factor = match positive(silt) {
            Some(silt) if (30.0..=50.0).contains(&silt) => 1.05,
            Some(silt) if silt > 50.0 => 1.0,
            Some(_) => 0.95,
            None => 1.0,
        };

        let soc_factor = match positive(soc).map(|s| s / 10.0) {
            Some(pct) if pct > 2.0 => 1.05,
            Some(pct) if pct > 1.0 => 1.02,
            _ => 1.0,
        };

        let potassium = base_k * clay_factor * silt_factor * soc_factor;
        round_to(bound(potassium, self.k_bounds), 1)
    }

    pub fn estimate(&self, inputs: &NutrientInputs) -> NutrientEstimate {
        NutrientEstimate {
            nitrogen: self.estimate_nitrogen(inputs.soc),
            phosphorus: self.estimate_phosphorus(inputs.soc, inputs.cec, inputs.clay, inputs.ph),
            potassium: self.estimate_potassium(inputs.cec, inputs.clay, inputs.silt, inputs.soc),
        }
    }
}
