use serde::{Deserialize, Serialize};

use super::tables::{GIS, resolve};

pub const EMPLOYMENT_EXEMPTION: f64 = 5_000.0;
const SINGLE_REDUCTION_RATE: f64 = 0.50;
const COUPLE_REDUCTION_RATE: f64 = 0.25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaritalStatus {
    #[default]
    Single,
    SpouseReceivesOas,
    SpouseWithoutOas,
}

impl MaritalStatus {
    pub fn is_couple(self) -> bool {
        !matches!(self, MaritalStatus::Single)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GisParameters {
    pub year: i32,
    pub max_single: f64,
    pub max_couple_both_oas: f64,
    pub max_couple_spouse_without_oas: f64,
}

impl GisParameters {
    pub fn for_year(year: i32) -> Self {
        match resolve(GIS, year) {
            Some((row, _)) => Self {
                year,
                max_single: row.single,
                max_couple_both_oas: row.couple_both_oas,
                max_couple_spouse_without_oas: row.couple_spouse_without_oas,
            },
            None => Self {
                year,
                max_single: 0.0,
                max_couple_both_oas: 0.0,
                max_couple_spouse_without_oas: 0.0,
            },
        }
    }

    pub fn for_projection(year: i32, inflation: f64) -> Self {
        let newest = GIS.last().map(|(y, _)| *y).unwrap_or(year);
        let base = Self::for_year(year);
        if year <= newest {
            return base;
        }
        base.indexed((1.0 + inflation).powi(year - newest))
    }

    pub fn indexed(self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return self;
        }
        Self {
            year: self.year,
            max_single: self.max_single * factor,
            max_couple_both_oas: self.max_couple_both_oas * factor,
            max_couple_spouse_without_oas: self.max_couple_spouse_without_oas * factor,
        }
    }

    pub fn maximum(&self, status: MaritalStatus) -> f64 {
        match status {
            MaritalStatus::Single => self.max_single,
            MaritalStatus::SpouseReceivesOas => self.max_couple_both_oas,
            MaritalStatus::SpouseWithoutOas => self.max_couple_spouse_without_oas,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GisAmount {
    pub monthly_amount: f64,
    pub annual_amount: f64,
    pub reduction: f64,
}

pub fn tested_income(employment_income: f64, other_income: f64) -> f64 {
    ((employment_income.max(0.0) - EMPLOYMENT_EXEMPTION).max(0.0) + other_income).max(0.0)
}

// `annual_income` is the tested income: the person's own for a single
// pensioner, the couple's combined income otherwise.
pub fn gis_amount(
    params: &GisParameters,
    status: MaritalStatus,
    annual_income: f64,
    oas_monthly: f64,
    age: u32,
) -> GisAmount {
    if oas_monthly <= 0.0 || age < super::oas::ELIGIBILITY_AGE {
        return GisAmount::default();
    }

    let rate = if status.is_couple() {
        COUPLE_REDUCTION_RATE
    } else {
        SINGLE_REDUCTION_RATE
    };
    let maximum_annual = params.maximum(status) * 12.0;
    let reduction = (annual_income.max(0.0) * rate).min(maximum_annual);
    let annual_amount = (maximum_annual - reduction).max(0.0);

    GisAmount {
        monthly_amount: annual_amount / 12.0,
        annual_amount,
        reduction,
    }
}
