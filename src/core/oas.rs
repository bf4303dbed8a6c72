use serde::Serialize;

use super::error::{ConfigError, ConfigResult};
use super::tables::{OAS, OasRow, resolve};

pub const ELIGIBILITY_AGE: u32 = 65;
pub const LATEST_START_AGE: u32 = 70;
pub const INCREASE_AGE: u32 = 75;
pub const MIN_RESIDENCE_YEARS: u32 = 10;
pub const FULL_RESIDENCE_YEARS: u32 = 40;
pub const CLAWBACK_RATE: f64 = 0.15;
const DEFERRAL_INCREASE_PER_MONTH: f64 = 0.006;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OasParameters {
    pub year: i32,
    pub max_monthly: f64,
    pub max_monthly_75_plus: f64,
    pub clawback_threshold: f64,
}

impl OasParameters {
    pub fn for_year(year: i32) -> Self {
        match resolve(OAS, year) {
            Some((row, _)) => Self::from_row(year, row),
            None => Self {
                year,
                max_monthly: 0.0,
                max_monthly_75_plus: 0.0,
                clawback_threshold: 0.0,
            },
        }
    }

    pub fn for_projection(year: i32, inflation: f64) -> Self {
        let newest = OAS.last().map(|(y, _)| *y).unwrap_or(year);
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
            max_monthly: self.max_monthly * factor,
            max_monthly_75_plus: self.max_monthly_75_plus * factor,
            clawback_threshold: self.clawback_threshold * factor,
        }
    }

    fn from_row(year: i32, row: OasRow) -> Self {
        Self {
            year,
            max_monthly: row.max_monthly,
            max_monthly_75_plus: row.max_monthly_75_plus,
            clawback_threshold: row.clawback_threshold,
        }
    }

    fn maximum_for_age(&self, age: u32) -> f64 {
        if age >= INCREASE_AGE {
            self.max_monthly_75_plus
        } else {
            self.max_monthly
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OasAmount {
    pub gross_monthly: f64,
    pub clawback: f64,
    pub monthly_amount: f64,
    pub annual_amount: f64,
}

impl OasAmount {
    pub fn gross_annual(&self) -> f64 {
        self.gross_monthly * 12.0
    }

    pub fn annual_clawback(&self) -> f64 {
        self.clawback * 12.0
    }
}

pub fn deferral_factor(start_age: u32) -> ConfigResult<f64> {
    if !(ELIGIBILITY_AGE..=LATEST_START_AGE).contains(&start_age) {
        return Err(ConfigError::OasStartAge(start_age));
    }
    let months = (start_age - ELIGIBILITY_AGE) * 12;
    Ok(1.0 + DEFERRAL_INCREASE_PER_MONTH * f64::from(months))
}

pub fn residence_fraction(years_in_canada: u32) -> f64 {
    if years_in_canada < MIN_RESIDENCE_YEARS {
        return 0.0;
    }
    f64::from(years_in_canada.min(FULL_RESIDENCE_YEARS)) / f64::from(FULL_RESIDENCE_YEARS)
}

pub fn oas_net_amount(years_in_canada: u32, annual_income: f64, age: u32, year: i32) -> OasAmount {
    oas_amount(
        &OasParameters::for_year(year),
        years_in_canada,
        annual_income,
        age,
        1.0,
    )
}

pub fn oas_amount(
    params: &OasParameters,
    years_in_canada: u32,
    annual_income: f64,
    age: u32,
    deferral_factor: f64,
) -> OasAmount {
    if age < ELIGIBILITY_AGE {
        return OasAmount::default();
    }
    let gross_monthly =
        params.maximum_for_age(age) * residence_fraction(years_in_canada) * deferral_factor;
    if gross_monthly <= 0.0 {
        return OasAmount::default();
    }

    let excess = (annual_income - params.clawback_threshold).max(0.0);
    let clawback = (CLAWBACK_RATE * excess / 12.0).min(gross_monthly);
    let monthly_amount = gross_monthly - clawback;

    OasAmount {
        gross_monthly,
        clawback,
        monthly_amount,
        annual_amount: monthly_amount * 12.0,
    }
}
