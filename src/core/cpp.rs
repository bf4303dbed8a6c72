use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use super::tables::{max_cpp_monthly, mpea, ympe};

pub const EARLIEST_START_AGE: u32 = 60;
pub const STANDARD_START_AGE: u32 = 65;
pub const LATEST_START_AGE: u32 = 70;

const REPLACEMENT_RATE: f64 = 0.25;
const GENERAL_DROPOUT_SHARE: f64 = 0.17;

// Index 0 is a pension starting at 60: -0.6%/month before 65, +0.7%/month after.
const ADJUSTMENT_FACTORS: [f64; 11] = [
    0.64, 0.712, 0.784, 0.856, 0.928, 1.0, 1.084, 1.168, 1.252, 1.336, 1.42,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionYear {
    pub year: i32,
    pub pensionable_earnings: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EarningsBasis {
    #[default]
    Nominal,
    #[serde(alias = "wage_indexed", alias = "mpea")]
    WageIndexed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CppEstimate {
    pub base_monthly: f64,
    pub adjustment_factor: f64,
    pub monthly_amount: f64,
    pub annual_amount: f64,
    pub contributory_years: u32,
    pub dropped_years: u32,
}

pub fn adjustment_factor(start_age: u32) -> ConfigResult<f64> {
    if !(EARLIEST_START_AGE..=LATEST_START_AGE).contains(&start_age) {
        return Err(ConfigError::CppStartAge(start_age));
    }
    Ok(ADJUSTMENT_FACTORS[(start_age - EARLIEST_START_AGE) as usize])
}

pub fn estimate_cpp(
    history: &[ContributionYear],
    start_age: u32,
    benefit_year: i32,
) -> ConfigResult<CppEstimate> {
    estimate_cpp_with_basis(history, start_age, benefit_year, EarningsBasis::Nominal)
}

pub fn estimate_cpp_with_basis(
    history: &[ContributionYear],
    start_age: u32,
    benefit_year: i32,
    basis: EarningsBasis,
) -> ConfigResult<CppEstimate> {
    let factor = adjustment_factor(start_age)?;
    if history.is_empty() {
        return Ok(CppEstimate {
            adjustment_factor: factor,
            ..CppEstimate::default()
        });
    }

    let mut sorted = history.to_vec();
    sorted.sort_by_key(|c| c.year);

    let benefit_mpea = mpea(benefit_year);
    let mut adjusted: Vec<f64> = sorted
        .iter()
        .map(|c| {
            let year_max = ympe(c.year);
            let capped = c.pensionable_earnings.max(0.0).min(year_max);
            match basis {
                EarningsBasis::Nominal => capped,
                EarningsBasis::WageIndexed if year_max > 0.0 => capped * benefit_mpea / year_max,
                EarningsBasis::WageIndexed => 0.0,
            }
        })
        .collect();

    let years = adjusted.len();
    let dropped = ((years as f64 * GENERAL_DROPOUT_SHARE).floor() as usize).min(years - 1);
    adjusted.sort_by(|a, b| b.total_cmp(a));
    adjusted.truncate(years - dropped);

    let average = adjusted.iter().sum::<f64>() / adjusted.len() as f64;
    let base_monthly = (REPLACEMENT_RATE * average / 12.0).min(max_cpp_monthly(benefit_year));
    let monthly_amount = base_monthly * factor;

    log::debug!(
        "cpp estimate: {years} years, {dropped} dropped, base {base_monthly:.2}/month, factor {factor}"
    );

    Ok(CppEstimate {
        base_monthly,
        adjustment_factor: factor,
        monthly_amount,
        annual_amount: monthly_amount * 12.0,
        contributory_years: years as u32,
        dropped_years: dropped as u32,
    })
}
