use serde::{Deserialize, Serialize};

use super::engine::run_projection;
use super::error::{ConfigError, ConfigResult};
use super::types::HouseholdInput;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolveConfig {
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub target_success_rate: f64,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            search_min: 0.0,
            search_max: 3.0,
            tolerance: 0.001,
            max_iterations: 40,
            target_success_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_multiplier: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSolveResult {
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub target_success_rate: f64,
    pub solved_multiplier: Option<f64>,
    pub first_year_spending: Option<f64>,
    pub achieved_success_rate: Option<f64>,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

pub fn solve_max_spending(
    household: &HouseholdInput,
    config: SolveConfig,
) -> ConfigResult<SpendingSolveResult> {
    validate_config(config)?;

    let low_rate = success_rate_for(household, config.search_min)?;
    let high_rate = success_rate_for(household, config.search_max)?;
    let meets = |rate: f64| rate + 1e-12 >= config.target_success_rate;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut solved_multiplier = None;
    let mut converged = false;
    let feasible;
    let message;

    if !meets(low_rate) {
        feasible = false;
        message = "No sustainable spending level found within the search bounds.".to_string();
    } else if meets(high_rate) {
        solved_multiplier = Some(config.search_max);
        converged = true;
        feasible = true;
        message = "Upper multiplier is still sustainable; increase search max for a higher plan."
            .to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let rate = success_rate_for(household, mid)?;
            iterations.push(SolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_multiplier: mid,
                success_rate: rate,
            });

            if meets(rate) {
                lo = mid;
            } else {
                hi = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_multiplier = Some(lo);
        feasible = true;
        message = if converged {
            "Solved maximum sustainable spending.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    let mut first_year_spending = None;
    let mut achieved_success_rate = None;
    if let Some(multiplier) = solved_multiplier {
        let result = run_projection(&scaled(household, multiplier))?;
        first_year_spending = result.years.first().map(|y| y.spending_target);
        achieved_success_rate = Some(result.summary.success_rate);
        log::info!(
            "solved spending multiplier {multiplier:.4} after {} iterations",
            iterations.len()
        );
    } else {
        log::warn!("spending solve infeasible: {message}");
    }

    Ok(SpendingSolveResult {
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        target_success_rate: config.target_success_rate,
        solved_multiplier,
        first_year_spending,
        achieved_success_rate,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn scaled(household: &HouseholdInput, multiplier: f64) -> HouseholdInput {
    let mut candidate = household.clone();
    for phase in &mut candidate.spending_phases {
        phase.annual_amount *= multiplier.max(0.0);
    }
    candidate
}

fn success_rate_for(household: &HouseholdInput, multiplier: f64) -> ConfigResult<f64> {
    let mut candidate = scaled(household, multiplier);
    candidate.config.stop_on_first_failure = false;
    Ok(run_projection(&candidate)?.summary.success_rate)
}

fn validate_config(config: SolveConfig) -> ConfigResult<()> {
    let fail = |msg: &str| Err(ConfigError::SolverBounds(msg.to_string()));
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return fail("search bounds must be finite");
    }
    if config.search_min < 0.0 {
        return fail("search_min must be >= 0");
    }
    if config.search_max <= config.search_min {
        return fail("search_max must be greater than search_min");
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return fail("tolerance must be > 0");
    }
    if config.max_iterations == 0 {
        return fail("max_iterations must be > 0");
    }
    if !(0.0..=1.0).contains(&config.target_success_rate) {
        return fail("target_success_rate must be between 0 and 1");
    }
    Ok(())
}
