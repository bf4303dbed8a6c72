pub mod cpp;
mod engine;
mod error;
pub mod gis;
pub mod oas;
pub mod rrif;
mod solver;
pub mod tables;
pub mod tax;
mod types;

pub use cpp::{ContributionYear, CppEstimate, EarningsBasis, estimate_cpp};
pub use engine::{compare_strategies, run_projection};
pub use error::{ConfigError, ConfigResult};
pub use gis::{GisAmount, GisParameters, MaritalStatus, gis_amount};
pub use oas::{OasAmount, OasParameters, oas_net_amount};
pub use solver::{SolveConfig, SolveIteration, SpendingSolveResult, solve_max_spending};
pub use tax::{
    IncomeComponents, Jurisdiction, Province, TaxAssessment, TaxComputation, TaxSchedule,
    TaxpayerProfile, compose, evaluate, evaluate_profile,
};
pub use types::{
    HouseholdInput, PersonInput, PersonYear, ProjectionConfig, ProjectionResult,
    ProjectionSummary, SpendingPhase, StrategyOutcome, TaxFunding, WithdrawalStrategy, YearResult,
};
