use serde::{Deserialize, Serialize};

use super::cpp::{ContributionYear, EarningsBasis};
use super::tax::Province;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalStrategy {
    #[default]
    #[serde(alias = "tfsa_first")]
    TfsaFirst,
    #[serde(alias = "non_registered_first", alias = "nonreg-first")]
    NonRegisteredFirst,
    #[serde(alias = "rrsp_first", alias = "rrif-first")]
    RrspFirst,
    #[serde(alias = "pro_rata")]
    ProRata,
}

impl WithdrawalStrategy {
    pub const ALL: [WithdrawalStrategy; 4] = [
        WithdrawalStrategy::TfsaFirst,
        WithdrawalStrategy::NonRegisteredFirst,
        WithdrawalStrategy::RrspFirst,
        WithdrawalStrategy::ProRata,
    ];
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxFunding {
    #[default]
    Reported,
    Withdrawn,
}

// Annual spending in start-year dollars from `start_age` of the primary
// person until the next phase begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingPhase {
    pub start_age: u32,
    pub annual_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersonInput {
    pub name: String,
    pub current_age: u32,
    pub life_expectancy: u32,
    pub retirement_age: u32,

    pub tfsa_balance: f64,
    pub tfsa_room: f64,
    pub rrsp_balance: f64,
    pub non_registered_balance: f64,
    pub non_registered_acb: f64,
    pub corporate_balance: f64,
    pub corporate_rdtoh: f64,

    pub employment_income: f64,
    pub pension_income: f64,
    pub pension_start_age: u32,
    pub rental_income: f64,
    pub other_income: f64,

    pub cpp_start_age: u32,
    // Monthly CPP at 65 in start-year dollars. Estimated from
    // `contribution_history` when absent.
    pub cpp_monthly_at_65: Option<f64>,
    pub contribution_history: Vec<ContributionYear>,

    pub oas_start_age: u32,
    pub years_in_canada: u32,
    pub disabled: bool,
}

impl Default for PersonInput {
    fn default() -> Self {
        Self {
            name: String::new(),
            current_age: 65,
            life_expectancy: 95,
            retirement_age: 65,
            tfsa_balance: 0.0,
            tfsa_room: 0.0,
            rrsp_balance: 0.0,
            non_registered_balance: 0.0,
            non_registered_acb: 0.0,
            corporate_balance: 0.0,
            corporate_rdtoh: 0.0,
            employment_income: 0.0,
            pension_income: 0.0,
            pension_start_age: 65,
            rental_income: 0.0,
            other_income: 0.0,
            cpp_start_age: 65,
            cpp_monthly_at_65: None,
            contribution_history: Vec::new(),
            oas_start_age: 65,
            years_in_canada: 40,
            disabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectionConfig {
    pub province: Province,
    pub start_year: i32,
    pub general_inflation: f64,
    pub spending_inflation: f64,
    pub investment_return: f64,
    pub withdrawal_strategy: WithdrawalStrategy,
    pub tax_funding: TaxFunding,
    // TFSA dollar limit for years past the published table, in start-year
    // dollars. Indexed by general inflation.
    pub tfsa_annual_limit: f64,
    pub reinvest_surplus: bool,
    pub index_tax_brackets: bool,
    pub cpp_earnings_basis: EarningsBasis,
    pub stop_on_first_failure: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            province: Province::Ontario,
            start_year: 2025,
            general_inflation: 0.02,
            spending_inflation: 0.02,
            investment_return: 0.05,
            withdrawal_strategy: WithdrawalStrategy::TfsaFirst,
            tax_funding: TaxFunding::Reported,
            tfsa_annual_limit: 7_000.0,
            reinvest_surplus: true,
            index_tax_brackets: true,
            cpp_earnings_basis: EarningsBasis::Nominal,
            stop_on_first_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdInput {
    pub people: Vec<PersonInput>,
    pub spending_phases: Vec<SpendingPhase>,
    #[serde(default)]
    pub config: ProjectionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonYear {
    pub name: String,
    pub age: u32,
    pub employment_income: f64,
    pub pension_income: f64,
    pub cpp: f64,
    pub oas_gross: f64,
    pub oas: f64,
    // Withheld at source: oas_gross = oas + oas_clawback.
    pub oas_clawback: f64,
    // Assessed on final net income; any excess over oas_clawback is in total_tax.
    pub oas_recovery_tax: f64,
    pub gis: f64,
    pub rrif_minimum: f64,
    pub tfsa_withdrawal: f64,
    pub non_registered_withdrawal: f64,
    pub rrsp_withdrawal: f64,
    pub corporate_withdrawal: f64,
    pub taxable_income: f64,
    pub federal_tax: f64,
    pub provincial_tax: f64,
    pub total_tax: f64,
    pub marginal_rate: f64,
    pub average_rate: f64,
    pub tfsa_balance: f64,
    pub tfsa_room: f64,
    pub rrsp_balance: f64,
    pub non_registered_balance: f64,
    pub non_registered_acb: f64,
    pub corporate_balance: f64,
    pub corporate_rdtoh: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearResult {
    pub year: i32,
    // The first person's age. It keeps counting after their death so that
    // spending phases and failure ages stay on one clock; `people` carries
    // the survivors' own ages.
    pub age: u32,
    pub spouse_age: Option<u32>,
    pub spending_target: f64,

    pub employment_income: f64,
    pub pension_income: f64,
    pub cpp: f64,
    pub oas_gross: f64,
    pub oas: f64,
    pub oas_clawback: f64,
    pub gis: f64,
    pub rental_income: f64,
    pub other_income: f64,
    pub shortfall: f64,

    pub rrif_minimum: f64,
    pub tfsa_withdrawal: f64,
    pub non_registered_withdrawal: f64,
    pub rrsp_withdrawal: f64,
    pub corporate_withdrawal: f64,
    pub total_withdrawal: f64,
    pub rdtoh_refund: f64,

    pub taxable_income: f64,
    pub federal_tax: f64,
    pub provincial_tax: f64,
    // Tax paid in cash, net of the OAS clawback already withheld.
    pub total_tax: f64,
    pub surplus_reinvested: f64,

    pub tfsa_balance: f64,
    pub rrsp_balance: f64,
    pub non_registered_balance: f64,
    pub corporate_balance: f64,
    pub total_assets: f64,

    pub success: bool,
    pub gap: f64,
    pub people: Vec<PersonYear>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub years_simulated: u32,
    pub years_funded: u32,
    pub success_rate: f64,
    pub fully_funded: bool,
    pub first_failure_year: Option<i32>,
    pub first_failure_age: Option<u32>,
    pub depletion_age: Option<u32>,
    pub total_tax: f64,
    pub total_withdrawals: f64,
    pub total_benefits: f64,
    pub total_gap: f64,
    pub final_assets: f64,
    pub final_assets_real: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub years: Vec<YearResult>,
    pub summary: ProjectionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutcome {
    pub strategy: WithdrawalStrategy,
    pub summary: ProjectionSummary,
}
