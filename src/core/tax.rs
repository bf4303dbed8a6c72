use serde::{Deserialize, Serialize};

use super::tables::{TableSource, resolve};

pub const CAPITAL_GAINS_INCLUSION_RATE: f64 = 0.50;
pub const OAS_RECOVERY_RATE: f64 = 0.15;
pub const NON_ELIGIBLE_DIVIDEND_GROSS_UP: f64 = 0.15;
pub const ELIGIBLE_DIVIDEND_GROSS_UP: f64 = 0.38;
const AGE_AMOUNT_REDUCTION_RATE: f64 = 0.15;
const AGE_AMOUNT_MIN_AGE: u32 = 65;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Province {
    #[default]
    Ontario,
    Alberta,
    BritishColumbia,
    Quebec,
}

impl Province {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "ON" => Province::Ontario,
            "AB" => Province::Alberta,
            "BC" => Province::BritishColumbia,
            "QC" => Province::Quebec,
            other => {
                log::warn!("unknown province code {other:?}, using Ontario tables");
                Province::Ontario
            }
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Province::Ontario => "ON",
            Province::Alberta => "AB",
            Province::BritishColumbia => "BC",
            Province::Quebec => "QC",
        }
    }

    pub fn federal_abatement(self) -> f64 {
        match self {
            Province::Quebec => 0.165,
            _ => 0.0,
        }
    }
}

impl From<String> for Province {
    fn from(value: String) -> Self {
        Province::from_code(&value)
    }
}

impl From<Province> for String {
    fn from(value: Province) -> Self {
        value.code().to_string()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Jurisdiction {
    Federal,
    Provincial(Province),
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub upper_limit: f64,
    pub rate: f64,
}

// Ordered marginal brackets; the last `upper_limit` is `f64::INFINITY`.
// Limits increase strictly. Rates are not assumed to be monotonic.
#[derive(Clone, Debug, PartialEq)]
pub struct TaxBracketTable {
    brackets: Vec<TaxBracket>,
}

impl TaxBracketTable {
    pub fn new(brackets: Vec<TaxBracket>) -> Self {
        Self { brackets }
    }

    fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|&(upper_limit, rate)| TaxBracket { upper_limit, rate })
                .collect(),
        )
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    pub fn lowest_rate(&self) -> f64 {
        self.brackets.first().map(|b| b.rate).unwrap_or(0.0)
    }

    fn walk(&self, income: f64) -> (f64, f64) {
        let mut tax = 0.0;
        let mut marginal = 0.0;
        let mut lower = 0.0;

        for bracket in &self.brackets {
            if income <= lower {
                break;
            }
            let width = bracket.upper_limit - lower;
            tax += (income - lower).min(width) * bracket.rate;
            marginal = bracket.rate;
            lower = bracket.upper_limit;
        }

        (tax, marginal)
    }

    fn indexed(&self, factor: f64) -> Self {
        Self::new(
            self.brackets
                .iter()
                .map(|b| TaxBracket {
                    upper_limit: b.upper_limit * factor,
                    rate: b.rate,
                })
                .collect(),
        )
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSet {
    pub basic_personal: f64,
    pub age_amount: f64,
    pub age_amount_threshold: f64,
    pub pension_amount: f64,
    pub spousal_amount: f64,
    pub disability_amount: f64,
}

impl CreditSet {
    fn indexed(self, factor: f64) -> Self {
        Self {
            basic_personal: self.basic_personal * factor,
            age_amount: self.age_amount * factor,
            age_amount_threshold: self.age_amount_threshold * factor,
            pension_amount: self.pension_amount * factor,
            spousal_amount: self.spousal_amount * factor,
            disability_amount: self.disability_amount * factor,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CreditRate {
    LowestBracket,
    Fixed(f64),
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DividendCreditRates {
    pub eligible: f64,
    pub non_eligible: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SurtaxTier {
    pub threshold: f64,
    pub rate: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaxSchedule {
    pub jurisdiction: Jurisdiction,
    pub year: i32,
    pub brackets: TaxBracketTable,
    pub credits: CreditSet,
    pub credit_rate: CreditRate,
    pub surtax: Vec<SurtaxTier>,
    pub dividend_credits: DividendCreditRates,
}

impl TaxSchedule {
    pub fn lookup(jurisdiction: Jurisdiction, year: i32) -> Self {
        Self::lookup_with_source(jurisdiction, year).0
    }

    pub fn lookup_with_source(jurisdiction: Jurisdiction, year: i32) -> (Self, TableSource) {
        let table = schedule_table(jurisdiction);
        let (data_year, data, source) = resolve(table, year)
            .map(|(data, source)| (data.0, data.1, source))
            .unwrap_or((year, &EMPTY_SCHEDULE, TableSource::Exact));
        (data.build(jurisdiction, data_year), source)
    }

    pub fn for_projection(jurisdiction: Jurisdiction, year: i32, inflation: f64) -> Self {
        let schedule = Self::lookup(jurisdiction, year);
        if year <= schedule.year {
            return schedule;
        }
        let factor = (1.0 + inflation).powi(year - schedule.year);
        schedule.indexed(factor)
    }

    pub fn indexed(&self, factor: f64) -> Self {
        if !factor.is_finite() || factor <= 0.0 {
            return self.clone();
        }
        Self {
            jurisdiction: self.jurisdiction,
            year: self.year,
            brackets: self.brackets.indexed(factor),
            credits: self.credits.indexed(factor),
            credit_rate: self.credit_rate,
            surtax: self
                .surtax
                .iter()
                .map(|t| SurtaxTier {
                    threshold: t.threshold * factor,
                    rate: t.rate,
                })
                .collect(),
            dividend_credits: self.dividend_credits,
        }
    }

    pub fn credit_conversion_rate(&self) -> f64 {
        match self.credit_rate {
            CreditRate::LowestBracket => self.brackets.lowest_rate(),
            CreditRate::Fixed(rate) => rate,
        }
    }

    fn surtax_on(&self, basic_tax: f64) -> f64 {
        self.surtax
            .iter()
            .map(|tier| (basic_tax - tier.threshold).max(0.0) * tier.rate)
            .sum()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TaxpayerProfile {
    pub age: u32,
    pub has_pension_income: bool,
    pub spouse_net_income: Option<f64>,
    pub disabled: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxAssessment {
    pub gross_tax: f64,
    pub credits: f64,
    pub net_tax: f64,
    pub marginal_rate: f64,
    pub average_rate: f64,
}

pub fn evaluate(
    schedule: &TaxSchedule,
    taxable_income: f64,
    age: u32,
    has_pension_income: bool,
) -> TaxAssessment {
    evaluate_profile(
        schedule,
        taxable_income,
        &TaxpayerProfile {
            age,
            has_pension_income,
            ..TaxpayerProfile::default()
        },
    )
}

pub fn evaluate_profile(
    schedule: &TaxSchedule,
    taxable_income: f64,
    profile: &TaxpayerProfile,
) -> TaxAssessment {
    if !taxable_income.is_finite() || taxable_income <= 0.0 {
        return TaxAssessment::default();
    }

    let (gross_tax, marginal_rate) = schedule.brackets.walk(taxable_income);
    let credits = credit_base(&schedule.credits, taxable_income, profile)
        * schedule.credit_conversion_rate();
    let net_tax = (gross_tax - credits).max(0.0);

    TaxAssessment {
        gross_tax,
        credits,
        net_tax,
        marginal_rate,
        average_rate: net_tax / taxable_income,
    }
}

fn credit_base(credits: &CreditSet, net_income: f64, profile: &TaxpayerProfile) -> f64 {
    let mut base = credits.basic_personal;

    if profile.age >= AGE_AMOUNT_MIN_AGE {
        let reduction =
            (net_income - credits.age_amount_threshold).max(0.0) * AGE_AMOUNT_REDUCTION_RATE;
        base += (credits.age_amount - reduction).max(0.0);
    }
    if profile.has_pension_income {
        base += credits.pension_amount;
    }
    if let Some(spouse_income) = profile.spouse_net_income {
        base += (credits.spousal_amount - spouse_income.max(0.0)).max(0.0);
    }
    if profile.disabled {
        base += credits.disability_amount;
    }

    base.max(0.0)
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct IncomeComponents {
    pub employment: f64,
    pub pension: f64,
    pub cpp: f64,
    pub oas_gross: f64,
    pub rental: f64,
    pub other: f64,
    pub rrif_withdrawal: f64,
    pub realized_capital_gain: f64,
    pub non_eligible_dividends: f64,
    pub eligible_dividends: f64,
}

impl IncomeComponents {
    pub fn grossed_up_dividends(&self) -> f64 {
        self.non_eligible_dividends.max(0.0) * (1.0 + NON_ELIGIBLE_DIVIDEND_GROSS_UP)
            + self.eligible_dividends.max(0.0) * (1.0 + ELIGIBLE_DIVIDEND_GROSS_UP)
    }

    pub fn taxable_income(&self) -> f64 {
        let ordinary = self.employment
            + self.pension
            + self.cpp
            + self.oas_gross
            + self.rental
            + self.other
            + self.rrif_withdrawal;
        let gains = self.realized_capital_gain.max(0.0) * CAPITAL_GAINS_INCLUSION_RATE;
        (ordinary + gains + self.grossed_up_dividends()).max(0.0)
    }

    // Pension income amount eligibility: any DB pension, plus RRIF income
    // from 65.
    pub fn qualifies_for_pension_credit(&self, age: u32) -> bool {
        self.pension > 0.0 || (age >= AGE_AMOUNT_MIN_AGE && self.rrif_withdrawal > 0.0)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxComputation {
    pub taxable_income: f64,
    pub federal: TaxAssessment,
    pub provincial: TaxAssessment,
    pub dividend_tax_credit: f64,
    pub provincial_surtax: f64,
    pub federal_abatement: f64,
    pub federal_tax: f64,
    pub provincial_tax: f64,
    pub oas_recovery_tax: f64,
    pub total_tax: f64,
    pub marginal_rate: f64,
    pub average_rate: f64,
}

pub fn compose(
    federal: &TaxSchedule,
    provincial: &TaxSchedule,
    province: Province,
    income: &IncomeComponents,
    profile: &TaxpayerProfile,
    oas_clawback_threshold: f64,
) -> TaxComputation {
    let taxable_income = income.taxable_income();
    let profile = TaxpayerProfile {
        has_pension_income: profile.has_pension_income
            || income.qualifies_for_pension_credit(profile.age),
        ..*profile
    };

    let federal_assessment = evaluate_profile(federal, taxable_income, &profile);
    let provincial_assessment = evaluate_profile(provincial, taxable_income, &profile);

    let federal_dtc = dividend_tax_credit(federal, income);
    let provincial_dtc = dividend_tax_credit(provincial, income);

    let federal_basic = (federal_assessment.net_tax - federal_dtc).max(0.0);
    let federal_abatement = federal_basic * province.federal_abatement();
    let federal_tax = federal_basic - federal_abatement;

    let provincial_basic = (provincial_assessment.net_tax - provincial_dtc).max(0.0);
    let provincial_surtax = provincial.surtax_on(provincial_basic);
    let provincial_tax = provincial_basic + provincial_surtax;

    let oas_recovery_tax = oas_recovery_tax(
        income.oas_gross,
        taxable_income,
        oas_clawback_threshold,
    );
    let total_tax = federal_tax + provincial_tax + oas_recovery_tax;

    TaxComputation {
        taxable_income,
        federal: federal_assessment,
        provincial: provincial_assessment,
        dividend_tax_credit: federal_dtc + provincial_dtc,
        provincial_surtax,
        federal_abatement,
        federal_tax,
        provincial_tax,
        oas_recovery_tax,
        total_tax,
        marginal_rate: federal_assessment.marginal_rate + provincial_assessment.marginal_rate,
        average_rate: if taxable_income > 0.0 {
            total_tax / taxable_income
        } else {
            0.0
        },
    }
}

fn dividend_tax_credit(schedule: &TaxSchedule, income: &IncomeComponents) -> f64 {
    let non_eligible = income.non_eligible_dividends.max(0.0)
        * (1.0 + NON_ELIGIBLE_DIVIDEND_GROSS_UP)
        * schedule.dividend_credits.non_eligible;
    let eligible = income.eligible_dividends.max(0.0)
        * (1.0 + ELIGIBLE_DIVIDEND_GROSS_UP)
        * schedule.dividend_credits.eligible;
    non_eligible + eligible
}

pub fn oas_recovery_tax(oas_gross: f64, net_income: f64, threshold: f64) -> f64 {
    if oas_gross <= 0.0 {
        return 0.0;
    }
    ((net_income - threshold).max(0.0) * OAS_RECOVERY_RATE).min(oas_gross)
}

struct ScheduleData {
    brackets: &'static [(f64, f64)],
    credits: CreditSet,
    credit_rate: CreditRate,
    surtax: &'static [(f64, f64)],
    dividend_credits: DividendCreditRates,
}

impl ScheduleData {
    fn build(&self, jurisdiction: Jurisdiction, year: i32) -> TaxSchedule {
        TaxSchedule {
            jurisdiction,
            year,
            brackets: TaxBracketTable::from_pairs(self.brackets),
            credits: self.credits,
            credit_rate: self.credit_rate,
            surtax: self
                .surtax
                .iter()
                .map(|&(threshold, rate)| SurtaxTier { threshold, rate })
                .collect(),
            dividend_credits: self.dividend_credits,
        }
    }
}

type ScheduleTable = &'static [(i32, (i32, &'static ScheduleData))];

fn schedule_table(jurisdiction: Jurisdiction) -> ScheduleTable {
    match jurisdiction {
        Jurisdiction::Federal => FEDERAL_SCHEDULES,
        Jurisdiction::Provincial(Province::Ontario) => ONTARIO_SCHEDULES,
        Jurisdiction::Provincial(Province::Alberta) => ALBERTA_SCHEDULES,
        Jurisdiction::Provincial(Province::BritishColumbia) => BRITISH_COLUMBIA_SCHEDULES,
        Jurisdiction::Provincial(Province::Quebec) => QUEBEC_SCHEDULES,
    }
}

const EMPTY_SCHEDULE: ScheduleData = ScheduleData {
    brackets: &[],
    credits: CreditSet {
        basic_personal: 0.0,
        age_amount: 0.0,
        age_amount_threshold: 0.0,
        pension_amount: 0.0,
        spousal_amount: 0.0,
        disability_amount: 0.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[],
    dividend_credits: DividendCreditRates {
        eligible: 0.0,
        non_eligible: 0.0,
    },
};

const FEDERAL_SCHEDULES: ScheduleTable = &[
    (2024, (2024, &FEDERAL_2024)),
    (2025, (2025, &FEDERAL_2025)),
];
const ONTARIO_SCHEDULES: ScheduleTable = &[
    (2024, (2024, &ONTARIO_2024)),
    (2025, (2025, &ONTARIO_2025)),
];
const ALBERTA_SCHEDULES: ScheduleTable = &[
    (2024, (2024, &ALBERTA_2024)),
    (2025, (2025, &ALBERTA_2025)),
];
const BRITISH_COLUMBIA_SCHEDULES: ScheduleTable = &[(2025, (2025, &BRITISH_COLUMBIA_2025))];
const QUEBEC_SCHEDULES: ScheduleTable = &[(2025, (2025, &QUEBEC_2025))];

const FEDERAL_DIVIDEND_CREDITS: DividendCreditRates = DividendCreditRates {
    eligible: 0.150198,
    non_eligible: 0.090301,
};

const FEDERAL_2024: ScheduleData = ScheduleData {
    brackets: &[
        (55_867.0, 0.15),
        (111_733.0, 0.205),
        (173_205.0, 0.26),
        (246_752.0, 0.29),
        (f64::INFINITY, 0.33),
    ],
    credits: CreditSet {
        basic_personal: 15_705.0,
        age_amount: 8_790.0,
        age_amount_threshold: 44_325.0,
        pension_amount: 2_000.0,
        spousal_amount: 15_705.0,
        disability_amount: 9_872.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[],
    dividend_credits: FEDERAL_DIVIDEND_CREDITS,
};

const FEDERAL_2025: ScheduleData = ScheduleData {
    brackets: &[
        (57_375.0, 0.15),
        (114_750.0, 0.205),
        (177_882.0, 0.26),
        (253_414.0, 0.29),
        (f64::INFINITY, 0.33),
    ],
    credits: CreditSet {
        basic_personal: 16_129.0,
        age_amount: 9_028.0,
        age_amount_threshold: 45_522.0,
        pension_amount: 2_000.0,
        spousal_amount: 16_129.0,
        disability_amount: 10_138.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[],
    dividend_credits: FEDERAL_DIVIDEND_CREDITS,
};

const ONTARIO_DIVIDEND_CREDITS: DividendCreditRates = DividendCreditRates {
    eligible: 0.10,
    non_eligible: 0.029863,
};

const ONTARIO_2024: ScheduleData = ScheduleData {
    brackets: &[
        (51_446.0, 0.0505),
        (102_894.0, 0.0915),
        (150_000.0, 0.1116),
        (220_000.0, 0.1216),
        (f64::INFINITY, 0.1316),
    ],
    credits: CreditSet {
        basic_personal: 12_399.0,
        age_amount: 6_054.0,
        age_amount_threshold: 45_068.0,
        pension_amount: 1_714.0,
        spousal_amount: 10_528.0,
        disability_amount: 10_017.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[(5_554.0, 0.20), (7_108.0, 0.36)],
    dividend_credits: ONTARIO_DIVIDEND_CREDITS,
};

const ONTARIO_2025: ScheduleData = ScheduleData {
    brackets: &[
        (52_886.0, 0.0505),
        (105_775.0, 0.0915),
        (150_000.0, 0.1116),
        (220_000.0, 0.1216),
        (f64::INFINITY, 0.1316),
    ],
    credits: CreditSet {
        basic_personal: 12_747.0,
        age_amount: 6_223.0,
        age_amount_threshold: 46_330.0,
        pension_amount: 1_762.0,
        spousal_amount: 10_823.0,
        disability_amount: 10_298.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[(5_710.0, 0.20), (7_307.0, 0.36)],
    dividend_credits: ONTARIO_DIVIDEND_CREDITS,
};

const ALBERTA_DIVIDEND_CREDITS: DividendCreditRates = DividendCreditRates {
    eligible: 0.0812,
    non_eligible: 0.0218,
};

const ALBERTA_2024: ScheduleData = ScheduleData {
    brackets: &[
        (148_269.0, 0.10),
        (177_922.0, 0.12),
        (237_230.0, 0.13),
        (355_845.0, 0.14),
        (f64::INFINITY, 0.15),
    ],
    credits: CreditSet {
        basic_personal: 21_885.0,
        age_amount: 6_087.0,
        age_amount_threshold: 45_330.0,
        pension_amount: 1_635.0,
        spousal_amount: 21_885.0,
        disability_amount: 16_989.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[],
    dividend_credits: ALBERTA_DIVIDEND_CREDITS,
};

// The 8% bracket introduced for 2025 does not lower the credit rate.
const ALBERTA_2025: ScheduleData = ScheduleData {
    brackets: &[
        (60_000.0, 0.08),
        (151_234.0, 0.10),
        (181_481.0, 0.12),
        (241_974.0, 0.13),
        (362_961.0, 0.14),
        (f64::INFINITY, 0.15),
    ],
    credits: CreditSet {
        basic_personal: 22_323.0,
        age_amount: 6_221.0,
        age_amount_threshold: 46_308.0,
        pension_amount: 1_719.0,
        spousal_amount: 22_323.0,
        disability_amount: 17_363.0,
    },
    credit_rate: CreditRate::Fixed(0.10),
    surtax: &[],
    dividend_credits: ALBERTA_DIVIDEND_CREDITS,
};

const BRITISH_COLUMBIA_2025: ScheduleData = ScheduleData {
    brackets: &[
        (49_279.0, 0.0506),
        (98_560.0, 0.077),
        (113_158.0, 0.105),
        (137_407.0, 0.1229),
        (186_306.0, 0.147),
        (259_829.0, 0.168),
        (f64::INFINITY, 0.205),
    ],
    credits: CreditSet {
        basic_personal: 12_932.0,
        age_amount: 5_799.0,
        age_amount_threshold: 43_169.0,
        pension_amount: 1_000.0,
        spousal_amount: 11_073.0,
        disability_amount: 8_986.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[],
    dividend_credits: DividendCreditRates {
        eligible: 0.12,
        non_eligible: 0.0196,
    },
};

const QUEBEC_2025: ScheduleData = ScheduleData {
    brackets: &[
        (53_255.0, 0.14),
        (106_495.0, 0.19),
        (129_590.0, 0.24),
        (f64::INFINITY, 0.2575),
    ],
    credits: CreditSet {
        basic_personal: 18_571.0,
        age_amount: 3_798.0,
        age_amount_threshold: 42_090.0,
        pension_amount: 3_374.0,
        spousal_amount: 0.0,
        disability_amount: 3_832.0,
    },
    credit_rate: CreditRate::LowestBracket,
    surtax: &[],
    dividend_credits: DividendCreditRates {
        eligible: 0.117,
        non_eligible: 0.0342,
    },
};
