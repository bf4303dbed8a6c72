#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableSource {
    Exact,
    LatestKnown,
    EarliestKnown,
}

pub fn resolve<T: Copy>(table: &[(i32, T)], year: i32) -> Option<(T, TableSource)> {
    let (first_year, first) = *table.first()?;
    let (last_year, last) = *table.last()?;

    if year < first_year {
        return Some((first, TableSource::EarliestKnown));
    }
    if year > last_year {
        return Some((last, TableSource::LatestKnown));
    }

    table
        .iter()
        .rev()
        .find(|(y, _)| *y <= year)
        .map(|(y, v)| {
            let source = if *y == year {
                TableSource::Exact
            } else {
                TableSource::LatestKnown
            };
            (*v, source)
        })
}

pub fn value_for_year<T: Copy>(table: &[(i32, T)], year: i32) -> Option<T> {
    resolve(table, year).map(|(value, _)| value)
}

pub const YMPE: &[(i32, f64)] = &[
    (1990, 28_900.0),
    (1991, 30_500.0),
    (1992, 32_200.0),
    (1993, 33_400.0),
    (1994, 34_400.0),
    (1995, 34_900.0),
    (1996, 35_400.0),
    (1997, 35_800.0),
    (1998, 36_900.0),
    (1999, 37_400.0),
    (2000, 37_600.0),
    (2001, 38_300.0),
    (2002, 39_100.0),
    (2003, 39_900.0),
    (2004, 40_500.0),
    (2005, 41_100.0),
    (2006, 42_100.0),
    (2007, 43_700.0),
    (2008, 44_900.0),
    (2009, 46_300.0),
    (2010, 47_200.0),
    (2011, 48_300.0),
    (2012, 50_100.0),
    (2013, 51_100.0),
    (2014, 52_500.0),
    (2015, 53_600.0),
    (2016, 54_900.0),
    (2017, 55_300.0),
    (2018, 55_900.0),
    (2019, 57_400.0),
    (2020, 58_700.0),
    (2021, 61_600.0),
    (2022, 64_900.0),
    (2023, 66_600.0),
    (2024, 68_500.0),
    (2025, 71_300.0),
];

pub const MAX_CPP_MONTHLY: &[(i32, f64)] = &[
    (2020, 1_175.83),
    (2021, 1_203.75),
    (2022, 1_253.59),
    (2023, 1_306.57),
    (2024, 1_364.60),
    (2025, 1_433.00),
];

pub const TFSA_ANNUAL_LIMIT: &[(i32, f64)] = &[
    (2019, 6_000.0),
    (2020, 6_000.0),
    (2021, 6_000.0),
    (2022, 6_000.0),
    (2023, 6_500.0),
    (2024, 7_000.0),
    (2025, 7_000.0),
];

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OasRow {
    pub max_monthly: f64,
    pub max_monthly_75_plus: f64,
    pub clawback_threshold: f64,
}

// OAS maximums and the recovery-tax threshold, keyed by payment year.
pub const OAS: &[(i32, OasRow)] = &[
    (
        2023,
        OasRow {
            max_monthly: 687.56,
            max_monthly_75_plus: 756.32,
            clawback_threshold: 81_761.0,
        },
    ),
    (
        2024,
        OasRow {
            max_monthly: 713.34,
            max_monthly_75_plus: 784.67,
            clawback_threshold: 86_912.0,
        },
    ),
    (
        2025,
        OasRow {
            max_monthly: 727.67,
            max_monthly_75_plus: 800.44,
            clawback_threshold: 90_997.0,
        },
    ),
];

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GisRow {
    pub single: f64,
    pub couple_both_oas: f64,
    pub couple_spouse_without_oas: f64,
}

pub const GIS: &[(i32, GisRow)] = &[
    (
        2024,
        GisRow {
            single: 1_065.47,
            couple_both_oas: 641.35,
            couple_spouse_without_oas: 1_065.47,
        },
    ),
    (
        2025,
        GisRow {
            single: 1_086.88,
            couple_both_oas: 654.23,
            couple_spouse_without_oas: 1_086.88,
        },
    ),
];

pub fn ympe(year: i32) -> f64 {
    value_for_year(YMPE, year).unwrap_or(0.0)
}

pub fn max_cpp_monthly(year: i32) -> f64 {
    value_for_year(MAX_CPP_MONTHLY, year).unwrap_or(0.0)
}

pub fn tfsa_annual_limit(year: i32) -> f64 {
    value_for_year(TFSA_ANNUAL_LIMIT, year).unwrap_or(0.0)
}

pub fn mpea(year: i32) -> f64 {
    let total: f64 = (year - 4..=year).map(ympe).sum();
    total / 5.0
}
