pub const FIRST_MANDATORY_AGE: u32 = 71;
pub const TABLE_CAP_AGE: u32 = 95;

// Index 0 is age 71, the last entry is the age-95 cap.
const PRESCRIBED_FACTORS: [f64; 25] = [
    0.0528, 0.0540, 0.0553, 0.0567, 0.0582, 0.0598, 0.0617, 0.0636, 0.0658, 0.0682, 0.0708,
    0.0738, 0.0771, 0.0808, 0.0851, 0.0899, 0.0955, 0.1021, 0.1099, 0.1192, 0.1306, 0.1449,
    0.1634, 0.1879, 0.2000,
];

pub fn minimum_fraction(age: u32) -> f64 {
    if age < FIRST_MANDATORY_AGE {
        return 0.0;
    }
    let idx = (age.min(TABLE_CAP_AGE) - FIRST_MANDATORY_AGE) as usize;
    PRESCRIBED_FACTORS[idx]
}

pub fn minimum_withdrawal(age: u32, start_of_year_balance: f64) -> f64 {
    (minimum_fraction(age) * start_of_year_balance.max(0.0)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    #[test]
    fn ages_before_conversion_have_no_minimum() {
        for age in [0, 55, 65, 70] {
            assert_eq!(minimum_fraction(age), 0.0);
        }
        assert_eq!(minimum_withdrawal(65, 200_000.0), 0.0);
    }

    #[test]
    fn prescribed_factors_at_table_edges() {
        assert_eq!(minimum_fraction(71), 0.0528);
        assert_eq!(minimum_fraction(80), 0.0682);
        assert_eq!(minimum_fraction(94), 0.1879);
        assert_eq!(minimum_fraction(95), 0.20);
    }

    #[test]
    fn ages_past_cap_use_age_95_factor() {
        assert_eq!(minimum_fraction(101), minimum_fraction(95));
        assert_eq!(minimum_fraction(120), 0.20);
    }

    #[test]
    fn minimum_withdrawal_scales_start_balance() {
        assert!((minimum_withdrawal(71, 100_000.0) - 5_280.0).abs() < 1e-9);
        assert_eq!(minimum_withdrawal(75, 0.0), 0.0);
        assert_eq!(minimum_withdrawal(75, -10.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_schedule_is_non_decreasing(age in 71u32..94) {
            prop_assert!(minimum_fraction(age) <= minimum_fraction(age + 1));
        }

        #[test]
        fn prop_fraction_is_a_valid_share(age in 0u32..130) {
            let f = minimum_fraction(age);
            prop_assert!((0.0..=1.0).contains(&f));
        }
    }
}
