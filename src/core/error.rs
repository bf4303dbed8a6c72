use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("CPP start age must be between 60 and 70, got {0}")]
    CppStartAge(u32),

    #[error("OAS start age must be between 65 and 70, got {0}")]
    OasStartAge(u32),

    #[error("life expectancy ({life_expectancy}) must be greater than current age ({current_age})")]
    NonPositiveHorizon {
        current_age: u32,
        life_expectancy: u32,
    },

    #[error("{field} of {age} is past the supported maximum age of {max}")]
    ImplausibleAge {
        field: &'static str,
        age: u32,
        max: u32,
    },

    #[error("a household needs one or two people, got {0}")]
    PersonCount(usize),

    #[error("{field} must be a finite amount >= 0, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error("{field} must be a finite rate > -100%, got {value}")]
    InvalidRate { field: &'static str, value: f64 },

    #[error("spending plan needs at least one phase")]
    EmptySpendingPlan,

    #[error("solver bounds are invalid: {0}")]
    SolverBounds(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
