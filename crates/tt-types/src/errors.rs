use thiserror::Error;

/// Main error type for TopicTune
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Restart error: {0}")]
    Restart(#[from] RestartError),

    #[error("Evaluation failed at iteration {iteration}: {message}")]
    Evaluation { iteration: usize, message: String },

    #[error("Metric {metric} produced a NaN aggregate at iteration {iteration}")]
    NumericDegeneracy { iteration: usize, metric: String },

    #[error("Surrogate backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while validating an optimizer configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("optimization type must be Maximize or Minimize, got {value}")]
    InvalidOptimizationType { value: String },

    #[error("surrogate model must be RF, ET, RS or GP, got {value}")]
    InvalidSurrogateModel { value: String },

    #[error("acquisition function must be PI, EI or LCB, got {value}")]
    InvalidAcquisitionFunction { value: String },

    #[error("wrong initial point generator: {value}")]
    InvalidInitialPointGenerator { value: String },

    #[error("number_of_call can't be <= 0")]
    NonPositiveBudget,

    #[error("number_of_call ({number_of_call}) must exceed the number of seed points ({seeds})")]
    BudgetBelowSeeds { number_of_call: usize, seeds: usize },

    #[error("{field} must be an integer, got {value}")]
    NotAnInteger { field: String, value: String },

    #[error("{field} must be at least {min}, got {value}")]
    OutOfRange { field: String, min: i64, value: i64 },

    #[error("y0 has {y0} values but x0 has {x0} points; y0 must be empty or match x0")]
    SeedLengthMismatch { x0: usize, y0: usize },

    #[error("seed point {index} is invalid: {message}")]
    InvalidSeedPoint { index: usize, message: String },

    #[error("search space is empty")]
    EmptySearchSpace,

    #[error("invalid dimension {name}: {message}")]
    InvalidDimension { name: String, message: String },

    #[error("metric {name} is configured more than once")]
    DuplicateMetric { name: String },

    #[error("unknown option: {name}")]
    UnknownOption { name: String },

    #[error("invalid value for option {name}: {message}")]
    InvalidOption { name: String, message: String },
}

/// Errors raised while reconstructing a search from a checkpoint
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RestartError {
    #[error("checkpoint is missing required field: {field}")]
    MissingField { field: String },

    #[error("checkpoint field {field} is malformed: {message}")]
    MalformedField { field: String, message: String },

    #[error("no metric named {name} is registered")]
    UnknownMetric { name: String },

    #[error("checkpoint records {x_iters} candidates but {func_vals} objective values")]
    LengthMismatch { x_iters: usize, func_vals: usize },
}

/// Result type alias for TopicTune operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Macro for creating configuration errors from a field name and message
#[macro_export]
macro_rules! invalid_option {
    ($name:expr, $($arg:tt)*) => {
        $crate::ConfigError::InvalidOption {
            name: $name.to_string(),
            message: format!($($arg)*),
        }
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TuneError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::BudgetBelowSeeds {
            number_of_call: 2,
            seeds: 3,
        };

        assert!(error.to_string().contains("number_of_call (2)"));
        assert!(error.to_string().contains("seed points (3)"));
    }

    #[test]
    fn test_error_conversion() {
        let config_error = ConfigError::NonPositiveBudget;
        let tune_error: TuneError = config_error.into();

        match tune_error {
            TuneError::Config(ConfigError::NonPositiveBudget) => (),
            _ => panic!("Expected Config error"),
        }

        let restart: TuneError = RestartError::MissingField {
            field: "x_iters".into(),
        }
        .into();
        assert!(restart.to_string().contains("x_iters"));
    }

    #[test]
    fn test_macros() {
        let err = invalid_option!("save_step", "expected {} got {}", "integer", "1.5");
        assert_eq!(
            err,
            ConfigError::InvalidOption {
                name: "save_step".into(),
                message: "expected integer got 1.5".into(),
            }
        );
        let internal = internal_error!("lost {}", 3);
        assert_eq!(internal.to_string(), "Internal error: lost 3");
    }
}
