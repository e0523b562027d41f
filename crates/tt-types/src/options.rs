//! Identifier enums for the optimizer options and the typed kernel description.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// Whether the primary metric is maximized or minimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizationType {
    #[default]
    Maximize,
    Minimize,
}

impl OptimizationType {
    /// Convert a raw score into the minimize convention used by surrogates.
    pub fn to_signed(self, value: f64) -> f64 {
        match self {
            Self::Maximize => -value,
            Self::Minimize => value,
        }
    }

    /// Inverse of [`OptimizationType::to_signed`].
    pub fn from_signed(self, value: f64) -> f64 {
        self.to_signed(value)
    }
}

/// Regression model family used as the surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SurrogateModel {
    /// Random forest
    #[default]
    RF,
    /// Random search (no regression)
    RS,
    /// Gaussian process
    GP,
    /// Extra trees
    ET,
}

/// Acquisition function minimized over the surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcquisitionFunction {
    PI,
    EI,
    #[default]
    LCB,
}

/// Strategy for the initial random-exploration points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialPointGenerator {
    #[default]
    Lhs,
    Sobol,
    Halton,
    Hammersly,
    Grid,
    Random,
}

impl InitialPointGenerator {
    pub const ALL: [Self; 6] = [
        Self::Lhs,
        Self::Sobol,
        Self::Halton,
        Self::Hammersly,
        Self::Grid,
        Self::Random,
    ];
}

macro_rules! string_enum {
    ($ty:ty, $err:ident, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($variant),)+
                    other => Err(ConfigError::$err { value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($variant => $name,)+
                };
                f.write_str(name)
            }
        }
    };
}

string_enum!(OptimizationType, InvalidOptimizationType, {
    OptimizationType::Maximize => "Maximize",
    OptimizationType::Minimize => "Minimize",
});

string_enum!(SurrogateModel, InvalidSurrogateModel, {
    SurrogateModel::RF => "RF",
    SurrogateModel::RS => "RS",
    SurrogateModel::GP => "GP",
    SurrogateModel::ET => "ET",
});

string_enum!(AcquisitionFunction, InvalidAcquisitionFunction, {
    AcquisitionFunction::PI => "PI",
    AcquisitionFunction::EI => "EI",
    AcquisitionFunction::LCB => "LCB",
});

string_enum!(InitialPointGenerator, InvalidInitialPointGenerator, {
    InitialPointGenerator::Lhs => "lhs",
    InitialPointGenerator::Sobol => "sobol",
    InitialPointGenerator::Halton => "halton",
    InitialPointGenerator::Hammersly => "hammersly",
    InitialPointGenerator::Grid => "grid",
    InitialPointGenerator::Random => "random",
});

/// Covariance kernel for Gaussian-process surrogates, stored as plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Kernel {
    Matern {
        #[serde(default = "unit")]
        amplitude: f64,
        length_scale: f64,
        length_scale_bounds: (f64, f64),
        nu: f64,
    },
    Rbf {
        #[serde(default = "unit")]
        amplitude: f64,
        length_scale: f64,
        length_scale_bounds: (f64, f64),
    },
    RationalQuadratic {
        #[serde(default = "unit")]
        amplitude: f64,
        length_scale: f64,
        alpha: f64,
    },
}

fn unit() -> f64 {
    1.0
}

impl Default for Kernel {
    /// `1.0 * Matern(length_scale=1.0, length_scale_bounds=(0.1, 10.0), nu=1.5)`
    fn default() -> Self {
        Self::Matern {
            amplitude: 1.0,
            length_scale: 1.0,
            length_scale_bounds: (0.1, 10.0),
            nu: 1.5,
        }
    }
}

impl Kernel {
    pub fn length_scale(&self) -> f64 {
        match self {
            Self::Matern { length_scale, .. }
            | Self::Rbf { length_scale, .. }
            | Self::RationalQuadratic { length_scale, .. } => *length_scale,
        }
    }

    pub fn amplitude(&self) -> f64 {
        match self {
            Self::Matern { amplitude, .. }
            | Self::Rbf { amplitude, .. }
            | Self::RationalQuadratic { amplitude, .. } => *amplitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for name in ["RF", "RS", "GP", "ET"] {
            let parsed: SurrogateModel = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
        }
        for gen in InitialPointGenerator::ALL {
            let parsed: InitialPointGenerator = gen.to_string().parse().unwrap();
            assert_eq!(parsed, gen);
        }
        assert_eq!("LCB".parse::<AcquisitionFunction>().unwrap(), AcquisitionFunction::LCB);
    }

    #[test]
    fn unknown_identifiers_are_config_errors() {
        assert_eq!(
            "maximize".parse::<OptimizationType>(),
            Err(ConfigError::InvalidOptimizationType {
                value: "maximize".into()
            })
        );
        assert!(matches!(
            "SVM".parse::<SurrogateModel>(),
            Err(ConfigError::InvalidSurrogateModel { .. })
        ));
        assert!(matches!(
            "UCB".parse::<AcquisitionFunction>(),
            Err(ConfigError::InvalidAcquisitionFunction { .. })
        ));
        assert!(matches!(
            "latin".parse::<InitialPointGenerator>(),
            Err(ConfigError::InvalidInitialPointGenerator { .. })
        ));
    }

    #[test]
    fn signed_values_follow_direction() {
        assert_eq!(OptimizationType::Maximize.to_signed(0.42), -0.42);
        assert_eq!(OptimizationType::Minimize.to_signed(0.42), 0.42);
        assert_eq!(OptimizationType::Maximize.from_signed(-0.42), 0.42);
    }

    #[test]
    fn kernel_is_structured_json() {
        let json = serde_json::to_value(Kernel::default()).unwrap();
        assert_eq!(json["kind"], "matern");
        assert_eq!(json["nu"], 1.5);
        let back: Kernel = serde_json::from_value(json).unwrap();
        assert_eq!(back, Kernel::default());
        assert_eq!(back.length_scale(), 1.0);
    }

    #[test]
    fn serde_names_match_identifiers() {
        assert_eq!(serde_json::to_value(InitialPointGenerator::Hammersly).unwrap(), "hammersly");
        assert_eq!(serde_json::to_value(SurrogateModel::GP).unwrap(), "GP");
        assert_eq!(serde_json::to_value(OptimizationType::Minimize).unwrap(), "Minimize");
    }
}
