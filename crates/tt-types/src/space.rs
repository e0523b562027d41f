//! Search space definitions and the canonical parameter ordering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ConfigError;

/// Describes how a single hyperparameter is searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dimension {
    /// Integer range [low, high] inclusive.
    Integer {
        low: i64,
        high: i64,
        #[serde(default)]
        log_scale: bool,
    },
    /// Continuous range [low, high].
    Real {
        low: f64,
        high: f64,
        #[serde(default)]
        log_scale: bool,
    },
    /// Unordered set of choices.
    Categorical { categories: Vec<serde_json::Value> },
}

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Categorical(serde_json::Value),
}

/// One proposed configuration, aligned with [`SearchSpace::names`].
pub type Candidate = Vec<ParameterValue>;

/// Named view of a candidate, as handed to a topic model.
pub type Hyperparameters = BTreeMap<String, ParameterValue>;

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Categorical(v) => v.as_f64(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Float(_) => None,
            Self::Categorical(v) => v.as_i64(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Categorical(v) => v.clone(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Categorical(v) => write!(f, "{v}"),
        }
    }
}

impl Dimension {
    /// Check that the bounds describe a non-empty, samplable range.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidDimension {
            name: name.to_string(),
            message: message.to_string(),
        };
        match self {
            Self::Integer {
                low,
                high,
                log_scale,
            } => {
                if low > high {
                    return Err(invalid("low must not exceed high"));
                }
                if *log_scale && *low <= 0 {
                    return Err(invalid("log-scaled bounds must be positive"));
                }
            }
            Self::Real {
                low,
                high,
                log_scale,
            } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(invalid("bounds must be finite"));
                }
                if low > high {
                    return Err(invalid("low must not exceed high"));
                }
                if *log_scale && *low <= 0.0 {
                    return Err(invalid("log-scaled bounds must be positive"));
                }
            }
            Self::Categorical { categories } => {
                if categories.is_empty() {
                    return Err(invalid("no categories"));
                }
            }
        }
        Ok(())
    }

    /// Map a unit-interval coordinate onto this dimension.
    pub fn from_unit(&self, u: f64) -> ParameterValue {
        let u = u.clamp(0.0, 1.0);
        match self {
            Self::Integer {
                low,
                high,
                log_scale: false,
            } => {
                let span = (high - low + 1) as f64;
                let offset = (u * span).floor() as i64;
                ParameterValue::Int((low + offset).min(*high))
            }
            Self::Integer {
                low,
                high,
                log_scale: true,
            } => {
                let (ll, lh) = ((*low as f64).ln(), (*high as f64).ln());
                let v = (ll + u * (lh - ll)).exp().round() as i64;
                ParameterValue::Int(v.clamp(*low, *high))
            }
            Self::Real {
                low,
                high,
                log_scale: false,
            } => ParameterValue::Float((low + u * (high - low)).clamp(*low, *high)),
            Self::Real {
                low,
                high,
                log_scale: true,
            } => {
                let (ll, lh) = (low.ln(), high.ln());
                ParameterValue::Float((ll + u * (lh - ll)).exp().clamp(*low, *high))
            }
            Self::Categorical { categories } => {
                let idx = ((u * categories.len() as f64).floor() as usize)
                    .min(categories.len() - 1);
                ParameterValue::Categorical(categories[idx].clone())
            }
        }
    }

    /// Inverse of [`Dimension::from_unit`]; `None` if the value does not belong here.
    pub fn to_unit(&self, value: &ParameterValue) -> Option<f64> {
        let value = self.canonicalize(value)?;
        let u = match (self, &value) {
            (
                Self::Integer {
                    low,
                    high,
                    log_scale: false,
                },
                ParameterValue::Int(v),
            ) => (v - low) as f64 / (high - low + 1) as f64 + 0.5 / (high - low + 1) as f64,
            (
                Self::Integer {
                    low,
                    high,
                    log_scale: true,
                },
                ParameterValue::Int(v),
            ) => ratio((*v as f64).ln(), (*low as f64).ln(), (*high as f64).ln()),
            (
                Self::Real {
                    low,
                    high,
                    log_scale: false,
                },
                ParameterValue::Float(v),
            ) => ratio(*v, *low, *high),
            (
                Self::Real {
                    low,
                    high,
                    log_scale: true,
                },
                ParameterValue::Float(v),
            ) => ratio(v.ln(), low.ln(), high.ln()),
            (Self::Categorical { categories }, ParameterValue::Categorical(v)) => {
                let idx = categories.iter().position(|c| c == v)?;
                (idx as f64 + 0.5) / categories.len() as f64
            }
            _ => return None,
        };
        Some(u.clamp(0.0, 1.0))
    }

    /// Convert a value into the variant this dimension produces, if it fits.
    ///
    /// Checkpoints store values untagged, so an integer category comes back as
    /// `Int` and a whole-number real as `Int` too; this restores the variant.
    pub fn canonicalize(&self, value: &ParameterValue) -> Option<ParameterValue> {
        match self {
            Self::Integer { low, high, .. } => {
                let v = value.as_i64()?;
                (v >= *low && v <= *high).then_some(ParameterValue::Int(v))
            }
            Self::Real { low, high, .. } => {
                let v = match value {
                    ParameterValue::Categorical(_) => return None,
                    other => other.as_f64()?,
                };
                (v >= *low && v <= *high).then_some(ParameterValue::Float(v))
            }
            Self::Categorical { categories } => {
                let json = value.to_json();
                categories
                    .iter()
                    .find(|c| **c == json)
                    .map(|c| ParameterValue::Categorical(c.clone()))
            }
        }
    }

    pub fn contains(&self, value: &ParameterValue) -> bool {
        self.canonicalize(value).is_some()
    }
}

fn ratio(v: f64, low: f64, high: f64) -> f64 {
    if high > low {
        (v - low) / (high - low)
    } else {
        0.5
    }
}

/// The full search space. Keys are kept sorted, which fixes the canonical
/// parameter order used by every [`Candidate`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    dimensions: BTreeMap<String, Dimension>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: impl Into<String>, dimension: Dimension) -> Self {
        self.dimensions.insert(name.into(), dimension);
        self
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(
            name,
            Dimension::Integer {
                low,
                high,
                log_scale: false,
            },
        )
    }

    pub fn add_real(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(
            name,
            Dimension::Real {
                low,
                high,
                log_scale: false,
            },
        )
    }

    pub fn add_log_real(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(
            name,
            Dimension::Real {
                low,
                high,
                log_scale: true,
            },
        )
    }

    pub fn add_categorical(
        self,
        name: impl Into<String>,
        categories: Vec<serde_json::Value>,
    ) -> Self {
        self.add(name, Dimension::Categorical { categories })
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Hyperparameter names in canonical (sorted) order.
    pub fn names(&self) -> Vec<String> {
        self.dimensions.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Dimension)> {
        self.dimensions.iter()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptySearchSpace);
        }
        for (name, dim) in &self.dimensions {
            dim.validate(name)?;
        }
        Ok(())
    }

    /// Restore a candidate's values to the variants each dimension produces.
    /// Fails with a message naming the first offending hyperparameter.
    pub fn canonicalize(&self, candidate: &[ParameterValue]) -> Result<Candidate, String> {
        if candidate.len() != self.len() {
            return Err(format!(
                "expected {} values, got {}",
                self.len(),
                candidate.len()
            ));
        }
        self.dimensions
            .iter()
            .zip(candidate)
            .map(|((name, dim), value)| {
                dim.canonicalize(value)
                    .ok_or_else(|| format!("{value} is outside the range of {name}"))
            })
            .collect()
    }

    pub fn contains(&self, candidate: &[ParameterValue]) -> bool {
        self.canonicalize(candidate).is_ok()
    }

    /// Name each value of a candidate by its hyperparameter.
    pub fn to_named(&self, candidate: &[ParameterValue]) -> Hyperparameters {
        self.dimensions
            .keys()
            .cloned()
            .zip(candidate.iter().cloned())
            .collect()
    }

    /// Map a point of the unit hypercube onto the space.
    pub fn from_unit(&self, point: &[f64]) -> Candidate {
        self.dimensions
            .values()
            .zip(point)
            .map(|(dim, u)| dim.from_unit(*u))
            .collect()
    }

    /// Unit hypercube coordinates of a candidate.
    pub fn to_unit(&self, candidate: &[ParameterValue]) -> Option<Vec<f64>> {
        self.dimensions
            .values()
            .zip(candidate)
            .map(|(dim, value)| dim.to_unit(value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_int("num_topics", 5, 50)
            .add_log_real("lr", 1e-4, 1e-1)
            .add_categorical("activation", vec![json!("relu"), json!("tanh")])
    }

    #[test]
    fn names_are_sorted() {
        let space = sample_space();
        assert_eq!(space.names(), vec!["activation", "lr", "num_topics"]);
    }

    #[test]
    fn to_named_follows_sorted_order() {
        let space = sample_space();
        let candidate = vec![
            ParameterValue::Categorical(json!("tanh")),
            ParameterValue::Float(0.01),
            ParameterValue::Int(12),
        ];
        let named = space.to_named(&candidate);
        assert_eq!(named["num_topics"], ParameterValue::Int(12));
        assert_eq!(named["lr"], ParameterValue::Float(0.01));
        assert_eq!(named["activation"], ParameterValue::Categorical(json!("tanh")));
    }

    #[test]
    fn from_unit_stays_in_bounds() {
        let space = sample_space();
        for i in 0..=20 {
            let u = i as f64 / 20.0;
            let candidate = space.from_unit(&[u, u, u]);
            assert!(space.contains(&candidate), "{candidate:?} out of bounds");
        }
    }

    #[test]
    fn integer_unit_round_trip() {
        let dim = Dimension::Integer {
            low: 5,
            high: 50,
            log_scale: false,
        };
        for v in 5..=50 {
            let u = dim.to_unit(&ParameterValue::Int(v)).unwrap();
            assert_eq!(dim.from_unit(u), ParameterValue::Int(v));
        }
    }

    #[test]
    fn canonicalize_restores_variants() {
        let space = SearchSpace::new()
            .add_real("alpha", 0.0, 2.0)
            .add_categorical("k", vec![json!(1), json!(2)]);
        // Untagged JSON round trips turn these into Int.
        let raw = vec![ParameterValue::Int(1), ParameterValue::Int(2)];
        let fixed = space.canonicalize(&raw).unwrap();
        assert_eq!(fixed[0], ParameterValue::Float(1.0));
        assert_eq!(fixed[1], ParameterValue::Categorical(json!(2)));
    }

    #[test]
    fn canonicalize_rejects_out_of_range() {
        let space = SearchSpace::new().add_int("num_topics", 5, 50);
        let err = space.canonicalize(&[ParameterValue::Int(51)]).unwrap_err();
        assert!(err.contains("num_topics"));
        assert!(space.canonicalize(&[]).is_err());
    }

    #[test]
    fn validate_rejects_bad_dimensions() {
        assert_eq!(SearchSpace::new().validate(), Err(ConfigError::EmptySearchSpace));
        let inverted = SearchSpace::new().add_int("k", 10, 1);
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidDimension { .. })
        ));
        let bad_log = SearchSpace::new().add_log_real("lr", 0.0, 1.0);
        assert!(bad_log.validate().is_err());
        let empty_choice = SearchSpace::new().add_categorical("c", vec![]);
        assert!(empty_choice.validate().is_err());
    }

    #[test]
    fn serializes_with_kind_tags() {
        let space = SearchSpace::new().add_int("num_topics", 5, 50);
        let json = serde_json::to_value(&space).unwrap();
        assert_eq!(
            json,
            json!({"num_topics": {"kind": "integer", "low": 5, "high": 50, "log_scale": false}})
        );
        let back: SearchSpace = serde_json::from_value(json).unwrap();
        assert_eq!(back, space);
    }
}
