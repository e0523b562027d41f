//! Configuration checks run before any evaluation, and the output layout
//! they prepare.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tracing::error;
use tt_types::{ConfigError, TuneResult};

use crate::config::OptimizerConfig;

/// Directory for per-run model outputs, below the save path.
pub const MODELS_DIR: &str = "models";

/// Check configuration invariants and normalize file-name options.
///
/// Identifier options are already typed here; unknown spellings are rejected
/// when parsing (see [`OptimizerConfig::from_options`]).
pub fn validate(config: &mut OptimizerConfig) -> Result<(), ConfigError> {
    config.search_space.validate()?;

    if config.number_of_call == 0 {
        return Err(ConfigError::NonPositiveBudget);
    }
    if config.number_of_call <= config.x0.len() {
        return Err(ConfigError::BudgetBelowSeeds {
            number_of_call: config.number_of_call,
            seeds: config.x0.len(),
        });
    }
    for (field, value) in [
        ("model_runs", config.model_runs),
        ("save_step", config.save_step),
        ("early_step", config.early_step),
    ] {
        if value == 0 {
            return Err(ConfigError::OutOfRange {
                field: field.to_string(),
                min: 1,
                value: 0,
            });
        }
    }

    if !config.y0.is_empty() && config.y0.len() != config.x0.len() {
        return Err(ConfigError::SeedLengthMismatch {
            x0: config.x0.len(),
            y0: config.y0.len(),
        });
    }
    if let Some(index) = config.y0.iter().position(|y| !y.is_finite()) {
        return Err(ConfigError::InvalidSeedPoint {
            index,
            message: "y0 value is not finite".into(),
        });
    }
    let mut seeds = Vec::with_capacity(config.x0.len());
    for (index, point) in config.x0.iter().enumerate() {
        let point = config
            .search_space
            .canonicalize(point)
            .map_err(|message| ConfigError::InvalidSeedPoint { index, message })?;
        seeds.push(point);
    }
    config.x0 = seeds;

    normalize_names(config);
    Ok(())
}

fn normalize_names(config: &mut OptimizerConfig) {
    if let Some(stem) = config.save_name.strip_suffix(".json") {
        config.save_name = stem.to_string();
    }
    if let Some(stem) = config.plot_name.strip_suffix(".png") {
        config.plot_name = stem.to_string();
    }
    if config.save_path.is_empty() {
        config.save_path = format!(".{MAIN_SEPARATOR}");
    }
    if !config.save_path.ends_with(['/', MAIN_SEPARATOR]) {
        config.save_path.push(MAIN_SEPARATOR);
    }
}

/// Reject metric names used more than once; each name keys its own history.
pub fn check_metric_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateMetric {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Where per-run model outputs go.
pub fn models_dir(config: &OptimizerConfig) -> PathBuf {
    Path::new(&config.save_path).join(MODELS_DIR)
}

/// Create the output directory, and the models directory when enabled.
pub fn prepare_output(config: &OptimizerConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.save_path)?;
    if config.save_models {
        std::fs::create_dir_all(models_dir(config))?;
    }
    Ok(())
}

/// Validate, then prepare the output layout. Failures are logged before
/// being returned so a run never starts from an invalid configuration.
pub fn check_parameters(config: &mut OptimizerConfig) -> TuneResult<()> {
    if let Err(e) = validate(config) {
        error!("Wrong initialization of optimizer parameters: {}", e);
        return Err(e.into());
    }
    prepare_output(config).map_err(|e| {
        error!("Cannot create output directory {}: {}", config.save_path, e);
        e.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tt_types::{ParameterValue, SearchSpace};

    fn config() -> OptimizerConfig {
        OptimizerConfig::new(SearchSpace::new().add_int("num_topics", 5, 50))
    }

    #[test]
    fn budget_must_exceed_seed_count() {
        let mut cfg = config()
            .with_number_of_call(1)
            .with_seed_points(vec![vec![ParameterValue::Int(10)]], vec![]);
        assert_eq!(
            validate(&mut cfg),
            Err(ConfigError::BudgetBelowSeeds {
                number_of_call: 1,
                seeds: 1
            })
        );

        let mut zero = config().with_number_of_call(0);
        assert_eq!(validate(&mut zero), Err(ConfigError::NonPositiveBudget));

        let mut ok = config()
            .with_number_of_call(2)
            .with_seed_points(vec![vec![ParameterValue::Int(10)]], vec![]);
        assert!(validate(&mut ok).is_ok());
    }

    #[test]
    fn counts_must_be_positive() {
        let mut cfg = config().with_model_runs(0);
        assert!(matches!(
            validate(&mut cfg),
            Err(ConfigError::OutOfRange { ref field, .. }) if field == "model_runs"
        ));
        let mut cfg = config();
        cfg.save_step = 0;
        assert!(validate(&mut cfg).is_err());
    }

    #[test]
    fn seed_lengths_must_agree() {
        let mut cfg = config().with_number_of_call(5).with_seed_points(
            vec![vec![ParameterValue::Int(10)], vec![ParameterValue::Int(20)]],
            vec![0.4],
        );
        assert_eq!(
            validate(&mut cfg),
            Err(ConfigError::SeedLengthMismatch { x0: 2, y0: 1 })
        );
    }

    #[test]
    fn seed_points_must_lie_in_space() {
        let mut cfg = config()
            .with_number_of_call(5)
            .with_seed_points(vec![vec![ParameterValue::Int(500)]], vec![]);
        assert!(matches!(
            validate(&mut cfg),
            Err(ConfigError::InvalidSeedPoint { index: 0, .. })
        ));
    }

    #[test]
    fn seed_points_are_canonicalized() {
        let mut cfg = OptimizerConfig::new(SearchSpace::new().add_real("alpha", 0.0, 1.0))
            .with_seed_points(vec![vec![ParameterValue::Int(1)]], vec![]);
        validate(&mut cfg).unwrap();
        assert_eq!(cfg.x0, vec![vec![ParameterValue::Float(1.0)]]);
    }

    #[test]
    fn names_are_normalized() {
        let mut cfg = config().with_save("out", "result.json", 1);
        cfg.plot_name = "plot.png".into();
        validate(&mut cfg).unwrap();
        assert_eq!(cfg.save_name, "result");
        assert_eq!(cfg.plot_name, "plot");
        assert!(cfg.save_path.starts_with("out"));
        assert!(cfg.save_path.ends_with(['/', MAIN_SEPARATOR]));
    }

    #[test]
    fn metric_names_must_be_unique() {
        assert!(check_metric_names(["Coherence", "TopicDiversity"]).is_ok());
        assert_eq!(
            check_metric_names(["TopicDiversity", "Coherence", "TopicDiversity"]),
            Err(ConfigError::DuplicateMetric {
                name: "TopicDiversity".into()
            })
        );
    }

    #[test]
    fn check_parameters_creates_directories() {
        let dir = tempdir().unwrap();
        let save_path = dir.path().join("bo").to_string_lossy().into_owned();
        let mut cfg = config().with_save(save_path, "result", 1).with_save_models(true);
        check_parameters(&mut cfg).unwrap();
        assert!(dir.path().join("bo").is_dir());
        assert!(dir.path().join("bo").join(MODELS_DIR).is_dir());
    }

    #[test]
    fn check_parameters_fails_before_touching_disk() {
        let dir = tempdir().unwrap();
        let save_path = dir.path().join("never").to_string_lossy().into_owned();
        let mut cfg = config().with_save(save_path, "result", 1).with_number_of_call(0);
        assert!(check_parameters(&mut cfg).is_err());
        assert!(!dir.path().join("never").exists());
    }
}
