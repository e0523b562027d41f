//! Optimizer configuration: typed struct, builder methods and the flat
//! named-option surface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tt_types::{
    invalid_option, AcquisitionFunction, Candidate, ConfigError, InitialPointGenerator, Kernel,
    OptimizationType, OutputOptions, SearchSpace, SurrogateModel,
};

/// Top-level configuration for an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// The hyperparameter search space.
    pub search_space: SearchSpace,

    /// Evaluation budget.
    pub number_of_call: usize,

    /// Evaluations spent on the initial design before the surrogate is trusted.
    pub n_random_starts: usize,

    pub initial_point_generator: InitialPointGenerator,

    pub optimization_type: OptimizationType,

    /// Independent trainings per candidate, aggregated by median.
    pub model_runs: usize,

    pub surrogate_model: SurrogateModel,

    pub kernel: Kernel,

    pub acq_func: AcquisitionFunction,

    /// Seed for reproducible runs.
    pub random_state: Option<u64>,

    /// Seed points evaluated before the surrogate is queried.
    pub x0: Vec<Candidate>,

    /// Known scores for `x0`, in the user's direction. Empty or `x0.len()` long.
    pub y0: Vec<f64>,

    /// Persist every model output under `<save_path>/models/`.
    pub save_models: bool,

    /// Checkpoint every `save_step` iterations.
    pub save_step: usize,

    pub save_name: String,

    pub save_path: String,

    pub early_stop: bool,

    /// Non-improving iterations tolerated before stopping.
    pub early_step: usize,

    pub plot_best_seen: bool,

    pub plot_model: bool,

    pub plot_name: String,

    pub log_scale_plot: bool,

    /// Run the repeated model trainings of one candidate in parallel.
    pub parallel_model_runs: bool,

    pub output: OutputOptions,
}

impl OptimizerConfig {
    pub fn new(search_space: SearchSpace) -> Self {
        Self {
            search_space,
            number_of_call: 5,
            n_random_starts: 0,
            initial_point_generator: InitialPointGenerator::Lhs,
            optimization_type: OptimizationType::Maximize,
            model_runs: 5,
            surrogate_model: SurrogateModel::RF,
            kernel: Kernel::default(),
            acq_func: AcquisitionFunction::LCB,
            random_state: None,
            x0: Vec::new(),
            y0: Vec::new(),
            save_models: false,
            save_step: 1,
            save_name: "result".to_string(),
            save_path: "results/".to_string(),
            early_stop: false,
            early_step: 5,
            plot_best_seen: false,
            plot_model: false,
            plot_name: "B0_plot".to_string(),
            log_scale_plot: false,
            parallel_model_runs: false,
            output: OutputOptions::default(),
        }
    }

    pub fn with_number_of_call(mut self, n: usize) -> Self {
        self.number_of_call = n;
        self
    }

    pub fn with_model_runs(mut self, n: usize) -> Self {
        self.model_runs = n;
        self
    }

    pub fn with_optimization_type(mut self, optimization_type: OptimizationType) -> Self {
        self.optimization_type = optimization_type;
        self
    }

    pub fn with_surrogate(
        mut self,
        surrogate_model: SurrogateModel,
        acq_func: AcquisitionFunction,
    ) -> Self {
        self.surrogate_model = surrogate_model;
        self.acq_func = acq_func;
        self
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_initial_points(
        mut self,
        generator: InitialPointGenerator,
        n_random_starts: usize,
    ) -> Self {
        self.initial_point_generator = generator;
        self.n_random_starts = n_random_starts;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_seed_points(mut self, x0: Vec<Candidate>, y0: Vec<f64>) -> Self {
        self.x0 = x0;
        self.y0 = y0;
        self
    }

    pub fn with_save(
        mut self,
        save_path: impl Into<String>,
        save_name: impl Into<String>,
        save_step: usize,
    ) -> Self {
        self.save_path = save_path.into();
        self.save_name = save_name.into();
        self.save_step = save_step;
        self
    }

    pub fn with_save_models(mut self, save_models: bool) -> Self {
        self.save_models = save_models;
        self
    }

    pub fn with_early_stop(mut self, early_step: usize) -> Self {
        self.early_stop = true;
        self.early_step = early_step;
        self
    }

    pub fn with_parallel_model_runs(mut self, parallel: bool) -> Self {
        self.parallel_model_runs = parallel;
        self
    }

    /// Build a configuration from flat named options, e.g. a JSON config file.
    ///
    /// Every option is optional except `search_space`; unknown names are
    /// rejected and count options must be JSON integers.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, ConfigError> {
        let search_space = match options.get("search_space") {
            Some(value) => parse_json(value, "search_space")?,
            None => {
                return Err(ConfigError::InvalidOption {
                    name: "search_space".into(),
                    message: "required".into(),
                })
            }
        };
        let mut config = Self::new(search_space);

        for (name, value) in options {
            match name.as_str() {
                "search_space" => {}
                "number_of_call" => {
                    let n = integer(name, value)?;
                    if n <= 0 {
                        return Err(ConfigError::NonPositiveBudget);
                    }
                    config.number_of_call = n as usize;
                }
                "n_random_starts" => config.n_random_starts = count(name, value, 0)?,
                "model_runs" => config.model_runs = count(name, value, 1)?,
                "save_step" => config.save_step = count(name, value, 1)?,
                "early_step" => config.early_step = count(name, value, 1)?,
                "topk" => config.output.top_k = count(name, value, 0)?,
                "initial_point_generator" => {
                    config.initial_point_generator = identifier(name, value)?
                }
                "optimization_type" => config.optimization_type = identifier(name, value)?,
                "surrogate_model" => config.surrogate_model = identifier(name, value)?,
                "acq_func" => config.acq_func = identifier(name, value)?,
                "kernel" => config.kernel = parse_json(value, name)?,
                "random_state" => {
                    config.random_state = match value {
                        // `false` is the conventional "unseeded" spelling.
                        Value::Null | Value::Bool(false) => None,
                        other => Some(count(name, other, 0)? as u64),
                    }
                }
                "x0" => config.x0 = parse_json(value, name)?,
                "y0" => config.y0 = parse_json(value, name)?,
                "save_models" => config.save_models = boolean(name, value)?,
                "save_name" => config.save_name = string(name, value)?,
                "save_path" => config.save_path = string(name, value)?,
                "early_stop" => config.early_stop = boolean(name, value)?,
                "plot_best_seen" => config.plot_best_seen = boolean(name, value)?,
                "plot_model" => config.plot_model = boolean(name, value)?,
                "plot_name" => config.plot_name = string(name, value)?,
                "log_scale_plot" => config.log_scale_plot = boolean(name, value)?,
                "parallel_model_runs" => config.parallel_model_runs = boolean(name, value)?,
                "topic_word_matrix" => config.output.topic_word_matrix = boolean(name, value)?,
                "topic_document_matrix" => {
                    config.output.topic_document_matrix = boolean(name, value)?
                }
                other => {
                    return Err(ConfigError::UnknownOption {
                        name: other.to_string(),
                    })
                }
            }
        }
        Ok(config)
    }
}

fn integer(name: &str, value: &Value) -> Result<i64, ConfigError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| ConfigError::NotAnInteger {
            field: name.to_string(),
            value: n.to_string(),
        }),
        other => Err(ConfigError::NotAnInteger {
            field: name.to_string(),
            value: other.to_string(),
        }),
    }
}

fn count(name: &str, value: &Value, min: i64) -> Result<usize, ConfigError> {
    let n = integer(name, value)?;
    if n < min {
        return Err(ConfigError::OutOfRange {
            field: name.to_string(),
            min,
            value: n,
        });
    }
    Ok(n as usize)
}

fn identifier<T>(name: &str, value: &Value) -> Result<T, ConfigError>
where
    T: FromStr<Err = ConfigError>,
{
    value
        .as_str()
        .ok_or_else(|| invalid_option!(name, "expected a string, got {}", value))?
        .parse()
}

fn boolean(name: &str, value: &Value) -> Result<bool, ConfigError> {
    value
        .as_bool()
        .ok_or_else(|| invalid_option!(name, "expected a boolean, got {}", value))
}

fn string(name: &str, value: &Value) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_option!(name, "expected a string, got {}", value))
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &Value, name: &str) -> Result<T, ConfigError> {
    serde_json::from_value(value.clone()).map_err(|e| invalid_option!(name, "{}", e))
}
