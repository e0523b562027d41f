//! # tt-optimizer
//!
//! Hyperparameter tuning for topic models with sequential model-based
//! optimization.
//!
//! Provides the optimizer configuration and its validation, the evaluation
//! harness that repeats and aggregates model runs, surrogate backends behind
//! an ask/tell interface, early stopping, and checkpoint/restart.

mod backend;
mod checkpoint;
mod config;
mod early_stop;
mod harness;
mod history;
mod metrics;
mod optimizer;
mod sampling;
mod state;
mod validate;

#[cfg(test)]
mod test_support;

pub use backend::{
    BackendFactory, BackendSpec, DefaultBackendFactory, LocalSearchBackend, RandomBackend,
    SurrogateBackend, TellResult, DEFAULT_INITIAL_POINTS,
};
pub use checkpoint::{save as save_checkpoint, BestEvaluation, Checkpoint, RestartOptions, FORMAT_VERSION};
pub use config::OptimizerConfig;
pub use early_stop::early_condition;
pub use harness::{median, Evaluation, EvaluationHarness};
pub use history::{iteration_key, RunHistory};
pub use metrics::{MetricRegistry, TopicDiversity};
pub use optimizer::Optimizer;
pub use sampling::generate;
pub use state::{LoopStatus, OptimizationState, StopReason};
pub use validate::{
    check_metric_names, check_parameters, models_dir, prepare_output, validate, MODELS_DIR,
};
