//! Objective function: turns repeated model training and scoring into one
//! signed scalar.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;
use tt_types::{
    internal_error, Candidate, Dataset, Metric, ModelOutput, OptimizationType, OutputOptions,
    SearchSpace, TopicModel, TuneError, TuneResult,
};

use crate::history::{iteration_key, RunHistory};
use crate::validate::check_metric_names;

/// Result of evaluating one candidate `model_runs` times.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub candidate: Candidate,
    /// Raw primary scores, one per run.
    pub scores: Vec<f64>,
    /// Raw extra-metric scores, keyed by metric name.
    pub extra_scores: BTreeMap<String, Vec<f64>>,
    /// Median of `scores`, negated when maximizing.
    pub signed: f64,
    pub duration: Duration,
}

/// Raw scores of a single model run.
struct RunScores {
    primary: f64,
    extras: Vec<f64>,
}

/// Owns the model, dataset and metrics a search evaluates against.
pub struct EvaluationHarness {
    model: Box<dyn TopicModel>,
    dataset: Dataset,
    metric: Box<dyn Metric>,
    extra_metrics: Vec<Box<dyn Metric>>,
    space: SearchSpace,
    optimization_type: OptimizationType,
    model_runs: usize,
    output: OutputOptions,
    models_dir: Option<PathBuf>,
    parallel: bool,
}

impl EvaluationHarness {
    pub fn new(
        model: Box<dyn TopicModel>,
        dataset: Dataset,
        metric: Box<dyn Metric>,
        space: SearchSpace,
        optimization_type: OptimizationType,
        model_runs: usize,
    ) -> Self {
        Self {
            model,
            dataset,
            metric,
            extra_metrics: Vec::new(),
            space,
            optimization_type,
            model_runs,
            output: OutputOptions::default(),
            models_dir: None,
            parallel: false,
        }
    }

    pub fn with_extra_metrics(mut self, extra_metrics: Vec<Box<dyn Metric>>) -> Self {
        self.extra_metrics = extra_metrics;
        self
    }

    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    /// Persist every run's output as `<dir>/<iteration>_<run>.json`.
    pub fn with_models_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.models_dir = dir;
        self
    }

    pub fn with_parallel_runs(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn model(&self) -> &dyn TopicModel {
        self.model.as_ref()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn metric(&self) -> &dyn Metric {
        self.metric.as_ref()
    }

    pub fn extra_metrics(&self) -> &[Box<dyn Metric>] {
        &self.extra_metrics
    }

    /// Primary metric name followed by the extra metric names.
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.metric.name()).chain(self.extra_metrics.iter().map(|m| m.name()))
    }

    /// Every metric must be distinct and have exactly `iteration` entries so
    /// the scores can be appended once training is done.
    fn check_history(&self, iteration: usize, history: &RunHistory) -> TuneResult<()> {
        check_metric_names(self.metric_names())?;
        for name in self.metric_names() {
            let recorded = history.iterations(name);
            if recorded != iteration {
                return Err(internal_error!(
                    "history for {} is at {}, cannot evaluate {}",
                    name,
                    iteration_key(recorded),
                    iteration_key(iteration)
                ));
            }
        }
        Ok(())
    }

    /// Evaluate `candidate` as iteration `iteration`, appending the raw scores
    /// to `history`. A failing run aborts the whole evaluation. Nothing is
    /// trained unless `iteration` is the next one for every metric.
    pub fn evaluate(
        &self,
        candidate: &Candidate,
        iteration: usize,
        history: &mut RunHistory,
    ) -> TuneResult<Evaluation> {
        self.check_history(iteration, history)?;
        let start = Instant::now();
        let runs: Vec<RunScores> = if self.parallel {
            (0..self.model_runs)
                .into_par_iter()
                .map(|run| self.run_once(candidate, iteration, run))
                .collect::<TuneResult<_>>()?
        } else {
            (0..self.model_runs)
                .map(|run| self.run_once(candidate, iteration, run))
                .collect::<TuneResult<_>>()?
        };

        let scores: Vec<f64> = runs.iter().map(|r| r.primary).collect();
        let aggregate = median(&scores);
        if aggregate.is_nan() {
            return Err(TuneError::NumericDegeneracy {
                iteration,
                metric: self.metric.name().to_string(),
            });
        }

        let extra_scores: BTreeMap<String, Vec<f64>> = self
            .extra_metrics
            .iter()
            .enumerate()
            .map(|(j, metric)| {
                let values = runs.iter().map(|r| r.extras[j]).collect();
                (metric.name().to_string(), values)
            })
            .collect();

        history.record(self.metric.name(), iteration, scores.clone())?;
        for (name, values) in &extra_scores {
            history.record(name, iteration, values.clone())?;
        }

        let signed = self.optimization_type.to_signed(aggregate);
        debug!(iteration, median = aggregate, signed, "Evaluated candidate");
        Ok(Evaluation {
            candidate: candidate.clone(),
            scores,
            extra_scores,
            signed,
            duration: start.elapsed(),
        })
    }

    fn run_once(&self, candidate: &Candidate, iteration: usize, run: usize) -> TuneResult<RunScores> {
        let failed = |e: anyhow::Error| TuneError::Evaluation {
            iteration,
            message: format!("run {run}: {e:#}"),
        };
        let params = self.space.to_named(candidate);
        let output: ModelOutput = self
            .model
            .train_model(&self.dataset, &params, &self.output)
            .map_err(failed)?;

        let primary = self.metric.score(&output).map_err(failed)?;
        let extras = self
            .extra_metrics
            .iter()
            .map(|metric| metric.score(&output))
            .collect::<anyhow::Result<Vec<f64>>>()
            .map_err(failed)?;

        if let Some(dir) = &self.models_dir {
            output.save(dir.join(format!("{iteration}_{run}.json")))?;
        }
        Ok(RunScores { primary, extras })
    }
}

/// Median of `values`; NaN if any value is NaN or `values` is empty.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
