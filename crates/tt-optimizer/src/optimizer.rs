//! The ask/tell optimization loop, checkpointing and restart.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tt_types::{
    Candidate, Dataset, Metric, ParameterValue, RestartError, SearchSpace, TopicModel, TuneResult,
};
use uuid::Uuid;

use crate::backend::{
    BackendFactory, BackendSpec, DefaultBackendFactory, SurrogateBackend, DEFAULT_INITIAL_POINTS,
};
use crate::checkpoint::{self, BestEvaluation, Checkpoint, RestartOptions, FORMAT_VERSION};
use crate::config::OptimizerConfig;
use crate::early_stop::early_condition;
use crate::harness::EvaluationHarness;
use crate::history::RunHistory;
use crate::state::OptimizationState;
use crate::validate::{check_metric_names, check_parameters, models_dir};

/// Sequential model-based hyperparameter search over one model, dataset and
/// metric.
pub struct Optimizer {
    config: OptimizerConfig,
    harness: EvaluationHarness,
    state: OptimizationState,
    backend_factory: Box<dyn BackendFactory>,
    run_id: Uuid,
}

impl Optimizer {
    /// Validate `config` and prepare the output directory. Nothing is trained
    /// until [`Optimizer::optimize`] runs.
    pub fn new(
        model: Box<dyn TopicModel>,
        dataset: Dataset,
        metric: Box<dyn Metric>,
        mut config: OptimizerConfig,
    ) -> TuneResult<Self> {
        check_parameters(&mut config)?;
        let mut history = RunHistory::new();
        history.register(metric.name());
        let harness = build_harness(model, dataset, metric, &config);
        let state = OptimizationState::new(config.number_of_call, history);
        Ok(Self {
            config,
            harness,
            state,
            backend_factory: Box::new(DefaultBackendFactory),
            run_id: Uuid::new_v4(),
        })
    }

    /// Metrics scored and recorded on every run without being optimized.
    /// Their names must differ from each other and from the primary metric.
    pub fn with_extra_metrics(
        mut self,
        extra_metrics: Vec<Box<dyn Metric>>,
    ) -> TuneResult<Self> {
        ensure_distinct_metrics(self.harness.metric(), &extra_metrics)?;
        let completed = self.state.completed();
        for metric in &extra_metrics {
            if !self.state.history.contains(metric.name()) {
                self.state.history.register(metric.name());
                self.state.history.backfill(metric.name(), completed);
            }
        }
        self.harness = self.harness.with_extra_metrics(extra_metrics);
        Ok(self)
    }

    pub fn with_backend_factory(mut self, factory: Box<dyn BackendFactory>) -> Self {
        self.backend_factory = factory;
        self
    }

    /// Resume a checkpointed run for `number_of_call_additional` more
    /// iterations. Every field of `options` left `None` is taken from the
    /// checkpoint; the metrics are rebuilt through the registry and the
    /// dataset reloaded from its recorded path.
    pub fn restart(
        checkpoint: &Checkpoint,
        number_of_call_additional: usize,
        model: Box<dyn TopicModel>,
        options: RestartOptions,
    ) -> TuneResult<Self> {
        let RestartOptions {
            optimization_type,
            surrogate_model,
            acq_func,
            kernel,
            initial_point_generator,
            random_state,
            n_random_starts,
            model_runs,
            save_models,
            save_step,
            save_name,
            save_path,
            early_stop,
            early_step,
            plot_model,
            plot_best_seen,
            plot_name,
            log_scale_plot,
            parallel_model_runs,
            output,
            metric,
            extra_metrics,
            dataset,
            registry,
            backend_factory,
        } = options;

        let times: Vec<f64> = checkpoint.require("times")?;
        let f_val: Vec<f64> = checkpoint.require("f_val")?;
        let previous_calls = times.len();
        if f_val.len() != previous_calls {
            return Err(RestartError::LengthMismatch {
                x_iters: previous_calls,
                func_vals: f_val.len(),
            }
            .into());
        }

        let search_space: SearchSpace = checkpoint.require("search_space")?;
        let random_state = match random_state {
            Some(seed) => Some(seed),
            None => checkpoint.require("random_state")?,
        };
        let mut config = OptimizerConfig {
            number_of_call: previous_calls + number_of_call_additional,
            n_random_starts: checkpoint.resolve(n_random_starts, "n_random_starts")?,
            initial_point_generator: checkpoint
                .resolve(initial_point_generator, "initial_point_generator")?,
            optimization_type: checkpoint.resolve(optimization_type, "optimization_type")?,
            model_runs: checkpoint.resolve(model_runs, "model_runs")?,
            surrogate_model: checkpoint.resolve(surrogate_model, "surrogate_model")?,
            kernel: checkpoint.resolve(kernel, "kernel")?,
            acq_func: checkpoint.resolve(acq_func, "acq_func")?,
            random_state,
            x0: checkpoint.field("x0")?.unwrap_or_default(),
            y0: checkpoint.field("y0")?.unwrap_or_default(),
            save_models: checkpoint.resolve(save_models, "save_models")?,
            save_step: checkpoint.resolve(save_step, "save_step")?,
            save_name: checkpoint.resolve(save_name, "save_name")?,
            save_path: checkpoint.resolve(save_path, "save_path")?,
            early_stop: checkpoint.resolve(early_stop, "early_stop")?,
            early_step: checkpoint.resolve(early_step, "early_step")?,
            plot_best_seen: checkpoint.resolve(plot_best_seen, "plot_best_seen")?,
            plot_model: checkpoint.resolve(plot_model, "plot_model")?,
            plot_name: checkpoint.resolve(plot_name, "plot_name")?,
            log_scale_plot: checkpoint.resolve(log_scale_plot, "log_scale_plot")?,
            parallel_model_runs: match parallel_model_runs {
                Some(parallel) => parallel,
                None => checkpoint.field("parallel_model_runs")?.unwrap_or(false),
            },
            output: match output {
                Some(output) => output,
                None => checkpoint.field("output")?.unwrap_or_default(),
            },
            search_space,
        };
        check_parameters(&mut config)?;

        let x_iters = replay_candidates(checkpoint, &config.search_space, previous_calls)?;

        let metric = match metric {
            Some(metric) => metric,
            None => {
                let name: String = checkpoint.require("metric_name")?;
                let attributes = checkpoint
                    .field("metric_attributes")?
                    .unwrap_or(serde_json::Value::Null);
                registry.build(&name, &attributes)?
            }
        };
        let extra_metrics = match extra_metrics {
            Some(extra_metrics) => extra_metrics,
            None => {
                let names: Vec<String> =
                    checkpoint.field("extra_metric_names")?.unwrap_or_default();
                let attributes: Vec<serde_json::Value> = checkpoint
                    .field("extra_metric_attributes")?
                    .unwrap_or_default();
                names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let attrs = attributes.get(i).unwrap_or(&serde_json::Value::Null);
                        registry.build(name, attrs)
                    })
                    .collect::<TuneResult<Vec<_>>>()?
            }
        };
        ensure_distinct_metrics(metric.as_ref(), &extra_metrics)?;
        let dataset = match dataset {
            Some(dataset) => dataset,
            None => {
                let path: Option<String> = checkpoint.require("dataset_path")?;
                let path = path.ok_or_else(|| RestartError::MissingField {
                    field: "dataset_path".into(),
                })?;
                Dataset::load(path)?
            }
        };

        let mut history: RunHistory = checkpoint.require("dict_model_runs")?;
        history.register(metric.name());
        history.backfill(metric.name(), previous_calls);
        for extra in &extra_metrics {
            if !history.contains(extra.name()) {
                debug!(metric = extra.name(), "Back-filling history for new metric");
            }
            history.register(extra.name());
            history.backfill(extra.name(), previous_calls);
        }

        let mut state = OptimizationState::new(config.number_of_call, history);
        for ((candidate, raw), seconds) in x_iters.into_iter().zip(f_val).zip(times) {
            state.record(candidate, config.optimization_type.to_signed(raw), seconds);
        }

        let run_id = match checkpoint.field::<Uuid>("run_id")? {
            Some(id) => id,
            None => Uuid::new_v4(),
        };
        info!(
            previous_calls,
            number_of_call = config.number_of_call,
            "Restarting optimization from checkpoint"
        );

        let harness = build_harness(model, dataset, metric, &config).with_extra_metrics(extra_metrics);
        Ok(Self {
            config,
            harness,
            state,
            backend_factory: backend_factory.unwrap_or_else(|| Box::new(DefaultBackendFactory)),
            run_id,
        })
    }

    /// Run the remaining iterations and return the final report.
    pub fn optimize(&mut self) -> TuneResult<BestEvaluation> {
        info!(
            run_id = %self.run_id,
            model = self.harness.model().name(),
            metric = self.harness.metric().name(),
            surrogate = %self.config.surrogate_model,
            number_of_call = self.state.number_of_call,
            "Starting optimization"
        );

        if let Err(e) = self.run() {
            error!(current_call = self.state.current_call, "Optimization aborted: {}", e);
            self.state.mark_terminated();
            return Err(e);
        }

        let report = self.report();
        match report.f_best {
            Some(best) => info!(
                completed = self.state.completed(),
                best,
                stop_reason = ?self.state.stop_reason,
                "Optimization finished"
            ),
            None => warn!("Optimization finished without any evaluation"),
        }
        self.state.mark_terminated();
        Ok(report)
    }

    fn run(&mut self) -> TuneResult<()> {
        let mut backend = self.backend_factory.build(&self.backend_spec())?;
        for (candidate, value) in self.state.x_iters.iter().zip(&self.state.func_vals) {
            backend.tell(candidate.clone(), *value)?;
        }
        debug!(
            backend = backend.name(),
            replayed = self.state.completed(),
            "Surrogate ready"
        );

        self.state.mark_running();
        let seeds = self.config.x0.len();
        let mut stopped_early = false;
        for i in self.state.current_call..self.state.number_of_call {
            info!(current_call = i, "Current call");
            let start = Instant::now();
            let (candidate, signed) = self.next_evaluation(i, backend.as_mut())?;
            backend.tell(candidate.clone(), signed)?;
            self.state
                .record(candidate, signed, start.elapsed().as_secs_f64());

            if i % self.config.save_step == 0 {
                self.save()?;
            }
            if self.config.early_stop
                && i >= seeds
                && early_condition(
                    &self.state.func_vals,
                    self.config.early_step,
                    self.config.n_random_starts,
                )
            {
                info!(
                    current_call = i,
                    early_step = self.config.early_step,
                    "No improvement in the last iterations, stopping early"
                );
                stopped_early = true;
                break;
            }
        }

        if stopped_early {
            self.state.mark_early_stopped();
        } else {
            self.state.mark_budget_exhausted();
        }
        self.save()
    }

    /// Candidate and signed objective value for iteration `i`.
    fn next_evaluation(
        &mut self,
        i: usize,
        backend: &mut dyn SurrogateBackend,
    ) -> TuneResult<(Candidate, f64)> {
        let Some(seed) = self.config.x0.get(i).cloned() else {
            let candidate = backend.ask()?;
            let evaluation = self
                .harness
                .evaluate(&candidate, i, &mut self.state.history)?;
            return Ok((evaluation.candidate, evaluation.signed));
        };

        match self.config.y0.get(i).copied() {
            Some(known) => {
                debug!(iteration = i, score = known, "Reusing known score for seed point");
                self.state
                    .history
                    .record(self.harness.metric().name(), i, vec![known])?;
                for extra in self.harness.extra_metrics() {
                    self.state.history.record(extra.name(), i, Vec::new())?;
                }
                Ok((seed, self.config.optimization_type.to_signed(known)))
            }
            None => {
                let evaluation = self.harness.evaluate(&seed, i, &mut self.state.history)?;
                Ok((seed, evaluation.signed))
            }
        }
    }

    fn backend_spec(&self) -> BackendSpec {
        let n_initial_points = if self.config.n_random_starts > 0 {
            self.config.n_random_starts
        } else {
            DEFAULT_INITIAL_POINTS
        };
        BackendSpec {
            surrogate_model: self.config.surrogate_model,
            kernel: self.config.kernel.clone(),
            acq_func: self.config.acq_func,
            random_state: self.config.random_state,
            initial_point_generator: self.config.initial_point_generator,
            n_initial_points: n_initial_points.min(self.config.number_of_call),
            space: self.config.search_space.clone(),
        }
    }

    /// Where checkpoints are written.
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(&self.config.save_path).join(format!("{}.json", self.config.save_name))
    }

    /// Persist the current state.
    pub fn save(&self) -> TuneResult<()> {
        let path = self.checkpoint_path();
        checkpoint::save(&self.report(), &path)?;
        debug!(
            path = %path.display(),
            current_call = self.state.current_call,
            "Checkpoint written"
        );
        Ok(())
    }

    /// Snapshot of the run as a checkpoint document.
    pub fn report(&self) -> BestEvaluation {
        let direction = self.config.optimization_type;
        let hyperparameters = self.config.search_space.names();
        let x_iters: BTreeMap<String, Vec<ParameterValue>> = hyperparameters
            .iter()
            .enumerate()
            .map(|(k, name)| {
                let values = self.state.x_iters.iter().map(|c| c[k].clone()).collect();
                (name.clone(), values)
            })
            .collect();
        let (x_best, f_best) = match self.state.best() {
            Some((candidate, value)) => (
                Some(self.config.search_space.to_named(candidate)),
                Some(direction.from_signed(value)),
            ),
            None => (None, None),
        };
        let metric = self.harness.metric();
        let extras = self.harness.extra_metrics();
        let dataset = self.harness.dataset();

        BestEvaluation {
            format_version: FORMAT_VERSION,
            run_id: self.run_id,
            saved_at: Utc::now(),
            current_call: self.state.current_call,
            hyperparameters,
            x_iters,
            func_vals: self.state.func_vals.clone(),
            f_val: self
                .state
                .func_vals
                .iter()
                .map(|v| direction.from_signed(*v))
                .collect(),
            x_best,
            f_best,
            times: self.state.times.clone(),
            dict_model_runs: self.state.history.clone(),
            stop_reason: self.state.stop_reason,
            model_name: self.harness.model().name().to_string(),
            dataset_name: dataset.name.clone(),
            dataset_path: dataset
                .path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            metric_name: metric.name().to_string(),
            metric_attributes: metric.attributes(),
            extra_metric_names: extras.iter().map(|m| m.name().to_string()).collect(),
            extra_metric_attributes: extras.iter().map(|m| m.attributes()).collect(),
            config: self.config.clone(),
        }
    }

    pub fn state(&self) -> &OptimizationState {
        &self.state
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn history(&self) -> &RunHistory {
        &self.state.history
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

fn ensure_distinct_metrics(
    metric: &dyn Metric,
    extra_metrics: &[Box<dyn Metric>],
) -> TuneResult<()> {
    let names = std::iter::once(metric.name()).chain(extra_metrics.iter().map(|m| m.name()));
    if let Err(e) = check_metric_names(names) {
        error!("Wrong metric configuration: {}", e);
        return Err(e.into());
    }
    Ok(())
}

fn build_harness(
    model: Box<dyn TopicModel>,
    dataset: Dataset,
    metric: Box<dyn Metric>,
    config: &OptimizerConfig,
) -> EvaluationHarness {
    EvaluationHarness::new(
        model,
        dataset,
        metric,
        config.search_space.clone(),
        config.optimization_type,
        config.model_runs,
    )
    .with_output(config.output)
    .with_models_dir(config.save_models.then(|| models_dir(config)))
    .with_parallel_runs(config.parallel_model_runs)
}

/// Rebuild the evaluated candidates from the per-name columns of `x_iters`.
fn replay_candidates(
    checkpoint: &Checkpoint,
    space: &SearchSpace,
    previous_calls: usize,
) -> TuneResult<Vec<Candidate>> {
    let columns: BTreeMap<String, Vec<ParameterValue>> = checkpoint.require("x_iters")?;
    let names = space.names();
    let mut ordered = Vec::with_capacity(names.len());
    for name in &names {
        let column = columns.get(name).ok_or_else(|| RestartError::MalformedField {
            field: "x_iters".into(),
            message: format!("no values for hyperparameter {name}"),
        })?;
        if column.len() != previous_calls {
            return Err(RestartError::LengthMismatch {
                x_iters: column.len(),
                func_vals: previous_calls,
            }
            .into());
        }
        ordered.push(column);
    }

    (0..previous_calls)
        .map(|i| {
            let candidate: Candidate = ordered.iter().map(|column| column[i].clone()).collect();
            space.canonicalize(&candidate).map_err(|message| {
                RestartError::MalformedField {
                    field: "x_iters".into(),
                    message: format!("iteration {i}: {message}"),
                }
                .into()
            })
        })
        .collect()
}
