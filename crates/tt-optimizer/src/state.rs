//! Loop state: counters, evaluated candidates, objective values and timings.

use serde::{Deserialize, Serialize};
use tt_types::Candidate;

use crate::history::RunHistory;

/// Lifecycle of one optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopStatus {
    Initializing,
    Running,
    EarlyStopped,
    BudgetExhausted,
    Terminated,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    EarlyStopped,
    BudgetExhausted,
}

/// Everything the loop mutates; the sole authority for resuming a search.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationState {
    /// Next iteration index to run; equals the number of completed iterations.
    pub current_call: usize,
    /// Total evaluation budget, including completed iterations.
    pub number_of_call: usize,
    pub x_iters: Vec<Candidate>,
    /// Aggregated objective values, always in minimize convention.
    pub func_vals: Vec<f64>,
    /// Wall-clock seconds per iteration.
    pub times: Vec<f64>,
    pub history: RunHistory,
    pub status: LoopStatus,
    pub stop_reason: Option<StopReason>,
}

impl OptimizationState {
    pub fn new(number_of_call: usize, history: RunHistory) -> Self {
        Self {
            current_call: 0,
            number_of_call,
            x_iters: Vec::new(),
            func_vals: Vec::new(),
            times: Vec::new(),
            history,
            status: LoopStatus::Initializing,
            stop_reason: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = LoopStatus::Running;
        self.stop_reason = None;
    }

    pub fn mark_early_stopped(&mut self) {
        self.status = LoopStatus::EarlyStopped;
        self.stop_reason = Some(StopReason::EarlyStopped);
    }

    pub fn mark_budget_exhausted(&mut self) {
        self.status = LoopStatus::BudgetExhausted;
        self.stop_reason = Some(StopReason::BudgetExhausted);
    }

    pub fn mark_terminated(&mut self) {
        self.status = LoopStatus::Terminated;
    }

    /// Record one completed iteration and advance the call counter.
    pub fn record(&mut self, candidate: Candidate, signed_value: f64, seconds: f64) {
        self.x_iters.push(candidate);
        self.func_vals.push(signed_value);
        self.times.push(seconds);
        self.current_call += 1;
    }

    pub fn completed(&self) -> usize {
        self.func_vals.len()
    }

    /// Index of the first minimum of `func_vals`.
    pub fn best_index(&self) -> Option<usize> {
        self.func_vals
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// Best candidate and its signed value.
    pub fn best(&self) -> Option<(&Candidate, f64)> {
        self.best_index()
            .map(|i| (&self.x_iters[i], self.func_vals[i]))
    }
}
