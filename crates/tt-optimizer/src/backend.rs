//! Surrogate backends behind an ask/tell interface, and the factory that
//! builds them from the configured surrogate kind.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use tt_types::{
    AcquisitionFunction, Candidate, InitialPointGenerator, Kernel, SearchSpace, SurrogateModel,
    TuneError, TuneResult,
};

use crate::sampling;

/// Number of initial design points when `n_random_starts` is 0.
pub const DEFAULT_INITIAL_POINTS: usize = 10;

/// Outcome of a `tell`.
#[derive(Debug, Clone, PartialEq)]
pub struct TellResult {
    pub best_value: f64,
    pub best_candidate: Candidate,
    pub func_vals: Vec<f64>,
}

/// Sequential model-based optimizer: proposes candidates and learns from
/// their (minimized) objective values.
pub trait SurrogateBackend: Send {
    /// Propose the next candidate.
    fn ask(&mut self) -> TuneResult<Candidate>;

    /// Record the signed objective value of a candidate.
    fn tell(&mut self, candidate: Candidate, value: f64) -> TuneResult<TellResult>;

    fn x_iters(&self) -> &[Candidate];

    fn func_vals(&self) -> &[f64];

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Everything needed to construct a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    pub surrogate_model: SurrogateModel,
    pub kernel: Kernel,
    pub acq_func: AcquisitionFunction,
    pub random_state: Option<u64>,
    pub initial_point_generator: InitialPointGenerator,
    pub n_initial_points: usize,
    pub space: SearchSpace,
}

/// Builds backends for a [`BackendSpec`].
pub trait BackendFactory: Send + Sync {
    fn build(&self, spec: &BackendSpec) -> TuneResult<Box<dyn SurrogateBackend>>;
}

/// Resolves every [`SurrogateModel`] to one of the built-in backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn build(&self, spec: &BackendSpec) -> TuneResult<Box<dyn SurrogateBackend>> {
        if spec.space.is_empty() {
            return Err(TuneError::Backend("search space is empty".into()));
        }
        debug!(
            surrogate = %spec.surrogate_model,
            acq_func = %spec.acq_func,
            initial_points = spec.n_initial_points,
            "Building surrogate backend"
        );
        Ok(match spec.surrogate_model {
            SurrogateModel::RS => Box::new(RandomBackend::new(spec)),
            SurrogateModel::GP | SurrogateModel::RF | SurrogateModel::ET => {
                Box::new(LocalSearchBackend::new(spec))
            }
        })
    }
}

/// Observations shared by the built-in backends.
#[derive(Debug, Clone)]
struct Observations {
    space: SearchSpace,
    x_iters: Vec<Candidate>,
    func_vals: Vec<f64>,
}

impl Observations {
    fn new(space: SearchSpace) -> Self {
        Self {
            space,
            x_iters: Vec::new(),
            func_vals: Vec::new(),
        }
    }

    fn record(&mut self, candidate: Candidate, value: f64) -> TuneResult<TellResult> {
        if value.is_nan() {
            return Err(TuneError::Backend("objective value is NaN".into()));
        }
        let candidate = self
            .space
            .canonicalize(&candidate)
            .map_err(TuneError::Backend)?;
        self.x_iters.push(candidate);
        self.func_vals.push(value);

        let best = self
            .func_vals
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        Ok(TellResult {
            best_value: self.func_vals[best],
            best_candidate: self.x_iters[best].clone(),
            func_vals: self.func_vals.clone(),
        })
    }

    fn best(&self) -> Option<&Candidate> {
        self.func_vals
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| &self.x_iters[i])
    }
}

/// Fixed initial design plus a per-step random stream.
///
/// The stream for each `ask` is derived from the base seed and the number of
/// observations, so a backend that is replayed the same history proposes the
/// same next candidate.
#[derive(Debug, Clone)]
struct Design {
    seed: u64,
    points: Vec<Vec<f64>>,
}

impl Design {
    fn new(spec: &BackendSpec) -> Self {
        let seed = spec.random_state.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let points = sampling::generate(
            spec.initial_point_generator,
            spec.n_initial_points,
            spec.space.len(),
            &mut rng,
        );
        Self { seed, points }
    }

    fn initial_point(&self, observed: usize) -> Option<&[f64]> {
        self.points.get(observed).map(Vec::as_slice)
    }

    fn rng(&self, observed: usize) -> StdRng {
        let step = (observed as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(self.seed ^ step)
    }
}

fn uniform_point(rng: &mut StdRng, dims: usize) -> Vec<f64> {
    (0..dims).map(|_| rng.random::<f64>()).collect()
}

// ---- Random search ----

/// Initial design followed by independent uniform sampling.
#[derive(Debug, Clone)]
pub struct RandomBackend {
    observations: Observations,
    design: Design,
}

impl RandomBackend {
    pub fn new(spec: &BackendSpec) -> Self {
        Self {
            observations: Observations::new(spec.space.clone()),
            design: Design::new(spec),
        }
    }
}

impl SurrogateBackend for RandomBackend {
    fn ask(&mut self) -> TuneResult<Candidate> {
        let observed = self.observations.func_vals.len();
        let space = &self.observations.space;
        let point = match self.design.initial_point(observed) {
            Some(point) => point.to_vec(),
            None => uniform_point(&mut self.design.rng(observed), space.len()),
        };
        Ok(space.from_unit(&point))
    }

    fn tell(&mut self, candidate: Candidate, value: f64) -> TuneResult<TellResult> {
        self.observations.record(candidate, value)
    }

    fn x_iters(&self) -> &[Candidate] {
        &self.observations.x_iters
    }

    fn func_vals(&self) -> &[f64] {
        &self.observations.func_vals
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Model-guided local search ----

/// Initial design, then perturbations of the incumbent in unit-cube
/// coordinates. The acquisition function sets the step width (LCB widest,
/// PI narrowest), scaled by the kernel length scale for GP; the surrogate
/// kind sets how often a fresh uniform point is explored instead.
#[derive(Debug, Clone)]
pub struct LocalSearchBackend {
    observations: Observations,
    design: Design,
    step_width: f64,
    exploration_weight: f64,
    name: &'static str,
}

impl LocalSearchBackend {
    const MAX_RESAMPLES: usize = 16;

    pub fn new(spec: &BackendSpec) -> Self {
        let base = match spec.acq_func {
            AcquisitionFunction::LCB => 0.2,
            AcquisitionFunction::EI => 0.1,
            AcquisitionFunction::PI => 0.05,
        };
        let (scale, exploration_weight, name) = match spec.surrogate_model {
            SurrogateModel::GP => (spec.kernel.length_scale().clamp(0.1, 10.0), 0.05, "gp"),
            SurrogateModel::ET => (1.0, 0.2, "extra_trees"),
            _ => (1.0, 0.1, "random_forest"),
        };
        Self {
            observations: Observations::new(spec.space.clone()),
            design: Design::new(spec),
            step_width: (base * scale).clamp(0.01, 0.5),
            exploration_weight,
            name,
        }
    }

    fn perturb(&self, rng: &mut StdRng, base: &[f64]) -> Vec<f64> {
        base.iter()
            .map(|u| {
                let noise = rng.random_range(-self.step_width..=self.step_width);
                (u + noise).clamp(0.0, 1.0 - f64::EPSILON)
            })
            .collect()
    }
}

impl SurrogateBackend for LocalSearchBackend {
    fn ask(&mut self) -> TuneResult<Candidate> {
        let observed = self.observations.func_vals.len();
        let space = &self.observations.space;
        if let Some(point) = self.design.initial_point(observed) {
            return Ok(space.from_unit(point));
        }

        let mut rng = self.design.rng(observed);
        let incumbent = self
            .observations
            .best()
            .and_then(|best| space.to_unit(best));
        let base = match incumbent {
            Some(base) if rng.random::<f64>() >= self.exploration_weight => base,
            _ => return Ok(space.from_unit(&uniform_point(&mut rng, space.len()))),
        };

        let mut candidate = space.from_unit(&self.perturb(&mut rng, &base));
        for _ in 0..Self::MAX_RESAMPLES {
            if !self.observations.x_iters.contains(&candidate) {
                break;
            }
            candidate = space.from_unit(&self.perturb(&mut rng, &base));
        }
        Ok(candidate)
    }

    fn tell(&mut self, candidate: Candidate, value: f64) -> TuneResult<TellResult> {
        self.observations.record(candidate, value)
    }

    fn x_iters(&self) -> &[Candidate] {
        &self.observations.x_iters
    }

    fn func_vals(&self) -> &[f64] {
        &self.observations.func_vals
    }

    fn name(&self) -> &str {
        self.name
    }
}
