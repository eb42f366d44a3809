//! Bounded Nelder–Mead minimization.
//!
//! The staged fits minimize small (2–3 parameter) objectives whose parameters
//! live on wildly different scales (`N0 ~ 1e-6` next to `Γ ~ 1`). We therefore:
//!
//! - run the simplex in scaled coordinates `y = x / step`, so every axis starts
//!   with a unit simplex edge
//! - clamp each evaluation into the box bounds and add a quadratic penalty on
//!   the clamped distance, so the simplex is pushed back inside
//! - treat an invalid evaluation (error or non-finite value) as a barrier
//!   cost; only an invalid converged point fails the minimization
//! - restart from the best vertex until a restart no longer improves the minimum
//!
//! Parameters can be frozen (`free[i] == false`): they keep their start value and
//! are not part of the simplex.

use std::cell::{Cell, RefCell};
use std::time::Instant;

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;

use crate::domain::MinimizerConfig;
use crate::error::FitError;

/// Scalar objective evaluated by the minimizer.
pub trait ObjectiveFunction {
    /// Evaluate the objective at the full parameter vector.
    fn eval(&self, params: &[f64]) -> Result<f64, FitError>;

    /// Objective change corresponding to one standard deviation.
    ///
    /// `0.5` for negative log-likelihoods, `1.0` for chi-square.
    fn errordef(&self) -> f64 {
        0.5
    }
}

/// Start point, scales, bounds and free/frozen mask of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpace {
    pub start: Vec<f64>,
    pub steps: Vec<f64>,
    pub bounds: Vec<(f64, f64)>,
    pub free: Vec<bool>,
}

impl ParamSpace {
    pub fn new(start: Vec<f64>, steps: Vec<f64>, bounds: Vec<(f64, f64)>) -> Result<Self, FitError> {
        let n = start.len();
        if steps.len() != n {
            return Err(FitError::shape("parameter steps", n, steps.len()));
        }
        if bounds.len() != n {
            return Err(FitError::shape("parameter bounds", n, bounds.len()));
        }
        Ok(Self {
            start,
            steps,
            bounds,
            free: vec![true; n],
        })
    }

    /// Freeze parameter `i` at its start value.
    pub fn freeze(mut self, i: usize) -> Self {
        if let Some(flag) = self.free.get_mut(i) {
            *flag = false;
        }
        self
    }

    pub fn free_indices(&self) -> Vec<usize> {
        (0..self.start.len()).filter(|&i| self.free[i]).collect()
    }

    pub fn n_free(&self) -> usize {
        self.free.iter().filter(|f| **f).count()
    }

    /// Clamp into the box; also returns the scaled squared distance moved.
    pub fn clamp(&self, params: &[f64]) -> (Vec<f64>, f64) {
        let mut penalty = 0.0;
        let clamped = params
            .iter()
            .zip(&self.bounds)
            .zip(&self.steps)
            .map(|((&v, &(lo, hi)), &step)| {
                let c = v.clamp(lo, hi);
                let d = (v - c) / step;
                penalty += d * d;
                c
            })
            .collect();
        (clamped, penalty)
    }
}

/// Converged minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub params: Vec<f64>,
    /// Objective at `params`, without bound penalty.
    pub fval: f64,
    pub iterations: u64,
    pub evaluations: usize,
}

/// Minimization that did not reach a converged minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeFailure {
    /// Parameters at the failing evaluation (or the best point so far).
    pub params: Vec<f64>,
    pub reason: String,
}

struct ScaledProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    space: &'a ParamSpace,
    free: &'a [usize],
    deadline: Option<Instant>,
    evaluations: &'a Cell<usize>,
    timed_out: &'a RefCell<Option<MinimizeFailure>>,
}

/// Cost of points where the objective is undefined.
const BARRIER: f64 = 1e150;

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Map scaled free coordinates back to a clamped full parameter vector.
fn unscale(space: &ParamSpace, free: &[usize], y: &[f64]) -> (Vec<f64>, f64) {
    let mut x = space.start.clone();
    for (k, &i) in free.iter().enumerate() {
        x[i] = y[k] * space.steps[i];
    }
    space.clamp(&x)
}

impl CostFunction for ScaledProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    // Never returns `Err`: argmin unwraps the costs of the initial simplex.
    fn cost(&self, y: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let (params, penalty) = unscale(self.space, self.free, y);

        if deadline_passed(self.deadline) {
            let mut slot = self.timed_out.borrow_mut();
            if slot.is_none() {
                *slot = Some(MinimizeFailure {
                    params,
                    reason: "stage timeout exceeded".into(),
                });
            }
            return Ok(BARRIER + penalty);
        }

        self.evaluations.set(self.evaluations.get() + 1);
        match self.objective.eval(&params) {
            Ok(v) if v.is_finite() => Ok(v + penalty),
            Ok(v) => {
                log::trace!("objective is {v} at {params:?}");
                Ok(BARRIER + penalty)
            }
            Err(e) => {
                log::trace!("objective undefined at {params:?}: {e}");
                Ok(BARRIER + penalty)
            }
        }
    }
}

/// Bounded Nelder–Mead minimizer.
#[derive(Debug, Clone)]
pub struct Minimizer {
    config: MinimizerConfig,
}

impl Minimizer {
    pub fn new(config: MinimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` over the free parameters of `space`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        space: &ParamSpace,
    ) -> Result<Minimum, MinimizeFailure> {
        let free = space.free_indices();
        let (start, _) = space.clamp(&space.start);
        if free.is_empty() {
            let fval = objective.eval(&start).map_err(|e| MinimizeFailure {
                params: start.clone(),
                reason: e.to_string(),
            })?;
            return Ok(Minimum {
                params: start,
                fval,
                iterations: 0,
                evaluations: 1,
            });
        }

        let deadline = self.config.stage_timeout.map(|t| Instant::now() + t);
        let evaluations = Cell::new(0usize);
        let timed_out = RefCell::new(None);
        let space = ParamSpace {
            start: start.clone(),
            ..space.clone()
        };
        let problem = || ScaledProblem {
            objective,
            space: &space,
            free: &free,
            deadline,
            evaluations: &evaluations,
            timed_out: &timed_out,
        };

        let mut y: Vec<f64> = free.iter().map(|&i| start[i] / space.steps[i]).collect();
        let mut best_cost = f64::INFINITY;
        let mut iterations = 0u64;

        for attempt in 0..=self.config.restarts {
            if deadline_passed(deadline) {
                return Err(MinimizeFailure {
                    params: unscale(&space, &free, &y).0,
                    reason: "stage timeout exceeded".into(),
                });
            }
            let simplex = initial_simplex(&y, &free, &space);
            let run = NelderMead::new(simplex)
                .with_sd_tolerance(self.config.tolerance)
                .and_then(|solver| {
                    Executor::new(problem(), solver)
                        .configure(|state| state.max_iters(self.config.max_iters))
                        .run()
                });

            if let Some(failure) = timed_out.borrow_mut().take() {
                return Err(failure);
            }
            let res = run.map_err(|e| MinimizeFailure {
                params: unscale(&space, &free, &y).0,
                reason: e.to_string(),
            })?;

            let state = res.state();
            iterations += state.get_iter();
            let Some(candidate) = state.get_best_param().cloned() else {
                return Err(MinimizeFailure {
                    params: start,
                    reason: "minimizer returned no parameters".into(),
                });
            };
            let cost = state.get_best_cost();
            let termination = state.get_termination_status();
            if !matches!(
                termination,
                TerminationStatus::Terminated(TerminationReason::SolverConverged)
            ) {
                return Err(MinimizeFailure {
                    params: unscale(&space, &free, &candidate).0,
                    reason: format!("no convergence: {termination:?}"),
                });
            }

            let improvement = best_cost - cost;
            log::trace!("simplex run {attempt}: cost={cost:.10e} improvement={improvement:.3e}");
            if cost < best_cost {
                best_cost = cost;
                y = candidate;
            }
            if !(improvement > 10.0 * self.config.tolerance) {
                break;
            }
        }

        let (params, _) = unscale(&space, &free, &y);
        let fval = match objective.eval(&params) {
            Ok(v) if v.is_finite() => v,
            Ok(v) => {
                return Err(MinimizeFailure {
                    params,
                    reason: format!("objective evaluated to {v} at the minimum"),
                });
            }
            Err(e) => {
                return Err(MinimizeFailure {
                    params,
                    reason: e.to_string(),
                });
            }
        };
        Ok(Minimum {
            params,
            fval,
            iterations,
            evaluations: evaluations.get(),
        })
    }
}

/// Unit simplex around `y0`, stepping away from the upper bound when needed.
fn initial_simplex(y0: &[f64], free: &[usize], space: &ParamSpace) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(y0.len() + 1);
    simplex.push(y0.to_vec());
    for (k, &i) in free.iter().enumerate() {
        let mut vertex = y0.to_vec();
        let (_, hi) = space.bounds[i];
        let up = (y0[k] + 1.0) * space.steps[i];
        vertex[k] += if up > hi { -1.0 } else { 1.0 };
        simplex.push(vertex);
    }
    simplex
}
