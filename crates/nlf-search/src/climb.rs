//! Random-restart stochastic hill climbing backend.
//!
//! A cheap optimizer: from a random starting point, propose a batch of
//! Gaussian perturbations, move to the best candidate if it improves, and
//! shrink the step scale when it does not. After a fixed number of steps the
//! climber restarts from a fresh random point. Only improving moves are
//! recorded, so the sample store traces the ascent paths.

use nlf_core::{ErrorInfo, FitError, RngHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{reflect_unit, state_from_value, state_to_value, AcceptedDraw, SearchBackend};

/// Stochastic hill climbing with random restarts.
#[derive(Debug, Clone)]
pub struct StochasticHillClimb {
    restarts: usize,
    steps_per_restart: usize,
    batch: usize,
    initial_scale: f64,
    shrink: f64,
    state: ClimbState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ClimbState {
    dim: usize,
    initialized: bool,
    restart: usize,
    step: usize,
    scale: f64,
    current: Vec<f64>,
    #[serde(with = "crate::json_float::float")]
    current_ll: f64,
    best: Vec<f64>,
    #[serde(with = "crate::json_float::float")]
    best_ll: f64,
}

impl StochasticHillClimb {
    /// Creates a climber with `restarts` independent starts of
    /// `steps_per_restart` steps each.
    pub fn new(restarts: usize, steps_per_restart: usize) -> Self {
        Self {
            restarts,
            steps_per_restart,
            batch: 8,
            initial_scale: 0.1,
            shrink: 0.9,
            state: ClimbState::default(),
        }
    }

    /// Overrides the candidate batch size per step.
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }
}

fn best_of(evaluated: &[(Vec<f64>, f64)]) -> Option<(&Vec<f64>, f64)> {
    let mut best: Option<(&Vec<f64>, f64)> = None;
    for (unit, ll) in evaluated {
        if !ll.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, current)| *ll > current) {
            best = Some((unit, *ll));
        }
    }
    best
}

impl SearchBackend for StochasticHillClimb {
    fn name(&self) -> &'static str {
        "hill-climb"
    }

    fn config_value(&self) -> Result<Value, FitError> {
        Ok(json!({
            "restarts": self.restarts,
            "steps_per_restart": self.steps_per_restart,
            "batch": self.batch,
            "initial_scale": self.initial_scale,
            "shrink": self.shrink,
        }))
    }

    fn initialize(&mut self, dim: usize) -> Result<(), FitError> {
        if self.restarts == 0 || self.steps_per_restart == 0 {
            return Err(FitError::Configuration(ErrorInfo::new(
                "climb-budget",
                "restarts and steps_per_restart must be at least 1",
            )));
        }
        self.state = ClimbState {
            dim,
            scale: self.initial_scale,
            current_ll: f64::NEG_INFINITY,
            best_ll: f64::NEG_INFINITY,
            ..ClimbState::default()
        };
        Ok(())
    }

    fn propose(&mut self, rng: &mut RngHandle) -> Result<Vec<Vec<f64>>, FitError> {
        let dim = self.state.dim;
        if !self.state.initialized {
            return Ok((0..self.batch)
                .map(|_| (0..dim).map(|_| rng.next_unit()).collect())
                .collect());
        }
        Ok((0..self.batch)
            .map(|_| {
                self.state
                    .current
                    .iter()
                    .map(|c| reflect_unit(c + self.state.scale * rng.next_standard_normal()))
                    .collect()
            })
            .collect())
    }

    fn observe(
        &mut self,
        evaluated: &[(Vec<f64>, f64)],
        rng: &mut RngHandle,
    ) -> Result<Vec<AcceptedDraw>, FitError> {
        let mut draws = Vec::new();
        let winner = best_of(evaluated);

        if !self.state.initialized {
            if let Some((unit, ll)) = winner {
                self.state.current = unit.clone();
                self.state.current_ll = ll;
                self.state.best = unit.clone();
                self.state.best_ll = ll;
                draws.push(AcceptedDraw {
                    unit: unit.clone(),
                    log_likelihood: ll,
                    weight: 1.0,
                });
            } else {
                // All starting candidates impossible; pick one arbitrarily
                // and let the perturbations search outward.
                if let Some((unit, ll)) = evaluated.first() {
                    self.state.current = unit.clone();
                    self.state.current_ll = *ll;
                }
            }
            self.state.initialized = true;
            return Ok(draws);
        }

        match winner {
            Some((unit, ll)) if ll > self.state.current_ll => {
                self.state.current = unit.clone();
                self.state.current_ll = ll;
                if ll > self.state.best_ll {
                    self.state.best = unit.clone();
                    self.state.best_ll = ll;
                }
                draws.push(AcceptedDraw {
                    unit: unit.clone(),
                    log_likelihood: ll,
                    weight: 1.0,
                });
            }
            _ => self.state.scale *= self.shrink,
        }
        self.state.step += 1;
        if self.state.step >= self.steps_per_restart {
            self.state.restart += 1;
            self.state.step = 0;
            self.state.scale = self.initial_scale;
            if self.state.restart < self.restarts {
                self.state.current = (0..self.state.dim).map(|_| rng.next_unit()).collect();
                self.state.current_ll = f64::NEG_INFINITY;
            }
        }
        Ok(draws)
    }

    fn converged(&self) -> bool {
        self.state.initialized && self.state.restart >= self.restarts
    }

    fn state_value(&self) -> Result<Value, FitError> {
        state_to_value(&self.state)
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), FitError> {
        self.state = state_from_value(state)?;
        Ok(())
    }
}
