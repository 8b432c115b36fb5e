//! Static nested sampling backend.
//!
//! Keeps a fixed population of `nlive` live points. Each iteration the worst
//! live point becomes a weighted dead sample and is replaced by a candidate
//! whose likelihood exceeds it. Prior volume shrinks geometrically: after `i`
//! replacements the remaining volume is `X_i = exp(-i / nlive)`, and the dead
//! point's weight is `exp(logL - logL_ref) * (X_{i-1} - X_i)` with `logL_ref`
//! fixed at the best initial live likelihood to keep weights representable.
//! The run stops when the estimated remaining evidence falls below `dlogz`
//! of the accumulated weight, or after `max_iterations` replacements.

use nlf_core::{ErrorInfo, FitError, RngHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{reflect_unit, state_from_value, state_to_value, AcceptedDraw, SearchBackend};

/// Nested sampling with a static live point population.
#[derive(Debug, Clone)]
pub struct StaticNestedSampler {
    nlive: usize,
    dlogz: f64,
    max_iterations: usize,
    batch: usize,
    jitter: f64,
    state: NestedState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NestedState {
    dim: usize,
    iteration: usize,
    initialized: bool,
    done: bool,
    live_units: Vec<Vec<f64>>,
    #[serde(with = "crate::json_float::float_vec")]
    live_lls: Vec<f64>,
    #[serde(with = "crate::json_float::float")]
    ll_ref: f64,
    log_volume: f64,
    total_weight: f64,
}

impl StaticNestedSampler {
    /// Creates a sampler with `nlive` live points and stopping tolerance
    /// `dlogz`, capped at 10000 replacement iterations.
    pub fn new(nlive: usize, dlogz: f64) -> Self {
        Self {
            nlive,
            dlogz,
            max_iterations: 10_000,
            batch: 16,
            jitter: 0.05,
            state: NestedState::default(),
        }
    }

    /// Overrides the replacement iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Overrides the candidate batch size per iteration.
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    fn worst_live(&self) -> usize {
        let mut worst = 0;
        for (idx, ll) in self.state.live_lls.iter().enumerate() {
            if *ll < self.state.live_lls[worst] {
                worst = idx;
            }
        }
        worst
    }

    fn best_live_ll(&self) -> f64 {
        self.state
            .live_lls
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn update_done(&mut self) {
        if self.state.iteration >= self.max_iterations {
            self.state.done = true;
            return;
        }
        if self.state.total_weight > 0.0 {
            let remaining =
                scaled_exp(self.best_live_ll() - self.state.ll_ref) * self.state.log_volume.exp();
            if remaining < self.dlogz * self.state.total_weight {
                self.state.done = true;
            }
        }
    }
}

/// `exp` with the argument clamped to the representable range.
fn scaled_exp(delta: f64) -> f64 {
    delta.clamp(-700.0, 700.0).exp()
}

impl SearchBackend for StaticNestedSampler {
    fn name(&self) -> &'static str {
        "nested"
    }

    fn config_value(&self) -> Result<Value, FitError> {
        Ok(json!({
            "nlive": self.nlive,
            "dlogz": self.dlogz,
            "max_iterations": self.max_iterations,
            "batch": self.batch,
            "jitter": self.jitter,
        }))
    }

    fn initialize(&mut self, dim: usize) -> Result<(), FitError> {
        if self.nlive < 2 {
            return Err(FitError::Configuration(
                ErrorInfo::new("nested-live", "nested sampling needs at least two live points")
                    .with_context("nlive", self.nlive.to_string()),
            ));
        }
        self.state = NestedState {
            dim,
            ..NestedState::default()
        };
        Ok(())
    }

    fn propose(&mut self, rng: &mut RngHandle) -> Result<Vec<Vec<f64>>, FitError> {
        let dim = self.state.dim;
        if !self.state.initialized {
            return Ok((0..self.nlive)
                .map(|_| (0..dim).map(|_| rng.next_unit()).collect())
                .collect());
        }
        // Candidates alternate between fresh prior draws and jittered copies
        // of live points; the first one beating the worst likelihood wins.
        let mut candidates = Vec::with_capacity(self.batch);
        for attempt in 0..self.batch {
            if attempt % 2 == 0 {
                candidates.push((0..dim).map(|_| rng.next_unit()).collect());
            } else {
                let source = &self.state.live_units[rng.next_index(self.nlive)];
                candidates.push(
                    source
                        .iter()
                        .map(|c| reflect_unit(c + self.jitter * rng.next_standard_normal()))
                        .collect(),
                );
            }
        }
        Ok(candidates)
    }

    fn observe(
        &mut self,
        evaluated: &[(Vec<f64>, f64)],
        _rng: &mut RngHandle,
    ) -> Result<Vec<AcceptedDraw>, FitError> {
        if !self.state.initialized {
            self.state.live_units = evaluated.iter().map(|(unit, _)| unit.clone()).collect();
            self.state.live_lls = evaluated.iter().map(|(_, ll)| *ll).collect();
            self.state.ll_ref = {
                let best = self.best_live_ll();
                if best.is_finite() {
                    best
                } else {
                    0.0
                }
            };
            self.state.log_volume = 0.0;
            self.state.initialized = true;
            return Ok(Vec::new());
        }

        let worst = self.worst_live();
        let threshold = self.state.live_lls[worst];
        let winner = evaluated
            .iter()
            .find(|(_, ll)| ll.is_finite() && *ll > threshold);

        let mut draws = Vec::new();
        if let Some((unit, ll)) = winner {
            let volume_before = self.state.log_volume.exp();
            self.state.log_volume -= 1.0 / self.nlive as f64;
            let volume_after = self.state.log_volume.exp();
            if threshold.is_finite() {
                let weight = scaled_exp(threshold - self.state.ll_ref)
                    * (volume_before - volume_after);
                self.state.total_weight += weight;
                draws.push(AcceptedDraw {
                    unit: self.state.live_units[worst].clone(),
                    log_likelihood: threshold,
                    weight,
                });
            }
            self.state.live_units[worst] = unit.clone();
            self.state.live_lls[worst] = *ll;
        }
        self.state.iteration += 1;
        self.update_done();
        Ok(draws)
    }

    fn drain(&mut self) -> Result<Vec<AcceptedDraw>, FitError> {
        // Remaining live points share the residual prior volume evenly.
        let share = self.state.log_volume.exp() / self.nlive as f64;
        let mut draws = Vec::new();
        for (unit, ll) in self.state.live_units.iter().zip(&self.state.live_lls) {
            if ll.is_finite() {
                draws.push(AcceptedDraw {
                    unit: unit.clone(),
                    log_likelihood: *ll,
                    weight: scaled_exp(ll - self.state.ll_ref) * share,
                });
            }
        }
        self.state.live_units.clear();
        self.state.live_lls.clear();
        self.state.done = true;
        Ok(draws)
    }

    fn converged(&self) -> bool {
        self.state.done
    }

    fn state_value(&self) -> Result<Value, FitError> {
        state_to_value(&self.state)
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), FitError> {
        let restored: NestedState = state_from_value(state)?;
        if restored.initialized && !restored.done && restored.live_units.len() != self.nlive {
            return Err(FitError::ResumeConflict(
                ErrorInfo::new("nested-state", "stored live point count differs")
                    .with_context("live", self.nlive.to_string())
                    .with_context("stored", restored.live_units.len().to_string()),
            ));
        }
        self.state = restored;
        Ok(())
    }
}
