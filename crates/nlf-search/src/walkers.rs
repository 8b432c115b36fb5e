//! Affine-invariant ensemble walker backend.
//!
//! Maintains an ensemble of walkers in unit hypercube space and advances it
//! with stretch moves: each walker proposes along the line through itself and
//! a randomly chosen partner, scaled by `z = ((a-1)u + 1)^2 / a`. The move is
//! accepted with probability `min(1, z^(d-1) * L_new / L_old)`. Rejected
//! walkers re-record their current position, so every run iteration
//! contributes one sample per walker.

use nlf_core::{ErrorInfo, FitError, RngHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::{reflect_unit, state_from_value, state_to_value, AcceptedDraw, SearchBackend};

/// Ensemble walker search over the unit hypercube.
#[derive(Debug, Clone)]
pub struct EnsembleWalkers {
    nwalkers: usize,
    nsteps: usize,
    stretch: f64,
    state: WalkerState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WalkerState {
    dim: usize,
    step: usize,
    initialized: bool,
    positions: Vec<Vec<f64>>,
    #[serde(with = "crate::json_float::float_vec")]
    log_likelihoods: Vec<f64>,
    pending_scales: Vec<f64>,
}

impl EnsembleWalkers {
    /// Creates a backend with `nwalkers` walkers run for `nsteps` ensemble
    /// steps after initialization, using the standard stretch scale `a = 2`.
    pub fn new(nwalkers: usize, nsteps: usize) -> Self {
        Self {
            nwalkers,
            nsteps,
            stretch: 2.0,
            state: WalkerState::default(),
        }
    }

    /// Overrides the stretch scale `a`.
    pub fn with_stretch(mut self, stretch: f64) -> Self {
        self.stretch = stretch;
        self
    }

    fn draw_scale(&self, rng: &mut RngHandle) -> f64 {
        let a = self.stretch;
        let u = rng.next_unit();
        let g = (a - 1.0) * u + 1.0;
        g * g / a
    }
}

impl SearchBackend for EnsembleWalkers {
    fn name(&self) -> &'static str {
        "walkers"
    }

    fn config_value(&self) -> Result<Value, FitError> {
        Ok(json!({
            "nwalkers": self.nwalkers,
            "nsteps": self.nsteps,
            "stretch": self.stretch,
        }))
    }

    fn initialize(&mut self, dim: usize) -> Result<(), FitError> {
        if self.nwalkers < 2 {
            return Err(FitError::Configuration(
                ErrorInfo::new("walkers-count", "stretch moves need at least two walkers")
                    .with_context("nwalkers", self.nwalkers.to_string()),
            ));
        }
        self.state = WalkerState {
            dim,
            ..WalkerState::default()
        };
        Ok(())
    }

    fn propose(&mut self, rng: &mut RngHandle) -> Result<Vec<Vec<f64>>, FitError> {
        let dim = self.state.dim;
        if !self.state.initialized {
            // First batch seeds the ensemble with prior draws.
            return Ok((0..self.nwalkers)
                .map(|_| (0..dim).map(|_| rng.next_unit()).collect())
                .collect());
        }
        self.state.pending_scales.clear();
        let mut proposals = Vec::with_capacity(self.nwalkers);
        for walker in 0..self.nwalkers {
            let mut partner = rng.next_index(self.nwalkers - 1);
            if partner >= walker {
                partner += 1;
            }
            let scale = self.draw_scale(rng);
            let current = &self.state.positions[walker];
            let other = &self.state.positions[partner];
            let candidate = current
                .iter()
                .zip(other)
                .map(|(c, o)| reflect_unit(o + scale * (c - o)))
                .collect();
            self.state.pending_scales.push(scale);
            proposals.push(candidate);
        }
        Ok(proposals)
    }

    fn observe(
        &mut self,
        evaluated: &[(Vec<f64>, f64)],
        rng: &mut RngHandle,
    ) -> Result<Vec<AcceptedDraw>, FitError> {
        let mut draws = Vec::new();
        if !self.state.initialized {
            self.state.positions = evaluated.iter().map(|(unit, _)| unit.clone()).collect();
            self.state.log_likelihoods = evaluated.iter().map(|(_, ll)| *ll).collect();
            self.state.initialized = true;
            for (unit, ll) in evaluated {
                if ll.is_finite() {
                    draws.push(AcceptedDraw {
                        unit: unit.clone(),
                        log_likelihood: *ll,
                        weight: 1.0,
                    });
                }
            }
            return Ok(draws);
        }

        let exponent = self.state.dim.saturating_sub(1) as f64;
        for (walker, (candidate, ll_new)) in evaluated.iter().enumerate() {
            let scale = self.state.pending_scales.get(walker).copied().ok_or_else(|| {
                FitError::Dimension(
                    ErrorInfo::new("walkers-batch", "observed batch exceeds proposed batch")
                        .with_context("walker", walker.to_string()),
                )
            })?;
            let threshold = rng.next_unit().max(f64::MIN_POSITIVE).ln();
            let ll_old = self.state.log_likelihoods[walker];
            let accept = if !ll_new.is_finite() {
                false
            } else if !ll_old.is_finite() {
                true
            } else {
                threshold < exponent * scale.ln() + ll_new - ll_old
            };
            if accept {
                self.state.positions[walker] = candidate.clone();
                self.state.log_likelihoods[walker] = *ll_new;
                draws.push(AcceptedDraw {
                    unit: candidate.clone(),
                    log_likelihood: *ll_new,
                    weight: 1.0,
                });
            } else if ll_old.is_finite() {
                draws.push(AcceptedDraw {
                    unit: self.state.positions[walker].clone(),
                    log_likelihood: ll_old,
                    weight: 1.0,
                });
            }
        }
        self.state.pending_scales.clear();
        self.state.step += 1;
        Ok(draws)
    }

    fn converged(&self) -> bool {
        self.state.initialized && self.state.step >= self.nsteps
    }

    fn state_value(&self) -> Result<Value, FitError> {
        state_to_value(&self.state)
    }

    fn restore_state(&mut self, state: &Value) -> Result<(), FitError> {
        let restored: WalkerState = state_from_value(state)?;
        if restored.initialized && restored.positions.len() != self.nwalkers {
            return Err(FitError::ResumeConflict(
                ErrorInfo::new("walkers-state", "stored ensemble size differs")
                    .with_context("live", self.nwalkers.to_string())
                    .with_context("stored", restored.positions.len().to_string()),
            ));
        }
        self.state = restored;
        Ok(())
    }
}
