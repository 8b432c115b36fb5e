//! The pluggable stochastic search backend interface.

use nlf_core::{ErrorInfo, FitError, RngHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A draw the backend wants recorded in the sample store.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedDraw {
    /// Unit hypercube coordinates of the draw.
    pub unit: Vec<f64>,
    /// Log likelihood of the draw.
    pub log_likelihood: f64,
    /// Importance weight of the draw.
    pub weight: f64,
}

/// A stochastic search strategy driven by the fit loop.
///
/// The driver owns the evaluation loop: each iteration it calls `propose`,
/// evaluates every proposal's likelihood (possibly in parallel), then hands
/// the `(unit, log_likelihood)` pairs back through `observe` in proposal
/// order. All randomness must come from the `RngHandle` the driver passes in;
/// backends hold no RNG of their own, which is what makes checkpoint replay
/// exact.
pub trait SearchBackend: Send {
    /// Stable backend name, part of the fit identifier.
    fn name(&self) -> &'static str;

    /// Identity-relevant configuration as a JSON value.
    fn config_value(&self) -> Result<Value, FitError>;

    /// Prepares internal state for a fresh fit over `dim` parameters.
    fn initialize(&mut self, dim: usize) -> Result<(), FitError>;

    /// Produces the next batch of unit-space proposals.
    fn propose(&mut self, rng: &mut RngHandle) -> Result<Vec<Vec<f64>>, FitError>;

    /// Consumes evaluated proposals and returns the draws to record.
    fn observe(
        &mut self,
        evaluated: &[(Vec<f64>, f64)],
        rng: &mut RngHandle,
    ) -> Result<Vec<AcceptedDraw>, FitError>;

    /// Final draws to record after convergence. Most backends have none.
    fn drain(&mut self) -> Result<Vec<AcceptedDraw>, FitError> {
        Ok(Vec::new())
    }

    /// Whether the backend considers the search finished.
    fn converged(&self) -> bool;

    /// Serializes internal state for checkpointing.
    fn state_value(&self) -> Result<Value, FitError>;

    /// Restores internal state from a checkpoint snapshot.
    fn restore_state(&mut self, state: &Value) -> Result<(), FitError>;
}

/// Reflects an unconstrained coordinate back into `[0, 1]`.
pub(crate) fn reflect_unit(mut x: f64) -> f64 {
    x = x.rem_euclid(2.0);
    if x > 1.0 {
        2.0 - x
    } else {
        x
    }
}

pub(crate) fn state_to_value<T: Serialize>(state: &T) -> Result<Value, FitError> {
    serde_json::to_value(state).map_err(|err| {
        FitError::Serde(
            ErrorInfo::new("state-serialize", "failed to serialize backend state")
                .with_context("error", err.to_string()),
        )
    })
}

pub(crate) fn state_from_value<T: DeserializeOwned>(state: &Value) -> Result<T, FitError> {
    serde_json::from_value(state.clone()).map_err(|err| {
        FitError::Serde(
            ErrorInfo::new("state-deserialize", "failed to restore backend state")
                .with_context("error", err.to_string()),
        )
    })
}
