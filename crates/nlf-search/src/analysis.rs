//! The likelihood contract implemented by fit consumers.

use nlf_core::FitError;
use nlf_model::Instance;

use crate::paths::SearchPaths;

/// Maps a model instance to a log likelihood.
///
/// An analysis owns the dataset it fits and is shared read-only across the
/// evaluation worker threads. `log_likelihood` must be a pure function of the
/// instance; larger return values mean a better fit. `f64::NEG_INFINITY`
/// marks an instance as impossible without aborting the search, and a NaN
/// return is treated the same way by the driver.
pub trait Analysis: Send + Sync {
    /// Evaluates the log likelihood of one instance.
    fn log_likelihood(&self, instance: &Instance) -> f64;

    /// Optional visualization hook. Called with `during_analysis = true` at
    /// each checkpoint and once with `false` after convergence. Errors are
    /// logged by the driver but never abort the fit.
    fn visualize(
        &self,
        _paths: &SearchPaths,
        _instance: &Instance,
        _during_analysis: bool,
    ) -> Result<(), FitError> {
        Ok(())
    }

    /// Optional hook for persisting analysis attributes (datasets, masks)
    /// into the fit's attached object store. Called once when a fit starts.
    fn save_attributes(&self, _paths: &SearchPaths) -> Result<(), FitError> {
        Ok(())
    }
}
