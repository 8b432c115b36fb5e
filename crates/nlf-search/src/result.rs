//! Fit results, registry records, and the persistence sink trait.

use std::collections::BTreeMap;

use nlf_core::FitError;
use nlf_model::{Instance, Model};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::FitStatus;
use crate::samples::SampleSet;

/// Outcome of a driver invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Content-hash identifier of the fit.
    pub identifier: String,
    /// Status at return: `Completed` after convergence, `Running` when the
    /// per-invocation iteration budget paused the search.
    pub status: FitStatus,
    model: Model,
    samples: SampleSet,
}

impl FitResult {
    /// Assembles a result from its parts.
    pub fn new(identifier: String, status: FitStatus, model: Model, samples: SampleSet) -> Self {
        Self {
            identifier,
            status,
            model,
            samples,
        }
    }

    /// The fitted model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The accepted samples.
    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    /// Instance of the maximum likelihood sample.
    pub fn max_log_likelihood_instance(&self) -> Result<Instance, FitError> {
        self.samples.max_log_likelihood_instance(&self.model)
    }

    /// Instance of the weighted median parameter vector.
    pub fn median_pdf_instance(&self) -> Result<Instance, FitError> {
        self.samples.median_pdf_instance(&self.model)
    }
}

/// Everything the registry stores about a fit besides its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    /// Content-hash identifier.
    pub identifier: String,
    /// Search name from the configuration.
    pub name: String,
    /// Output path prefix, recorded for later artifact lookup.
    pub path_prefix: String,
    /// Optional unique tag.
    pub unique_tag: Option<String>,
    /// The fitted model.
    pub model: Model,
    /// Backend name.
    pub search_class: String,
    /// Identity-relevant backend configuration.
    pub search_config: Value,
    /// Free-form consumer annotations, queryable in the aggregator.
    pub info: BTreeMap<String, String>,
    /// Lifecycle status at commit time.
    pub status: FitStatus,
    /// RFC 3339 timestamp of the first invocation.
    pub created_at: String,
    /// RFC 3339 timestamp of the commit.
    pub updated_at: String,
}

/// Destination for completed fits.
///
/// The driver commits through this trait after convergence; the sqlite
/// registry implements it. Commits must be idempotent per identifier so a
/// re-run of a completed fit overwrites rather than duplicates.
pub trait FitSink: Send + Sync {
    /// Persists a fit record, its samples, and its attached objects.
    fn commit_fit(
        &self,
        record: &FitRecord,
        samples: &SampleSet,
        objects: &[(String, Value)],
    ) -> Result<(), FitError>;
}
