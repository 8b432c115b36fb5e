//! Checkpoint payloads persisted between driver invocations.

use std::fs;
use std::path::Path;

use nlf_core::{
    from_json_slice, to_canonical_json_bytes, ErrorInfo, FitError, FitProvenance, SchemaVersion,
};
use nlf_model::Model;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::paths::write_atomic;
use crate::samples::SampleSet;

/// Everything required to resume a fit from where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    /// Version of the checkpoint layout.
    pub schema_version: SchemaVersion,
    /// Identifier, master seed, and timestamp of the writing run.
    pub provenance: FitProvenance,
    /// Next driver iteration to execute.
    pub iteration: usize,
    /// The model as configured at fit start.
    pub model: Model,
    /// Name of the backend that produced the state.
    pub backend_name: String,
    /// Identity-relevant backend configuration.
    pub backend_config: Value,
    /// Opaque backend state snapshot.
    pub backend_state: Value,
    /// Samples accepted so far.
    pub samples: SampleSet,
}

impl CheckpointPayload {
    /// Atomically writes the checkpoint to `path`.
    pub fn store(&self, path: &Path) -> Result<(), FitError> {
        let bytes = to_canonical_json_bytes(self)?;
        write_atomic(path, &bytes)
    }

    /// Loads a checkpoint from `path`.
    pub fn load(path: &Path) -> Result<Self, FitError> {
        let bytes = fs::read(path).map_err(|err| {
            FitError::Persistence(
                ErrorInfo::new("read-checkpoint", "failed to read checkpoint")
                    .with_context("path", path.display().to_string())
                    .with_context("error", err.to_string()),
            )
        })?;
        from_json_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::Sample;
    use nlf_model::Prior;
    use serde_json::json;

    #[test]
    fn checkpoint_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search").join("checkpoint.json");

        let mut model = Model::new();
        model.insert_prior(
            "x",
            Prior::Uniform {
                lower: 0.0,
                upper: 1.0,
            },
        );
        let mut samples = SampleSet::new(1);
        samples
            .append(Sample {
                unit: vec![0.25],
                params: vec![0.25],
                log_likelihood: -3.5,
                weight: 1.0,
            })
            .unwrap();

        let payload = CheckpointPayload {
            schema_version: SchemaVersion::default(),
            provenance: FitProvenance::stamp("abc123", 42),
            iteration: 12,
            model,
            backend_name: "walkers".into(),
            backend_config: json!({"nwalkers": 8}),
            backend_state: json!({"step": 12}),
            samples,
        };
        payload.store(&path).unwrap();
        assert_eq!(CheckpointPayload::load(&path).unwrap(), payload);
    }

    #[test]
    fn missing_checkpoint_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CheckpointPayload::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, FitError::Persistence(_)));
    }
}
