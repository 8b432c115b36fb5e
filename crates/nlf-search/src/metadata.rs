//! Fit metadata written alongside checkpoints.

use std::fs;
use std::path::Path;

use nlf_core::{from_json_slice, to_canonical_json_bytes, ErrorInfo, FitError, SchemaVersion};
use serde::{Deserialize, Serialize};

use crate::paths::write_atomic;

/// Lifecycle state of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitStatus {
    /// The search has checkpointed state but has not converged.
    Running,
    /// The search converged and final artifacts were written.
    Completed,
    /// The search aborted with an error.
    Failed,
}

impl FitStatus {
    /// Stable string form, used as the registry column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            FitStatus::Running => "running",
            FitStatus::Completed => "completed",
            FitStatus::Failed => "failed",
        }
    }

    /// Parses the stable string form.
    pub fn parse(text: &str) -> Result<Self, FitError> {
        match text {
            "running" => Ok(FitStatus::Running),
            "completed" => Ok(FitStatus::Completed),
            "failed" => Ok(FitStatus::Failed),
            other => Err(FitError::Serde(
                ErrorInfo::new("status-unknown", "unknown fit status")
                    .with_context("status", other.to_string()),
            )),
        }
    }
}

/// Small descriptor persisted at `search/metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitMetadata {
    /// Version of the metadata document layout.
    pub schema_version: SchemaVersion,
    /// Content-hash identifier of the fit.
    pub identifier: String,
    /// Search name from the configuration.
    pub name: String,
    /// Optional unique tag from the configuration.
    pub unique_tag: Option<String>,
    /// Backend name.
    pub search: String,
    /// Current lifecycle state.
    pub status: FitStatus,
    /// RFC 3339 timestamp of the first invocation.
    pub created_at: String,
    /// RFC 3339 timestamp of the last status change.
    pub updated_at: String,
}

impl FitMetadata {
    /// Atomically writes the document to `path`.
    pub fn write(&self, path: &Path) -> Result<(), FitError> {
        let bytes = to_canonical_json_bytes(self)?;
        write_atomic(path, &bytes)
    }

    /// Loads the document from `path`.
    pub fn load(path: &Path) -> Result<Self, FitError> {
        let bytes = fs::read(path).map_err(|err| {
            FitError::Persistence(
                ErrorInfo::new("read-metadata", "failed to read fit metadata")
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

    #[test]
    fn metadata_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let metadata = FitMetadata {
            schema_version: SchemaVersion::default(),
            identifier: "abc".into(),
            name: "demo".into(),
            unique_tag: Some("run-a".into()),
            search: "walkers".into(),
            status: FitStatus::Running,
            created_at: "2026-01-01T00:00:00+00:00".into(),
            updated_at: "2026-01-01T00:05:00+00:00".into(),
        };
        metadata.write(&path).unwrap();
        assert_eq!(FitMetadata::load(&path).unwrap(), metadata);
    }

    #[test]
    fn status_string_form_round_trips() {
        for status in [FitStatus::Running, FitStatus::Completed, FitStatus::Failed] {
            assert_eq!(FitStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(FitStatus::parse("paused").is_err());
    }
}
