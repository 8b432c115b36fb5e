//! On-disk layout of a fit's output directory.
//!
//! Every fit owns `<path_prefix>/<name>/<identifier>/` with a `search/`
//! subdirectory for driver state and an `attached/` subdirectory for consumer
//! objects. All writes go through an atomic temp-file-then-rename step so a
//! crash never leaves a partially written artifact behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use nlf_core::{from_json_slice, to_canonical_json_bytes, ErrorInfo, FitError};
use serde::Serialize;
use serde_json::Value;

/// Resolved output directories for one fit.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    root: PathBuf,
}

impl SearchPaths {
    /// Resolves and creates the output directories for a fit.
    pub fn create(path_prefix: &Path, name: &str, identifier: &str) -> Result<Self, FitError> {
        let root = path_prefix.join(name).join(identifier);
        let paths = Self { root };
        for dir in [paths.root.clone(), paths.search_dir(), paths.attached_dir()] {
            fs::create_dir_all(&dir).map_err(|err| io_error("create-dir", &dir, &err))?;
        }
        Ok(paths)
    }

    /// The fit's root output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding driver-owned state.
    pub fn search_dir(&self) -> PathBuf {
        self.root.join("search")
    }

    /// Directory holding consumer-attached objects.
    pub fn attached_dir(&self) -> PathBuf {
        self.root.join("attached")
    }

    /// Location of the resumable checkpoint.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.search_dir().join("checkpoint.json")
    }

    /// Location of the fit metadata document.
    pub fn metadata_path(&self) -> PathBuf {
        self.search_dir().join("metadata.json")
    }

    /// Location of the human-readable model listing.
    pub fn model_info_path(&self) -> PathBuf {
        self.root.join("model.info")
    }

    /// Location of the human-readable results summary.
    pub fn model_results_path(&self) -> PathBuf {
        self.root.join("model.results")
    }

    /// Serializes `value` under `attached/<name>.json`. Re-saving under the
    /// same name replaces the previous object.
    pub fn save_object<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, FitError> {
        check_object_name(name)?;
        let bytes = to_canonical_json_bytes(value)?;
        let path = self.attached_dir().join(format!("{name}.json"));
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Loads a previously attached object by name.
    pub fn load_object(&self, name: &str) -> Result<Value, FitError> {
        check_object_name(name)?;
        let path = self.attached_dir().join(format!("{name}.json"));
        let bytes = fs::read(&path).map_err(|err| io_error("read-object", &path, &err))?;
        from_json_slice(&bytes)
    }

    /// Lists every attached object as `(name, value)`, sorted by name.
    pub fn attached_objects(&self) -> Result<Vec<(String, Value)>, FitError> {
        let dir = self.attached_dir();
        let mut out = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|err| io_error("read-dir", &dir, &err))?;
        for entry in entries {
            let entry = entry.map_err(|err| io_error("read-dir", &dir, &err))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let bytes = fs::read(&path).map_err(|err| io_error("read-object", &path, &err))?;
            out.push((name.to_string(), from_json_slice(&bytes)?));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

/// Writes `bytes` to `path` via a temp file in the same directory followed by
/// an atomic rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FitError> {
    let parent = path.parent().ok_or_else(|| {
        FitError::Persistence(
            ErrorInfo::new("write-atomic", "target path has no parent directory")
                .with_context("path", path.display().to_string()),
        )
    })?;
    fs::create_dir_all(parent).map_err(|err| io_error("create-dir", parent, &err))?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|err| io_error("temp-file", parent, &err))?;
    temp.write_all(bytes)
        .map_err(|err| io_error("write", path, &err))?;
    temp.persist(path)
        .map_err(|err| io_error("rename", path, &err.error))?;
    Ok(())
}

fn check_object_name(name: &str) -> Result<(), FitError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(FitError::Configuration(
            ErrorInfo::new("object-name", "attached object names must be alphanumeric")
                .with_context("name", name.to_string()),
        ));
    }
    Ok(())
}

fn io_error(code: &str, path: &Path, err: &std::io::Error) -> FitError {
    FitError::Persistence(
        ErrorInfo::new(code, "filesystem operation failed")
            .with_context("path", path.display().to_string())
            .with_context("error", err.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_created_under_prefix_name_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SearchPaths::create(dir.path(), "demo", "abc123").unwrap();
        assert!(paths.search_dir().is_dir());
        assert!(paths.attached_dir().is_dir());
        assert!(paths.root().ends_with("demo/abc123"));
    }

    #[test]
    fn objects_round_trip_and_resaving_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SearchPaths::create(dir.path(), "demo", "abc123").unwrap();
        paths.save_object("dataset", &serde_json::json!({"n": 3})).unwrap();
        paths.save_object("dataset", &serde_json::json!({"n": 7})).unwrap();
        assert_eq!(paths.load_object("dataset").unwrap()["n"], 7);
        let listed = paths.attached_objects().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "dataset");
    }

    #[test]
    fn path_separators_in_object_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SearchPaths::create(dir.path(), "demo", "abc123").unwrap();
        assert!(paths.save_object("../escape", &1).is_err());
    }
}
