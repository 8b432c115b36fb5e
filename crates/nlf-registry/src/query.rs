//! Aggregator queries over stored fits.
//!
//! Predicates combine with AND. String filtering over info keys happens on
//! the indexed fit_info table shape, but predicate evaluation itself runs in
//! Rust against loaded records: registries hold hundreds of fits, not
//! millions, and this keeps range and class predicates trivially correct.

use std::collections::BTreeMap;

use nlf_core::{ErrorInfo, FitError};
use nlf_search::{FitRecord, FitResult, FitStatus, SampleSet};
use serde_json::Value;

use crate::session::Session;

/// Numeric range predicate over one info key.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoRange {
    /// Info key whose value is parsed as a float.
    pub key: String,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

/// Conjunction of predicates over stored fits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitQuery {
    /// Exact-match predicates over info keys.
    pub info_equals: BTreeMap<String, String>,
    /// Numeric range predicates over info keys.
    pub info_ranges: Vec<InfoRange>,
    /// Filter on the model class label.
    pub model_class: Option<String>,
    /// Filter on the backend name.
    pub search_class: Option<String>,
    /// Filter on the lifecycle status.
    pub status: Option<FitStatus>,
}

impl FitQuery {
    /// An empty query matching every stored fit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `info[key] == value`.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info_equals.insert(key.into(), value.into());
        self
    }

    /// Requires `min <= parse(info[key]) <= max`.
    pub fn with_info_range(mut self, key: impl Into<String>, min: f64, max: f64) -> Self {
        self.info_ranges.push(InfoRange {
            key: key.into(),
            min,
            max,
        });
        self
    }

    /// Requires a matching model class label.
    pub fn with_model_class(mut self, class: impl Into<String>) -> Self {
        self.model_class = Some(class.into());
        self
    }

    /// Requires a matching backend name.
    pub fn with_search_class(mut self, class: impl Into<String>) -> Self {
        self.search_class = Some(class.into());
        self
    }

    /// Requires a matching lifecycle status.
    pub fn with_status(mut self, status: FitStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn validate(&self) -> Result<(), FitError> {
        for range in &self.info_ranges {
            if range.min > range.max || range.min.is_nan() || range.max.is_nan() {
                return Err(FitError::Query(
                    ErrorInfo::new("range-malformed", "range lower bound exceeds upper bound")
                        .with_context("key", range.key.clone())
                        .with_context("min", range.min.to_string())
                        .with_context("max", range.max.to_string()),
                ));
            }
        }
        Ok(())
    }

    fn matches(&self, record: &FitRecord) -> bool {
        for (key, value) in &self.info_equals {
            if record.info.get(key) != Some(value) {
                return false;
            }
        }
        for range in &self.info_ranges {
            let Some(parsed) = record.info.get(&range.key).and_then(|v| v.parse::<f64>().ok())
            else {
                return false;
            };
            if parsed < range.min || parsed > range.max {
                return false;
            }
        }
        if let Some(class) = &self.model_class {
            if record.model.class_label() != *class {
                return false;
            }
        }
        if let Some(class) = &self.search_class {
            if record.search_class != *class {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        true
    }
}

/// Query interface over one registry session.
pub struct Aggregator<'a> {
    session: &'a Session,
}

impl<'a> Aggregator<'a> {
    /// Creates an aggregator over `session`.
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Returns handles for every fit matching `query`, ordered by creation
    /// time.
    pub fn query(&self, query: &FitQuery) -> Result<Vec<FitHandle<'a>>, FitError> {
        query.validate()?;
        Ok(self
            .session
            .all_fits()?
            .into_iter()
            .filter(|record| query.matches(record))
            .map(|record| FitHandle {
                session: self.session,
                record,
            })
            .collect())
    }
}

/// Lazy handle to one stored fit.
///
/// The record is loaded eagerly; samples and attached objects are fetched
/// from the database only when asked for.
pub struct FitHandle<'a> {
    session: &'a Session,
    record: FitRecord,
}

impl std::fmt::Debug for FitHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitHandle")
            .field("identifier", &self.record.identifier)
            .field("name", &self.record.name)
            .field("status", &self.record.status)
            .finish()
    }
}

impl FitHandle<'_> {
    /// The fit's identifier.
    pub fn identifier(&self) -> &str {
        &self.record.identifier
    }

    /// The stored record.
    pub fn record(&self) -> &FitRecord {
        &self.record
    }

    /// Loads the fit's samples.
    pub fn samples(&self) -> Result<SampleSet, FitError> {
        self.session.load_samples(&self.record.identifier)
    }

    /// Reconstructs the full fit result.
    pub fn result(&self) -> Result<FitResult, FitError> {
        let samples = self.samples()?;
        Ok(FitResult::new(
            self.record.identifier.clone(),
            self.record.status,
            self.record.model.clone(),
            samples,
        ))
    }

    /// Loads one attached object by name.
    pub fn object(&self, name: &str) -> Result<Value, FitError> {
        self.session.load_object(&self.record.identifier, name)
    }
}
