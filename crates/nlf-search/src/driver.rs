//! The checkpointed search driver.
//!
//! `SearchDriver::fit` owns the whole fit lifecycle: identifier derivation,
//! output directory setup, resume validation, the propose/evaluate/observe
//! loop, checkpointing, and the final commit to a persistence sink. Each
//! iteration runs with an RNG seeded from `(master_seed, iteration)`, so a
//! resumed run replays exactly the stream an uninterrupted run would have
//! used.

use std::collections::BTreeMap;
use std::path::Path;
use std::thread;
use std::time::Duration;

use nlf_core::{
    to_canonical_json_bytes, ErrorInfo, FitError, FitProvenance, RngHandle, SchemaVersion,
};
use nlf_model::{Instance, Model};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::analysis::Analysis;
use crate::backend::SearchBackend;
use crate::checkpoint::CheckpointPayload;
use crate::config::SearchConfig;
use crate::determinism::iteration_seed;
use crate::identifier::fit_identifier;
use crate::metadata::{FitMetadata, FitStatus};
use crate::paths::{write_atomic, SearchPaths};
use crate::result::{FitRecord, FitResult, FitSink};
use crate::samples::{Sample, SampleSet};

/// Drives a search backend against an analysis until convergence.
pub struct SearchDriver<B: SearchBackend> {
    backend: B,
    config: SearchConfig,
}

impl<B: SearchBackend> SearchDriver<B> {
    /// Creates a driver for one backend and configuration.
    pub fn new(backend: B, config: SearchConfig) -> Self {
        Self { backend, config }
    }

    /// The driver's configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs the fit to convergence, resuming from a checkpoint when one
    /// exists under the fit's identifier.
    ///
    /// `info` is free-form consumer annotation stored with the fit record.
    /// When `sink` is given, the completed fit is committed through it.
    pub fn fit<A: Analysis>(
        &mut self,
        model: &Model,
        analysis: &A,
        info: &BTreeMap<String, String>,
        sink: Option<&dyn FitSink>,
    ) -> Result<FitResult, FitError> {
        model.validate()?;
        self.config.validate()?;
        let dim = model.prior_count();

        let backend_config = self.backend.config_value()?;
        let identifier = fit_identifier(
            model,
            self.backend.name(),
            &backend_config,
            self.config.unique_tag.as_deref(),
        )?;
        let paths = SearchPaths::create(&self.config.path_prefix, &self.config.name, &identifier)?;
        write_atomic(&paths.model_info_path(), model.info().as_bytes())?;

        let checkpoint_path = paths.checkpoint_path();
        let mut iteration;
        let mut samples;
        if checkpoint_path.exists() {
            let payload = CheckpointPayload::load(&checkpoint_path)?;
            self.validate_resume(model, &backend_config, &identifier, &payload)?;
            self.backend.initialize(dim)?;
            self.backend.restore_state(&payload.backend_state)?;
            iteration = payload.iteration;
            samples = payload.samples;
            info!(
                identifier = %identifier,
                iteration,
                samples = samples.len(),
                "resuming fit from checkpoint"
            );
        } else {
            self.backend.initialize(dim)?;
            iteration = 0;
            samples = SampleSet::new(dim);
            analysis.save_attributes(&paths)?;
            info!(identifier = %identifier, search = self.backend.name(), "starting fit");
        }
        let created_at = match FitMetadata::load(&paths.metadata_path()) {
            Ok(existing) => existing.created_at,
            Err(_) => chrono::Utc::now().to_rfc3339(),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.number_of_cores)
            .build()
            .map_err(|err| {
                FitError::Configuration(
                    ErrorInfo::new("thread-pool", "failed to build evaluation thread pool")
                        .with_context("error", err.to_string()),
                )
            })?;

        let mut invocation_iterations = 0usize;
        let mut paused = false;
        while !self.backend.converged() {
            if let Some(budget) = self.config.max_iterations_per_invocation {
                if invocation_iterations >= budget {
                    paused = true;
                    break;
                }
            }

            let mut rng =
                RngHandle::from_seed(iteration_seed(self.config.master_seed, iteration));
            let proposals = self.backend.propose(&mut rng)?;
            if proposals.is_empty() {
                return Err(FitError::Configuration(
                    ErrorInfo::new("backend-batch", "backend proposed an empty batch")
                        .with_context("search", self.backend.name().to_string()),
                ));
            }
            let instances: Vec<Instance> = proposals
                .iter()
                .map(|unit| model.instance_from_unit_vector(unit))
                .collect::<Result<_, _>>()?;
            let log_likelihoods: Vec<f64> = pool.install(|| {
                instances
                    .par_iter()
                    .map(|instance| {
                        let ll = analysis.log_likelihood(instance);
                        if ll.is_nan() {
                            f64::NEG_INFINITY
                        } else {
                            ll
                        }
                    })
                    .collect()
            });
            let evaluated: Vec<(Vec<f64>, f64)> =
                proposals.into_iter().zip(log_likelihoods).collect();
            let accepted = self.backend.observe(&evaluated, &mut rng)?;
            for draw in accepted {
                let params = model.physical_from_unit_vector(&draw.unit)?;
                samples.append(Sample {
                    unit: draw.unit,
                    params,
                    log_likelihood: draw.log_likelihood,
                    weight: draw.weight,
                })?;
            }
            iteration += 1;
            invocation_iterations += 1;

            if iteration % self.config.iterations_per_update == 0 {
                debug!(iteration, samples = samples.len(), "checkpointing");
                self.persist_or_fail(&paths, iteration, model, &samples, &identifier, &created_at)?;
                self.write_metadata(&paths, &identifier, FitStatus::Running, &created_at)?;
                run_visualize(analysis, &paths, model, &samples, true);
            }
        }

        if paused {
            info!(identifier = %identifier, iteration, "iteration budget reached, pausing");
            self.persist_or_fail(&paths, iteration, model, &samples, &identifier, &created_at)?;
            self.write_metadata(&paths, &identifier, FitStatus::Running, &created_at)?;
            return Ok(FitResult::new(
                identifier,
                FitStatus::Running,
                model.clone(),
                samples,
            ));
        }

        for draw in self.backend.drain()? {
            let params = model.physical_from_unit_vector(&draw.unit)?;
            samples.append(Sample {
                unit: draw.unit,
                params,
                log_likelihood: draw.log_likelihood,
                weight: draw.weight,
            })?;
        }
        self.persist_or_fail(&paths, iteration, model, &samples, &identifier, &created_at)?;
        write_atomic(
            &paths.model_results_path(),
            results_summary(model, &samples).as_bytes(),
        )?;
        self.write_metadata(&paths, &identifier, FitStatus::Completed, &created_at)?;
        run_visualize(analysis, &paths, model, &samples, false);
        info!(identifier = %identifier, iteration, samples = samples.len(), "fit completed");

        if let Some(sink) = sink {
            let record = FitRecord {
                identifier: identifier.clone(),
                name: self.config.name.clone(),
                path_prefix: self.config.path_prefix.display().to_string(),
                unique_tag: self.config.unique_tag.clone(),
                model: model.clone(),
                search_class: self.backend.name().to_string(),
                search_config: backend_config,
                info: info.clone(),
                status: FitStatus::Completed,
                created_at,
                updated_at: chrono::Utc::now().to_rfc3339(),
            };
            let objects = paths.attached_objects()?;
            sink.commit_fit(&record, &samples, &objects)?;
        }
        Ok(FitResult::new(
            identifier,
            FitStatus::Completed,
            model.clone(),
            samples,
        ))
    }

    fn validate_resume(
        &self,
        model: &Model,
        backend_config: &serde_json::Value,
        identifier: &str,
        payload: &CheckpointPayload,
    ) -> Result<(), FitError> {
        model.structural_match(&payload.model)?;
        if payload.provenance.identifier != identifier {
            return Err(FitError::ResumeConflict(
                ErrorInfo::new("identifier", "checkpoint belongs to a different fit")
                    .with_context("live", identifier.to_string())
                    .with_context("stored", payload.provenance.identifier.clone()),
            ));
        }
        if payload.backend_name != self.backend.name() {
            return Err(FitError::ResumeConflict(
                ErrorInfo::new("backend-name", "checkpoint was written by a different backend")
                    .with_context("live", self.backend.name().to_string())
                    .with_context("stored", payload.backend_name.clone()),
            ));
        }
        if to_canonical_json_bytes(&payload.backend_config)?
            != to_canonical_json_bytes(backend_config)?
        {
            return Err(FitError::ResumeConflict(ErrorInfo::new(
                "backend-config",
                "checkpoint was written with a different backend configuration",
            )));
        }
        if payload.provenance.seed != self.config.master_seed {
            return Err(FitError::ResumeConflict(
                ErrorInfo::new("master-seed", "checkpoint was written with a different seed")
                    .with_context("live", self.config.master_seed.to_string())
                    .with_context("stored", payload.provenance.seed.to_string())
                    .with_hint("resume with the original master_seed to keep streams replayable"),
            ));
        }
        Ok(())
    }

    /// Checkpoints, and on retry exhaustion marks the fit `Failed` before
    /// surfacing the error. The last good checkpoint stays on disk.
    fn persist_or_fail(
        &mut self,
        paths: &SearchPaths,
        iteration: usize,
        model: &Model,
        samples: &SampleSet,
        identifier: &str,
        created_at: &str,
    ) -> Result<(), FitError> {
        if let Err(err) = self.persist_progress(paths, iteration, model, samples, identifier) {
            if let Err(meta_err) =
                self.write_metadata(paths, identifier, FitStatus::Failed, created_at)
            {
                warn!(error = %meta_err, "could not record failed status");
            }
            return Err(err);
        }
        Ok(())
    }

    fn persist_progress(
        &mut self,
        paths: &SearchPaths,
        iteration: usize,
        model: &Model,
        samples: &SampleSet,
        identifier: &str,
    ) -> Result<(), FitError> {
        let payload = CheckpointPayload {
            schema_version: SchemaVersion::default(),
            provenance: FitProvenance::stamp(identifier, self.config.master_seed),
            iteration,
            model: model.clone(),
            backend_name: self.backend.name().to_string(),
            backend_config: self.backend.config_value()?,
            backend_state: self.backend.state_value()?,
            samples: samples.clone(),
        };
        store_with_retry(
            &payload,
            &paths.checkpoint_path(),
            self.config.persistence_retries,
            self.config.retry_backoff_ms,
        )
    }

    fn write_metadata(
        &self,
        paths: &SearchPaths,
        identifier: &str,
        status: FitStatus,
        created_at: &str,
    ) -> Result<(), FitError> {
        let metadata = FitMetadata {
            schema_version: SchemaVersion::default(),
            identifier: identifier.to_string(),
            name: self.config.name.clone(),
            unique_tag: self.config.unique_tag.clone(),
            search: self.backend.name().to_string(),
            status,
            created_at: created_at.to_string(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        metadata.write(&paths.metadata_path())
    }
}

fn store_with_retry(
    payload: &CheckpointPayload,
    path: &Path,
    retries: usize,
    backoff_ms: u64,
) -> Result<(), FitError> {
    let mut attempt = 0usize;
    loop {
        match payload.store(path) {
            Ok(()) => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt > retries {
                    return Err(FitError::Persistence(
                        err.info()
                            .clone()
                            .with_context("attempts", attempt.to_string())
                            .with_hint(
                                "checkpoint retries exhausted; the last checkpoint on disk is \
                                 still valid for resuming",
                            ),
                    ));
                }
                warn!(attempt, error = %err, "checkpoint write failed, retrying");
                thread::sleep(Duration::from_millis(
                    backoff_ms.saturating_mul(attempt as u64),
                ));
            }
        }
    }
}

fn run_visualize<A: Analysis>(
    analysis: &A,
    paths: &SearchPaths,
    model: &Model,
    samples: &SampleSet,
    during_analysis: bool,
) {
    if samples.is_empty() {
        return;
    }
    match samples.max_log_likelihood_instance(model) {
        Ok(instance) => {
            if let Err(err) = analysis.visualize(paths, &instance, during_analysis) {
                warn!(error = %err, during_analysis, "visualization hook failed");
            }
        }
        Err(err) => debug!(error = %err, "skipping visualization"),
    }
}

fn results_summary(model: &Model, samples: &SampleSet) -> String {
    let paths = model.paths();
    let mut out = String::new();
    let best = match samples.max_log_likelihood_sample() {
        Ok(best) => best,
        Err(_) => return "No samples were recorded.\n".to_string(),
    };
    out.push_str(&format!(
        "Maximum log likelihood: {:.6}\n\nMaximum likelihood model\n\n",
        best.log_likelihood
    ));
    for (path, value) in paths.iter().zip(&best.params) {
        out.push_str(&format!("{path:<40} {value:.6}\n"));
    }
    if let Ok(median) = samples.median_pdf_vector() {
        out.push_str("\nMedian PDF model\n\n");
        for (path, value) in paths.iter().zip(&median) {
            out.push_str(&format!("{path:<40} {value:.6}\n"));
        }
    }
    if let Ok(covariance) = samples.covariance_matrix() {
        out.push_str("\nParameter standard deviations\n\n");
        for (axis, path) in paths.iter().enumerate() {
            out.push_str(&format!(
                "{path:<40} {:.6}\n",
                covariance[axis][axis].max(0.0).sqrt()
            ));
        }
    }
    out
}
