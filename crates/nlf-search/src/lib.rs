#![deny(missing_docs)]

//! Stochastic search backends and the checkpoint/resume fit driver.

/// The likelihood contract implemented by fit consumers.
pub mod analysis;
/// The pluggable stochastic search backend interface.
pub mod backend;
/// Checkpoint payloads persisted between driver invocations.
pub mod checkpoint;
/// Random-restart stochastic hill climbing backend.
pub mod climb;
/// Search configuration and its defaults.
pub mod config;
/// Per-iteration seed derivation.
pub mod determinism;
/// The checkpointed search driver.
pub mod driver;
/// Deterministic fit identifiers.
pub mod identifier;
pub(crate) mod json_float;
/// Fit metadata written alongside checkpoints.
pub mod metadata;
/// Static nested sampling backend.
pub mod nested;
/// On-disk layout of a fit's output directory.
pub mod paths;
/// Fit results, registry records, and the persistence sink trait.
pub mod result;
/// Weighted posterior samples and their summaries.
pub mod samples;
/// Affine-invariant ensemble walker backend.
pub mod walkers;

pub use analysis::Analysis;
pub use backend::{AcceptedDraw, SearchBackend};
pub use checkpoint::CheckpointPayload;
pub use climb::StochasticHillClimb;
pub use config::SearchConfig;
pub use determinism::iteration_seed;
pub use driver::SearchDriver;
pub use identifier::fit_identifier;
pub use metadata::{FitMetadata, FitStatus};
pub use nested::StaticNestedSampler;
pub use paths::SearchPaths;
pub use result::{FitRecord, FitResult, FitSink};
pub use samples::{Sample, SampleSet};
pub use walkers::EnsembleWalkers;
