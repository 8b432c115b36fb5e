#![deny(missing_docs)]

//! Core error, determinism, and canonical serialization primitives shared by
//! every NLF crate.

/// Structured error types shared across NLF crates.
pub mod errors;
/// Stable hashing over canonically serialized payloads.
pub mod hash;
/// Provenance and schema descriptors attached to persisted artifacts.
pub mod provenance;
/// Deterministic RNG wrapper and seed-derivation helpers.
pub mod rng;
/// Canonical JSON serialization helpers.
pub mod serde;

pub use errors::{ErrorInfo, FitError};
pub use hash::stable_hash_string;
pub use provenance::{FitProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, RngHandle};
pub use serde::{from_json_slice, to_canonical_json_bytes};
