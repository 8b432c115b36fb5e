#![deny(missing_docs)]

//! Prior distributions and the model mapper tree for NLF.
//!
//! A [`Model`] is a named, declaration-ordered tree whose leaves are
//! [`Prior`] distributions. The tree fixes a stable depth-first traversal
//! order over free parameters, which is the positional contract between the
//! search backends (which address parameters by index) and user likelihood
//! code (which addresses them by path through an [`Instance`]).

/// Concrete parameter trees produced by the model mapper.
pub mod instance;
/// The named prior tree and its vector mapping operations.
pub mod model;
/// Leaf prior distributions over the unit interval.
pub mod prior;

pub use instance::{Instance, InstanceNode};
pub use model::{Model, ModelNode};
pub use prior::Prior;

/// Dotted path identifying one free parameter inside a [`Model`].
pub type ParamPath = String;
