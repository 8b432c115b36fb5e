//! Sqlite registry for completed fits and the aggregator query layer.

mod query;
mod schema;
mod session;

pub use query::{Aggregator, FitHandle, FitQuery, InfoRange};
pub use schema::SCHEMA_VERSION;
pub use session::Session;
