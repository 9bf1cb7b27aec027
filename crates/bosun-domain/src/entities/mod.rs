//! Domain entities.

mod diagnostics;
mod edge;
mod equipment;
mod ml_model;
mod retraining;

pub use diagnostics::*;
pub use edge::*;
pub use equipment::*;
pub use ml_model::*;
pub use retraining::*;

/// Generates a new opaque record identifier.
#[must_use]
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
