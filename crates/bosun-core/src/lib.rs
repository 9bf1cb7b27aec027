//! # Bosun Core
//!
//! Core error definitions, result aliases, and tracing setup shared by
//! every Bosun crate.

pub mod error;
pub mod result;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use error::*;
pub use result::*;

// Re-export shaku for component interfaces
pub use shaku::Interface;
