//! # Bosun Domain
//!
//! Entities shared by the storage port, the schedulers, and the
//! auto-recovery engine.

pub mod entities;

pub use entities::*;
