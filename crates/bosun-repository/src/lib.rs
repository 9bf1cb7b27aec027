//! # Bosun Repository
//!
//! Storage ports consumed by the schedulers and the auto-recovery engine.
//!
//! ```text
//! Service / Engine
//!   ↓  Arc<dyn EquipmentRepository>, Arc<dyn PortStateRepository>, ...
//! MemoryStore (in-process implementation of every port)
//! ```
//!
//! A database-backed store implements the same traits; nothing above this
//! crate depends on the concrete type.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::*;
