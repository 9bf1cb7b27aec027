//! # Bosun Server Library
//!
//! Wiring of the worker process: storage, job queue, cron schedules and the
//! auto-recovery engine, plus startup utilities.

pub mod app;
pub mod startup;
