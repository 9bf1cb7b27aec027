//! # Bosun Config
//!
//! Layered configuration for the Bosun server: TOML files, `.env`, and
//! `BOSUN_`-prefixed environment variables, validated before use.

mod app_config;
mod loader;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use validation::*;
