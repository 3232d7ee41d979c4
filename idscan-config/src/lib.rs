//! Configuration loading for the idscan orchestration engine.
//!
//! Resolves an [`OrchestratorConfig`](idscan_core::OrchestratorConfig) from a
//! file, inline JSON or built-in defaults, applies per-field environment
//! overrides, validates it and reports guard-rail warnings for settings that
//! are legal but unlikely to behave as intended.
#![allow(missing_docs)]

pub mod error;
pub mod loader;
pub mod util;
pub mod validation;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader, ConfigSource};
pub use validation::{ConfigWarning, ConfigWarnings, guard_rails};
