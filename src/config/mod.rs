//! # Configuration
//!
//! Controller-level settings loaded from the environment and command line.

mod controller;

pub use controller::{AdminVaultSettings, ControllerConfig, LogFormat};
