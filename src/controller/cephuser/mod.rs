//! # CephUser Controller
//!
//! - `engine`: the per-record state machine
//! - `reconcile`: the controller entry point (deadline, metrics, failure reporting)

mod engine;
mod reconcile;

pub use engine::{CephUserEngine, UserPhase};
pub use reconcile::{reconcile, KIND};
