//! # Observability
//!
//! - `metrics`: Prometheus metrics collection
//! - `tracker`: per-call timing of remote operations

pub mod metrics;
mod tracker;

pub use tracker::OperationTracker;
