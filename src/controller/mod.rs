//! # Controller
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `bucket`: Bucket lifecycle
//! - `cephuser`: CephUser state machine and entry point
//! - `conditions`: status written after each reconciliation
//! - `events`: Kubernetes Events
//! - `records`: field-level writes to managed resources
//! - `server`: HTTP server for metrics and health checks
//! - `types`: shared context and error type

pub mod backoff;
pub mod bucket;
pub mod cephuser;
pub mod conditions;
pub mod events;
pub mod records;
pub mod server;
pub mod types;

pub use types::{BackoffState, Reconciler, ReconcilerError};
