//! # Bucket Controller
//!
//! Thin lifecycle glue for Bucket resources, the consumer of the client registry.

mod engine;
mod reconcile;

pub use engine::{BucketEngine, KubeOwnerLookup, OwnerLookup};
pub use reconcile::{reconcile, KIND};
