//! RADOS Gateway User Controller Library
//!
//! Reconciles `CephUser` resources onto Ceph RADOS Gateway users, persists
//! their generated credentials in Vault (or a legacy Kubernetes Secret), and
//! manages `Bucket` resources with each user's own S3 client.
//!
//! ## Quick Start
//!
//! ```rust
//! use radosgw_user_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod backend;
pub mod config;
pub mod constants;
pub mod controller;
pub mod credentials;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod radosgw;
pub mod registry;
pub mod runtime;
pub mod s3;
pub mod vault;
