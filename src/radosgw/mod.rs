//! # RADOS Gateway Admin
//!
//! Client for the RADOS Gateway admin API and the user service built on it.
//!
//! - `admin.rs` - `AdminApi` trait and the signed HTTP client
//! - `service.rs` - idempotency contracts over `AdminApi`
//! - `error.rs` - error kinds translated from admin API error codes
//! - `signing.rs` - SigV4 request signing
//! - `types.rs` - user and quota types

mod admin;
mod error;
mod service;
mod signing;
mod types;

pub use admin::{AdminApi, RgwAdminClient};
pub use error::{AdminError, AdminErrorKind};
pub use service::UserService;
pub use types::{NewUser, RgwUser, UserQuota};
