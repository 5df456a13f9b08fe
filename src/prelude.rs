//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use radosgw_user_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Collaborator seams, implemented by fakes in tests
pub use crate::backend::{Backend, BackendResolver};
pub use crate::controller::events::EventPublisher;
pub use crate::controller::records::RecordStore;
pub use crate::credentials::{CredentialPair, CredentialStore};
pub use crate::radosgw::{AdminApi, AdminError, AdminErrorKind, UserService};
pub use crate::registry::{ClientFactory, ClientRegistry};

// Reconciler types
pub use crate::controller::cephuser::{CephUserEngine, UserPhase};
pub use crate::controller::{BackoffState, Reconciler, ReconcilerError};

pub use crate::config::ControllerConfig;
