//! # Runtime
//!
//! Process startup, the controller watch loops and their error policies.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;
