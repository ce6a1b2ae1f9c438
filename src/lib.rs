//! Batch lifecycle management for cloud service account keys.
//!
//! Authenticates once with a controller identity, discovers or creates a set
//! of service accounts sharing a name prefix, then issues, rotates, or deletes
//! their user-managed keys with pacing and a retry queue.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Batch driver, directory, reconciler, key manager, audit journal
//! - `models`: Data structures (accounts, keys, controller credential, settings)
//! - `provider`: Identity provider trait, IAM REST client, in-memory fake
//! - `util`: Filesystem helpers

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod provider;
pub mod util;
