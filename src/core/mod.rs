//! Core business logic modules.

pub mod audit_log;
pub mod batch;
pub mod controller;
pub mod directory;
pub mod file_lock;
pub mod flows;
pub mod keys;
pub mod output;
pub mod pacing;
pub mod paths;
pub mod reconcile;
pub mod settings;
