//! Data structures shared by the provider, core, and CLI layers.

pub mod account;
pub mod controller;
pub mod settings;
