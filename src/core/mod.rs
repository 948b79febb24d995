//! Core blessing generation engine

pub mod client;
pub mod config;
pub mod errors;
pub mod identity;
pub mod models;
pub mod prompt;
pub mod rate_limit;
pub mod store;
pub mod usage_monitor;
pub mod validation;
