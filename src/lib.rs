//! Blessing Service - AI greeting generation behind a rate-limited HTTP API
//!
//! This library builds prompts from user selections, calls OpenAI-compatible
//! completion providers with a primary/fallback tier, and admits clients
//! through fixed-window per-minute and per-day counters.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod server;

// Re-export key types for convenience
pub use core::{
    client::{BlessingGenerator, CompletionClient},
    config::{AppConfig, RateLimitConfig},
    errors::{CompletionError, GateError, StoreError, ValidationError},
    models::{BlessingResponse, GenerationOptions, RateLimitResult},
    prompt::build_prompt,
    rate_limit::AdmissionGate,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
