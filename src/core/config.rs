//! Configuration management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::core::models::ProviderConfig;

const DEFAULT_PRIMARY_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_PRIMARY_MODEL: &str = "deepseek-chat";
const DEFAULT_FALLBACK_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_FALLBACK_MODEL: &str = "gpt-3.5-turbo";

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TIMEOUT_MS: u64 = 30000;

const DEFAULT_MINUTE_MAX: u64 = 8;
const DEFAULT_MINUTE_WINDOW_SECS: u64 = 60;
const DEFAULT_DAILY_MAX: u64 = 50;

/// Fixed-window limits for the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per minute window
    pub minute_max: u64,
    /// Minute window length in seconds
    pub minute_window_secs: u64,
    /// Requests allowed per UTC day
    pub daily_max: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            minute_max: DEFAULT_MINUTE_MAX,
            minute_window_secs: DEFAULT_MINUTE_WINDOW_SECS,
            daily_max: DEFAULT_DAILY_MAX,
        }
    }
}

/// Redis-compatible REST key-value store
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct KvConfig {
    pub url: String,
    pub token: String,
}

impl fmt::Debug for KvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvConfig")
            .field("url", &self.url)
            .field("token", &"***")
            .finish()
    }
}

/// Service configuration, read once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub primary: Option<ProviderConfig>,
    pub fallback: Option<ProviderConfig>,
    pub enable_fallback: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,
    pub rate_limit: RateLimitConfig,
    pub kv: Option<KvConfig>,
    /// Local development: rate limiter degrades to memory when the store fails
    pub development: bool,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            primary: None,
            fallback: None,
            enable_fallback: false,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rate_limit: RateLimitConfig::default(),
            kv: None,
            development: false,
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Parses a positive number, falling back to `default` when unset, malformed, or not positive
fn positive_or<T>(raw: Option<String>, default: T) -> T
where
    T: FromStr + PartialOrd + Default,
{
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn provider_from<F>(lookup: &F, prefix: &str, default_url: &str, default_model: &str) -> Option<ProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = non_empty(lookup(&format!("{}_AI_API_KEY", prefix)))?;
    let base_url = non_empty(lookup(&format!("{}_AI_BASE_URL", prefix)))
        .unwrap_or_else(|| default_url.to_string());
    let model = non_empty(lookup(&format!("{}_AI_MODEL", prefix)))
        .unwrap_or_else(|| default_model.to_string());

    Some(ProviderConfig {
        api_key,
        base_url,
        model,
    })
}

/// Only the exact string `true` enables a flag
fn flag(raw: Option<String>) -> bool {
    raw.as_deref() == Some("true")
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let primary = provider_from(&lookup, "PRIMARY", DEFAULT_PRIMARY_BASE_URL, DEFAULT_PRIMARY_MODEL);
        let fallback = provider_from(&lookup, "FALLBACK", DEFAULT_FALLBACK_BASE_URL, DEFAULT_FALLBACK_MODEL);

        let kv = match (
            non_empty(lookup("KV_REST_API_URL")),
            non_empty(lookup("KV_REST_API_TOKEN")),
        ) {
            (Some(url), Some(token)) => Some(KvConfig { url, token }),
            (Some(_), None) => {
                warn!("KV_REST_API_URL is set without KV_REST_API_TOKEN, using in-memory rate limiting");
                None
            }
            _ => None,
        };

        let development = lookup("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("development"))
            .unwrap_or(false);

        Self {
            primary,
            fallback,
            enable_fallback: flag(lookup("ENABLE_FALLBACK")),
            max_tokens: positive_or(lookup("AI_MAX_TOKENS"), DEFAULT_MAX_TOKENS),
            temperature: positive_or(lookup("AI_TEMPERATURE"), DEFAULT_TEMPERATURE),
            timeout_ms: positive_or(lookup("AI_TIMEOUT"), DEFAULT_TIMEOUT_MS),
            rate_limit: RateLimitConfig {
                minute_max: positive_or(lookup("RATE_LIMIT_PER_MINUTE"), DEFAULT_MINUTE_MAX),
                minute_window_secs: DEFAULT_MINUTE_WINDOW_SECS,
                daily_max: positive_or(lookup("RATE_LIMIT_PER_DAY"), DEFAULT_DAILY_MAX),
            },
            kv,
            development,
            host: non_empty(lookup("HOST")).unwrap_or(defaults.host),
            port: positive_or(lookup("PORT"), defaults.port),
        }
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.primary.is_none() && self.fallback.is_none() {
            warn!("No AI provider configured, generation requests will fail");
        }

        if self.enable_fallback && self.fallback.is_none() {
            warn!("ENABLE_FALLBACK is set but FALLBACK_AI_API_KEY is missing");
        }

        if self.rate_limit.minute_max == 0 || self.rate_limit.daily_max == 0 {
            return Err(anyhow::anyhow!("rate limits must be greater than 0"));
        }

        if self.rate_limit.minute_window_secs == 0 {
            return Err(anyhow::anyhow!("minute window must be greater than 0"));
        }

        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Log a one-line summary without secrets
    pub fn log_summary(&self) {
        info!(
            "Providers: primary={}, fallback={} (enabled: {}), store={}, development={}",
            self.primary.as_ref().map(|p| p.model.as_str()).unwrap_or("none"),
            self.fallback.as_ref().map(|p| p.model.as_str()).unwrap_or("none"),
            self.enable_fallback,
            if self.kv.is_some() { "kv" } else { "memory" },
            self.development,
        );
    }
}
