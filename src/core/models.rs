//! Core data models for blessing generation

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Style used when the caller does not pick one
pub const DEFAULT_STYLE: &str = "温馨";

/// Provider tier for completion calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderTier {
    /// Tried first
    Primary,
    /// Tried after a primary failure when fallback is enabled
    Fallback,
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderTier::Primary => write!(f, "primary"),
            ProviderTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// Connection settings for one OpenAI-compatible provider
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ProviderConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Full chat completion URL
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// Keeps the key out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Blessing generation request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Occasion, e.g. 生日
    #[serde(default)]
    pub scenario: String,
    /// Festival, empty when none
    #[serde(default)]
    pub festival: String,
    /// Recipient, e.g. 朋友
    #[serde(default)]
    pub target_person: String,
    /// Tone, defaults to 温馨
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Free-text description for smart mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_description: Option<String>,
    /// Request smart mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_smart_mode: Option<bool>,
}

impl GenerationOptions {
    /// Template-mode options
    pub fn template(scenario: impl Into<String>, target_person: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            target_person: target_person.into(),
            ..Default::default()
        }
    }

    /// Smart-mode options
    pub fn smart(description: impl Into<String>) -> Self {
        Self {
            custom_description: Some(description.into()),
            use_smart_mode: Some(true),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Trimmed description when it is non-empty
    pub fn description(&self) -> Option<&str> {
        self.custom_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// Smart mode only applies with an explicit flag and a non-blank description
    pub fn is_smart_mode(&self) -> bool {
        self.use_smart_mode == Some(true) && self.description().is_some()
    }

    /// Style or the default when absent or blank
    pub fn style_or_default(&self) -> &str {
        self.style
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STYLE)
    }
}

/// Successful generation response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlessingResponse {
    pub blessing: String,
}

/// Which window triggered a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    Minute,
    Daily,
}

/// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub admitted: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds at which the reported window resets
    #[serde(rename = "resetTime")]
    pub reset_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<LimitScope>,
}

impl RateLimitResult {
    pub fn admitted(limit: u64, remaining: u64, reset_at: i64) -> Self {
        Self {
            admitted: true,
            limit,
            remaining,
            reset_at,
            error_message: None,
            scope: None,
        }
    }

    pub fn rejected(scope: LimitScope, limit: u64, reset_at: i64, message: impl Into<String>) -> Self {
        Self {
            admitted: false,
            limit,
            remaining: 0,
            reset_at,
            error_message: Some(message.into()),
            scope: Some(scope),
        }
    }
}

/// Chat message in the OpenAI schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Outbound chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Chat completion response, only the parts we read
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Per-client request statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUsage {
    pub requests: u64,
    pub errors: u64,
    pub last_request: Option<chrono::DateTime<chrono::Utc>>,
    pub total_duration_ms: u64,
}

impl ClientUsage {
    pub fn avg_duration_ms(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.requests as f64
    }

    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.errors as f64 / self.requests as f64
    }
}
