//! Completion client with primary/fallback tier logic

use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::core::config::AppConfig;
use crate::core::errors::{CompletionError, Result};
use crate::core::models::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, GenerationOptions, ProviderConfig,
    ProviderTier,
};
use crate::core::prompt::build_prompt;

/// Single-attempt client for OpenAI-compatible chat completion endpoints
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    max_tokens: u32,
    temperature: f32,
}

impl CompletionClient {
    /// Create a new client
    pub fn new(max_tokens: u32, temperature: f32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            max_tokens,
            temperature,
        })
    }

    /// Create from application config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.max_tokens,
            config.temperature,
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Send one chat completion request and return the first choice's content
    pub async fn complete(&self, provider: &ProviderConfig, prompt: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &provider.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        debug!("POST {} (model: {})", provider.completions_url(), provider.model);

        let response = self
            .client
            .post(provider.completions_url())
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let provider_message = serde_json::from_str::<serde_json::Value>(&error_text)
                .ok()
                .and_then(|json| json["error"]["message"].as_str().map(|s| s.to_string()));

            return Err(CompletionError::Api {
                status: status.as_u16(),
                provider_message,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse {
                message: "No choices in response".to_string(),
            })
    }
}

/// Blessing generator over the configured provider tiers
#[derive(Debug, Clone)]
pub struct BlessingGenerator {
    client: CompletionClient,
    primary: Option<ProviderConfig>,
    fallback: Option<ProviderConfig>,
    enable_fallback: bool,
}

impl BlessingGenerator {
    pub fn new(
        client: CompletionClient,
        primary: Option<ProviderConfig>,
        fallback: Option<ProviderConfig>,
        enable_fallback: bool,
    ) -> Self {
        Self {
            client,
            primary,
            fallback,
            enable_fallback,
        }
    }

    /// Create from application config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = CompletionClient::from_config(config)?;
        Ok(Self::new(
            client,
            config.primary.clone(),
            config.fallback.clone(),
            config.enable_fallback,
        ))
    }

    /// Whether any tier can be called
    pub fn is_configured(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    /// Build the prompt for `options` and generate
    pub async fn generate(&self, options: &GenerationOptions) -> Result<String> {
        let prompt = build_prompt(options);
        self.generate_blessing(&prompt).await
    }

    /// Generate a blessing, trying the fallback tier after a primary failure when enabled.
    ///
    /// When both tiers fail the fallback's error is returned; the primary failure is only
    /// logged.
    pub async fn generate_blessing(&self, prompt: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(CompletionError::Configuration {
                message: "未配置任何AI API，请检查环境变量".to_string(),
            });
        }

        if let Some(primary) = &self.primary {
            match self.call_tier(ProviderTier::Primary, primary, prompt).await {
                Ok(blessing) => return Ok(blessing),
                Err(e) => {
                    if !self.enable_fallback || self.fallback.is_none() {
                        error!("Primary provider failed with no fallback available: {}", e);
                        return Err(e);
                    }
                    warn!("Primary provider failed: {}, trying fallback", e);
                }
            }
        }

        match &self.fallback {
            Some(fallback) => self
                .call_tier(ProviderTier::Fallback, fallback, prompt)
                .await
                .map_err(|e| {
                    error!("Fallback provider failed: {}", e);
                    e
                }),
            None => Err(CompletionError::Configuration {
                message: "所有API都不可用".to_string(),
            }),
        }
    }

    async fn call_tier(
        &self,
        tier: ProviderTier,
        provider: &ProviderConfig,
        prompt: &str,
    ) -> Result<String> {
        let started = Instant::now();
        let result = self.client.complete(provider, prompt).await;

        if result.is_ok() {
            info!(
                "Generated with {} provider ({}) in {}ms",
                tier,
                provider.model,
                started.elapsed().as_millis()
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn client() -> CompletionClient {
        CompletionClient::new(1000, 0.7, Duration::from_secs(5)).unwrap()
    }

    fn provider(server: &ServerGuard, key: &str) -> ProviderConfig {
        ProviderConfig::new(key, server.url(), "test-model")
    }

    fn completion_body(content: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "messages": [{ "role": "user", "content": "写一句祝福" }],
                "max_tokens": 1000,
                "stream": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("X"))
            .expect(1)
            .create_async()
            .await;

        let result = client()
            .complete(&provider(&server, "test-key"), "写一句祝福")
            .await
            .unwrap();

        assert_eq!(result, "X");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_maps_http_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API key"}}"#)
            .create_async()
            .await;

        let err = client()
            .complete(&provider(&server, "bad"), "hi")
            .await
            .unwrap_err();

        match err {
            CompletionError::Api {
                status,
                provider_message,
            } => {
                assert_eq!(status, 401);
                assert_eq!(provider_message.as_deref(), Some("Invalid API key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_rejects_empty_choices() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = client().complete(&provider(&server, "k"), "hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_complete_network_error() {
        let unreachable = ProviderConfig::new("k", "http://127.0.0.1:1", "m");
        let err = client().complete(&unreachable, "hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::Network { .. }));
    }

    #[tokio::test]
    async fn test_complete_times_out() {
        // Accepts the connection and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = CompletionClient::new(1000, 0.7, Duration::from_millis(200)).unwrap();
        let silent = ProviderConfig::new("k", format!("http://{}", addr), "m");

        let started = Instant::now();
        let err = client.complete(&silent, "hi").await.unwrap_err();

        assert!(matches!(err, CompletionError::Timeout), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_no_tier_configured() {
        let generator = BlessingGenerator::new(client(), None, None, true);
        let err = generator.generate_blessing("hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_fallback_used_after_primary_failure() {
        let mut primary = Server::new_async().await;
        let mut fallback = Server::new_async().await;

        let primary_mock = primary
            .mock("POST", "/chat/completions")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let fallback_mock = fallback
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer fb-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("来自备用"))
            .expect(1)
            .create_async()
            .await;

        let generator = BlessingGenerator::new(
            client(),
            Some(provider(&primary, "p-key")),
            Some(provider(&fallback, "fb-key")),
            true,
        );

        assert_eq!(generator.generate_blessing("hi").await.unwrap(), "来自备用");
        primary_mock.assert_async().await;
        fallback_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_both_tiers_fail_surfaces_fallback_error() {
        let mut primary = Server::new_async().await;
        let mut fallback = Server::new_async().await;

        let primary_mock = primary
            .mock("POST", "/chat/completions")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let fallback_mock = fallback
            .mock("POST", "/chat/completions")
            .with_status(429)
            .expect(1)
            .create_async()
            .await;

        let generator = BlessingGenerator::new(
            client(),
            Some(provider(&primary, "p-key")),
            Some(provider(&fallback, "fb-key")),
            true,
        );

        let err = generator.generate_blessing("hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 429, .. }));
        primary_mock.assert_async().await;
        fallback_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_fallback_returns_primary_error() {
        let mut primary = Server::new_async().await;
        let mut fallback = Server::new_async().await;

        let primary_mock = primary
            .mock("POST", "/chat/completions")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;
        let fallback_mock = fallback
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let generator = BlessingGenerator::new(
            client(),
            Some(provider(&primary, "p-key")),
            Some(provider(&fallback, "fb-key")),
            false,
        );

        let err = generator.generate_blessing("hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 502, .. }));
        primary_mock.assert_async().await;
        fallback_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_enabled_fallback_without_config_returns_primary_error() {
        let mut primary = Server::new_async().await;
        let primary_mock = primary
            .mock("POST", "/chat/completions")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let generator =
            BlessingGenerator::new(client(), Some(provider(&primary, "p-key")), None, true);

        let err = generator.generate_blessing("hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 500, .. }));
        primary_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fallback_only_is_called_directly() {
        let mut fallback = Server::new_async().await;
        let fallback_mock = fallback
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("仅备用"))
            .expect(1)
            .create_async()
            .await;

        let generator =
            BlessingGenerator::new(client(), None, Some(provider(&fallback, "fb-key")), false);

        assert_eq!(generator.generate_blessing("hi").await.unwrap(), "仅备用");
        fallback_mock.assert_async().await;
    }
}
