//! Counter stores backing the admission gate

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::config::KvConfig;
use crate::core::errors::StoreError;

/// Entry count that triggers an opportunistic sweep
const SWEEP_SIZE_THRESHOLD: usize = 300;
/// Maximum time between opportunistic sweeps
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Entries removed per opportunistic sweep
const SWEEP_BATCH: usize = 100;

/// Atomically incrementable, independently expiring counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, creating it with a `ttl_secs` expiry when absent. Returns the new count.
    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError>;

    /// Current value of `key`, zero when absent or expired
    async fn get(&self, key: &str) -> Result<u64, StoreError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

#[derive(Debug)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct MemoryState {
    entries: HashMap<String, CounterEntry>,
    last_sweep: Instant,
}

/// Single-process counter store
#[derive(Debug)]
pub struct MemoryCounterStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Number of tracked counters, expired ones included
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every expired counter
    pub async fn evict_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let removed = sweep(&mut state, now, usize::MAX);
        if removed > 0 {
            debug!("Evicted {} expired rate limit counters", removed);
        }
        removed
    }
}

fn sweep(state: &mut MemoryState, now: Instant, limit: usize) -> usize {
    let expired: Vec<String> = state
        .entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .take(limit)
        .collect();

    for key in &expired {
        state.entries.remove(key);
    }
    state.last_sweep = now;

    expired.len()
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                count: 0,
                expires_at: now + Duration::from_secs(ttl_secs),
            });

        if entry.is_expired(now) && entry.count > 0 {
            entry.count = 0;
            entry.expires_at = now + Duration::from_secs(ttl_secs);
        }
        entry.count += 1;
        let count = entry.count;

        if state.entries.len() >= SWEEP_SIZE_THRESHOLD
            || now.duration_since(state.last_sweep) >= SWEEP_INTERVAL
        {
            sweep(&mut state, now, SWEEP_BATCH);
        }

        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        let now = Instant::now();

        Ok(state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.count)
            .unwrap_or(0))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Reply envelope of Redis-compatible REST APIs
#[derive(Debug, Deserialize)]
struct KvReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Counter store over a Redis-compatible REST API.
///
/// Increments run as one `MULTI`/`EXEC` transaction of `INCR` and `EXPIRE .. NX`, so a
/// counter always carries a TTL even when an earlier expiry was lost.
#[derive(Debug, Clone)]
pub struct RestKvStore {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl RestKvStore {
    pub fn new(config: &KvConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<serde_json::Value, StoreError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| StoreError::UnexpectedResponse {
                    message: e.to_string(),
                })?;

        if let Some(message) = body.get("error").and_then(|e| e.as_str()) {
            return Err(StoreError::Unavailable {
                message: message.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Unavailable {
                message: format!("status {}", status.as_u16()),
            });
        }

        Ok(body)
    }

    async fn command(&self, args: &[&str]) -> Result<Option<serde_json::Value>, StoreError> {
        let body = self.post(&self.url, args).await?;
        Ok(parse_reply(body)?.result)
    }

    /// Run `commands` atomically, returning each result in order
    async fn transaction(
        &self,
        commands: &[&[&str]],
    ) -> Result<Vec<Option<serde_json::Value>>, StoreError> {
        let url = format!("{}/multi-exec", self.url);
        let body = self.post(&url, commands).await?;

        let replies: Vec<KvReply> =
            serde_json::from_value(body).map_err(|e| StoreError::UnexpectedResponse {
                message: e.to_string(),
            })?;
        if replies.len() != commands.len() {
            return Err(StoreError::UnexpectedResponse {
                message: format!(
                    "expected {} transaction results, got {}",
                    commands.len(),
                    replies.len()
                ),
            });
        }

        replies
            .into_iter()
            .map(|reply| match reply.error {
                Some(message) => Err(StoreError::Unavailable { message }),
                None => Ok(reply.result),
            })
            .collect()
    }
}

fn parse_reply(body: serde_json::Value) -> Result<KvReply, StoreError> {
    serde_json::from_value(body).map_err(|e| StoreError::UnexpectedResponse {
        message: e.to_string(),
    })
}

fn as_count(value: Option<serde_json::Value>) -> Result<u64, StoreError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::Number(n)) => n.as_u64().ok_or_else(|| StoreError::UnexpectedResponse {
            message: format!("counter is not a positive integer: {}", n),
        }),
        Some(serde_json::Value::String(s)) => s.parse().map_err(|_| StoreError::UnexpectedResponse {
            message: format!("counter is not numeric: {}", s),
        }),
        Some(other) => Err(StoreError::UnexpectedResponse {
            message: format!("unexpected counter value: {}", other),
        }),
    }
}

#[async_trait]
impl CounterStore for RestKvStore {
    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let ttl = ttl_secs.max(1).to_string();
        let mut results = self
            .transaction(&[&["INCR", key][..], &["EXPIRE", key, ttl.as_str(), "NX"][..]])
            .await?
            .into_iter();

        as_count(results.next().flatten())
    }

    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        as_count(self.command(&["GET", key]).await?)
    }

    fn name(&self) -> &'static str {
        "kv"
    }
}
