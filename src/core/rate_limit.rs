//! Fixed-window admission gate (per-minute and per-day counters per client)

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::config::{AppConfig, RateLimitConfig};
use crate::core::errors::{GateError, StoreError};
use crate::core::models::{LimitScope, RateLimitResult};
use crate::core::store::{CounterStore, MemoryCounterStore, RestKvStore};

pub const MSG_TOO_FREQUENT: &str = "请求太频繁，请稍后再试";
pub const MSG_DAILY_CAP: &str = "今日使用次数已达上限";

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Minute bucket boundaries for an instant
#[derive(Debug, Clone, Copy)]
struct MinuteWindow {
    bucket: i64,
    reset_at: i64,
}

impl MinuteWindow {
    fn at(now_secs: i64, window_secs: i64) -> Self {
        let bucket = now_secs.div_euclid(window_secs);
        Self {
            bucket,
            reset_at: (bucket + 1) * window_secs,
        }
    }
}

/// UTC day boundaries for an instant
#[derive(Debug, Clone)]
struct DailyWindow {
    date: String,
    reset_at: i64,
}

impl DailyWindow {
    fn at(now: DateTime<Utc>) -> Self {
        let now_secs = now.timestamp();
        Self {
            date: now.format("%Y-%m-%d").to_string(),
            reset_at: now_secs - now_secs.rem_euclid(SECONDS_PER_DAY) + SECONDS_PER_DAY,
        }
    }
}

/// Decides whether a client may issue another completion request
pub struct AdmissionGate {
    store: Arc<dyn CounterStore>,
    local: Arc<MemoryCounterStore>,
    config: RateLimitConfig,
    development: bool,
}

impl AdmissionGate {
    /// Gate over `store`; in development mode store failures degrade to an in-process counter
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig, development: bool) -> Self {
        Self {
            store,
            local: Arc::new(MemoryCounterStore::new()),
            config,
            development,
        }
    }

    /// Gate backed only by process memory
    pub fn in_memory(config: RateLimitConfig) -> Self {
        let local = Arc::new(MemoryCounterStore::new());
        Self {
            store: local.clone(),
            local,
            config,
            development: false,
        }
    }

    /// Pick the backing store from application config
    pub fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        match &config.kv {
            Some(kv) => {
                info!("Rate limiting backed by KV store at {}", kv.url);
                let store = Arc::new(RestKvStore::new(kv)?);
                Ok(Self::new(store, config.rate_limit, config.development))
            }
            None => {
                info!("Rate limiting backed by process memory");
                Ok(Self::in_memory(config.rate_limit))
            }
        }
    }

    /// Count a request from `identity` and decide admission
    pub async fn check(&self, identity: &str) -> Result<RateLimitResult, GateError> {
        self.check_at(identity, Utc::now()).await
    }

    /// `check` at an explicit instant
    pub async fn check_at(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult, GateError> {
        match self.evaluate(self.store.as_ref(), identity, now).await {
            Ok(result) => Ok(result),
            Err(e) if self.development => {
                warn!(
                    "Rate limit store ({}) failed: {}, degrading to in-memory counters",
                    self.store.name(),
                    e
                );
                Ok(self.evaluate(self.local.as_ref(), identity, now).await?)
            }
            Err(e) => {
                error!("Rate limit store ({}) failed: {}", self.store.name(), e);
                Err(GateError::StoreUnavailable(e))
            }
        }
    }

    async fn evaluate(
        &self,
        store: &dyn CounterStore,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult, StoreError> {
        let now_secs = now.timestamp();
        let window_secs = self.config.minute_window_secs as i64;
        let minute = MinuteWindow::at(now_secs, window_secs);

        let minute_key = format!("rate_limit:minute:{}:{}", identity, minute.bucket);
        let minute_count = store.incr(&minute_key, self.config.minute_window_secs).await?;

        if minute_count > self.config.minute_max {
            debug!("{} exceeded minute limit ({})", identity, minute_count);
            return Ok(RateLimitResult::rejected(
                LimitScope::Minute,
                self.config.minute_max,
                minute.reset_at,
                MSG_TOO_FREQUENT,
            ));
        }

        let daily = DailyWindow::at(now);
        let daily_key = format!("rate_limit:daily:{}:{}", identity, daily.date);
        let daily_ttl = (daily.reset_at - now_secs).max(1) as u64;
        let daily_count = store.incr(&daily_key, daily_ttl).await?;

        if daily_count > self.config.daily_max {
            debug!("{} exceeded daily limit ({})", identity, daily_count);
            return Ok(RateLimitResult::rejected(
                LimitScope::Daily,
                self.config.daily_max,
                daily.reset_at,
                MSG_DAILY_CAP,
            ));
        }

        Ok(RateLimitResult::admitted(
            self.config.minute_max,
            self.config.minute_max - minute_count,
            minute.reset_at,
        ))
    }

    /// Current standing of `identity` without consuming quota
    pub async fn status(&self, identity: &str) -> Result<RateLimitResult, GateError> {
        self.status_at(identity, Utc::now()).await
    }

    /// `status` at an explicit instant
    pub async fn status_at(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult, GateError> {
        match self.peek(self.store.as_ref(), identity, now).await {
            Ok(result) => Ok(result),
            Err(e) if self.development => {
                warn!("Rate limit store ({}) failed: {}", self.store.name(), e);
                Ok(self.peek(self.local.as_ref(), identity, now).await?)
            }
            Err(e) => Err(GateError::StoreUnavailable(e)),
        }
    }

    async fn peek(
        &self,
        store: &dyn CounterStore,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult, StoreError> {
        let minute = MinuteWindow::at(now.timestamp(), self.config.minute_window_secs as i64);
        let daily = DailyWindow::at(now);

        let minute_count = store
            .get(&format!("rate_limit:minute:{}:{}", identity, minute.bucket))
            .await?;
        let daily_count = store
            .get(&format!("rate_limit:daily:{}:{}", identity, daily.date))
            .await?;

        let minute_remaining = self.config.minute_max.saturating_sub(minute_count);
        let daily_remaining = self.config.daily_max.saturating_sub(daily_count);

        Ok(RateLimitResult {
            admitted: minute_remaining > 0 && daily_remaining > 0,
            limit: self.config.minute_max,
            remaining: minute_remaining.min(daily_remaining),
            reset_at: minute.reset_at,
            error_message: None,
            scope: None,
        })
    }

    /// Drop expired in-process counters
    pub async fn evict_expired(&self) -> usize {
        self.local.evict_expired().await
    }
}
