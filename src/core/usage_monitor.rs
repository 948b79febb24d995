//! Per-client request statistics

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::models::ClientUsage;

/// Idle time after which a client's statistics are dropped
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// Statistics for one client, with derived rates
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub client_id: String,
    #[serde(flatten)]
    pub usage: ClientUsage,
    pub avg_duration_ms: f64,
    pub error_rate: f64,
}

/// Aggregate over all clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub clients: usize,
    pub total_requests: u64,
    pub total_errors: u64,
}

/// In-memory usage monitor, shared across request handlers
#[derive(Debug, Clone, Default)]
pub struct UsageMonitor {
    usage: Arc<RwLock<HashMap<String, ClientUsage>>>,
}

impl UsageMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request
    pub async fn track(&self, client_id: &str, duration: Duration, is_error: bool) {
        let mut usage = self.usage.write().await;
        let entry = usage.entry(client_id.to_string()).or_default();

        entry.requests += 1;
        entry.last_request = Some(Utc::now());
        entry.total_duration_ms += duration.as_millis() as u64;
        if is_error {
            entry.errors += 1;
        }

        debug!(
            "Client {}: {} requests, {} errors",
            client_id, entry.requests, entry.errors
        );
    }

    /// Statistics for one client
    pub async fn usage(&self, client_id: &str) -> Option<ClientUsage> {
        self.usage.read().await.get(client_id).cloned()
    }

    /// All clients, busiest first
    pub async fn all_stats(&self) -> Vec<ClientStats> {
        let usage = self.usage.read().await;
        let mut stats: Vec<ClientStats> = usage
            .iter()
            .map(|(client_id, usage)| ClientStats {
                client_id: client_id.clone(),
                avg_duration_ms: usage.avg_duration_ms(),
                error_rate: usage.error_rate(),
                usage: usage.clone(),
            })
            .collect();

        stats.sort_by(|a, b| b.usage.requests.cmp(&a.usage.requests));
        stats
    }

    /// Totals across clients
    pub async fn summary(&self) -> UsageSummary {
        let usage = self.usage.read().await;
        UsageSummary {
            clients: usage.len(),
            total_requests: usage.values().map(|u| u.requests).sum(),
            total_errors: usage.values().map(|u| u.errors).sum(),
        }
    }

    /// Drop clients idle for longer than `max_idle`
    pub async fn cleanup(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::days(1));

        let mut usage = self.usage.write().await;
        let before = usage.len();
        usage.retain(|_, u| u.last_request.map(|t| t >= cutoff).unwrap_or(false));
        let removed = before - usage.len();

        if removed > 0 {
            info!("Dropped usage statistics for {} idle clients", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_track_accumulates() {
        let monitor = UsageMonitor::new();

        monitor.track("1.2.3.4", Duration::from_millis(100), false).await;
        monitor.track("1.2.3.4", Duration::from_millis(300), true).await;

        let usage = monitor.usage("1.2.3.4").await.unwrap();
        assert_eq!(usage.requests, 2);
        assert_eq!(usage.errors, 1);
        assert_eq!(usage.total_duration_ms, 400);
        assert_eq!(usage.avg_duration_ms(), 200.0);
        assert_eq!(usage.error_rate(), 0.5);
        assert!(monitor.usage("5.6.7.8").await.is_none());
    }

    #[tokio::test]
    async fn test_all_stats_sorted_by_requests() {
        let monitor = UsageMonitor::new();
        monitor.track("quiet", Duration::from_millis(10), false).await;
        for _ in 0..3 {
            monitor.track("busy", Duration::from_millis(10), false).await;
        }

        let stats = monitor.all_stats().await;
        assert_eq!(stats[0].client_id, "busy");
        assert_eq!(stats[1].client_id, "quiet");

        let summary = monitor.summary().await;
        assert_eq!(
            summary,
            UsageSummary {
                clients: 2,
                total_requests: 4,
                total_errors: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_clients() {
        let monitor = UsageMonitor::new();
        monitor.track("recent", Duration::from_millis(10), false).await;

        assert_eq!(monitor.cleanup(DEFAULT_MAX_IDLE).await, 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(monitor.cleanup(Duration::from_millis(1)).await, 1);
        assert!(monitor.usage("recent").await.is_none());
    }
}
