use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::services::{Metrics, OddsStore};

/// Evicts events that stopped being queried, cancelling their loops
pub struct IdleReaper {
    store: Arc<OddsStore>,
    metrics: Arc<Metrics>,
    idle_timeout: Duration,
    check_interval: Duration,
}

impl IdleReaper {
    pub fn new(
        store: Arc<OddsStore>,
        metrics: Arc<Metrics>,
        idle_timeout: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            idle_timeout,
            check_interval,
        }
    }

    /// `None` when eviction is disabled
    pub fn from_config(
        config: &RegistryConfig,
        store: Arc<OddsStore>,
        metrics: Arc<Metrics>,
    ) -> Option<Self> {
        (config.idle_timeout_secs > 0).then(|| {
            Self::new(
                store,
                metrics,
                Duration::from_secs(config.idle_timeout_secs),
                Duration::from_secs(config.reap_interval_secs.max(1)),
            )
        })
    }

    pub async fn reap_once(&self) -> Vec<String> {
        let idle_for = chrono::Duration::seconds(self.idle_timeout.as_secs() as i64);
        let evicted = self.store.evict_idle(Utc::now(), idle_for).await;
        if !evicted.is_empty() {
            self.metrics.add_events_reaped(evicted.len() as u64);
        }
        evicted
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Idle reaper running (timeout {:?}, every {:?})",
            self.idle_timeout, self.check_interval
        );
        let mut ticker = interval(self.check_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.reap_once().await;
                    debug!("Reaper pass evicted {} events", evicted.len());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_disabled_by_default() {
        let store = Arc::new(OddsStore::new(10));
        let metrics = Arc::new(Metrics::new());
        assert!(IdleReaper::from_config(&RegistryConfig::default(), store, metrics).is_none());
    }

    #[tokio::test]
    async fn test_reap_once_evicts_idle_events() {
        let store = Arc::new(OddsStore::new(10));
        let metrics = Arc::new(Metrics::new());
        let lease = store.mark_active("quiet").await.unwrap();

        let reaper = IdleReaper::new(
            Arc::clone(&store),
            Arc::clone(&metrics),
            Duration::ZERO,
            Duration::from_secs(1),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(reaper.reap_once().await, vec!["quiet".to_string()]);
        assert!(lease.cancel.is_cancelled());
        assert!(!store.is_active("quiet").await);
        assert_eq!(metrics.events_reaped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_recently_queried_events_survive() {
        let store = Arc::new(OddsStore::new(10));
        let metrics = Arc::new(Metrics::new());
        store.mark_active("busy").await;

        let reaper = IdleReaper::new(
            Arc::clone(&store),
            metrics,
            Duration::from_secs(300),
            Duration::from_secs(1),
        );
        assert!(reaper.reap_once().await.is_empty());
        assert!(store.is_active("busy").await);
    }
}
