use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::OddsRecord;
use crate::error::{OddsError, Result};
use crate::services::{LoopLauncher, Metrics, OddsStore};

/// How the odds endpoint resolves which event a query is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMode {
    /// Any event may be queried; loops start on first request
    Multi,
    /// One event, monitored from startup
    Single { event_id: String },
}

/// Outcome of an odds query, independent of the HTTP layer
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse {
    Ready(OddsRecord),
    Pending { event_id: String, message: String },
    Unavailable { message: String },
    InvalidRequest { error: String },
}

pub struct QueryService {
    store: Arc<OddsStore>,
    launcher: Arc<dyn LoopLauncher>,
    metrics: Arc<Metrics>,
    mode: QueryMode,
}

impl QueryService {
    pub fn new(
        store: Arc<OddsStore>,
        launcher: Arc<dyn LoopLauncher>,
        metrics: Arc<Metrics>,
        mode: QueryMode,
    ) -> Self {
        Self {
            store,
            launcher,
            metrics,
            mode,
        }
    }

    pub fn mode(&self) -> &QueryMode {
        &self.mode
    }

    pub fn store(&self) -> &Arc<OddsStore> {
        &self.store
    }

    /// Activate an event and launch its loop if this call won the transition.
    pub async fn ensure_monitoring(&self, event_id: &str) -> bool {
        match self.store.mark_active(event_id).await {
            Some(lease) => {
                info!("Spawning extraction loop for {}", event_id);
                self.launcher.launch(lease);
                true
            }
            None => false,
        }
    }

    /// Pin the fixed event and start its loop in single mode; no-op in multi mode.
    pub async fn start_fixed_event(&self) -> bool {
        match &self.mode {
            QueryMode::Single { event_id } => {
                self.store.pin(event_id).await;
                self.ensure_monitoring(event_id).await
            }
            QueryMode::Multi => false,
        }
    }

    pub async fn handle_query(&self, event_id: Option<&str>) -> QueryResponse {
        self.metrics.inc_queries();

        match &self.mode {
            QueryMode::Single { event_id } => self.query_fixed(event_id).await,
            QueryMode::Multi => {
                let Some(event_id) = event_id.map(str::trim).filter(|id| !id.is_empty()) else {
                    return QueryResponse::InvalidRequest {
                        error: "Missing required query parameter: event".to_string(),
                    };
                };
                self.query_any(event_id).await
            }
        }
    }

    async fn query_fixed(&self, event_id: &str) -> QueryResponse {
        self.store.touch(event_id).await;
        if let Some(record) = self.store.get(event_id).await {
            return QueryResponse::Ready(record);
        }

        // A loop that failed setup is restarted rather than leaving the feed dark
        self.ensure_monitoring(event_id).await;
        QueryResponse::Unavailable {
            message: "No odds data available yet.".to_string(),
        }
    }

    async fn query_any(&self, event_id: &str) -> QueryResponse {
        if let Some(record) = self.store.get(event_id).await {
            self.store.touch(event_id).await;
            return QueryResponse::Ready(record);
        }

        let spawned = self.ensure_monitoring(event_id).await;
        self.store.touch(event_id).await;

        let message = if spawned {
            format!("Started monitoring {}. Retry shortly.", event_id)
        } else {
            debug!("Loop already running for {}", event_id);
            format!(
                "{}. Retry shortly.",
                OddsError::NotYetAvailable(event_id.to_string())
            )
        };

        QueryResponse::Pending {
            event_id: event_id.to_string(),
            message,
        }
    }

    /// Bounded history for the dashboard
    pub async fn history(&self, event_id: Option<&str>) -> Result<Vec<OddsRecord>> {
        let event_id = match &self.mode {
            QueryMode::Single { event_id } => event_id.as_str(),
            QueryMode::Multi => event_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    OddsError::ClientInput("Missing required query parameter: event".to_string())
                })?,
        };

        self.store.touch(event_id).await;
        self.store
            .history(event_id)
            .await
            .ok_or_else(|| OddsError::NotFound(format!("event {} is not registered", event_id)))
    }
}
