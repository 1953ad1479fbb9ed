use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::services::{Metrics, QueryMode, QueryService};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub metrics: Arc<Metrics>,
    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(query: Arc<QueryService>, metrics: Arc<Metrics>) -> Self {
        Self {
            query,
            metrics,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }

    pub fn mode_name(&self) -> &'static str {
        match self.query.mode() {
            QueryMode::Multi => "multi",
            QueryMode::Single { .. } => "single",
        }
    }
}
