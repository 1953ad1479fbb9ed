use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{EventStatus, OddsRecord};

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub event: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub message: String,
    pub mode: String,
    pub usage: String,
}

/// One history point with the bookmaker margin alongside
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: OddsRecord,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub margin: Option<Decimal>,
}

impl From<OddsRecord> for HistoryEntry {
    fn from(record: OddsRecord) -> Self {
        let margin = record.margin();
        Self { record, margin }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub event: String,
    pub records: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventStatus>,
    pub total: usize,
    pub active_loops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub events: usize,
    pub active_loops: usize,
    pub uptime_secs: i64,
}
