use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio_util::sync::CancellationToken;

use super::OddsRecord;

/// Extraction loop state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPhase {
    /// Opening the page and discovering the market
    Init,
    /// Polling odds every interval
    Monitoring,
    /// Loop exited, session released
    Terminated,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Init => "INIT",
            LoopPhase::Monitoring => "MONITORING",
            LoopPhase::Terminated => "TERMINATED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: LoopPhase) -> bool {
        use LoopPhase::*;

        matches!(
            (self, target),
            (Init, Monitoring) | (Init, Terminated) | (Monitoring, Terminated) | (Terminated, Init)
        )
    }
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handed to exactly one caller when an event goes from inactive to active
#[derive(Debug, Clone)]
pub struct LoopLease {
    pub event_id: String,
    /// Distinguishes successive loops for the same event
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// Everything the store tracks for one event
#[derive(Debug)]
pub struct EventState {
    pub event_id: String,
    pub latest_record: Option<OddsRecord>,
    pub loop_active: bool,
    pub phase: LoopPhase,
    pub generation: u64,
    pub cancel: Option<CancellationToken>,
    /// Pinned events are never evicted for idleness
    pub pinned: bool,
    pub registered_at: DateTime<Utc>,
    pub last_queried: DateTime<Utc>,
    pub history: VecDeque<OddsRecord>,
}

impl EventState {
    pub fn new(event_id: &str) -> Self {
        let now = Utc::now();
        Self {
            event_id: event_id.to_string(),
            latest_record: None,
            loop_active: false,
            phase: LoopPhase::Terminated,
            generation: 0,
            cancel: None,
            pinned: false,
            registered_at: now,
            last_queried: now,
            history: VecDeque::new(),
        }
    }

    pub fn status(&self) -> EventStatus {
        EventStatus {
            event_id: self.event_id.clone(),
            phase: self.phase,
            loop_active: self.loop_active,
            market_name: self.latest_record.as_ref().map(|r| r.market_name.clone()),
            last_update: self.latest_record.as_ref().map(|r| r.timestamp),
            last_queried: self.last_queried,
            history_len: self.history.len(),
        }
    }
}

/// Serializable view of an event for status listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStatus {
    pub event_id: String,
    pub phase: LoopPhase,
    pub loop_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    pub last_queried: DateTime<Utc>,
    pub history_len: usize,
}
