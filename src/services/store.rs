//! Shared odds state and the active-loop registry
//!
//! Every read and write goes through one `RwLock` over the event map. Records
//! are replaced whole, so readers never observe a partially built snapshot,
//! and the inactive→active transition in `mark_active` happens under the write
//! lock, which is what keeps loops unique per event.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::{EventState, EventStatus, LoopLease, LoopPhase, OddsRecord};

pub struct OddsStore {
    events: RwLock<HashMap<String, EventState>>,
    history_capacity: usize,
    /// Generations are store-wide so a re-registered event never reuses one
    next_generation: AtomicU64,
    /// Parent of every loop token; cancelled on shutdown
    root: CancellationToken,
}

impl OddsStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            history_capacity: history_capacity.max(1),
            next_generation: AtomicU64::new(1),
            root: CancellationToken::new(),
        }
    }

    /// Latest record for an event
    pub async fn get(&self, event_id: &str) -> Option<OddsRecord> {
        self.events
            .read()
            .await
            .get(event_id)
            .and_then(|s| s.latest_record.clone())
    }

    /// Replace the latest record.
    ///
    /// Returns false when the record is older than the stored one or the event
    /// is no longer registered.
    pub async fn set(&self, event_id: &str, record: OddsRecord) -> bool {
        let mut events = self.events.write().await;
        let Some(state) = events.get_mut(event_id) else {
            debug!("Dropping record for unregistered event {}", event_id);
            return false;
        };
        self.push_record(state, record)
    }

    /// Like `set`, but only while `generation` still owns the event.
    pub async fn publish(&self, event_id: &str, generation: u64, record: OddsRecord) -> bool {
        let mut events = self.events.write().await;
        match events.get_mut(event_id) {
            Some(state) if state.generation == generation && state.loop_active => {
                self.push_record(state, record)
            }
            _ => {
                debug!("Dropping record from superseded loop for {}", event_id);
                false
            }
        }
    }

    fn push_record(&self, state: &mut EventState, record: OddsRecord) -> bool {
        if let Some(current) = &state.latest_record {
            if record.timestamp < current.timestamp {
                debug!(
                    "Dropping out-of-order record for {} ({} < {})",
                    state.event_id, record.timestamp, current.timestamp
                );
                return false;
            }
        }

        state.history.push_back(record.clone());
        while state.history.len() > self.history_capacity {
            state.history.pop_front();
        }
        state.latest_record = Some(record);
        true
    }

    pub async fn is_active(&self, event_id: &str) -> bool {
        self.events
            .read()
            .await
            .get(event_id)
            .is_some_and(|s| s.loop_active)
    }

    /// Register the event if unseen and flag it active.
    ///
    /// Returns a lease only for the call that performed the inactive→active
    /// transition; every other caller gets `None`.
    pub async fn mark_active(&self, event_id: &str) -> Option<LoopLease> {
        let mut events = self.events.write().await;
        let state = events
            .entry(event_id.to_string())
            .or_insert_with(|| EventState::new(event_id));

        if state.loop_active {
            return None;
        }

        let cancel = self.root.child_token();
        state.loop_active = true;
        state.phase = LoopPhase::Init;
        state.generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        state.cancel = Some(cancel.clone());

        Some(LoopLease {
            event_id: event_id.to_string(),
            generation: state.generation,
            cancel,
        })
    }

    /// Clear the active flag if `generation` still owns the event.
    pub async fn mark_inactive(&self, event_id: &str, generation: u64) -> bool {
        let mut events = self.events.write().await;
        match events.get_mut(event_id) {
            Some(state) if state.generation == generation && state.loop_active => {
                state.loop_active = false;
                state.phase = LoopPhase::Terminated;
                state.cancel = None;
                true
            }
            _ => false,
        }
    }

    pub async fn set_phase(&self, event_id: &str, generation: u64, phase: LoopPhase) {
        let mut events = self.events.write().await;
        if let Some(state) = events.get_mut(event_id) {
            if state.generation == generation && state.phase.can_transition_to(phase) {
                state.phase = phase;
            }
        }
    }

    pub async fn phase(&self, event_id: &str) -> Option<LoopPhase> {
        self.events.read().await.get(event_id).map(|s| s.phase)
    }

    /// Register the event if unseen and exempt it from idle eviction
    pub async fn pin(&self, event_id: &str) {
        let mut events = self.events.write().await;
        events
            .entry(event_id.to_string())
            .or_insert_with(|| EventState::new(event_id))
            .pinned = true;
    }

    /// Record that a client asked for this event
    pub async fn touch(&self, event_id: &str) {
        if let Some(state) = self.events.write().await.get_mut(event_id) {
            state.last_queried = Utc::now();
        }
    }

    /// Bounded history, oldest first
    pub async fn history(&self, event_id: &str) -> Option<Vec<OddsRecord>> {
        self.events
            .read()
            .await
            .get(event_id)
            .map(|s| s.history.iter().cloned().collect())
    }

    pub async fn snapshot(&self) -> Vec<EventStatus> {
        let mut statuses: Vec<EventStatus> = self
            .events
            .read()
            .await
            .values()
            .map(EventState::status)
            .collect();
        statuses.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        statuses
    }

    /// (registered events, active loops)
    pub async fn counts(&self) -> (usize, usize) {
        let events = self.events.read().await;
        let active = events.values().filter(|s| s.loop_active).count();
        (events.len(), active)
    }

    /// Remove unpinned events nobody queried since `now - idle_for`, cancelling their loops.
    pub async fn evict_idle(&self, now: DateTime<Utc>, idle_for: ChronoDuration) -> Vec<String> {
        let cutoff = now - idle_for;
        let mut events = self.events.write().await;

        let idle: Vec<String> = events
            .values()
            .filter(|s| !s.pinned && s.last_queried < cutoff)
            .map(|s| s.event_id.clone())
            .collect();

        for event_id in &idle {
            if let Some(state) = events.remove(event_id) {
                if let Some(cancel) = state.cancel {
                    cancel.cancel();
                }
                info!("Evicted idle event {}", event_id);
            }
        }
        idle
    }

    /// Cancel every running loop
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Token cancelled on shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }
}
