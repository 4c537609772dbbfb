//! Lead persistence seam.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::engine::EngineInput;
use crate::error::{StoreError, TransitionError};
use crate::lead::state::{LeadEngagementState, LeadEvent, StateTransition};

/// Maximum transitions retained per lead.
const MAX_TRANSITIONS: usize = 200;

/// Persisted state and message history for one lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: String,
    pub state: LeadEngagementState,
    pub last_outbound_at: Option<DateTime<Utc>>,
    /// Inbound responses since the current contact cycle began.
    pub inbound_message_times: Vec<DateTime<Utc>>,
    /// Per-lead delay override; the runner's default applies when absent.
    pub delay_minutes: Option<i64>,
    pub transitions: Vec<StateTransition>,
    pub updated_at: DateTime<Utc>,
}

impl LeadRecord {
    /// A freshly created lead in `NEW`.
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: LeadEngagementState::New,
            last_outbound_at: None,
            inbound_message_times: Vec::new(),
            delay_minutes: None,
            transitions: Vec::new(),
            updated_at: created_at,
        }
    }

    /// Snapshot this record as engine input.
    pub fn engine_input(&self, default_delay_minutes: i64, now: DateTime<Utc>) -> EngineInput {
        EngineInput {
            current_state: self.state,
            last_outbound_at: self.last_outbound_at,
            inbound_message_times: self.inbound_message_times.clone(),
            delay_minutes: self.delay_minutes.unwrap_or(default_delay_minutes),
            now,
        }
    }

    /// Fire `event` through the state machine. Leaves the record untouched on error.
    pub fn apply_event(
        &mut self,
        event: LeadEvent,
        at: DateTime<Utc>,
    ) -> Result<StateTransition, TransitionError> {
        let transition = StateTransition::apply(self.state, event, at)?;
        self.state = transition.to;
        self.updated_at = at;
        self.transitions.push(transition.clone());
        if self.transitions.len() > MAX_TRANSITIONS {
            let drain_count = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(..drain_count);
        }
        Ok(transition)
    }
}

/// Backend-agnostic lead storage.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Load a lead by ID.
    async fn get(&self, lead_id: &str) -> Result<Option<LeadRecord>, StoreError>;

    /// Insert or replace a lead.
    async fn put(&self, record: LeadRecord) -> Result<(), StoreError>;
}

/// In-memory lead store.
#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<String, LeadRecord>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn get(&self, lead_id: &str) -> Result<Option<LeadRecord>, StoreError> {
        Ok(self.leads.read().await.get(lead_id).cloned())
    }

    async fn put(&self, record: LeadRecord) -> Result<(), StoreError> {
        self.leads.write().await.insert(record.id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_input_uses_override_or_default() {
        let now = Utc::now();
        let mut record = LeadRecord::new("lead-1", now);
        assert_eq!(record.engine_input(30, now).delay_minutes, 30);
        record.delay_minutes = Some(5);
        let input = record.engine_input(30, now);
        assert_eq!(input.delay_minutes, 5);
        assert_eq!(input.current_state, LeadEngagementState::New);
        assert_eq!(input.now, now);
    }

    #[test]
    fn rejected_event_leaves_record_untouched() {
        let now = Utc::now();
        let mut record = LeadRecord::new("lead-1", now);
        let before = record.clone();
        assert!(record.apply_event(LeadEvent::Terminate, now).is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn transition_history_capped() {
        let now = Utc::now();
        let mut record = LeadRecord::new("lead-1", now);
        record.apply_event(LeadEvent::OutboundSent, now).unwrap();
        for _ in 0..250 {
            record.apply_event(LeadEvent::TimeElapsed, now).unwrap();
        }
        assert_eq!(record.transitions.len(), MAX_TRANSITIONS);
        assert_eq!(record.state, LeadEngagementState::Contacted);
    }

    #[tokio::test]
    async fn in_memory_store_roundtrip() {
        let store = InMemoryLeadStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        let record = LeadRecord::new("lead-1", Utc::now());
        store.put(record.clone()).await.unwrap();
        assert_eq!(store.get("lead-1").await.unwrap(), Some(record));
    }
}
