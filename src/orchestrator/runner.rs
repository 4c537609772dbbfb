//! Follow-up runner: drives one lead through evaluate → send → transition → audit.
//!
//! **Core invariant: at most one follow-up per decision.** All work for a lead
//! runs under that lead's lock, so two concurrent runs cannot both observe
//! "eligible" and both send.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::engine::{Decision, evaluate};
use crate::error::{DeliveryError, Result, StoreError, TransitionError};
use crate::lead::state::{LeadEngagementState, LeadEvent, StateTransition, can_transition};
use crate::orchestrator::audit::{AuditOutcome, AuditRecord, AuditSink};
use crate::orchestrator::store::{LeadRecord, LeadStore};

/// Per-lead async locks. The outer lock is never held across an await.
type LockMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Delivers follow-up messages. Pure I/O, no gating logic.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Send one follow-up to `lead`. Only called after a SEND decision.
    async fn send_follow_up(&self, lead: &LeadRecord) -> std::result::Result<(), DeliveryError>;
}

/// Exclusive hold on one lead. Releasing the last hold drops the map entry.
struct LeadLock<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<Mutex<()>>,
    locks: &'a LockMap,
    lead_id: String,
}

impl Drop for LeadLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this handle remain: nobody is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.lead_id);
        }
    }
}

/// Orchestrates the decision engine against stored leads.
pub struct FollowUpRunner {
    store: Arc<dyn LeadStore>,
    sender: Arc<dyn OutboundSender>,
    audit: Arc<dyn AuditSink>,
    config: GateConfig,
    locks: LockMap,
}

impl FollowUpRunner {
    pub fn new(
        store: Arc<dyn LeadStore>,
        sender: Arc<dyn OutboundSender>,
        audit: Arc<dyn AuditSink>,
        config: GateConfig,
    ) -> Self {
        Self {
            store,
            sender,
            audit,
            config,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    async fn lock_lead(&self, lead_id: &str) -> LeadLock<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(lead_id.to_string()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        LeadLock {
            guard: Some(guard),
            lock,
            locks: &self.locks,
            lead_id: lead_id.to_string(),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn load(&self, lead_id: &str) -> Result<LeadRecord> {
        self.store.get(lead_id).await?.ok_or_else(|| {
            StoreError::LeadNotFound {
                id: lead_id.to_string(),
            }
            .into()
        })
    }

    fn audit_record(
        &self,
        lead_id: &str,
        now: DateTime<Utc>,
        decision: Decision,
        outcome: AuditOutcome,
    ) -> AuditRecord {
        AuditRecord::new(
            Some(lead_id.to_string()),
            self.config.engine_version.clone(),
            now,
            decision,
            outcome,
        )
    }

    /// Register a new lead in `NEW`. An existing lead is never replaced.
    pub async fn create_lead(&self, lead_id: &str, now: DateTime<Utc>) -> Result<LeadRecord> {
        let _lock = self.lock_lead(lead_id).await;
        if let Some(existing) = self.store.get(lead_id).await? {
            warn!(lead_id, state = %existing.state, "Lead already exists");
            return Err(StoreError::LeadExists {
                id: lead_id.to_string(),
            }
            .into());
        }

        let mut record = LeadRecord::new(lead_id, now);
        record.apply_event(LeadEvent::LeadCreated, now)?;
        self.store.put(record.clone()).await?;
        info!(lead_id, "Lead created");
        Ok(record)
    }

    /// Evaluate one lead at `now` and act on the decision.
    ///
    /// Every evaluation is audited. On SKIP nothing else changes. On SEND the
    /// follow-up is delivered, then the transition and new outbound time are
    /// persisted. A failed send is audited and returned with no state change.
    /// A delivered send whose state cannot be persisted is audited as
    /// `SentUnpersisted` before the error is returned.
    pub async fn run(&self, lead_id: &str, now: DateTime<Utc>) -> Result<AuditRecord> {
        let _lock = self.lock_lead(lead_id).await;
        let record = self.load(lead_id).await?;

        let input = record.engine_input(self.config.default_delay_minutes, now);
        let decision = evaluate(&input);

        info!(
            lead_id,
            state = %decision.current_state,
            action = %decision.action,
            rule = %decision.rule,
            priority = decision.rule.priority(),
            evidence = ?decision.evidence,
            "Follow-up decision"
        );

        if !decision.is_send() {
            let entry = self.audit_record(lead_id, now, decision, AuditOutcome::Skipped);
            self.audit.append(&entry).await?;
            return Ok(entry);
        }

        // Resolve the transition before sending so a rejected pair can never
        // leave a delivered message without a recorded state change.
        let mut updated = record.clone();
        let transition = updated.apply_event(send_event(record.state)?, now)?;
        updated.last_outbound_at = Some(now);
        updated.inbound_message_times.clear();

        if let Err(e) = self.sender.send_follow_up(&record).await {
            warn!(lead_id, error = %e, "Follow-up delivery failed");
            let entry = self.audit_record(
                lead_id,
                now,
                decision,
                AuditOutcome::SendFailed {
                    reason: e.to_string(),
                },
            );
            self.audit.append(&entry).await?;
            return Err(e.into());
        }

        if let Err(e) = self.store.put(updated).await {
            warn!(lead_id, error = %e, "Follow-up sent but lead state not persisted");
            let entry = self
                .audit_record(
                    lead_id,
                    now,
                    decision,
                    AuditOutcome::SentUnpersisted {
                        reason: e.to_string(),
                    },
                )
                .with_transition(transition);
            self.audit.append(&entry).await?;
            return Err(e.into());
        }

        debug!(
            lead_id,
            from = %transition.from,
            to = %transition.to,
            event = %transition.event,
            "Follow-up sent"
        );

        let entry = self
            .audit_record(lead_id, now, decision, AuditOutcome::Sent)
            .with_transition(transition);
        self.audit.append(&entry).await?;
        Ok(entry)
    }

    /// Record an inbound response received at `at`.
    ///
    /// A contacted lead becomes `ENGAGED` when `at` is strictly after the last
    /// outbound. Returns the transition, if one fired.
    pub async fn record_inbound(
        &self,
        lead_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<StateTransition>> {
        let _lock = self.lock_lead(lead_id).await;
        let mut record = self.load(lead_id).await?;

        record.inbound_message_times.push(at);
        // Late deliveries carry old timestamps.
        record.updated_at = record.updated_at.max(at);

        let after_outbound = record.last_outbound_at.is_some_and(|outbound| at > outbound);
        let transition = if record.state == LeadEngagementState::Contacted && after_outbound {
            Some(record.apply_event(LeadEvent::InboundReceived, at)?)
        } else {
            None
        };

        info!(
            lead_id,
            state = %record.state,
            engaged = transition.is_some(),
            "Inbound response recorded"
        );

        self.store.put(record).await?;
        Ok(transition)
    }

    /// Apply a manual override or termination.
    ///
    /// Rejected events surface as `InvalidTransition` and nothing is persisted.
    pub async fn apply_event(
        &self,
        lead_id: &str,
        event: LeadEvent,
        now: DateTime<Utc>,
    ) -> Result<StateTransition> {
        let _lock = self.lock_lead(lead_id).await;
        let mut record = self.load(lead_id).await?;

        let transition = match record.apply_event(event, now) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    lead_id,
                    state = %record.state,
                    terminal = record.state.is_terminal(),
                    %event,
                    "Transition rejected"
                );
                return Err(e.into());
            }
        };
        self.store.put(record).await?;

        info!(
            lead_id,
            from = %transition.from,
            to = %transition.to,
            %event,
            "Lead transitioned"
        );
        Ok(transition)
    }
}

/// Event recorded when a follow-up goes out from `state`.
///
/// A first contact fires `OUTBOUND_SENT`. A lead that is already contacted
/// stays in its contact cycle through the `TIME_ELAPSED` self-transition.
fn send_event(state: LeadEngagementState) -> std::result::Result<LeadEvent, TransitionError> {
    [LeadEvent::OutboundSent, LeadEvent::TimeElapsed]
        .into_iter()
        .find(|event| can_transition(state, *event) == Some(LeadEngagementState::Contacted))
        .ok_or(TransitionError::InvalidTransition {
            from: state,
            event: LeadEvent::OutboundSent,
        })
}
