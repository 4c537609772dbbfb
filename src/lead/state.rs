//! Lead engagement state machine.
//!
//! Every `(state, event)` pair is spelled out in [`next_state`]. There is no
//! wildcard arm, so a new state or event fails to compile until the table
//! covers it, and every pair without a target is a rejected transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Lifecycle state of one lead.
///
/// Starts at `New`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadEngagementState {
    /// Lead exists, nothing sent yet.
    New,
    /// At least one outbound message has been sent.
    Contacted,
    /// The lead responded after an outbound message.
    Engaged,
    /// Automation halted by a manual override.
    Paused,
    /// Lead lifecycle is over.
    Closed,
}

impl LeadEngagementState {
    pub const ALL: [LeadEngagementState; 5] = [
        Self::New,
        Self::Contacted,
        Self::Engaged,
        Self::Paused,
        Self::Closed,
    ];

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl Default for LeadEngagementState {
    fn default() -> Self {
        Self::New
    }
}

impl std::fmt::Display for LeadEngagementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Contacted => "CONTACTED",
            Self::Engaged => "ENGAGED",
            Self::Paused => "PAUSED",
            Self::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}

/// Events that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadEvent {
    LeadCreated,
    OutboundSent,
    InboundReceived,
    TimeElapsed,
    ManualOverride,
    Terminate,
}

impl LeadEvent {
    pub const ALL: [LeadEvent; 6] = [
        Self::LeadCreated,
        Self::OutboundSent,
        Self::InboundReceived,
        Self::TimeElapsed,
        Self::ManualOverride,
        Self::Terminate,
    ];
}

impl std::fmt::Display for LeadEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LeadCreated => "LEAD_CREATED",
            Self::OutboundSent => "OUTBOUND_SENT",
            Self::InboundReceived => "INBOUND_RECEIVED",
            Self::TimeElapsed => "TIME_ELAPSED",
            Self::ManualOverride => "MANUAL_OVERRIDE",
            Self::Terminate => "TERMINATE",
        };
        write!(f, "{s}")
    }
}

fn next_state(from: LeadEngagementState, event: LeadEvent) -> Option<LeadEngagementState> {
    use LeadEngagementState::*;
    use LeadEvent::*;

    match (from, event) {
        (New, LeadCreated) => Some(New),
        (New, OutboundSent) => Some(Contacted),
        (New, InboundReceived | TimeElapsed | ManualOverride | Terminate) => None,

        (Contacted, InboundReceived) => Some(Engaged),
        (Contacted, TimeElapsed) => Some(Contacted),
        (Contacted, ManualOverride) => Some(Paused),
        (Contacted, Terminate) => Some(Closed),
        (Contacted, LeadCreated | OutboundSent) => None,

        (Engaged, ManualOverride) => Some(Paused),
        (Engaged, Terminate) => Some(Closed),
        (Engaged, LeadCreated | OutboundSent | InboundReceived | TimeElapsed) => None,

        (Paused, ManualOverride) => Some(Contacted),
        (Paused, Terminate) => Some(Closed),
        (Paused, LeadCreated | OutboundSent | InboundReceived | TimeElapsed) => None,

        (
            Closed,
            LeadCreated | OutboundSent | InboundReceived | TimeElapsed | ManualOverride | Terminate,
        ) => None,
    }
}

/// Apply `event` to `current`, failing when the table has no entry for the pair.
///
/// On error the caller must not mutate any persisted state.
pub fn transition_state(
    current: LeadEngagementState,
    event: LeadEvent,
) -> Result<LeadEngagementState, TransitionError> {
    next_state(current, event).ok_or(TransitionError::InvalidTransition {
        from: current,
        event,
    })
}

/// Pre-flight variant of [`transition_state`]: `None` for pairs the table rejects.
pub fn can_transition(current: LeadEngagementState, event: LeadEvent) -> Option<LeadEngagementState> {
    next_state(current, event)
}

/// A recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: LeadEngagementState,
    /// Event that fired.
    pub event: LeadEvent,
    /// New state.
    pub to: LeadEngagementState,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
}

impl StateTransition {
    /// Validate and record a transition at `timestamp`.
    pub fn apply(
        from: LeadEngagementState,
        event: LeadEvent,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        let to = transition_state(from, event)?;
        Ok(Self {
            from,
            event,
            to,
            timestamp,
        })
    }
}
