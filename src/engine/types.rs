//! Input, decision, and evidence value types for the decision engine.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::lead::state::LeadEngagementState;

// ── Input ───────────────────────────────────────────────────────────

/// Snapshot of one lead, built fresh for a single evaluation.
///
/// Timestamps are trusted as given. Callers filter out invalid inbound
/// times before building the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInput {
    pub current_state: LeadEngagementState,
    /// Most recent outbound message, if any was ever sent.
    #[serde(default)]
    pub last_outbound_at: Option<DateTime<Utc>>,
    /// Inbound responses for the current contact cycle, in any order.
    #[serde(default)]
    pub inbound_message_times: Vec<DateTime<Utc>>,
    /// Minimum wait between follow-ups. Negative values behave as zero.
    pub delay_minutes: i64,
    /// Clock reading captured by the caller.
    pub now: DateTime<Utc>,
}

impl EngineInput {
    /// Input for a lead with no message history.
    pub fn new(current_state: LeadEngagementState, delay_minutes: i64, now: DateTime<Utc>) -> Self {
        Self {
            current_state,
            last_outbound_at: None,
            inbound_message_times: Vec::new(),
            delay_minutes,
            now,
        }
    }

    pub fn with_last_outbound(mut self, at: DateTime<Utc>) -> Self {
        self.last_outbound_at = Some(at);
        self
    }

    pub fn with_inbound(mut self, times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        self.inbound_message_times.extend(times);
        self
    }
}

// ── Decision ────────────────────────────────────────────────────────

/// What the orchestrator should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Send,
    Skip,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Send => "SEND",
            Self::Skip => "SKIP",
        };
        write!(f, "{s}")
    }
}

/// The rule that produced a decision, listed in evaluation priority order.
///
/// A new suppression policy gets its own variant and its own position in
/// `engine::decision::evaluate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    /// Lead is paused, closed, or already engaged.
    StateBlock,
    /// The lead answered after the last outbound.
    ResponseSuppression,
    /// The configured delay has not yet elapsed.
    TimeGate,
    /// No rule suppressed the follow-up.
    Eligible,
}

impl Rule {
    /// Action implied by this rule.
    pub fn action(&self) -> Action {
        match self {
            Self::Eligible => Action::Send,
            Self::StateBlock | Self::ResponseSuppression | Self::TimeGate => Action::Skip,
        }
    }

    /// Position in the evaluation order, starting at 1.
    pub fn priority(&self) -> u8 {
        match self {
            Self::StateBlock => 1,
            Self::ResponseSuppression => 2,
            Self::TimeGate => 3,
            Self::Eligible => 4,
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StateBlock => "STATE_BLOCK",
            Self::ResponseSuppression => "RESPONSE_SUPPRESSION",
            Self::TimeGate => "TIME_GATE",
            Self::Eligible => "ELIGIBLE",
        };
        write!(f, "{s}")
    }
}

/// Structured justification retained with every decision.
///
/// Optional fields are present whenever the input makes them computable,
/// regardless of which rule fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Clock reading the decision was made against (ISO-8601).
    pub now: String,
    /// Effective delay after clamping to zero.
    pub delay_minutes: i64,
    pub inbound_after_outbound: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outbound_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inbound_at: Option<String>,
    /// Whole seconds between the last outbound and `now`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_since_last_outbound_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_eligible_at: Option<String>,
}

/// Immutable engine output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub rule: Rule,
    pub explanation: String,
    pub current_state: LeadEngagementState,
    pub evidence: Evidence,
}

impl Decision {
    /// Build a decision whose action is derived from `rule`.
    pub fn new(
        rule: Rule,
        explanation: impl Into<String>,
        current_state: LeadEngagementState,
        evidence: Evidence,
    ) -> Self {
        Self {
            action: rule.action(),
            rule,
            explanation: explanation.into(),
            current_state,
            evidence,
        }
    }

    pub fn is_send(&self) -> bool {
        self.action == Action::Send
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
