//! Ordered suppression rules.
//!
//! Rules run in a fixed order and the first match wins:
//! 1. `STATE_BLOCK` — lead is `PAUSED`, `CLOSED`, or `ENGAGED`
//! 2. `RESPONSE_SUPPRESSION` — latest inbound is strictly after the last outbound
//! 3. `TIME_GATE` — less than `delay_minutes` since the last outbound
//! 4. `ELIGIBLE` — send
//!
//! No I/O and no clock access: the same input always yields the same decision.

use chrono::{DateTime, TimeDelta, Utc};

use crate::engine::types::{Decision, EngineInput, Evidence, Rule, iso8601};
use crate::lead::state::LeadEngagementState;

/// Identifier stamped on audit records so a decision can be replayed
/// against the engine build that produced it.
pub const ENGINE_VERSION: &str = concat!("followup-gate/", env!("CARGO_PKG_VERSION"));

/// Values derived once from the input and shared by every rule.
struct Facts {
    delay_minutes: i64,
    delay: TimeDelta,
    latest_inbound_at: Option<DateTime<Utc>>,
    inbound_after_outbound: bool,
    elapsed: Option<TimeDelta>,
    next_eligible_at: Option<DateTime<Utc>>,
}

impl Facts {
    fn derive(input: &EngineInput) -> Self {
        let delay_minutes = input.delay_minutes.max(0);
        // Saturate instead of overflowing on absurd configuration.
        let delay = TimeDelta::try_minutes(delay_minutes).unwrap_or(TimeDelta::MAX);

        let latest_inbound_at = input.inbound_message_times.iter().copied().max();
        let inbound_after_outbound = match (latest_inbound_at, input.last_outbound_at) {
            (Some(inbound), Some(outbound)) => inbound > outbound,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let elapsed = input
            .last_outbound_at
            .map(|outbound| input.now.signed_duration_since(outbound));
        let next_eligible_at = input
            .last_outbound_at
            .and_then(|outbound| outbound.checked_add_signed(delay));

        Self {
            delay_minutes,
            delay,
            latest_inbound_at,
            inbound_after_outbound,
            elapsed,
            next_eligible_at,
        }
    }

    fn evidence(&self, input: &EngineInput) -> Evidence {
        Evidence {
            now: iso8601(input.now),
            delay_minutes: self.delay_minutes,
            inbound_after_outbound: self.inbound_after_outbound,
            last_outbound_at: input.last_outbound_at.map(iso8601),
            last_inbound_at: self.latest_inbound_at.map(iso8601),
            time_since_last_outbound_seconds: self.elapsed.map(|e| e.num_seconds()),
            next_eligible_at: self.next_eligible_at.map(iso8601),
        }
    }
}

/// Decide whether a follow-up should be sent for the lead described by `input`.
///
/// Total over well-typed input: never panics, never errors.
pub fn evaluate(input: &EngineInput) -> Decision {
    let facts = Facts::derive(input);
    let state = input.current_state;
    let (rule, explanation) = select_rule(input, &facts);
    Decision::new(rule, explanation, state, facts.evidence(input))
}

fn select_rule(input: &EngineInput, facts: &Facts) -> (Rule, String) {
    let state = input.current_state;

    match state {
        LeadEngagementState::Paused | LeadEngagementState::Closed => {
            return (
                Rule::StateBlock,
                format!("Lead is {state}; automated follow-ups are blocked"),
            );
        }
        LeadEngagementState::Engaged => {
            return (
                Rule::StateBlock,
                format!(
                    "Lead is {state}; a response was already recorded for this contact cycle"
                ),
            );
        }
        LeadEngagementState::New | LeadEngagementState::Contacted => {}
    }

    if facts.inbound_after_outbound {
        let inbound = facts.latest_inbound_at.map(iso8601).unwrap_or_default();
        let explanation = match input.last_outbound_at {
            Some(outbound) => format!(
                "Inbound response at {inbound} arrived after the last outbound at {}",
                iso8601(outbound)
            ),
            None => format!("Inbound response at {inbound} arrived before any outbound was sent"),
        };
        return (Rule::ResponseSuppression, explanation);
    }

    if let Some(elapsed) = facts.elapsed.filter(|elapsed| *elapsed < facts.delay) {
        let eligible = facts
            .next_eligible_at
            .map(iso8601)
            .unwrap_or_else(|| "never".to_string());
        return (
            Rule::TimeGate,
            format!(
                "{}s elapsed since the last outbound, {} minute delay required; eligible at {eligible}",
                elapsed.num_seconds(),
                facts.delay_minutes
            ),
        );
    }

    let explanation = if input.last_outbound_at.is_some() {
        format!(
            "{} minute delay has elapsed with no response; follow-up may be sent",
            facts.delay_minutes
        )
    } else {
        "No outbound sent yet and no response recorded; follow-up may be sent".to_string()
    };
    (Rule::Eligible, explanation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::engine::types::Action;
    use LeadEngagementState::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn mins(n: i64) -> TimeDelta {
        TimeDelta::minutes(n)
    }

    #[test]
    fn new_lead_without_history_is_eligible() {
        let decision = evaluate(&EngineInput::new(New, 10, t0()));
        assert_eq!(decision.action, Action::Send);
        assert_eq!(decision.rule, Rule::Eligible);
        assert_eq!(decision.current_state, New);
        assert_eq!(decision.evidence.now, "2024-03-01T09:00:00.000Z");
        assert!(!decision.evidence.inbound_after_outbound);
        assert!(decision.evidence.last_outbound_at.is_none());
        assert!(decision.evidence.next_eligible_at.is_none());
    }

    #[test]
    fn contacted_within_delay_is_time_gated() {
        let input = EngineInput::new(Contacted, 60, t0() + mins(30)).with_last_outbound(t0());
        let decision = evaluate(&input);
        assert_eq!(decision.action, Action::Skip);
        assert_eq!(decision.rule, Rule::TimeGate);
        assert_eq!(
            decision.evidence.next_eligible_at.as_deref(),
            Some("2024-03-01T10:00:00.000Z")
        );
        assert_eq!(decision.evidence.time_since_last_outbound_seconds, Some(1800));
    }

    #[test]
    fn inbound_after_outbound_suppresses() {
        let input = EngineInput::new(Contacted, 60, t0() + mins(6))
            .with_last_outbound(t0())
            .with_inbound([t0() + mins(5)]);
        let decision = evaluate(&input);
        assert_eq!(decision.action, Action::Skip);
        assert_eq!(decision.rule, Rule::ResponseSuppression);
        assert!(decision.evidence.inbound_after_outbound);
        assert_eq!(
            decision.evidence.last_inbound_at.as_deref(),
            Some("2024-03-01T09:05:00.000Z")
        );
    }

    #[test]
    fn engaged_is_state_blocked() {
        let input = EngineInput::new(Engaged, 60, t0() + mins(11))
            .with_last_outbound(t0())
            .with_inbound([t0() + mins(10)]);
        let decision = evaluate(&input);
        assert_eq!(decision.action, Action::Skip);
        assert_eq!(decision.rule, Rule::StateBlock);
        // Evidence is still complete for audit.
        assert!(decision.evidence.inbound_after_outbound);
        assert!(decision.evidence.next_eligible_at.is_some());
    }

    #[test]
    fn inbound_before_outbound_does_not_suppress() {
        let input = EngineInput::new(Contacted, 30, t0() + mins(41))
            .with_last_outbound(t0() + mins(10))
            .with_inbound([t0() + mins(5)]);
        let decision = evaluate(&input);
        assert_eq!(decision.action, Action::Send);
        assert_eq!(decision.rule, Rule::Eligible);
        assert!(!decision.evidence.inbound_after_outbound);
    }

    #[test]
    fn paused_and_closed_block_regardless_of_timestamps() {
        for state in [Paused, Closed] {
            let inputs = [
                EngineInput::new(state, 0, t0()),
                EngineInput::new(state, 60, t0()).with_inbound([t0()]),
                EngineInput::new(state, -5, t0() + mins(500)).with_last_outbound(t0()),
            ];
            for input in inputs {
                let decision = evaluate(&input);
                assert_eq!(decision.action, Action::Skip);
                assert_eq!(decision.rule, Rule::StateBlock, "{state}");
            }
        }
    }

    #[test]
    fn inbound_without_any_outbound_suppresses() {
        let input = EngineInput::new(New, 10, t0()).with_inbound([t0() - mins(1)]);
        let decision = evaluate(&input);
        assert_eq!(decision.rule, Rule::ResponseSuppression);
    }

    #[test]
    fn inbound_equal_to_outbound_is_not_after() {
        let input = EngineInput::new(Contacted, 0, t0())
            .with_last_outbound(t0())
            .with_inbound([t0()]);
        let decision = evaluate(&input);
        assert_eq!(decision.rule, Rule::Eligible);
        assert!(!decision.evidence.inbound_after_outbound);
    }

    #[test]
    fn only_latest_inbound_matters() {
        let outbound = t0() + mins(10);
        let older = EngineInput::new(Contacted, 0, t0() + mins(20))
            .with_last_outbound(outbound)
            .with_inbound([t0() + mins(9), t0(), t0() + mins(1)]);
        assert_eq!(evaluate(&older).rule, Rule::Eligible);

        let one_newer = older.clone().with_inbound([t0() + mins(11)]);
        let decision = evaluate(&one_newer);
        assert_eq!(decision.rule, Rule::ResponseSuppression);
        assert_eq!(
            decision.evidence.last_inbound_at.as_deref(),
            Some("2024-03-01T09:11:00.000Z")
        );
    }

    #[test]
    fn time_gate_boundary_is_inclusive() {
        let delay = 45;
        let deadline = t0() + mins(delay);

        let before = EngineInput::new(Contacted, delay, deadline - TimeDelta::milliseconds(1))
            .with_last_outbound(t0());
        let decision = evaluate(&before);
        assert_eq!(decision.action, Action::Skip);
        assert_eq!(decision.rule, Rule::TimeGate);

        let at = EngineInput::new(Contacted, delay, deadline).with_last_outbound(t0());
        let decision = evaluate(&at);
        assert_eq!(decision.action, Action::Send);
        assert_eq!(decision.rule, Rule::Eligible);
    }

    #[test]
    fn negative_delay_behaves_like_zero() {
        let cases = [
            EngineInput::new(New, 0, t0()),
            EngineInput::new(Contacted, 0, t0()).with_last_outbound(t0()),
            EngineInput::new(Contacted, 0, t0() - mins(3)).with_last_outbound(t0()),
            EngineInput::new(Contacted, 0, t0() + mins(2))
                .with_last_outbound(t0())
                .with_inbound([t0() + mins(1)]),
            EngineInput::new(Engaged, 0, t0()).with_last_outbound(t0()),
        ];
        for zero in cases {
            let mut negative = zero.clone();
            negative.delay_minutes = -100;
            assert_eq!(evaluate(&negative), evaluate(&zero));
        }
    }

    #[test]
    fn now_before_outbound_is_gated() {
        let input = EngineInput::new(Contacted, 0, t0() - mins(1)).with_last_outbound(t0());
        let decision = evaluate(&input);
        assert_eq!(decision.rule, Rule::TimeGate);
        assert_eq!(decision.evidence.time_since_last_outbound_seconds, Some(-60));
    }

    #[test]
    fn huge_delay_saturates_without_panicking() {
        let input = EngineInput::new(Contacted, i64::MAX, t0() + mins(1)).with_last_outbound(t0());
        let decision = evaluate(&input);
        assert_eq!(decision.rule, Rule::TimeGate);
        assert!(decision.evidence.next_eligible_at.is_none());
    }

    #[test]
    fn evaluate_is_deterministic() {
        let input = EngineInput::new(Contacted, 15, t0() + mins(7))
            .with_last_outbound(t0())
            .with_inbound([t0() - mins(3), t0() - mins(9)]);
        assert_eq!(evaluate(&input), evaluate(&input));
        assert_eq!(
            serde_json::to_string(&evaluate(&input)).unwrap(),
            serde_json::to_string(&evaluate(&input)).unwrap()
        );
    }

    #[test]
    fn version_names_the_crate() {
        assert!(ENGINE_VERSION.starts_with("followup-gate/"));
    }
}
