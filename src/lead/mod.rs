//! Lead lifecycle.

pub mod state;

pub use state::{LeadEngagementState, LeadEvent, StateTransition, can_transition, transition_state};
