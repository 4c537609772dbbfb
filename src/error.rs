//! Error types for the follow-up gate.

use crate::lead::state::{LeadEngagementState, LeadEvent};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Lifecycle state machine errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid transition: event {event} is not accepted in state {from}")]
    InvalidTransition {
        from: LeadEngagementState,
        event: LeadEvent,
    },
}

/// Lead and audit persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Lead {id} not found")]
    LeadNotFound { id: String },

    #[error("Lead {id} already exists")]
    LeadExists { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the outbound send collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to send follow-up to lead {lead_id}: {reason}")]
    SendFailed { lead_id: String, reason: String },
}

/// Result type alias for the follow-up gate.
pub type Result<T> = std::result::Result<T, Error>;
