//! Reference orchestrator around the decision engine.
//!
//! The engine only decides. This module owns the side of the loop that
//! touches the world, behind trait seams:
//! - `store` — `LeadStore` persistence for lead state and message history
//! - `audit` — `AuditSink` for one record per evaluation
//! - `runner` — `FollowUpRunner`, serializing evaluate → send → transition per lead

pub mod audit;
pub mod runner;
pub mod store;

pub use audit::{AuditOutcome, AuditRecord, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use runner::{FollowUpRunner, OutboundSender};
pub use store::{InMemoryLeadStore, LeadRecord, LeadStore};
