//! Deterministic send/skip decisions for outbound lead follow-ups.

pub mod config;
pub mod engine;
pub mod error;
pub mod lead;
pub mod orchestrator;
