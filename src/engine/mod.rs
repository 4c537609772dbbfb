//! Follow-up decision engine.
//!
//! A pure function over [`EngineInput`]: ordered suppression rules produce a
//! SEND/SKIP [`Decision`] naming exactly one [`Rule`], with [`Evidence`]
//! sufficient to replay it. Time enters only through `EngineInput::now`.

pub mod decision;
pub mod types;

pub use decision::{ENGINE_VERSION, evaluate};
pub use types::{Action, Decision, EngineInput, Evidence, Rule};
