//! The auto-reply pipeline.
//!
//! Inbound messages flow through:
//! 1. configuration gates (active bot, channel toggle, working hours)
//! 2. an atomic claim (`received → processed`)
//! 3. intent classification → reply generation
//! 4. dispatch through the originating channel
//! 5. a terminal status (`replied` or `failed`)
//!
//! Gated-out messages keep their `received` status and are left for
//! manual handling or a later run.

pub mod orchestrator;
pub mod runner;

pub use orchestrator::{AutoReplyOrchestrator, GateDecision};
pub use runner::spawn_poll_loop;
