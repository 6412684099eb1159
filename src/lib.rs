// src/lib.rs
// Public library surface for the binary and integration tests.

// Content relevance
pub mod categories;
pub mod decision;
pub mod engine;
pub mod oracle;
pub mod profile;
pub mod relevance;
pub mod similarity;
pub mod tokenizer;

// Session & nudge protocol
pub mod antiflutter;
pub mod controller;
pub mod nudge;
pub mod scheduler;
pub mod session;

// Host-facing plumbing
pub mod api;
pub mod config;
pub mod metrics;
pub mod notify;
pub mod store;

pub use crate::api::{router, AppState};
pub use crate::controller::{ControllerDeps, ControllerHandle, FocusController, HostEvent};
pub use crate::decision::{Mode, Verdict};
pub use crate::engine::Engine;
pub use crate::nudge::{NudgeMachine, NudgeStage, Transition};
