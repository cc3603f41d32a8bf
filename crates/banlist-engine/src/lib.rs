//! banlist engine library entry.
//!
//! Wires the policy engine, the store collaborator, background refresh, and
//! the host-facing checker surface together. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod app_state;
pub mod checks;
pub mod config;
pub mod engine;
pub mod obs;
pub mod refresh;
pub mod store;

pub use engine::{Enforcement, PolicyEngine, RebuildOutcome, Routing, UserProfile};
