//! banlist core: glob compilation, rule normalization, and per-list rule sets.
//!
//! This crate holds everything needed to turn policy records into matchers and
//! evaluate candidates against them. It carries no runtime or storage
//! dependencies; the engine crate layers publishing, refresh and host
//! callbacks on top.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed records
//! and odd globs are absorbed (dropped or compiled anyway) rather than
//! surfacing as crashes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod glob;
pub mod record;
pub mod rule;
pub mod ruleset;

/// Shared result type.
pub use error::{BanlistError, Result};
pub use glob::CompiledPattern;
pub use record::{RawRecord, RecordId, UserId};
pub use rule::{BanAction, PolicyRule, RuleKind};
pub use ruleset::RuleSet;
