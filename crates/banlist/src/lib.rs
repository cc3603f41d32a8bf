//! Top-level facade crate for banlist.
//!
//! Re-exports the core types and the engine library so users can depend on a single crate.

pub mod core {
    pub use banlist_core::*;
}

pub mod engine {
    pub use banlist_engine::*;
}
