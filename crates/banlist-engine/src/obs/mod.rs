//! In-process counters for decisions and rebuilds.
//!
//! Counters are atomics keyed by label sets and rendered in Prometheus text
//! format on request; nothing is exported automatically.

pub mod metrics;
