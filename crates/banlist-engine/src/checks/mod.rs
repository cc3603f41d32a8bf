//! Host-facing spam checker surface.
//!
//! Several event checks can be registered; an event is spam if any of them
//! says so. Every check runs, so policy records always reach the engine even
//! when an earlier check already flagged the event.

pub mod max_length;

use std::sync::Arc;

use banlist_core::RawRecord;

use crate::engine::{PolicyEngine, UserProfile};

pub use max_length::MessageMaxLength;

pub trait EventCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn check_event_for_spam(&self, event: &RawRecord) -> bool;
}

impl EventCheck for PolicyEngine {
    fn name(&self) -> &'static str {
        "policy_lists"
    }

    fn check_event_for_spam(&self, event: &RawRecord) -> bool {
        self.decide_message(event)
    }
}

pub struct CheckerRegistry {
    engine: Arc<PolicyEngine>,
    checks: Vec<Arc<dyn EventCheck>>,
}

impl CheckerRegistry {
    /// Starts with the policy engine registered as the first event check.
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        let checks: Vec<Arc<dyn EventCheck>> = vec![engine.clone() as Arc<dyn EventCheck>];
        Self { engine, checks }
    }

    pub fn register(&mut self, check: Arc<dyn EventCheck>) {
        self.checks.push(check);
    }

    pub fn registered(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// True when the event is spam.
    pub async fn check_event_for_spam(&self, event: &RawRecord) -> bool {
        let mut spam = false;
        for check in &self.checks {
            if check.check_event_for_spam(event) {
                tracing::debug!(check = check.name(), event_id = %event.event_id, "event flagged");
                spam = true;
            }
        }
        spam
    }

    /// True when the invite may go ahead.
    pub async fn user_may_invite(&self, inviter: &str, invitee: &str, room_id: &str) -> bool {
        self.engine.decide_invite(inviter, invitee, room_id)
    }

    /// True when the profile is spam.
    pub async fn check_username_for_spam(&self, profile: &UserProfile) -> bool {
        !self.engine.decide_username(profile)
    }
}
