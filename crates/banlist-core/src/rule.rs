//! Normalized policy rules.
//!
//! Policy lists have used several event types and recommendation strings for
//! the same meaning over the protocol's history. Everything is normalized to
//! one canonical value here; anything unrecognized becomes `Unknown` and is
//! kept for bookkeeping but never enforced.

use crate::glob::{self, CompiledPattern};

pub const RECOMMENDATION_BAN: &str = "m.ban";
pub const RECOMMENDATION_BAN_TYPES: &[&str] = &[RECOMMENDATION_BAN, "org.matrix.mjolnir.ban"];

pub const RULE_USER: &str = "m.policy.rule.user";
pub const RULE_ROOM: &str = "m.policy.rule.room";
pub const RULE_SERVER: &str = "m.policy.rule.server";

pub const USER_RULE_TYPES: &[&str] = &[RULE_USER, "m.room.rule.user", "org.matrix.mjolnir.rule.user"];
pub const ROOM_RULE_TYPES: &[&str] = &[RULE_ROOM, "m.room.rule.room", "org.matrix.mjolnir.rule.room"];
pub const SERVER_RULE_TYPES: &[&str] = &[
    RULE_SERVER,
    "m.room.rule.server",
    "org.matrix.mjolnir.rule.server",
];

/// What a rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    User,
    Room,
    Server,
    Unknown,
}

impl RuleKind {
    /// Kinds the decision engine evaluates.
    pub const ENFORCED: [RuleKind; 3] = [RuleKind::User, RuleKind::Room, RuleKind::Server];

    pub fn from_type(event_type: &str) -> Self {
        if USER_RULE_TYPES.contains(&event_type) {
            RuleKind::User
        } else if ROOM_RULE_TYPES.contains(&event_type) {
            RuleKind::Room
        } else if SERVER_RULE_TYPES.contains(&event_type) {
            RuleKind::Server
        } else {
            RuleKind::Unknown
        }
    }

    /// Every event type spelling that normalizes to this kind.
    pub fn spellings(self) -> &'static [&'static str] {
        match self {
            RuleKind::User => USER_RULE_TYPES,
            RuleKind::Room => ROOM_RULE_TYPES,
            RuleKind::Server => SERVER_RULE_TYPES,
            RuleKind::Unknown => &[],
        }
    }

    /// Stable event type for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::User => RULE_USER,
            RuleKind::Room => RULE_ROOM,
            RuleKind::Server => RULE_SERVER,
            RuleKind::Unknown => "unknown",
        }
    }
}

/// Whether `event_type` is any recognized rule type.
pub fn is_rule_type(event_type: &str) -> bool {
    RuleKind::from_type(event_type) != RuleKind::Unknown
}

/// Enforcement verdict a rule carries. Only `Ban` is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BanAction {
    Ban,
    Unknown,
}

impl BanAction {
    pub fn from_recommendation(recommendation: &str) -> Self {
        if RECOMMENDATION_BAN_TYPES.contains(&recommendation) {
            BanAction::Ban
        } else {
            BanAction::Unknown
        }
    }
}

/// A single normalized rule from a policy list.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub entity: String,
    pub compiled: CompiledPattern,
    pub action: BanAction,
    pub reason: String,
    pub kind: RuleKind,
}

impl PolicyRule {
    pub fn new(entity: &str, raw_action: &str, reason: &str, raw_kind: &str) -> Self {
        Self {
            entity: entity.to_string(),
            compiled: glob::compile(entity, false),
            action: BanAction::from_recommendation(raw_action),
            reason: reason.to_string(),
            kind: RuleKind::from_type(raw_kind),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.compiled.matches(candidate)
    }

    pub fn is_ban(&self) -> bool {
        self.action == BanAction::Ban
    }
}
