//! Rules sourced from one policy list.
//!
//! A `RuleSet` is immutable once built. Rebuilding produces a new value from
//! a snapshot of records so the caller can publish it in one step; the old
//! value stays valid for anyone still holding it.

use std::collections::HashSet;

use crate::record::{RawRecord, RecordId};
use crate::rule::{PolicyRule, RuleKind};

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    container_id: String,
    user_rules: Vec<PolicyRule>,
    room_rules: Vec<PolicyRule>,
    server_rules: Vec<PolicyRule>,
    /// Records the partitions were built from, in order.
    sources: Vec<RawRecord>,
}

impl RuleSet {
    pub fn empty(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            ..Self::default()
        }
    }

    /// Build a fresh set from a store snapshot.
    ///
    /// Partition order follows snapshot order. Records without a key, or
    /// missing `entity`, `recommendation` or `reason`, are skipped.
    pub fn full_rebuild(&self, records: impl IntoIterator<Item = RawRecord>) -> RuleSet {
        Self::build(&self.container_id, records)
    }

    /// Build from a snapshot that may lag behind `new_record`.
    ///
    /// Any snapshot record with the same type and key as `new_record` but a
    /// different identity is dropped and `new_record` is appended, so the
    /// freshest value wins even if the store has not caught up yet. When the
    /// snapshot already holds `new_record` it keeps its snapshot position.
    pub fn incremental_rebuild(
        &self,
        records: impl IntoIterator<Item = RawRecord>,
        new_record: &RawRecord,
    ) -> RuleSet {
        self.overlay_rebuild(records, std::slice::from_ref(new_record))
    }

    /// `incremental_rebuild` for several fresh records at once. `newer` must
    /// hold at most one record per type and key.
    pub fn overlay_rebuild(
        &self,
        records: impl IntoIterator<Item = RawRecord>,
        newer: &[RawRecord],
    ) -> RuleSet {
        let merged = records
            .into_iter()
            .filter(|r| !newer.iter().any(|n| n.same_slot(r) && !n.same_identity(r)))
            .chain(newer.iter().cloned());
        Self::build(&self.container_id, merged)
    }

    fn build(container_id: &str, records: impl IntoIterator<Item = RawRecord>) -> RuleSet {
        let mut out = RuleSet::empty(container_id);
        let mut seen: HashSet<RecordId> = HashSet::new();

        for record in records {
            if record.state_key.is_none() {
                continue;
            }
            if !record.event_id.is_empty() && !seen.insert(record.event_id.clone()) {
                continue;
            }

            let (Some(entity), Some(recommendation), Some(reason)) = (
                record.content_str("entity"),
                record.content_str("recommendation"),
                record.content_str("reason"),
            ) else {
                continue;
            };

            let rule = PolicyRule::new(entity, recommendation, reason, &record.record_type);
            let partition = match rule.kind {
                RuleKind::User => &mut out.user_rules,
                RuleKind::Room => &mut out.room_rules,
                RuleKind::Server => &mut out.server_rules,
                RuleKind::Unknown => continue,
            };

            tracing::debug!(
                list = %container_id,
                kind = %record.record_type,
                entity = %entity,
                action = %recommendation,
                "adding rule"
            );
            partition.push(rule);
            out.sources.push(record);
        }

        out
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn user_rules(&self) -> &[PolicyRule] {
        &self.user_rules
    }

    pub fn room_rules(&self) -> &[PolicyRule] {
        &self.room_rules
    }

    pub fn server_rules(&self) -> &[PolicyRule] {
        &self.server_rules
    }

    pub fn rules(&self, kind: RuleKind) -> &[PolicyRule] {
        match kind {
            RuleKind::User => &self.user_rules,
            RuleKind::Room => &self.room_rules,
            RuleKind::Server => &self.server_rules,
            RuleKind::Unknown => &[],
        }
    }

    pub fn sources(&self) -> &[RawRecord] {
        &self.sources
    }

    /// First rule of `kind`, in construction order, matching `candidate`.
    pub fn first_match(&self, kind: RuleKind, candidate: &str) -> Option<&PolicyRule> {
        self.rules(kind).iter().find(|r| r.matches(candidate))
    }

    pub fn len(&self) -> usize {
        self.user_rules.len() + self.room_rules.len() + self.server_rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
