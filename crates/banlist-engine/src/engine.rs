//! Multi-list decision engine.
//!
//! Lists are kept in registration order and each list's rules in construction
//! order. A query walks lists in that order and the first rule that matches
//! decides: banned iff that rule's action is `Ban`. A later, conflicting rule
//! is never consulted.
//!
//! Each list is published as an `Arc<RuleSet>`. Readers clone the `Arc` under
//! a short read lock and evaluate against that snapshot, so a rebuild is seen
//! either entirely or not at all. Rebuilds are built aside and swapped in under
//! the write lock, which is never held across a store fetch.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;
use tokio::sync::mpsc;

use banlist_core::rule::is_rule_type;
use banlist_core::{RawRecord, RecordId, RuleKind, RuleSet, UserId};

use crate::config::EngineSection;
use crate::obs::metrics::EngineMetrics;
use crate::refresh::RefreshRequest;
use crate::store::PolicyStore;

/// Which categories of action are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enforcement {
    pub messages: bool,
    pub invites: bool,
    pub usernames: bool,
}

impl Default for Enforcement {
    fn default() -> Self {
        Self {
            messages: false,
            invites: true,
            usernames: false,
        }
    }
}

impl From<&EngineSection> for Enforcement {
    fn from(s: &EngineSection) -> Self {
        Self {
            messages: s.enforce_messages,
            invites: s.enforce_invites,
            usernames: s.enforce_usernames,
        }
    }
}

/// Result of offering a record to `route_record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// A policy record for a tracked list; folded in, never abuse.
    PolicyUpdate,
    /// Ordinary content; evaluate it.
    NotPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Published { rules: usize },
    /// A newer live record was published while fetching; result discarded.
    Stale,
    /// Fetch failed; the previous rules stay in force.
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    // Guarded values are only ever replaced whole, so a poisoned lock still
    // holds a complete snapshot.
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Without an id, a record is only recognised by its slot and content.
fn is_same_delivery(a: &RawRecord, b: &RawRecord) -> bool {
    if a.event_id.is_empty() || b.event_id.is_empty() {
        a.event_id.is_empty() && b.event_id.is_empty() && a.same_slot(b) && a.content == b.content
    } else {
        a.event_id == b.event_id
    }
}

struct Published {
    generation: u64,
    rules: Arc<RuleSet>,
    /// Live records not yet seen in a store snapshot, at most one per type
    /// and key. Store-backed rebuilds lay these over what they fetch.
    pending: Vec<RawRecord>,
}

struct ListSlot {
    container_id: String,
    state: RwLock<Published>,
}

impl ListSlot {
    fn new(container_id: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            state: RwLock::new(Published {
                generation: 0,
                rules: Arc::new(RuleSet::empty(container_id)),
                pending: Vec::new(),
            }),
        }
    }

    fn snapshot(&self) -> (u64, Arc<RuleSet>) {
        let g = read(&self.state);
        (g.generation, Arc::clone(&g.rules))
    }

    fn snapshot_with_pending(&self) -> (u64, Arc<RuleSet>, Vec<RawRecord>) {
        let g = read(&self.state);
        (g.generation, Arc::clone(&g.rules), g.pending.clone())
    }

    /// Swap in `rules` unless something else was published after `expected`.
    fn publish_if(&self, expected: u64, rules: RuleSet, pending: Vec<RawRecord>) -> bool {
        let mut g = write(&self.state);
        if g.generation != expected {
            return false;
        }
        g.generation += 1;
        g.rules = Arc::new(rules);
        g.pending = pending;
        true
    }
}

pub struct PolicyEngine {
    enforcement: Enforcement,
    lists: RwLock<Vec<Arc<ListSlot>>>,
    refresh_tx: Option<mpsc::UnboundedSender<RefreshRequest>>,
    metrics: Arc<EngineMetrics>,
}

impl PolicyEngine {
    /// `refresh_tx` receives store-backed rebuild requests; without it live
    /// records are still folded in but never re-read from the store.
    pub fn new(
        enforcement: Enforcement,
        refresh_tx: Option<mpsc::UnboundedSender<RefreshRequest>>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            enforcement,
            lists: RwLock::new(Vec::new()),
            refresh_tx,
            metrics,
        }
    }

    pub fn enforcement(&self) -> Enforcement {
        self.enforcement
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    fn slot(&self, container_id: &str) -> Option<Arc<ListSlot>> {
        read(&self.lists)
            .iter()
            .find(|s| s.container_id == container_id)
            .cloned()
    }

    fn slot_or_create(&self, container_id: &str) -> Arc<ListSlot> {
        if let Some(slot) = self.slot(container_id) {
            return slot;
        }
        let mut lists = write(&self.lists);
        if let Some(slot) = lists.iter().find(|s| s.container_id == container_id) {
            return Arc::clone(slot);
        }
        tracing::info!(list = %container_id, "tracking ban list");
        let slot = Arc::new(ListSlot::new(container_id));
        lists.push(Arc::clone(&slot));
        slot
    }

    /// Current rules for `container_id`, registering an empty list on first use.
    pub fn get_or_create(&self, container_id: &str) -> Arc<RuleSet> {
        self.slot_or_create(container_id).snapshot().1
    }

    /// Current rules for a tracked list.
    pub fn rule_set(&self, container_id: &str) -> Option<Arc<RuleSet>> {
        self.slot(container_id).map(|s| s.snapshot().1)
    }

    /// Tracked list ids in registration order.
    pub fn container_ids(&self) -> Vec<String> {
        read(&self.lists)
            .iter()
            .map(|s| s.container_id.clone())
            .collect()
    }

    pub fn is_tracked(&self, container_id: &str) -> bool {
        self.slot(container_id).is_some()
    }

    fn is_banned(&self, kind: RuleKind, candidate: &str) -> bool {
        let lists = read(&self.lists);
        for slot in lists.iter() {
            let (_, rules) = slot.snapshot();
            if let Some(rule) = rules.first_match(kind, candidate) {
                return rule.is_ban();
            }
        }
        false
    }

    pub fn is_user_banned(&self, user_id: &str) -> bool {
        self.is_banned(RuleKind::User, user_id)
    }

    pub fn is_room_banned(&self, room_id: &str) -> bool {
        self.is_banned(RuleKind::Room, room_id)
    }

    pub fn is_server_banned(&self, server_name: &str) -> bool {
        self.is_banned(RuleKind::Server, server_name)
    }

    fn is_domain_of_banned(&self, user_id: &str) -> bool {
        match UserId::parse(user_id) {
            Ok(u) => self.is_server_banned(u.domain()),
            Err(e) => {
                tracing::debug!(error = %e, "skipping server check");
                false
            }
        }
    }

    pub fn request_refresh(&self, req: RefreshRequest) {
        if let Some(tx) = &self.refresh_tx {
            if tx.send(req).is_err() {
                tracing::debug!("refresher stopped; dropping refresh request");
            }
        }
    }

    /// Fold a policy record for a tracked list into that list right away,
    /// then queue a store-backed rebuild that keeps the record on top.
    pub fn route_record(&self, record: &RawRecord) -> Routing {
        if record.state_key.is_none() || !is_rule_type(&record.record_type) {
            return Routing::NotPolicy;
        }
        let Some(slot) = self.slot(&record.room_id) else {
            return Routing::NotPolicy;
        };

        tracing::info!(list = %record.room_id, event_id = %record.event_id, "received ban list event; updating list");
        loop {
            let (generation, current, mut pending) = slot.snapshot_with_pending();
            let next = current.incremental_rebuild(current.sources().iter().cloned(), record);
            pending.retain(|p| !record.same_slot(p));
            pending.push(record.clone());
            if slot.publish_if(generation, next, pending) {
                break;
            }
        }
        self.metrics
            .rebuilds
            .inc(&[("mode", "live"), ("outcome", "published")]);

        self.request_refresh(RefreshRequest::Incremental {
            container_id: record.room_id.clone(),
            record: record.clone(),
        });
        Routing::PolicyUpdate
    }

    fn count_decision(&self, check: &str, allowed: bool) {
        let verdict = if allowed { "allow" } else { "deny" };
        self.metrics
            .decisions
            .inc(&[("check", check), ("verdict", verdict)]);
    }

    /// True when `event` is spam. Policy records are never spam.
    pub fn decide_message(&self, event: &RawRecord) -> bool {
        if self.route_record(event) == Routing::PolicyUpdate {
            return false;
        }
        if !self.enforcement.messages {
            return false;
        }

        let spam = self.is_user_banned(&event.sender) || self.is_domain_of_banned(&event.sender);
        self.count_decision("message", !spam);
        spam
    }

    /// True when the invite may go ahead.
    pub fn decide_invite(&self, inviter: &str, _invitee: &str, room_id: &str) -> bool {
        if !self.enforcement.invites {
            return true;
        }

        let denied = self.is_user_banned(inviter)
            || self.is_room_banned(room_id)
            || self.is_domain_of_banned(inviter);
        self.count_decision("invite", !denied);
        !denied
    }

    /// True when the profile's user id and display name are both acceptable.
    pub fn decide_username(&self, profile: &UserProfile) -> bool {
        if !self.enforcement.usernames {
            return true;
        }

        let denied = self.is_user_banned(&profile.user_id)
            || profile
                .display_name
                .as_deref()
                .is_some_and(|name| self.is_user_banned(name));
        self.count_decision("username", !denied);
        !denied
    }

    /// Re-read `container_id` from `store` and publish the result.
    ///
    /// Pending live records, and `with_record` if given, are folded over the
    /// snapshot. A pending record is retired once the snapshot contains it or
    /// once the rebuild made for it (`with_record`) has run. Failures are
    /// logged and leave the previous rules in place.
    pub async fn rebuild(
        &self,
        store: &dyn PolicyStore,
        container_id: &str,
        with_record: Option<&RawRecord>,
    ) -> RebuildOutcome {
        let slot = self.slot_or_create(container_id);
        let (generation, current, pending) = slot.snapshot_with_pending();
        let mode = if with_record.is_some() { "incremental" } else { "full" };

        tracing::info!(list = %container_id, mode, "rebuilding ban list");
        let records = match store
            .fetch_policy_records(container_id, &RuleKind::ENFORCED)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(list = %container_id, error = %e, "ban list fetch failed; keeping previous rules");
                self.metrics.rebuilds.inc(&[("mode", mode), ("outcome", "failed")]);
                return RebuildOutcome::Failed;
            }
        };

        let mut overlay = pending.clone();
        if let Some(record) = with_record {
            if !overlay.iter().any(|p| p.same_slot(record)) {
                overlay.push(record.clone());
            }
        }

        let still_pending: Vec<RawRecord> = {
            let fetched: HashSet<&RecordId> = records
                .iter()
                .map(|r| &r.event_id)
                .filter(|id| !id.is_empty())
                .collect();
            pending
                .into_iter()
                .filter(|p| !fetched.contains(&p.event_id))
                .filter(|p| with_record.map_or(true, |r| !is_same_delivery(r, p)))
                .collect()
        };

        let next = current.overlay_rebuild(records, &overlay);
        let rules = next.len();

        if !slot.publish_if(generation, next, still_pending) {
            tracing::debug!(list = %container_id, mode, "newer rules published during fetch; discarding rebuild");
            self.metrics.rebuilds.inc(&[("mode", mode), ("outcome", "stale")]);
            return RebuildOutcome::Stale;
        }

        tracing::info!(list = %container_id, rules, "ban list rebuilt");
        self.metrics.rebuilds.inc(&[("mode", mode), ("outcome", "published")]);
        RebuildOutcome::Published { rules }
    }

    /// Full rebuild of every tracked list. One list failing does not stop
    /// the others.
    pub async fn rebuild_all(&self, store: &dyn PolicyStore) {
        for id in self.container_ids() {
            self.rebuild(store, &id, None).await;
        }
    }
}
