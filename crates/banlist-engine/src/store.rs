//! Record store collaborator.
//!
//! The engine never owns policy durably; it asks a `PolicyStore` for the
//! current snapshot of a list whenever it rebuilds.

use async_trait::async_trait;
use dashmap::DashMap;

use banlist_core::error::{BanlistError, Result};
use banlist_core::{RawRecord, RuleKind};

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Current keyed records of `kinds` in `container_id`, in store order.
    async fn fetch_policy_records(
        &self,
        container_id: &str,
        kinds: &[RuleKind],
    ) -> Result<Vec<RawRecord>>;
}

/// Store backed by process memory. Used by the binary and in tests.
///
/// Writes keep one record per `(type, state_key)` like room state does;
/// re-inserting an existing slot replaces it in place.
#[derive(Default)]
pub struct InMemoryStore {
    lists: DashMap<String, Vec<RawRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            lists: DashMap::new(),
        }
    }

    pub fn insert(&self, record: RawRecord) {
        let mut list = self.lists.entry(record.room_id.clone()).or_default();
        match list.iter_mut().find(|r| record.same_slot(r)) {
            Some(existing) => *existing = record,
            None => list.push(record),
        }
    }

    /// Seed from a JSON array of records.
    pub fn load_json(&self, s: &str) -> Result<usize> {
        let records: Vec<RawRecord> = serde_json::from_str(s)
            .map_err(|e| BanlistError::BadRequest(format!("invalid records json: {e}")))?;
        let n = records.len();
        for r in records {
            self.insert(r);
        }
        Ok(n)
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn fetch_policy_records(
        &self,
        container_id: &str,
        kinds: &[RuleKind],
    ) -> Result<Vec<RawRecord>> {
        let Some(list) = self.lists.get(container_id) else {
            return Ok(Vec::new());
        };
        Ok(list
            .iter()
            .filter(|r| r.state_key.is_some())
            .filter(|r| kinds.contains(&RuleKind::from_type(&r.record_type)))
            .cloned()
            .collect())
    }
}
