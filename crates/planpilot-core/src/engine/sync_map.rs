//! The persisted association between plan items and external records.
//!
//! A sync map is scoped to one plan identifier and one target. The engine
//! builds it incrementally during a run and returns it in the result;
//! persisting it is the caller's responsibility. It is a cache -- the
//! authoritative idempotency source is always marker discovery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plan::ItemType;
use crate::provider::Item;

/// One persisted entry: the external identity of a plan item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub id: String,
    pub key: String,
    pub url: String,
    pub item_type: ItemType,
}

impl From<&Item> for SyncEntry {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            key: item.key.clone(),
            url: item.url.clone(),
            item_type: item.item_type,
        }
    }
}

/// The full persisted map for one `(plan_id, target)` pair.
///
/// Entries use a `BTreeMap` so serialization order is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMap {
    pub plan_id: String,
    pub target: String,
    pub board_url: String,
    pub entries: BTreeMap<String, SyncEntry>,
}

impl SyncMap {
    pub fn new(
        plan_id: impl Into<String>,
        target: impl Into<String>,
        board_url: impl Into<String>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            target: target.into(),
            board_url: board_url.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, plan_item_id: impl Into<String>, item: &Item) {
        self.entries.insert(plan_item_id.into(), SyncEntry::from(item));
    }

    pub fn get(&self, plan_item_id: &str) -> Option<&SyncEntry> {
        self.entries.get(plan_item_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
