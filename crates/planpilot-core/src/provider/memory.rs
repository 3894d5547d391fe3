//! In-memory reference provider.
//!
//! A complete, in-process implementation of the [`Provider`] contract:
//! the `memory` target of the CLI and the reference adapter for tests.
//! It keeps the full creation semantics of a real tracker -- marker-based
//! idempotent creation, additive labels, workflow status as a
//! creation-time default -- without any wire protocol.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::render::parse_marker;

use super::rate_limit::RateGate;
use super::trait_def::Provider;
use super::types::{
    Capabilities, Item, ItemDraft, ItemUpdate, ProviderError, SearchFilter, SessionContext,
};

const TARGET: &str = "memory";
const BOARD_URL: &str = "memory://board";

#[derive(Debug, Clone)]
struct StoredItem {
    item: Item,
    size: Option<String>,
    /// Workflow field: defaulted at creation, never re-asserted.
    status: String,
    parent: Option<String>,
    blocked_by: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    items: HashMap<String, StoredItem>,
    next_key: u64,
}

impl MemoryStore {
    /// Find an existing record carrying the same marker as `body`.
    fn find_by_marker(&self, body: &str) -> Option<String> {
        let marker = parse_marker(body)?;
        self.items
            .values()
            .find(|stored| parse_marker(&stored.item.body).as_ref() == Some(&marker))
            .map(|stored| stored.item.id.clone())
    }
}

/// The `memory` tracker target: everything lives in one mutex-guarded
/// store, safe for the engine's concurrent calls.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    gate: RateGate,
    store: Mutex<MemoryStore>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored item, sorted by key. Inspection aid for
    /// tests and dry runs.
    pub fn snapshot(&self) -> Vec<Item> {
        let store = self.store.lock().expect("memory store lock poisoned");
        let mut items: Vec<Item> = store.items.values().map(|s| s.item.clone()).collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }

    /// Workflow status of an item (creation default unless changed
    /// externally via [`MemoryProvider::set_status`]).
    pub fn status_of(&self, id: &str) -> Option<String> {
        let store = self.store.lock().expect("memory store lock poisoned");
        store.items.get(id).map(|s| s.status.clone())
    }

    /// Simulate an external workflow change (e.g. a human moving the
    /// item on the board).
    pub fn set_status(&self, id: &str, status: &str) {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if let Some(stored) = store.items.get_mut(id) {
            stored.status = status.to_owned();
        }
    }

    /// Simulate an externally added label.
    pub fn add_external_label(&self, id: &str, label: &str) {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if let Some(stored) = store.items.get_mut(id) {
            if !stored.item.labels.iter().any(|l| l == label) {
                stored.item.labels.push(label.to_owned());
            }
        }
    }

    /// External parent of an item, if set.
    pub fn parent_of(&self, id: &str) -> Option<String> {
        let store = self.store.lock().expect("memory store lock poisoned");
        store.items.get(id).and_then(|s| s.parent.clone())
    }

    /// External ids this item is blocked by.
    pub fn blocked_by_of(&self, id: &str) -> BTreeSet<String> {
        let store = self.store.lock().expect("memory store lock poisoned");
        store
            .items
            .get(id)
            .map(|s| s.blocked_by.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        TARGET
    }

    async fn enter(&self) -> Result<SessionContext, ProviderError> {
        Ok(SessionContext {
            target: TARGET.to_owned(),
            board_url: BOARD_URL.to_owned(),
            capabilities: Capabilities::full(),
        })
    }

    async fn exit(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn search_items(&self, filter: &SearchFilter) -> Result<Vec<Item>, ProviderError> {
        self.gate.wait_ready().await;
        let store = self.store.lock().expect("memory store lock poisoned");
        let mut hits: Vec<Item> = store
            .items
            .values()
            .filter(|stored| {
                filter
                    .labels
                    .iter()
                    .all(|label| stored.item.labels.iter().any(|l| l == label))
                    && stored.item.body.contains(&filter.body_contains)
            })
            .map(|stored| stored.item.clone())
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(hits)
    }

    async fn create_item(&self, draft: &ItemDraft) -> Result<Item, ProviderError> {
        self.gate.wait_ready().await;
        let mut store = self.store.lock().expect("memory store lock poisoned");

        // Idempotent creation: converge an existing record with the same
        // marker instead of duplicating it.
        if let Some(existing_id) = store.find_by_marker(&draft.body) {
            let stored = store
                .items
                .get_mut(&existing_id)
                .expect("id came from the store");
            stored.item.item_type = draft.item_type;
            for label in &draft.labels {
                if !stored.item.labels.iter().any(|l| l == label) {
                    stored.item.labels.push(label.clone());
                }
            }
            if stored.size.is_none() {
                stored.size = draft.size.clone();
            }
            tracing::debug!(key = %stored.item.key, "converged partially created item");
            return Ok(stored.item.clone());
        }

        store.next_key += 1;
        let key = format!("PP-{}", store.next_key);
        let item = Item {
            id: Uuid::new_v4().to_string(),
            key: key.clone(),
            url: format!("{BOARD_URL}/{key}"),
            title: draft.title.clone(),
            body: draft.body.clone(),
            item_type: draft.item_type,
            labels: draft.labels.clone(),
        };
        store.items.insert(
            item.id.clone(),
            StoredItem {
                item: item.clone(),
                size: draft.size.clone(),
                status: "todo".to_owned(),
                parent: None,
                blocked_by: BTreeSet::new(),
            },
        );
        Ok(item)
    }

    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<Item, ProviderError> {
        self.gate.wait_ready().await;
        let mut store = self.store.lock().expect("memory store lock poisoned");
        let stored = store
            .items
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))?;

        stored.item.title = update.title.clone();
        stored.item.body = update.body.clone();
        stored.item.item_type = update.item_type;
        for label in &update.ensure_labels {
            if !stored.item.labels.iter().any(|l| l == label) {
                stored.item.labels.push(label.clone());
            }
        }
        if update.size.is_some() {
            stored.size = update.size.clone();
        }
        Ok(stored.item.clone())
    }

    async fn get_item(&self, id: &str) -> Result<Item, ProviderError> {
        self.gate.wait_ready().await;
        let store = self.store.lock().expect("memory store lock poisoned");
        store
            .items
            .get(id)
            .map(|s| s.item.clone())
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))
    }

    async fn delete_item(&self, id: &str) -> Result<(), ProviderError> {
        self.gate.wait_ready().await;
        let mut store = self.store.lock().expect("memory store lock poisoned");
        store
            .items
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))
    }

    async fn set_parent(&self, item_id: &str, parent_id: &str) -> Result<(), ProviderError> {
        self.gate.wait_ready().await;
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if !store.items.contains_key(parent_id) {
            return Err(ProviderError::NotFound(parent_id.to_owned()));
        }
        let stored = store
            .items
            .get_mut(item_id)
            .ok_or_else(|| ProviderError::NotFound(item_id.to_owned()))?;
        stored.parent = Some(parent_id.to_owned());
        Ok(())
    }

    async fn add_dependency(
        &self,
        item_id: &str,
        blocked_by_id: &str,
    ) -> Result<(), ProviderError> {
        self.gate.wait_ready().await;
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if !store.items.contains_key(blocked_by_id) {
            return Err(ProviderError::NotFound(blocked_by_id.to_owned()));
        }
        let stored = store
            .items
            .get_mut(item_id)
            .ok_or_else(|| ProviderError::NotFound(item_id.to_owned()))?;
        stored.blocked_by.insert(blocked_by_id.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ItemType;
    use crate::render::format_marker;

    fn draft(item_id: &str, labels: &[&str]) -> ItemDraft {
        ItemDraft {
            title: format!("Item {item_id}"),
            body: format!("{}\n# Item {item_id}\n", format_marker("abcdef123456", item_id)),
            item_type: ItemType::Task,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            size: Some("M".to_owned()),
        }
    }

    #[tokio::test]
    async fn create_get_update_delete_roundtrip() {
        let provider = MemoryProvider::new();
        let item = provider.create_item(&draft("T1", &["planpilot"])).await.unwrap();
        assert_eq!(item.key, "PP-1");

        let fetched = provider.get_item(&item.id).await.unwrap();
        assert_eq!(fetched.title, "Item T1");

        let updated = provider
            .update_item(
                &item.id,
                &ItemUpdate {
                    title: "Renamed".to_owned(),
                    body: fetched.body.clone(),
                    item_type: ItemType::Task,
                    ensure_labels: vec![],
                    size: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");

        provider.delete_item(&item.id).await.unwrap();
        assert!(matches!(
            provider.get_item(&item.id).await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_is_idempotent_by_marker() {
        let provider = MemoryProvider::new();
        let first = provider.create_item(&draft("T1", &["planpilot"])).await.unwrap();
        let second = provider.create_item(&draft("T1", &["planpilot"])).await.unwrap();

        assert_eq!(first.id, second.id, "same marker must converge, not duplicate");
        assert_eq!(provider.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn converge_adds_missing_labels_without_dropping_external_ones() {
        let provider = MemoryProvider::new();
        let item = provider.create_item(&draft("T1", &[])).await.unwrap();
        provider.add_external_label(&item.id, "triage");

        let converged = provider.create_item(&draft("T1", &["planpilot"])).await.unwrap();
        assert!(converged.labels.contains(&"planpilot".to_owned()));
        assert!(converged.labels.contains(&"triage".to_owned()));
    }

    #[tokio::test]
    async fn search_is_conjunctive() {
        let provider = MemoryProvider::new();
        provider.create_item(&draft("T1", &["planpilot"])).await.unwrap();
        provider.create_item(&draft("T2", &["other"])).await.unwrap();

        // Label matches T1 only; body substring matches both.
        let hits = provider
            .search_items(&SearchFilter::new(
                ["planpilot".to_owned()],
                "PLAN_ID:abcdef123456",
            ))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "PP-1");

        // Label matches, body does not.
        let hits = provider
            .search_items(&SearchFilter::new(["planpilot".to_owned()], "PLAN_ID:ffffffffffff"))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn update_labels_are_additive() {
        let provider = MemoryProvider::new();
        let item = provider.create_item(&draft("T1", &["planpilot"])).await.unwrap();
        provider.add_external_label(&item.id, "urgent");

        let updated = provider
            .update_item(
                &item.id,
                &ItemUpdate {
                    title: item.title.clone(),
                    body: item.body.clone(),
                    item_type: item.item_type,
                    ensure_labels: vec!["planpilot".to_owned()],
                    size: None,
                },
            )
            .await
            .unwrap();
        assert!(
            updated.labels.contains(&"urgent".to_owned()),
            "externally added label must survive updates"
        );
    }

    #[tokio::test]
    async fn workflow_status_defaults_at_creation_and_survives_updates() {
        let provider = MemoryProvider::new();
        let item = provider.create_item(&draft("T1", &[])).await.unwrap();
        assert_eq!(provider.status_of(&item.id).as_deref(), Some("todo"));

        provider.set_status(&item.id, "in_progress");
        provider
            .update_item(
                &item.id,
                &ItemUpdate {
                    title: "t".to_owned(),
                    body: item.body.clone(),
                    item_type: item.item_type,
                    ensure_labels: vec![],
                    size: Some("L".to_owned()),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            provider.status_of(&item.id).as_deref(),
            Some("in_progress"),
            "updates must never re-assert workflow fields"
        );
    }

    #[tokio::test]
    async fn relations_are_stored() {
        let provider = MemoryProvider::new();
        let parent = provider.create_item(&draft("S1", &[])).await.unwrap();
        let child = provider.create_item(&draft("T1", &[])).await.unwrap();
        let blocker = provider.create_item(&draft("T2", &[])).await.unwrap();

        provider.set_parent(&child.id, &parent.id).await.unwrap();
        provider.add_dependency(&child.id, &blocker.id).await.unwrap();
        // Repeating a dependency is a no-op, not an error.
        provider.add_dependency(&child.id, &blocker.id).await.unwrap();

        assert_eq!(provider.parent_of(&child.id), Some(parent.id.clone()));
        assert_eq!(provider.blocked_by_of(&child.id).len(), 1);
    }

    #[tokio::test]
    async fn relation_to_unknown_id_is_not_found() {
        let provider = MemoryProvider::new();
        let item = provider.create_item(&draft("T1", &[])).await.unwrap();
        assert!(matches!(
            provider.set_parent(&item.id, "missing").await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn session_context_is_fully_capable() {
        let provider = MemoryProvider::new();
        let session = provider.enter().await.unwrap();
        assert_eq!(session.target, "memory");
        assert_eq!(session.capabilities, Capabilities::full());
        provider.exit().await.unwrap();
    }
}
