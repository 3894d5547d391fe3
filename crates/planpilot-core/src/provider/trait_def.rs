//! The `Provider` trait -- the adapter interface for external work
//! trackers.
//!
//! Each concrete adapter (the in-memory reference target, a hosted
//! tracker, etc.) implements this trait. The trait is intentionally
//! object-safe so it can be stored as `Box<dyn Provider>` in the
//! [`super::ProviderRegistry`].

use async_trait::async_trait;

use super::types::{Item, ItemDraft, ItemUpdate, ProviderError, SearchFilter, SessionContext};

/// Adapter interface for creating and reconciling items in an external
/// work tracker.
///
/// # Division of labor
///
/// The engine owns how many calls run in parallel; the adapter owns
/// making each individual call reliable -- retrying transient failures
/// with bounded backoff ([`super::retry::with_retry`]) and coordinating a
/// shared pause across all in-flight calls when a rate limit is hit
/// ([`super::rate_limit::RateGate`]). State resolved at session entry is
/// immutable afterwards; adapter-internal caches must tolerate concurrent
/// access.
///
/// # Relations
///
/// Relation operations take external ids and live on the trait rather
/// than on [`Item`], which stays plain data. This keeps the trait
/// object-safe and the item type cheap to clone across task boundaries.
///
/// # Object Safety
///
/// Every method returns a concrete type, so `Box<dyn Provider>` works.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable adapter name, used as the registry key and the sync-map
    /// target (e.g. "memory").
    fn name(&self) -> &str;

    /// Enter a session: resolve authentication and target context.
    ///
    /// Capability problems must surface here, before any item-level
    /// work, so a run either fully proceeds or fails without mutating
    /// anything. The returned context is read-only for the rest of the
    /// session.
    async fn enter(&self) -> Result<SessionContext, ProviderError>;

    /// Exit the session and release resources.
    async fn exit(&self) -> Result<(), ProviderError>;

    /// Search items whose labels include every filter label AND whose
    /// body contains the filter substring (conjunctive).
    ///
    /// Adapters that cannot satisfy these semantics must return
    /// [`ProviderError::Capability`]; a silently truncated result set is
    /// never acceptable.
    async fn search_items(&self, filter: &SearchFilter) -> Result<Vec<Item>, ProviderError>;

    /// Create an item, idempotently.
    ///
    /// Creation is logically multi-step (record, type, labels, board,
    /// board fields) but presents as one operation: re-invoking it for an
    /// item that already exists in a partially configured state must
    /// converge that item instead of duplicating it. The metadata marker
    /// in `draft.body` is written by the very first step, so a partial
    /// record is always discoverable by marker.
    ///
    /// A failure partway through returns
    /// [`ProviderError::PartialCreation`] carrying the created identity
    /// (if any), the completed steps, and whether retrying is safe.
    async fn create_item(&self, draft: &ItemDraft) -> Result<Item, ProviderError>;

    /// Overwrite the plan-authoritative fields of an item.
    ///
    /// Labels are applied additively; workflow fields are untouched.
    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<Item, ProviderError>;

    /// Fetch a single item by external id.
    async fn get_item(&self, id: &str) -> Result<Item, ProviderError>;

    /// Delete an item by external id.
    async fn delete_item(&self, id: &str) -> Result<(), ProviderError>;

    /// Make `item_id` a child of `parent_id`.
    async fn set_parent(&self, item_id: &str, parent_id: &str) -> Result<(), ProviderError>;

    /// Mark `item_id` as blocked by `blocked_by_id`.
    async fn add_dependency(&self, item_id: &str, blocked_by_id: &str)
    -> Result<(), ProviderError>;
}

// Compile-time assertion: Provider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Provider) {}
};
