//! Data types crossing the provider boundary.
//!
//! Everything here is adapter-agnostic: the engine reads these types and
//! never sees an adapter's wire format.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::ItemType;

/// An item as it exists in the external tracker.
///
/// Created and mutated exclusively by the provider adapter; the engine
/// only reads these fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Adapter-internal id, opaque to the engine.
    pub id: String,
    /// Human-readable key (e.g. "PP-42").
    pub key: String,
    /// Link to the item in the external system.
    pub url: String,
    pub title: String,
    pub body: String,
    pub item_type: ItemType,
    pub labels: Vec<String>,
}

/// The externally visible identity of a created record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemIdentity {
    pub id: String,
    pub key: String,
    pub url: String,
}

/// Everything needed to create an item.
///
/// Workflow-style fields (status, priority, iteration) are deliberately
/// absent: they are creation-time defaults owned by the adapter and are
/// never asserted by the engine.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub title: String,
    /// Body text; must already contain the metadata marker at the top.
    pub body: String,
    pub item_type: ItemType,
    pub labels: Vec<String>,
    pub size: Option<String>,
}

/// Plan-authoritative fields applied on update.
///
/// `ensure_labels` is additive: listed labels are ensured present, labels
/// added externally are never removed.
#[derive(Debug, Clone)]
pub struct ItemUpdate {
    pub title: String,
    pub body: String,
    pub item_type: ItemType,
    pub ensure_labels: Vec<String>,
    pub size: Option<String>,
}

/// Conjunctive search filter: every label must be present AND the body
/// must contain the substring.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub labels: BTreeSet<String>,
    pub body_contains: String,
}

impl SearchFilter {
    pub fn new(labels: impl IntoIterator<Item = String>, body_contains: impl Into<String>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
            body_contains: body_contains.into(),
        }
    }
}

/// What an adapter can do, declared at session entry.
///
/// A missing capability must surface as [`ProviderError::Capability`]
/// before any item-level work, never as a silently degraded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Can search by label set AND body substring, without truncation.
    pub search_by_label_and_body: bool,
    pub set_parent: bool,
    pub add_dependency: bool,
}

impl Capabilities {
    /// A fully capable adapter.
    pub const fn full() -> Self {
        Self {
            search_by_label_and_body: true,
            set_parent: true,
            add_dependency: true,
        }
    }
}

/// Session-scoped context resolved by [`super::Provider::enter`].
///
/// Immutable after session entry; everything outside the adapter treats
/// it as read-only.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Name of the external target (e.g. "memory", "github").
    pub target: String,
    /// Board/project URL the items land on.
    pub board_url: String,
    pub capabilities: Capabilities,
}

/// The canonical, ordered steps of item creation.
///
/// `CreateRecord` writes the body (marker included), so an item that
/// fails any later step is already discoverable and resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateStep {
    CreateRecord,
    AssignType,
    ApplyLabels,
    AttachToBoard,
    SetBoardFields,
}

impl CreateStep {
    /// All steps in execution order.
    pub const ALL: [CreateStep; 5] = [
        CreateStep::CreateRecord,
        CreateStep::AssignType,
        CreateStep::ApplyLabels,
        CreateStep::AttachToBoard,
        CreateStep::SetBoardFields,
    ];
}

impl fmt::Display for CreateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateRecord => "create_record",
            Self::AssignType => "assign_type",
            Self::ApplyLabels => "apply_labels",
            Self::AttachToBoard => "attach_to_board",
            Self::SetBoardFields => "set_board_fields",
        };
        f.write_str(s)
    }
}

/// A creation call that mutated external state but did not finish all
/// configuration steps.
#[derive(Debug, Clone, Error)]
#[error("item creation failed after {} step(s){}: {message}",
    .completed.len(),
    .identity.as_ref().map(|i| format!(" (created {})", i.key)).unwrap_or_default())]
pub struct PartialFailure {
    /// External identity already created, or `None` if creation itself
    /// never completed.
    pub identity: Option<ItemIdentity>,
    /// Canonical steps that did complete, in order.
    pub completed: Vec<CreateStep>,
    pub retryable: bool,
    pub message: String,
}

/// Errors raised by provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider capability missing: {0}")]
    Capability(String),

    #[error("rate limited{}", .retry_after.map(|d| format!(", retry after {}ms", d.as_millis())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("item not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    PartialCreation(#[from] PartialFailure),

    #[error("provider call failed: {message}")]
    Call { message: String, retryable: bool },
}

impl ProviderError {
    /// Shorthand for a transient call failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Call {
            message: message.into(),
            retryable: true,
        }
    }

    /// Shorthand for a permanent call failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Call {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether the adapter-side retry loop may re-attempt this error.
    ///
    /// Partial creation failures are never silently retried here; they
    /// escape to the engine and re-running the sync is the recovery path.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Call { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_steps_are_in_canonical_order() {
        assert_eq!(CreateStep::ALL[0], CreateStep::CreateRecord);
        assert_eq!(CreateStep::ALL[4], CreateStep::SetBoardFields);
        assert_eq!(CreateStep::ALL.len(), 5);
    }

    #[test]
    fn retryable_matrix() {
        assert!(ProviderError::transient("socket reset").is_retryable());
        assert!(
            ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(1))
            }
            .is_retryable()
        );
        assert!(!ProviderError::permanent("bad request").is_retryable());
        assert!(!ProviderError::Auth("expired token".into()).is_retryable());
        assert!(!ProviderError::Capability("no search".into()).is_retryable());
        let partial = ProviderError::PartialCreation(PartialFailure {
            identity: None,
            completed: vec![],
            retryable: true,
            message: "boom".into(),
        });
        assert!(!partial.is_retryable(), "partial creation escapes to the engine");
    }

    #[test]
    fn partial_failure_display_includes_identity_key() {
        let failure = PartialFailure {
            identity: Some(ItemIdentity {
                id: "abc".into(),
                key: "PP-7".into(),
                url: "https://example/PP-7".into(),
            }),
            completed: vec![CreateStep::CreateRecord, CreateStep::AssignType],
            retryable: true,
            message: "labels endpoint 500".into(),
        };
        let text = failure.to_string();
        assert!(text.contains("2 step(s)"), "unexpected: {text}");
        assert!(text.contains("PP-7"), "unexpected: {text}");
    }

    #[test]
    fn search_filter_dedups_labels() {
        let filter = SearchFilter::new(
            ["a".to_owned(), "a".to_owned(), "b".to_owned()],
            "PLAN_ID:abc",
        );
        assert_eq!(filter.labels.len(), 2);
    }
}
