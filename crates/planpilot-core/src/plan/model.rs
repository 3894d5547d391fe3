//! The plan data model: typed records for plan items and the [`Plan`]
//! collection built from them.
//!
//! A [`Plan`] is constructed once per invocation and never mutated. The
//! relational invariants (unique ids, hierarchy shape, reference
//! resolution) are enforced by [`super::validator`], not here; the model
//! only builds the id index used by lookups.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hierarchy level of a plan item.
///
/// The declaration order matters: it is the hierarchy level order
/// (epics are created before stories, stories before tasks) and the
/// primary sort key of the canonical form hashed by
/// [`super::hasher::compute_plan_id`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    Epic,
    Story,
    Task,
}

impl ItemType {
    /// All item types in hierarchy level order (parents first).
    pub const LEVELS: [ItemType; 3] = [ItemType::Epic, ItemType::Story, ItemType::Task];
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
        };
        f.write_str(s)
    }
}

impl FromStr for ItemType {
    type Err = ItemTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epic" => Ok(Self::Epic),
            "story" => Ok(Self::Story),
            "task" => Ok(Self::Task),
            other => Err(ItemTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ItemType`] string.
#[derive(Debug, Clone)]
pub struct ItemTypeParseError(pub String);

impl fmt::Display for ItemTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid item type: {:?} (expected epic, story, or task)", self.0)
    }
}

impl std::error::Error for ItemTypeParseError {}

/// One node of the hierarchical plan.
///
/// `sub_item_ids` is informational: it is derivable from the children's
/// `parent_id` and, when declared, must be the exact inverse of it (the
/// validator checks this).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    /// Globally unique item id (e.g. "E1", "S3", "T12").
    pub id: String,
    /// Hierarchy level of this item.
    pub item_type: ItemType,
    /// Short human-readable title.
    pub title: String,
    /// What this item is meant to achieve.
    pub goal: String,
    /// Id of the parent item, one level up the hierarchy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Declared children (informational, inverse of the children's `parent_id`).
    #[serde(default)]
    pub sub_item_ids: Vec<String>,
    /// Ids of items this item depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// What must be built. Required, non-empty for every type.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// How completion is judged. Required, non-empty for every type.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Why this item exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivation: Option<String>,
    /// Size estimate (free-form, e.g. "M" or "3d").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<String>,
    /// What is in and out of scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Reference into an external specification document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_ref: Option<String>,
    /// Steps to verify the finished work.
    #[serde(default)]
    pub verification: Vec<String>,
    /// Measurable outcomes.
    #[serde(default)]
    pub success_metrics: Vec<String>,
    /// Assumptions this item rests on.
    #[serde(default)]
    pub assumptions: Vec<String>,
    /// Known risks.
    #[serde(default)]
    pub risks: Vec<String>,
}

/// An ordered, immutable collection of [`PlanItem`]s.
///
/// Construction builds an id index for lookups; on duplicate ids the
/// first occurrence wins and the duplicate is left for the validator to
/// report.
#[derive(Debug, Clone)]
pub struct Plan {
    items: Vec<PlanItem>,
    index: HashMap<String, usize>,
}

impl Plan {
    /// Build a plan from an ordered list of items.
    pub fn new(items: Vec<PlanItem>) -> Self {
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            index.entry(item.id.clone()).or_insert(i);
        }
        Self { items, index }
    }

    /// All items in plan order.
    pub fn items(&self) -> &[PlanItem] {
        &self.items
    }

    /// Look up an item by id.
    pub fn get(&self, id: &str) -> Option<&PlanItem> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Whether an id is present anywhere in the loaded set.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All items of one hierarchy level, in plan order.
    pub fn items_of_type(&self, item_type: ItemType) -> impl Iterator<Item = &PlanItem> {
        self.items.iter().filter(move |i| i.item_type == item_type)
    }

    /// Loaded children of an item (items whose `parent_id` points at it),
    /// in plan order.
    pub fn children_of(&self, id: &str) -> Vec<&PlanItem> {
        self.items
            .iter()
            .filter(|i| i.parent_id.as_deref() == Some(id))
            .collect()
    }

    /// Number of items in the plan.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the plan has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
