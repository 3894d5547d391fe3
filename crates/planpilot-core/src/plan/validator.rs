//! Relational plan validation.
//!
//! Validates:
//! - Item ids are unique across the whole plan.
//! - Hierarchy shape: epics have no parent, a loaded story parent is an
//!   epic, a loaded task parent is a story.
//! - References resolve (strict mode) or are tolerated when the id is
//!   absent from the whole loaded set (partial mode).
//! - Required fields: `goal`, `requirements`, `acceptance_criteria`.
//! - `sub_item_ids` is the inverse of the loaded children's `parent_id`.
//!
//! Every check runs and every failure is collected; the caller gets the
//! complete list in one [`ValidationError`] instead of the first hit.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::model::{ItemType, Plan, PlanItem};

/// How unresolved references are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    /// Every `parent_id` and `depends_on` entry must resolve to a loaded
    /// item.
    Strict,
    /// A reference may point outside the loaded set (another plan slice);
    /// a loaded item violating its type contract is still an error.
    Partial,
}

/// One individual validation problem.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationIssue {
    #[error("duplicate item id {id:?}")]
    DuplicateId { id: String },

    #[error("epic {id:?} must not have a parent (found {parent_id:?})")]
    EpicWithParent { id: String, parent_id: String },

    #[error("{item_type} {id:?} has parent {parent_id:?} of type {parent_type}, expected {expected}")]
    WrongParentType {
        id: String,
        item_type: ItemType,
        parent_id: String,
        parent_type: ItemType,
        expected: ItemType,
    },

    #[error("item {id:?} references unknown parent {parent_id:?}")]
    UnresolvedParent { id: String, parent_id: String },

    #[error("item {id:?} depends on unknown item {dependency:?}")]
    UnresolvedDependency { id: String, dependency: String },

    #[error("item {id:?} is missing required field {field:?}")]
    MissingField { id: String, field: &'static str },

    #[error("item {id:?} declares sub-item {sub_id:?} but that item's parent is {actual:?}")]
    SubItemMismatch {
        id: String,
        sub_id: String,
        actual: Option<String>,
    },

    #[error("item {id:?} has parent {parent_id:?} but is missing from its sub_item_ids")]
    ChildNotDeclared { id: String, parent_id: String },

    #[error("item {id:?} declares sub-item {sub_id:?} which is not loaded")]
    UnresolvedSubItem { id: String, sub_id: String },
}

/// Aggregated validation failure: the full list of individual problems.
#[derive(Debug, Error)]
#[error("plan validation failed with {} issue(s)", .issues.len())]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

/// Validate the relational integrity of a plan.
///
/// All checks are applied uniformly; the result carries every failure,
/// never just the first. The caller decides whether to abort or continue.
pub fn validate(plan: &Plan, mode: ValidateMode) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    check_duplicate_ids(plan, &mut issues);
    for item in plan.items() {
        check_hierarchy(plan, item, mode, &mut issues);
        check_dependencies(plan, item, mode, &mut issues);
        check_required_fields(item, &mut issues);
        check_sub_items(plan, item, mode, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        tracing::debug!(issues = issues.len(), "plan validation failed");
        Err(ValidationError { issues })
    }
}

fn check_duplicate_ids(plan: &Plan, issues: &mut Vec<ValidationIssue>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for item in plan.items() {
        *counts.entry(item.id.as_str()).or_insert(0) += 1;
    }
    let mut duplicates: Vec<&str> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();
    duplicates.sort_unstable();
    for id in duplicates {
        issues.push(ValidationIssue::DuplicateId { id: id.to_owned() });
    }
}

fn check_hierarchy(
    plan: &Plan,
    item: &PlanItem,
    mode: ValidateMode,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(parent_id) = item.parent_id.as_deref() else {
        return;
    };

    if item.item_type == ItemType::Epic {
        issues.push(ValidationIssue::EpicWithParent {
            id: item.id.clone(),
            parent_id: parent_id.to_owned(),
        });
        return;
    }

    let expected = match item.item_type {
        ItemType::Story => ItemType::Epic,
        ItemType::Task => ItemType::Story,
        ItemType::Epic => unreachable!("handled above"),
    };

    match plan.get(parent_id) {
        // A loaded parent of the wrong type is an error in both modes.
        Some(parent) if parent.item_type != expected => {
            issues.push(ValidationIssue::WrongParentType {
                id: item.id.clone(),
                item_type: item.item_type,
                parent_id: parent_id.to_owned(),
                parent_type: parent.item_type,
                expected,
            });
        }
        Some(_) => {}
        None => {
            if mode == ValidateMode::Strict {
                issues.push(ValidationIssue::UnresolvedParent {
                    id: item.id.clone(),
                    parent_id: parent_id.to_owned(),
                });
            }
        }
    }
}

fn check_dependencies(
    plan: &Plan,
    item: &PlanItem,
    mode: ValidateMode,
    issues: &mut Vec<ValidationIssue>,
) {
    if mode == ValidateMode::Partial {
        // An unresolved dependency is, by definition, absent from the
        // loaded set and therefore assumed to live in another slice.
        return;
    }
    for dep in &item.depends_on {
        if !plan.contains(dep) {
            issues.push(ValidationIssue::UnresolvedDependency {
                id: item.id.clone(),
                dependency: dep.clone(),
            });
        }
    }
}

fn check_required_fields(item: &PlanItem, issues: &mut Vec<ValidationIssue>) {
    if item.goal.trim().is_empty() {
        issues.push(ValidationIssue::MissingField {
            id: item.id.clone(),
            field: "goal",
        });
    }
    if item.requirements.is_empty() {
        issues.push(ValidationIssue::MissingField {
            id: item.id.clone(),
            field: "requirements",
        });
    }
    if item.acceptance_criteria.is_empty() {
        issues.push(ValidationIssue::MissingField {
            id: item.id.clone(),
            field: "acceptance_criteria",
        });
    }
}

/// Check that a declared `sub_item_ids` list is the inverse of the loaded
/// children's `parent_id`.
///
/// An empty list is treated as absent (the field is informational and
/// derivable). A declared sub-item that is loaded but points elsewhere,
/// and a loaded child missing from the declared list, are errors in both
/// modes; a declared sub-item absent from the loaded set is an unresolved
/// reference and therefore strict-only.
fn check_sub_items(
    plan: &Plan,
    item: &PlanItem,
    mode: ValidateMode,
    issues: &mut Vec<ValidationIssue>,
) {
    if item.sub_item_ids.is_empty() {
        return;
    }

    let declared: HashSet<&str> = item.sub_item_ids.iter().map(String::as_str).collect();

    for sub_id in &item.sub_item_ids {
        match plan.get(sub_id) {
            Some(sub) if sub.parent_id.as_deref() != Some(item.id.as_str()) => {
                issues.push(ValidationIssue::SubItemMismatch {
                    id: item.id.clone(),
                    sub_id: sub_id.clone(),
                    actual: sub.parent_id.clone(),
                });
            }
            Some(_) => {}
            None => {
                if mode == ValidateMode::Strict {
                    issues.push(ValidationIssue::UnresolvedSubItem {
                        id: item.id.clone(),
                        sub_id: sub_id.clone(),
                    });
                }
            }
        }
    }

    for child in plan.children_of(&item.id) {
        if !declared.contains(child.id.as_str()) {
            issues.push(ValidationIssue::ChildNotDeclared {
                id: child.id.clone(),
                parent_id: item.id.clone(),
            });
        }
    }
}
