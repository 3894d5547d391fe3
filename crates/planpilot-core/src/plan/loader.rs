//! Plan file loading: parse one of the two supported TOML layouts into a
//! [`Plan`].
//!
//! Two layouts are supported:
//! - **Unified**: one file with `[[items]]` entries, each declaring its
//!   `type`.
//! - **Split**: three files (epics, stories, tasks), each with `[[items]]`
//!   entries; the item type comes from the file role and a declared `type`
//!   field is ignored.
//!
//! Every failure is wrapped into a [`PlanLoadError`] carrying the file and
//! the reason, so a bad plan can be diagnosed without re-running.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use super::model::{ItemType, Plan, PlanItem};

/// Where the plan comes from.
#[derive(Debug, Clone)]
pub enum PlanSource {
    /// One file; every record declares its own `type`.
    Unified { path: PathBuf },
    /// Three files, one per item type; declared `type` fields are ignored.
    Split {
        epics: PathBuf,
        stories: PathBuf,
        tasks: PathBuf,
    },
}

/// Errors that can occur while loading a plan.
#[derive(Debug, Error)]
pub enum PlanLoadError {
    #[error("failed to read plan file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid plan structure in {}: {reason}", .path.display())]
    Structure { path: PathBuf, reason: String },
}

/// Raw `[[items]]` record as it appears on disk.
///
/// `type` is optional here so the split layout can omit it; the unified
/// layout requires it and [`load_plan`] reports its absence as a
/// structure error.
#[derive(Debug, Deserialize)]
struct ItemRecord {
    id: String,
    #[serde(rename = "type")]
    item_type: Option<String>,
    title: String,
    #[serde(default)]
    goal: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    sub_item_ids: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    requirements: Vec<String>,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    motivation: Option<String>,
    #[serde(default)]
    estimate: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    spec_ref: Option<String>,
    #[serde(default)]
    verification: Vec<String>,
    #[serde(default)]
    success_metrics: Vec<String>,
    #[serde(default)]
    assumptions: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    items: Vec<ItemRecord>,
}

/// Load and structurally validate a plan from its source files.
///
/// Relational validation (hierarchy, references, required fields) is a
/// separate step; see [`super::validator::validate`].
pub fn load_plan(source: &PlanSource) -> Result<Plan, PlanLoadError> {
    let items = match source {
        PlanSource::Unified { path } => {
            let records = read_records(path)?;
            records
                .into_iter()
                .map(|r| into_item(r, None, path))
                .collect::<Result<Vec<_>, _>>()?
        }
        PlanSource::Split {
            epics,
            stories,
            tasks,
        } => {
            let mut items = Vec::new();
            for (path, role) in [
                (epics, ItemType::Epic),
                (stories, ItemType::Story),
                (tasks, ItemType::Task),
            ] {
                let records = read_records(path)?;
                for record in records {
                    items.push(into_item(record, Some(role), path)?);
                }
            }
            items
        }
    };

    if items.is_empty() {
        let path = match source {
            PlanSource::Unified { path } => path,
            PlanSource::Split { epics, .. } => epics,
        };
        return Err(PlanLoadError::Structure {
            path: path.clone(),
            reason: "plan contains no items".to_owned(),
        });
    }

    tracing::debug!(items = items.len(), "plan loaded");
    Ok(Plan::new(items))
}

fn read_records(path: &Path) -> Result<Vec<ItemRecord>, PlanLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| PlanLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: PlanFile = toml::from_str(&content).map_err(|source| PlanLoadError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    Ok(file.items)
}

/// Convert a raw record into a typed [`PlanItem`].
///
/// `role` is the file role in split mode (it wins over any declared
/// `type`); in unified mode the record must declare its type.
fn into_item(
    record: ItemRecord,
    role: Option<ItemType>,
    path: &Path,
) -> Result<PlanItem, PlanLoadError> {
    let item_type = match role {
        Some(role) => role,
        None => {
            let declared = record.item_type.as_deref().ok_or_else(|| {
                PlanLoadError::Structure {
                    path: path.to_path_buf(),
                    reason: format!("item {:?} does not declare a type", record.id),
                }
            })?;
            ItemType::from_str(declared).map_err(|e| PlanLoadError::Structure {
                path: path.to_path_buf(),
                reason: format!("item {:?}: {e}", record.id),
            })?
        }
    };

    Ok(PlanItem {
        id: record.id,
        item_type,
        title: record.title,
        goal: record.goal,
        parent_id: record.parent_id,
        sub_item_ids: record.sub_item_ids,
        depends_on: record.depends_on,
        requirements: record.requirements,
        acceptance_criteria: record.acceptance_criteria,
        motivation: record.motivation,
        estimate: record.estimate,
        scope: record.scope,
        spec_ref: record.spec_ref,
        verification: record.verification,
        success_metrics: record.success_metrics,
        assumptions: record.assumptions,
        risks: record.risks,
    })
}
