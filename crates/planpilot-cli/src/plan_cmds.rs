//! Handlers for the plan-inspection commands: `planpilot validate` and
//! `planpilot hash`.

use anyhow::Result;

use planpilot_core::plan::{
    ItemType, Plan, ValidateMode, compute_plan_id, load_plan, validate,
};

use crate::plan_input::PlanInputArgs;

/// Execute `planpilot validate`: load the plan and report every
/// aggregated validation issue.
pub fn run_validate(input: &PlanInputArgs, partial: bool) -> Result<()> {
    let source = input.to_source()?;
    let plan = load_plan(&source)?;
    let mode = if partial {
        ValidateMode::Partial
    } else {
        ValidateMode::Strict
    };

    match validate(&plan, mode) {
        Ok(()) => {
            println!("Plan is valid.");
            print_counts(&plan);
            Ok(())
        }
        Err(err) => {
            eprintln!("Plan validation failed:");
            for issue in &err.issues {
                eprintln!("  - {issue}");
            }
            Err(err.into())
        }
    }
}

/// Execute `planpilot hash`: print the deterministic plan identifier.
///
/// Returns the id so tests can assert on it.
pub fn run_hash(input: &PlanInputArgs) -> Result<String> {
    let source = input.to_source()?;
    let plan = load_plan(&source)?;
    let plan_id = compute_plan_id(&plan);
    println!("{plan_id}");
    Ok(plan_id)
}

fn print_counts(plan: &Plan) {
    println!("  Epics:   {}", plan.items_of_type(ItemType::Epic).count());
    println!("  Stories: {}", plan.items_of_type(ItemType::Story).count());
    println!("  Tasks:   {}", plan.items_of_type(ItemType::Task).count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use planpilot_core::plan::{PLAN_ID_LEN, PlanLoadError, ValidationError};

    fn unified_args(path: PathBuf) -> PlanInputArgs {
        PlanInputArgs {
            plan: Some(path),
            epics: None,
            stories: None,
            tasks: None,
        }
    }

    fn write_plan(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("plan.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    const VALID_PLAN: &str = r#"
[[items]]
id = "E1"
type = "epic"
title = "Epic one"
goal = "g"
sub_item_ids = ["S1"]
requirements = ["r"]
acceptance_criteria = ["a"]

[[items]]
id = "S1"
type = "story"
title = "Story one"
goal = "g"
parent_id = "E1"
requirements = ["r"]
acceptance_criteria = ["a"]
"#;

    #[test]
    fn validate_accepts_a_valid_plan() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_plan(&dir, VALID_PLAN);
        run_validate(&unified_args(path), false).unwrap();
    }

    #[test]
    fn validate_surfaces_the_typed_validation_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_plan(
            &dir,
            r#"
[[items]]
id = "T1"
type = "task"
title = "Orphan task"
goal = "g"
parent_id = "S-MISSING"
requirements = ["r"]
acceptance_criteria = ["a"]
"#,
        );

        let err = run_validate(&unified_args(path), false).unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
    }

    #[test]
    fn validate_partial_tolerates_unloaded_references() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_plan(
            &dir,
            r#"
[[items]]
id = "T1"
type = "task"
title = "Slice task"
goal = "g"
parent_id = "S-ELSEWHERE"
requirements = ["r"]
acceptance_criteria = ["a"]
"#,
        );

        run_validate(&unified_args(path), true).unwrap();
    }

    #[test]
    fn hash_prints_a_twelve_hex_plan_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_plan(&dir, VALID_PLAN);

        let id = run_hash(&unified_args(path)).unwrap();
        assert_eq!(id.len(), PLAN_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn missing_file_surfaces_the_typed_load_error() {
        let err = run_hash(&unified_args(PathBuf::from("/nonexistent/plan.toml"))).unwrap_err();
        assert!(err.downcast_ref::<PlanLoadError>().is_some());
    }
}
