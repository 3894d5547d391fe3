//! `planpilot sync` command: run the full pipeline against the
//! configured tracker target.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use planpilot_core::engine::{SyncEngine, SyncOptions, SyncOutcome};
use planpilot_core::plan::{PlanSource, ValidateMode, compute_plan_id, load_plan, validate};
use planpilot_core::provider::{MemoryProvider, Provider, ProviderError, ProviderRegistry};
use planpilot_core::render::MarkdownRenderer;

use crate::map_file;

/// Everything the sync pipeline needs, already resolved.
#[derive(Debug)]
pub struct SyncParams {
    pub source: PlanSource,
    pub mode: ValidateMode,
    pub target: String,
    pub discovery_label: String,
    pub concurrency: usize,
    pub map_dir: PathBuf,
}

/// The registry of compiled-in tracker adapters.
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(MemoryProvider::new());
    registry
}

/// Run the sync command: resolve the provider from the registry, then
/// drive the pipeline.
pub async fn run_sync(params: &SyncParams) -> Result<SyncOutcome> {
    let registry = default_registry();
    let provider = registry.get(&params.target).ok_or_else(|| {
        ProviderError::Capability(format!(
            "no provider registered for target {:?} (available: {:?})",
            params.target,
            registry.list()
        ))
    })?;
    run_sync_with_provider(provider, params).await
}

/// The pipeline proper: load, validate, hash, enter, sync, persist.
///
/// Split out so tests can run consecutive syncs against one shared
/// provider instance.
pub async fn run_sync_with_provider(
    provider: Arc<dyn Provider>,
    params: &SyncParams,
) -> Result<SyncOutcome> {
    // Loader and validator failures surface before any external call.
    let plan = load_plan(&params.source)?;
    validate(&plan, params.mode)?;
    let plan_id = compute_plan_id(&plan);

    println!("Syncing plan {plan_id} to target {:?}", params.target);
    println!("  Items:       {}", plan.len());
    println!("  Concurrency: {}", params.concurrency);

    let session = provider.enter().await?;
    let engine = SyncEngine::new(
        Arc::clone(&provider),
        Arc::new(MarkdownRenderer::new()),
        session,
        SyncOptions {
            discovery_label: params.discovery_label.clone(),
            concurrency: params.concurrency,
        },
    );

    let result = engine.sync(&plan, &plan_id).await;

    // Exit the session whether or not the run succeeded.
    if let Err(err) = provider.exit().await {
        tracing::warn!(error = %err, "provider session exit failed");
    }

    let outcome = result?;
    let path = map_file::save_map(&params.map_dir, &outcome.sync_map)?;

    println!();
    println!("Sync complete.");
    println!(
        "  Created: {} epic(s), {} story(ies), {} task(s)",
        outcome.created.epics, outcome.created.stories, outcome.created.tasks
    );
    println!("  Reused:  {} item(s)", outcome.reused.total());
    if !outcome.dropped_edges.is_empty() {
        println!();
        println!("Dropped cyclic dependency edges:");
        for edge in &outcome.dropped_edges {
            println!("  - {edge}");
        }
    }
    println!("  Sync map: {}", path.display());

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use planpilot_core::plan::ValidationError;
    use planpilot_core::provider::MemoryProvider;

    const PLAN_TOML: &str = r#"
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

[[items]]
id = "T1"
type = "task"
title = "Task one"
goal = "g"
parent_id = "S1"
requirements = ["r"]
acceptance_criteria = ["a"]
"#;

    fn params_for(dir: &Path, plan_file: &str) -> SyncParams {
        let path = dir.join("plan.toml");
        std::fs::write(&path, plan_file).unwrap();
        SyncParams {
            source: PlanSource::Unified { path },
            mode: ValidateMode::Strict,
            target: "memory".to_owned(),
            discovery_label: "planpilot".to_owned(),
            concurrency: 2,
            map_dir: dir.join("maps"),
        }
    }

    #[tokio::test]
    async fn consecutive_syncs_reuse_items_and_persist_the_map() {
        let tmp = tempfile::TempDir::new().unwrap();
        let params = params_for(tmp.path(), PLAN_TOML);
        let provider = Arc::new(MemoryProvider::new());

        let first = run_sync_with_provider(Arc::clone(&provider) as Arc<dyn Provider>, &params)
            .await
            .unwrap();
        assert_eq!(first.created.total(), 3);

        let map_path = map_file::map_path(&params.map_dir, &first.sync_map.plan_id, "memory");
        let persisted = map_file::load_map(&map_path).unwrap();
        assert_eq!(persisted, first.sync_map);

        let second = run_sync_with_provider(Arc::clone(&provider) as Arc<dyn Provider>, &params)
            .await
            .unwrap();
        assert_eq!(second.created.total(), 0, "second run must create nothing");
        assert_eq!(second.sync_map, first.sync_map);
        assert_eq!(provider.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn unknown_target_is_a_capability_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut params = params_for(tmp.path(), PLAN_TOML);
        params.target = "jupiter".to_owned();

        let err = run_sync(&params).await.unwrap_err();
        let provider_err = err
            .downcast_ref::<ProviderError>()
            .expect("should be a provider error");
        assert!(matches!(provider_err, ProviderError::Capability(_)));
    }

    #[tokio::test]
    async fn invalid_plan_fails_before_any_provider_call() {
        let tmp = tempfile::TempDir::new().unwrap();
        // Task parented to an epic: a hierarchy violation.
        let params = params_for(
            tmp.path(),
            r#"
[[items]]
id = "E1"
type = "epic"
title = "Epic one"
goal = "g"
requirements = ["r"]
acceptance_criteria = ["a"]

[[items]]
id = "T1"
type = "task"
title = "Task one"
goal = "g"
parent_id = "E1"
requirements = ["r"]
acceptance_criteria = ["a"]
"#,
        );
        let provider = Arc::new(MemoryProvider::new());

        let err = run_sync_with_provider(Arc::clone(&provider) as Arc<dyn Provider>, &params)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
        assert!(
            provider.snapshot().is_empty(),
            "validation failures must precede any external call"
        );
    }
}
