//! The sync engine: drives a provider through discovery, idempotent
//! creation, field reconciliation, and relationship linking.
//!
//! Five strictly ordered phases (discovery, upsert, enrich, relations,
//! result), with all provider calls gated by one shared semaphore. Within
//! the upsert phase, hierarchy levels run in strict order (parents exist
//! before children); within a level, and in the enrich and relations
//! phases, operations are unordered but bounded. The first failure in a
//! level cancels the remaining in-flight and queued operations and
//! propagates; completed operations are durable externally and are found
//! again by discovery on the next run.

pub mod rollup;
pub mod sync_map;

pub use rollup::{Edge, RollupResult, rollup_dependencies};
pub use sync_map::{SyncEntry, SyncMap};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::plan::{ItemType, Plan, PlanItem};
use crate::provider::{
    Item, ItemDraft, ItemUpdate, Provider, ProviderError, SearchFilter, SessionContext,
};
use crate::render::{ChildRef, DepRef, RenderContext, Renderer, parse_marker, plan_id_token};

/// The phase a sync failure escaped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Discovery,
    Upsert,
    Enrich,
    Relations,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discovery => "discovery",
            Self::Upsert => "upsert",
            Self::Enrich => "enrich",
            Self::Relations => "relations",
        };
        f.write_str(s)
    }
}

/// Terminal synchronization failure.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The session's capabilities cannot satisfy what this plan needs.
    /// Raised before any item-level work.
    #[error("provider capabilities insufficient: {0}")]
    Capability(String),

    /// A provider failure that escaped a phase.
    #[error("{phase} phase failed: {source}")]
    Phase {
        phase: SyncPhase,
        #[source]
        source: ProviderError,
    },

    /// The renderer failed to produce a body.
    #[error("failed to render body for item {item_id}: {source}")]
    Render {
        item_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A spawned sync operation panicked or an internal invariant broke.
    #[error("sync worker failed: {0}")]
    Worker(String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Label applied to every created item and used by discovery.
    pub discovery_label: String,
    /// Maximum provider calls in flight at once. Defaults to 1 (fully
    /// sequential); this is the only concurrency knob.
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            discovery_label: "planpilot".to_owned(),
            concurrency: 1,
        }
    }
}

/// Per-type creation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeCounts {
    pub epics: usize,
    pub stories: usize,
    pub tasks: usize,
}

impl TypeCounts {
    fn record(&mut self, item_type: ItemType) {
        match item_type {
            ItemType::Epic => self.epics += 1,
            ItemType::Story => self.stories += 1,
            ItemType::Task => self.tasks += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.epics + self.stories + self.tasks
    }
}

/// The result of one sync run.
#[derive(Debug)]
pub struct SyncOutcome {
    pub sync_map: SyncMap,
    /// Items created this run, per type.
    pub created: TypeCounts,
    /// Items found by discovery and reused, per type.
    pub reused: TypeCounts,
    /// Derived dependency edges dropped to keep the graph acyclic
    /// (plan-item ids, not external ids).
    pub dropped_edges: Vec<Edge>,
}

/// Orchestrates one sync run against an already-entered provider session.
pub struct SyncEngine {
    provider: Arc<dyn Provider>,
    renderer: Arc<dyn Renderer>,
    session: SessionContext,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        renderer: Arc<dyn Renderer>,
        session: SessionContext,
        options: SyncOptions,
    ) -> Self {
        Self {
            provider,
            renderer,
            session,
            options,
        }
    }

    /// Run the full pipeline for a plan.
    ///
    /// `plan_id` is the deterministic identifier from
    /// [`crate::plan::compute_plan_id`]; it scopes discovery and is
    /// embedded in every rendered body.
    pub async fn sync(&self, plan: &Plan, plan_id: &str) -> Result<SyncOutcome, SyncError> {
        self.ensure_capabilities(plan)?;

        let limiter = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        // Phase 1: discovery.
        let found = self.discover(plan_id).await?;
        tracing::info!(plan_id, found = found.len(), "discovery complete");

        // Phase 2: upsert, level by level.
        let mut external: HashMap<String, Item> = HashMap::new();
        let mut created = TypeCounts::default();
        let mut reused = TypeCounts::default();
        for level in ItemType::LEVELS {
            let level_created = self
                .upsert_level(plan, plan_id, level, &found, &mut external, &mut reused, &limiter)
                .await?;
            for (item_id, item) in level_created {
                created.record(level);
                external.insert(item_id, item);
            }
            tracing::info!(plan_id, level = %level, "upsert level complete");
        }

        // Phase 3: enrich every body with fully resolved cross-references.
        self.enrich(plan, plan_id, &external, &limiter).await?;
        tracing::info!(plan_id, items = external.len(), "enrich complete");

        // Phase 4: relations.
        let rollup = rollup_dependencies(plan);
        self.apply_relations(plan, &rollup, &external, &limiter).await?;
        tracing::info!(
            plan_id,
            edges = rollup.edges.len(),
            dropped = rollup.dropped.len(),
            "relations complete"
        );

        // Phase 5: result. Persisting the map is the caller's job.
        let mut map = SyncMap::new(plan_id, &self.session.target, &self.session.board_url);
        for (item_id, item) in &external {
            map.insert(item_id.clone(), item);
        }

        Ok(SyncOutcome {
            sync_map: map,
            created,
            reused,
            dropped_edges: rollup.dropped,
        })
    }

    /// Verify the session can satisfy everything this plan needs, before
    /// any item-level work.
    fn ensure_capabilities(&self, plan: &Plan) -> Result<(), SyncError> {
        let caps = &self.session.capabilities;
        if !caps.search_by_label_and_body {
            return Err(SyncError::Capability(
                "discovery requires label + body-substring search".to_owned(),
            ));
        }

        let needs_parent = plan.items().iter().any(|i| {
            i.parent_id
                .as_deref()
                .is_some_and(|p| plan.contains(p))
        });
        if needs_parent && !caps.set_parent {
            return Err(SyncError::Capability(
                "plan has parent links but the adapter cannot set parents".to_owned(),
            ));
        }

        let needs_dependency = plan
            .items()
            .iter()
            .any(|i| i.depends_on.iter().any(|d| d != &i.id && plan.contains(d)));
        if needs_dependency && !caps.add_dependency {
            return Err(SyncError::Capability(
                "plan has dependencies but the adapter cannot add them".to_owned(),
            ));
        }

        Ok(())
    }

    /// Phase 1: find previously created items by marker.
    ///
    /// This is the authoritative idempotency source; any persisted sync
    /// map is only a cache.
    async fn discover(&self, plan_id: &str) -> Result<HashMap<String, Item>, SyncError> {
        let filter = SearchFilter::new(
            [self.options.discovery_label.clone()],
            plan_id_token(plan_id),
        );
        let hits = self
            .provider
            .search_items(&filter)
            .await
            .map_err(|source| SyncError::Phase {
                phase: SyncPhase::Discovery,
                source,
            })?;

        let mut found = HashMap::new();
        for hit in hits {
            match parse_marker(&hit.body) {
                Some(marker) if marker.plan_id == plan_id => {
                    found.insert(marker.item_id, hit);
                }
                Some(marker) => {
                    tracing::warn!(
                        key = %hit.key,
                        marker_plan_id = %marker.plan_id,
                        "discovered item belongs to a different plan; skipping"
                    );
                }
                None => {
                    tracing::warn!(
                        key = %hit.key,
                        "discovered item has a malformed metadata marker; skipping"
                    );
                }
            }
        }
        Ok(found)
    }

    /// Phase 2, one hierarchy level: create every item of `level` that
    /// discovery did not find. Returns the created items.
    async fn upsert_level(
        &self,
        plan: &Plan,
        plan_id: &str,
        level: ItemType,
        found: &HashMap<String, Item>,
        external: &mut HashMap<String, Item>,
        reused: &mut TypeCounts,
        limiter: &Arc<Semaphore>,
    ) -> Result<Vec<(String, Item)>, SyncError> {
        let mut set: JoinSet<Result<(String, Item), SyncError>> = JoinSet::new();

        for item in plan.items_of_type(level) {
            if let Some(existing) = found.get(&item.id) {
                tracing::debug!(item = %item.id, key = %existing.key, "already synced, skipping creation");
                external.insert(item.id.clone(), existing.clone());
                reused.record(level);
                continue;
            }

            // Parents were upserted in the previous level, so the parent
            // key is resolvable here; children and dependencies are not
            // yet, which is fine for the partial creation body.
            let parent_key = item
                .parent_id
                .as_deref()
                .and_then(|p| external.get(p))
                .map(|parent| parent.key.clone());

            let provider = Arc::clone(&self.provider);
            let renderer = Arc::clone(&self.renderer);
            let limiter = Arc::clone(limiter);
            let label = self.options.discovery_label.clone();
            let plan_id = plan_id.to_owned();
            let item = item.clone();

            set.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| SyncError::Worker(e.to_string()))?;

                let ctx = RenderContext::partial(plan_id, parent_key);
                let body = renderer
                    .render_body(&item, &ctx)
                    .await
                    .map_err(|source| SyncError::Render {
                        item_id: item.id.clone(),
                        source,
                    })?;

                let draft = ItemDraft {
                    title: item.title.clone(),
                    body,
                    item_type: item.item_type,
                    labels: vec![label],
                    size: item.estimate.clone(),
                };
                let created =
                    provider
                        .create_item(&draft)
                        .await
                        .map_err(|source| SyncError::Phase {
                            phase: SyncPhase::Upsert,
                            source,
                        })?;
                tracing::info!(item = %item.id, key = %created.key, "created item");
                Ok((item.id.clone(), created))
            });
        }

        join_fail_fast(set).await
    }

    /// Phase 3: re-render every body with full cross-reference context
    /// and push the plan-authoritative fields.
    async fn enrich(
        &self,
        plan: &Plan,
        plan_id: &str,
        external: &HashMap<String, Item>,
        limiter: &Arc<Semaphore>,
    ) -> Result<(), SyncError> {
        let mut set: JoinSet<Result<(), SyncError>> = JoinSet::new();

        for item in plan.items() {
            let external_id = external
                .get(&item.id)
                .map(|e| e.id.clone())
                .ok_or_else(|| {
                    SyncError::Worker(format!("item {} missing after upsert", item.id))
                })?;
            let ctx = self.full_context(plan, plan_id, item, external);

            let provider = Arc::clone(&self.provider);
            let renderer = Arc::clone(&self.renderer);
            let limiter = Arc::clone(limiter);
            let label = self.options.discovery_label.clone();
            let item = item.clone();

            set.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| SyncError::Worker(e.to_string()))?;

                let body = renderer
                    .render_body(&item, &ctx)
                    .await
                    .map_err(|source| SyncError::Render {
                        item_id: item.id.clone(),
                        source,
                    })?;
                let update = ItemUpdate {
                    title: item.title.clone(),
                    body,
                    item_type: item.item_type,
                    ensure_labels: vec![label],
                    size: item.estimate.clone(),
                };
                provider
                    .update_item(&external_id, &update)
                    .await
                    .map_err(|source| SyncError::Phase {
                        phase: SyncPhase::Enrich,
                        source,
                    })?;
                tracing::debug!(item = %item.id, "enriched item");
                Ok(())
            });
        }

        join_fail_fast(set).await.map(|_| ())
    }

    /// The fully resolved render context for one item.
    fn full_context(
        &self,
        plan: &Plan,
        plan_id: &str,
        item: &PlanItem,
        external: &HashMap<String, Item>,
    ) -> RenderContext {
        let parent_key = item
            .parent_id
            .as_deref()
            .and_then(|p| external.get(p))
            .map(|parent| parent.key.clone());

        let children = plan
            .children_of(&item.id)
            .into_iter()
            .filter_map(|child| {
                external.get(&child.id).map(|e| ChildRef {
                    key: e.key.clone(),
                    title: child.title.clone(),
                })
            })
            .collect();

        let dependencies = item
            .depends_on
            .iter()
            .filter_map(|dep| {
                external.get(dep).map(|e| DepRef {
                    dep_id: dep.clone(),
                    key: e.key.clone(),
                })
            })
            .collect();

        RenderContext::new(plan_id, parent_key, children, dependencies)
    }

    /// Phase 4: apply parent links and the de-duplicated dependency edge
    /// set, all concurrent.
    async fn apply_relations(
        &self,
        plan: &Plan,
        rollup: &RollupResult,
        external: &HashMap<String, Item>,
        limiter: &Arc<Semaphore>,
    ) -> Result<(), SyncError> {
        enum RelationCall {
            SetParent { child: String, parent: String },
            Dependency { from: String, to: String },
        }

        let mut calls = Vec::new();
        for item in plan.items() {
            let Some(parent_id) = item.parent_id.as_deref() else {
                continue;
            };
            let (Some(child_ext), Some(parent_ext)) =
                (external.get(&item.id), external.get(parent_id))
            else {
                tracing::debug!(item = %item.id, parent = %parent_id, "parent not synced, skipping link");
                continue;
            };
            calls.push(RelationCall::SetParent {
                child: child_ext.id.clone(),
                parent: parent_ext.id.clone(),
            });
        }
        for edge in &rollup.edges {
            let (Some(from_ext), Some(to_ext)) = (external.get(&edge.from), external.get(&edge.to))
            else {
                return Err(SyncError::Worker(format!(
                    "edge endpoint missing after upsert: {edge}"
                )));
            };
            calls.push(RelationCall::Dependency {
                from: from_ext.id.clone(),
                to: to_ext.id.clone(),
            });
        }

        let mut set: JoinSet<Result<(), SyncError>> = JoinSet::new();
        for call in calls {
            let provider = Arc::clone(&self.provider);
            let limiter = Arc::clone(limiter);
            set.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| SyncError::Worker(e.to_string()))?;
                let result = match &call {
                    RelationCall::SetParent { child, parent } => {
                        provider.set_parent(child, parent).await
                    }
                    RelationCall::Dependency { from, to } => {
                        provider.add_dependency(from, to).await
                    }
                };
                result.map_err(|source| SyncError::Phase {
                    phase: SyncPhase::Relations,
                    source,
                })
            });
        }

        join_fail_fast(set).await.map(|_| ())
    }
}

/// Drain a `JoinSet`, failing fast: the first error aborts everything
/// still in flight or queued and propagates.
async fn join_fail_fast<T: 'static>(mut set: JoinSet<Result<T, SyncError>>) -> Result<Vec<T>, SyncError> {
    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(value)) => out.push(value),
            Ok(Err(err)) => {
                set.abort_all();
                while set.join_next().await.is_some() {}
                return Err(err);
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                set.abort_all();
                while set.join_next().await.is_some() {}
                return Err(SyncError::Worker(join_err.to_string()));
            }
        }
    }
    Ok(out)
}
