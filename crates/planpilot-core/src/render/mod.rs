//! Body rendering: the `Renderer` contract and the metadata marker every
//! rendered body must carry.

pub mod markdown;
pub mod marker;

pub use markdown::MarkdownRenderer;
pub use marker::{Marker, format_marker, parse_marker, plan_id_token};

use anyhow::Result;
use async_trait::async_trait;

use crate::plan::PlanItem;

/// A resolved cross-reference to a child item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub key: String,
    pub title: String,
}

/// A resolved cross-reference to a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepRef {
    /// Plan-item id of the dependency.
    pub dep_id: String,
    /// External key of the dependency.
    pub key: String,
}

/// Cross-reference context available when rendering one item's body.
///
/// During the upsert phase only the parent key is resolvable (parents
/// are created before children); the enrich phase re-renders with the
/// full context.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub plan_id: String,
    pub parent_key: Option<String>,
    /// Children, sorted by `(key, title)`.
    pub children: Vec<ChildRef>,
    /// Dependencies, sorted by dependency id.
    pub dependencies: Vec<DepRef>,
}

impl RenderContext {
    /// Build a context; children and dependencies are sorted here so the
    /// rendered output is deterministic regardless of caller order.
    pub fn new(
        plan_id: impl Into<String>,
        parent_key: Option<String>,
        mut children: Vec<ChildRef>,
        mut dependencies: Vec<DepRef>,
    ) -> Self {
        children.sort_by(|a, b| (&a.key, &a.title).cmp(&(&b.key, &b.title)));
        dependencies.sort_by(|a, b| a.dep_id.cmp(&b.dep_id));
        Self {
            plan_id: plan_id.into(),
            parent_key,
            children,
            dependencies,
        }
    }

    /// A context with no resolved cross-references except the parent.
    pub fn partial(plan_id: impl Into<String>, parent_key: Option<String>) -> Self {
        Self::new(plan_id, parent_key, vec![], vec![])
    }
}

/// Produces item body text for the external tracker.
///
/// Implementations must place the metadata marker
/// ([`marker::format_marker`]) verbatim at the top of every body; the
/// sync engine's discovery depends on it.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render_body(&self, item: &PlanItem, ctx: &RenderContext) -> Result<String>;
}

// Compile-time assertion: Renderer must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Renderer) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_sorts_children_by_key_then_title() {
        let ctx = RenderContext::new(
            "abc",
            None,
            vec![
                ChildRef { key: "PP-2".into(), title: "B".into() },
                ChildRef { key: "PP-1".into(), title: "Z".into() },
                ChildRef { key: "PP-2".into(), title: "A".into() },
            ],
            vec![],
        );
        let keys: Vec<(&str, &str)> = ctx
            .children
            .iter()
            .map(|c| (c.key.as_str(), c.title.as_str()))
            .collect();
        assert_eq!(keys, vec![("PP-1", "Z"), ("PP-2", "A"), ("PP-2", "B")]);
    }

    #[test]
    fn context_sorts_dependencies_by_dep_id() {
        let ctx = RenderContext::new(
            "abc",
            None,
            vec![],
            vec![
                DepRef { dep_id: "T9".into(), key: "PP-9".into() },
                DepRef { dep_id: "T1".into(), key: "PP-3".into() },
            ],
        );
        let ids: Vec<&str> = ctx.dependencies.iter().map(|d| d.dep_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T9"]);
    }
}
