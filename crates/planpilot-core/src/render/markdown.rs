//! Default markdown body renderer.
//!
//! Produces a standalone markdown document per item: the metadata marker
//! first, then the descriptive sections, then the resolved
//! cross-references. Sections for absent optional fields are omitted.

use anyhow::Result;
use async_trait::async_trait;

use crate::plan::PlanItem;

use super::{RenderContext, Renderer, marker};

/// Renders item bodies as markdown.
#[derive(Debug, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    async fn render_body(&self, item: &PlanItem, ctx: &RenderContext) -> Result<String> {
        let mut out = String::new();

        out.push_str(&marker::format_marker(&ctx.plan_id, &item.id));
        out.push('\n');

        out.push_str(&format!("# {}\n\n", item.title));
        out.push_str(&format!("**Type:** {}\n\n", item.item_type));

        out.push_str("## Goal\n\n");
        out.push_str(&item.goal);
        out.push_str("\n\n");

        if let Some(ref motivation) = item.motivation {
            out.push_str("## Motivation\n\n");
            out.push_str(motivation);
            out.push_str("\n\n");
        }

        push_list(&mut out, "Requirements", &item.requirements);
        push_list(&mut out, "Acceptance Criteria", &item.acceptance_criteria);
        push_list(&mut out, "Verification", &item.verification);

        if let Some(ref scope) = item.scope {
            out.push_str("## Scope\n\n");
            out.push_str(scope);
            out.push_str("\n\n");
        }

        push_list(&mut out, "Success Metrics", &item.success_metrics);
        push_list(&mut out, "Assumptions", &item.assumptions);
        push_list(&mut out, "Risks", &item.risks);

        let mut meta_lines = Vec::new();
        if let Some(ref estimate) = item.estimate {
            meta_lines.push(format!("**Estimate:** {estimate}"));
        }
        if let Some(ref spec_ref) = item.spec_ref {
            meta_lines.push(format!("**Spec:** {spec_ref}"));
        }
        if !meta_lines.is_empty() {
            out.push_str(&meta_lines.join("  \n"));
            out.push_str("\n\n");
        }

        if ctx.parent_key.is_some() || !ctx.children.is_empty() || !ctx.dependencies.is_empty() {
            out.push_str("## Links\n\n");
            if let Some(ref parent_key) = ctx.parent_key {
                out.push_str(&format!("**Parent:** {parent_key}\n\n"));
            }
            if !ctx.children.is_empty() {
                out.push_str("**Sub-items:**\n");
                for child in &ctx.children {
                    out.push_str(&format!("- {} {}\n", child.key, child.title));
                }
                out.push('\n');
            }
            if !ctx.dependencies.is_empty() {
                out.push_str("**Depends on:**\n");
                for dep in &ctx.dependencies {
                    out.push_str(&format!("- {}\n", dep.key));
                }
                out.push('\n');
            }
        }

        Ok(out)
    }
}

fn push_list(out: &mut String, heading: &str, entries: &[String]) {
    if entries.is_empty() {
        return;
    }
    out.push_str(&format!("## {heading}\n\n"));
    for entry in entries {
        out.push_str(&format!("- {entry}\n"));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ItemType;
    use crate::render::{ChildRef, DepRef, parse_marker};

    fn story() -> PlanItem {
        PlanItem {
            id: "S1".to_owned(),
            item_type: ItemType::Story,
            title: "Token issuing".to_owned(),
            goal: "Issue signed tokens".to_owned(),
            parent_id: Some("E1".to_owned()),
            sub_item_ids: vec![],
            depends_on: vec!["S2".to_owned()],
            requirements: vec!["RS256 keys".to_owned()],
            acceptance_criteria: vec!["Tokens verify".to_owned()],
            motivation: Some("Sessions are stateless".to_owned()),
            estimate: Some("M".to_owned()),
            scope: None,
            spec_ref: None,
            verification: vec![],
            success_metrics: vec![],
            assumptions: vec![],
            risks: vec![],
        }
    }

    #[tokio::test]
    async fn body_starts_with_the_marker() {
        let body = MarkdownRenderer::new()
            .render_body(&story(), &RenderContext::partial("a1b2c3d4e5f6", None))
            .await
            .unwrap();
        assert!(body.starts_with("PLANPILOT_META_V1\n"), "body: {body}");
        let marker = parse_marker(&body).expect("marker should parse back");
        assert_eq!(marker.plan_id, "a1b2c3d4e5f6");
        assert_eq!(marker.item_id, "S1");
    }

    #[tokio::test]
    async fn body_contains_required_sections() {
        let body = MarkdownRenderer::new()
            .render_body(&story(), &RenderContext::partial("a1b2c3d4e5f6", None))
            .await
            .unwrap();
        assert!(body.contains("# Token issuing"));
        assert!(body.contains("## Goal"));
        assert!(body.contains("## Requirements"));
        assert!(body.contains("- RS256 keys"));
        assert!(body.contains("## Acceptance Criteria"));
        assert!(body.contains("## Motivation"));
        assert!(body.contains("**Estimate:** M"));
        // Absent optional sections are omitted entirely.
        assert!(!body.contains("## Scope"));
        assert!(!body.contains("## Risks"));
    }

    #[tokio::test]
    async fn cross_references_render_when_resolved() {
        let ctx = RenderContext::new(
            "a1b2c3d4e5f6",
            Some("PP-1".to_owned()),
            vec![
                ChildRef { key: "PP-4".into(), title: "Rotate keys".into() },
                ChildRef { key: "PP-3".into(), title: "Sign".into() },
            ],
            vec![DepRef { dep_id: "S2".into(), key: "PP-2".into() }],
        );
        let body = MarkdownRenderer::new()
            .render_body(&story(), &ctx)
            .await
            .unwrap();
        assert!(body.contains("**Parent:** PP-1"));
        let pp3 = body.find("PP-3 Sign").expect("child PP-3");
        let pp4 = body.find("PP-4 Rotate keys").expect("child PP-4");
        assert!(pp3 < pp4, "children must be sorted by key");
        assert!(body.contains("**Depends on:**\n- PP-2"));
    }

    #[tokio::test]
    async fn no_links_section_without_cross_references() {
        let body = MarkdownRenderer::new()
            .render_body(&story(), &RenderContext::partial("a1b2c3d4e5f6", None))
            .await
            .unwrap();
        assert!(!body.contains("## Links"));
    }
}
