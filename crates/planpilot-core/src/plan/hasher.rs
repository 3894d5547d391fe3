//! Deterministic plan identifiers.
//!
//! [`compute_plan_id`] derives a 12-hex-character id from the canonical
//! content of a plan. The id is the correlation key embedded in every
//! rendered item body and the sole basis for discovery, so it must be
//! stable across everything that does not change the plan's meaning:
//! item ordering, source file layout, and empty-versus-omitted optional
//! collections.

use sha2::{Digest, Sha256};

use super::model::{Plan, PlanItem};

/// Number of hex characters in a plan id.
pub const PLAN_ID_LEN: usize = 12;

/// Compute the deterministic content-addressed identifier of a plan.
///
/// Items are sorted by `(item_type, id)` and serialized to a canonical
/// JSON document: absent options and empty collections are omitted, set-
/// valued lists (`sub_item_ids`, `depends_on`) are sorted, and map keys
/// sort lexicographically. The document is hashed with SHA-256 and
/// truncated to [`PLAN_ID_LEN`] hex characters.
pub fn compute_plan_id(plan: &Plan) -> String {
    let mut sorted: Vec<&PlanItem> = plan.items().iter().collect();
    sorted.sort_by(|a, b| (a.item_type, a.id.as_str()).cmp(&(b.item_type, b.id.as_str())));

    let doc = serde_json::Value::Array(sorted.into_iter().map(canonical_item).collect());
    // serde_json::Map is sorted by key, and to_string emits no
    // incidental whitespace, so this is already the canonical document.
    let canonical = doc.to_string();

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..PLAN_ID_LEN].to_owned()
}

fn canonical_item(item: &PlanItem) -> serde_json::Value {
    let mut m = serde_json::Map::new();

    m.insert("id".to_owned(), item.id.clone().into());
    m.insert("type".to_owned(), item.item_type.to_string().into());
    m.insert("title".to_owned(), item.title.clone().into());
    m.insert("goal".to_owned(), item.goal.clone().into());

    insert_opt(&mut m, "parent_id", &item.parent_id);
    insert_opt(&mut m, "motivation", &item.motivation);
    insert_opt(&mut m, "estimate", &item.estimate);
    insert_opt(&mut m, "scope", &item.scope);
    insert_opt(&mut m, "spec_ref", &item.spec_ref);

    insert_set(&mut m, "sub_item_ids", &item.sub_item_ids);
    insert_set(&mut m, "depends_on", &item.depends_on);

    insert_list(&mut m, "requirements", &item.requirements);
    insert_list(&mut m, "acceptance_criteria", &item.acceptance_criteria);
    insert_list(&mut m, "verification", &item.verification);
    insert_list(&mut m, "success_metrics", &item.success_metrics);
    insert_list(&mut m, "assumptions", &item.assumptions);
    insert_list(&mut m, "risks", &item.risks);

    serde_json::Value::Object(m)
}

fn insert_opt(m: &mut serde_json::Map<String, serde_json::Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        m.insert(key.to_owned(), v.clone().into());
    }
}

/// Insert a set-valued list: sorted, omitted when empty.
fn insert_set(m: &mut serde_json::Map<String, serde_json::Value>, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    m.insert(key.to_owned(), sorted.into());
}

/// Insert an ordered list, omitted when empty.
fn insert_list(m: &mut serde_json::Map<String, serde_json::Value>, key: &str, values: &[String]) {
    if !values.is_empty() {
        m.insert(key.to_owned(), values.to_vec().into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::model::ItemType;

    fn item(id: &str, item_type: ItemType) -> PlanItem {
        PlanItem {
            id: id.to_owned(),
            item_type,
            title: format!("Item {id}"),
            goal: "A goal".to_owned(),
            parent_id: None,
            sub_item_ids: vec![],
            depends_on: vec![],
            requirements: vec!["req".to_owned()],
            acceptance_criteria: vec!["done".to_owned()],
            motivation: None,
            estimate: None,
            scope: None,
            spec_ref: None,
            verification: vec![],
            success_metrics: vec![],
            assumptions: vec![],
            risks: vec![],
        }
    }

    #[test]
    fn plan_id_is_twelve_hex_chars() {
        let plan = Plan::new(vec![item("E1", ItemType::Epic)]);
        let id = compute_plan_id(&plan);
        assert_eq!(id.len(), PLAN_ID_LEN);
        assert!(
            id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
            "expected lowercase hex, got: {id}"
        );
    }

    #[test]
    fn plan_id_is_order_independent() {
        let a = Plan::new(vec![
            item("E1", ItemType::Epic),
            item("S1", ItemType::Story),
            item("T1", ItemType::Task),
        ]);
        let b = Plan::new(vec![
            item("T1", ItemType::Task),
            item("E1", ItemType::Epic),
            item("S1", ItemType::Story),
        ]);
        assert_eq!(compute_plan_id(&a), compute_plan_id(&b));
    }

    #[test]
    fn empty_collection_hashes_like_absent_collection() {
        let with_empty = item("E1", ItemType::Epic);
        // Vec fields default to empty, which is exactly the "absent"
        // representation; assert the canonical form drops them entirely.
        let value = canonical_item(&with_empty);
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("depends_on"));
        assert!(!obj.contains_key("sub_item_ids"));
        assert!(!obj.contains_key("verification"));
    }

    #[test]
    fn set_field_ordering_does_not_change_the_id() {
        let mut a = item("T1", ItemType::Task);
        a.depends_on = vec!["T2".to_owned(), "T3".to_owned()];
        let mut b = item("T1", ItemType::Task);
        b.depends_on = vec!["T3".to_owned(), "T2".to_owned()];

        assert_eq!(
            compute_plan_id(&Plan::new(vec![a])),
            compute_plan_id(&Plan::new(vec![b]))
        );
    }

    #[test]
    fn content_change_changes_the_id() {
        let a = Plan::new(vec![item("E1", ItemType::Epic)]);
        let mut changed = item("E1", ItemType::Epic);
        changed.goal = "A different goal".to_owned();
        let b = Plan::new(vec![changed]);

        assert_ne!(compute_plan_id(&a), compute_plan_id(&b));
    }

    #[test]
    fn optional_field_presence_changes_the_id() {
        let a = Plan::new(vec![item("E1", ItemType::Epic)]);
        let mut with_motivation = item("E1", ItemType::Epic);
        with_motivation.motivation = Some("because".to_owned());
        let b = Plan::new(vec![with_motivation]);

        assert_ne!(compute_plan_id(&a), compute_plan_id(&b));
    }

    #[test]
    fn same_id_different_types_sort_deterministically() {
        // Sorting is by (type, id): items of different types with the
        // same id still produce a stable document.
        let a = Plan::new(vec![item("X", ItemType::Task), item("X", ItemType::Epic)]);
        let b = Plan::new(vec![item("X", ItemType::Epic), item("X", ItemType::Task)]);
        assert_eq!(compute_plan_id(&a), compute_plan_id(&b));
    }
}
