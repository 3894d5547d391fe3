//! Shared test utilities for planpilot integration tests.
//!
//! Provides plan fixture builders and [`MockProvider`], a scriptable
//! in-process provider: it records every call, tracks the maximum number
//! of concurrent calls, and can be told to fail item creation partway
//! through its canonical steps -- exactly what the engine's
//! partial-failure recovery tests need.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use planpilot_core::plan::{ItemType, Plan, PlanItem};
use planpilot_core::provider::{
    Capabilities, CreateStep, Item, ItemDraft, ItemIdentity, ItemUpdate, PartialFailure, Provider,
    ProviderError, SearchFilter, SessionContext,
};
use planpilot_core::render::parse_marker;

// ---------------------------------------------------------------------------
// Plan fixtures
// ---------------------------------------------------------------------------

/// A minimal valid plan item of the given type.
pub fn plan_item(id: &str, item_type: ItemType, parent: Option<&str>) -> PlanItem {
    PlanItem {
        id: id.to_owned(),
        item_type,
        title: format!("{} {id}", capitalized(item_type)),
        goal: format!("Goal of {id}"),
        parent_id: parent.map(str::to_owned),
        sub_item_ids: vec![],
        depends_on: vec![],
        requirements: vec![format!("Requirement of {id}")],
        acceptance_criteria: vec![format!("Acceptance of {id}")],
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

fn capitalized(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Epic => "Epic",
        ItemType::Story => "Story",
        ItemType::Task => "Task",
    }
}

pub fn epic(id: &str) -> PlanItem {
    plan_item(id, ItemType::Epic, None)
}

pub fn story(id: &str, parent: &str) -> PlanItem {
    plan_item(id, ItemType::Story, Some(parent))
}

pub fn task(id: &str, parent: &str) -> PlanItem {
    plan_item(id, ItemType::Task, Some(parent))
}

pub fn plan_of(items: Vec<PlanItem>) -> Plan {
    Plan::new(items)
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// One recorded provider call. Item-level records carry the plan-item id
/// recovered from the marker where possible, so tests can assert on plan
/// vocabulary instead of opaque external ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRecord {
    Enter,
    Exit,
    Search,
    Create { plan_item_id: String },
    Update { plan_item_id: String },
    Get { id: String },
    Delete { id: String },
    SetParent { child: String, parent: String },
    AddDependency { from: String, to: String },
}

/// A scripted creation failure: fail `times` invocations for one plan
/// item, completing only `completed` steps each time.
#[derive(Debug, Clone)]
struct FailureScript {
    completed: Vec<CreateStep>,
    retryable: bool,
    times: usize,
}

#[derive(Debug, Clone)]
struct MockItem {
    item: Item,
    status: String,
    parent: Option<String>,
    blocked_by: BTreeSet<String>,
    steps: Vec<CreateStep>,
}

#[derive(Debug, Default)]
struct MockStore {
    items: HashMap<String, MockItem>,
    next_key: u64,
}

impl MockStore {
    fn find_by_marker(&self, body: &str) -> Option<String> {
        let marker = parse_marker(body)?;
        self.items
            .values()
            .find(|stored| parse_marker(&stored.item.body).as_ref() == Some(&marker))
            .map(|stored| stored.item.id.clone())
    }
}

/// Scriptable in-process provider for engine tests.
pub struct MockProvider {
    capabilities: Capabilities,
    op_delay: Duration,
    store: Mutex<MockStore>,
    fail_create: Mutex<HashMap<String, FailureScript>>,
    fail_update: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<CallRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::full(),
            op_delay: Duration::from_millis(5),
            store: Mutex::new(MockStore::default()),
            fail_create: Mutex::new(HashMap::new()),
            fail_update: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the declared capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Script `create_item` for one plan item to fail `times` times,
    /// completing only the given steps on each failing attempt.
    pub fn fail_create_after(
        self,
        plan_item_id: &str,
        completed: &[CreateStep],
        retryable: bool,
        times: usize,
    ) -> Self {
        self.fail_create.lock().unwrap().insert(
            plan_item_id.to_owned(),
            FailureScript {
                completed: completed.to_vec(),
                retryable,
                times,
            },
        );
        self
    }

    /// Script `update_item` for one plan item to fail permanently `times`
    /// times.
    pub fn fail_update(self, plan_item_id: &str, times: usize) -> Self {
        self.fail_update
            .lock()
            .unwrap()
            .insert(plan_item_id.to_owned(), times);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls matching a predicate.
    pub fn count_calls(&self, pred: impl Fn(&CallRecord) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// The highest number of provider calls that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Snapshot of all stored items, sorted by key.
    pub fn items(&self) -> Vec<Item> {
        let store = self.store.lock().unwrap();
        let mut items: Vec<Item> = store.items.values().map(|s| s.item.clone()).collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }

    /// The stored item for a plan item id, by marker.
    pub fn item_for(&self, plan_item_id: &str) -> Option<Item> {
        let store = self.store.lock().unwrap();
        store
            .items
            .values()
            .find(|s| {
                parse_marker(&s.item.body).is_some_and(|m| m.item_id == plan_item_id)
            })
            .map(|s| s.item.clone())
    }

    /// Completed creation steps for a plan item id.
    pub fn steps_for(&self, plan_item_id: &str) -> Vec<CreateStep> {
        let store = self.store.lock().unwrap();
        store
            .items
            .values()
            .find(|s| {
                parse_marker(&s.item.body).is_some_and(|m| m.item_id == plan_item_id)
            })
            .map(|s| s.steps.clone())
            .unwrap_or_default()
    }

    /// External ids this item is blocked by.
    pub fn blocked_by_of(&self, external_id: &str) -> BTreeSet<String> {
        let store = self.store.lock().unwrap();
        store
            .items
            .get(external_id)
            .map(|s| s.blocked_by.clone())
            .unwrap_or_default()
    }

    /// External parent of an item, if set.
    pub fn parent_of(&self, external_id: &str) -> Option<String> {
        let store = self.store.lock().unwrap();
        store.items.get(external_id).and_then(|s| s.parent.clone())
    }

    /// Workflow status of an item.
    pub fn status_of(&self, external_id: &str) -> Option<String> {
        let store = self.store.lock().unwrap();
        store.items.get(external_id).map(|s| s.status.clone())
    }

    /// Simulate an external workflow change.
    pub fn set_status(&self, external_id: &str, status: &str) {
        let mut store = self.store.lock().unwrap();
        if let Some(stored) = store.items.get_mut(external_id) {
            stored.status = status.to_owned();
        }
    }

    /// Simulate an externally added label.
    pub fn add_external_label(&self, external_id: &str, label: &str) {
        let mut store = self.store.lock().unwrap();
        if let Some(stored) = store.items.get_mut(external_id) {
            if !stored.item.labels.iter().any(|l| l == label) {
                stored.item.labels.push(label.to_owned());
            }
        }
    }

    fn record(&self, call: CallRecord) {
        self.calls.lock().unwrap().push(call);
    }

    /// Track one in-flight call, with a small delay so concurrent calls
    /// actually overlap.
    async fn begin_call(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.op_delay).await;
        InFlightGuard { counter: &self.in_flight }
    }

    fn plan_item_id_of(body: &str) -> String {
        parse_marker(body)
            .map(|m| m.item_id)
            .unwrap_or_else(|| "<unknown>".to_owned())
    }
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn enter(&self) -> Result<SessionContext, ProviderError> {
        self.record(CallRecord::Enter);
        Ok(SessionContext {
            target: "mock".to_owned(),
            board_url: "mock://board".to_owned(),
            capabilities: self.capabilities,
        })
    }

    async fn exit(&self) -> Result<(), ProviderError> {
        self.record(CallRecord::Exit);
        Ok(())
    }

    async fn search_items(&self, filter: &SearchFilter) -> Result<Vec<Item>, ProviderError> {
        if !self.capabilities.search_by_label_and_body {
            return Err(ProviderError::Capability(
                "mock search disabled".to_owned(),
            ));
        }
        self.record(CallRecord::Search);
        let _guard = self.begin_call().await;
        let store = self.store.lock().unwrap();
        let mut hits: Vec<Item> = store
            .items
            .values()
            .filter(|stored| {
                filter
                    .labels
                    .iter()
                    .all(|label| stored.item.labels.iter().any(|l| l == label))
                    && stored.item.body.contains(&filter.body_contains)
            })
            .map(|stored| stored.item.clone())
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(hits)
    }

    async fn create_item(&self, draft: &ItemDraft) -> Result<Item, ProviderError> {
        let plan_item_id = Self::plan_item_id_of(&draft.body);
        self.record(CallRecord::Create {
            plan_item_id: plan_item_id.clone(),
        });
        let _guard = self.begin_call().await;

        // Scripted partial failure?
        let script = {
            let mut scripts = self.fail_create.lock().unwrap();
            match scripts.get_mut(&plan_item_id) {
                Some(script) if script.times > 0 => {
                    script.times -= 1;
                    Some(script.clone())
                }
                _ => None,
            }
        };

        let mut store = self.store.lock().unwrap();

        if let Some(script) = script {
            let identity = if script.completed.contains(&CreateStep::CreateRecord) {
                // The record exists externally: store it in its partial
                // state, marker already in the body.
                let existing = store.find_by_marker(&draft.body);
                let id = match existing {
                    Some(id) => id,
                    None => {
                        store.next_key += 1;
                        let key = format!("MK-{}", store.next_key);
                        let item = Item {
                            id: Uuid::new_v4().to_string(),
                            key: key.clone(),
                            url: format!("mock://board/{key}"),
                            title: draft.title.clone(),
                            body: draft.body.clone(),
                            item_type: draft.item_type,
                            labels: if script.completed.contains(&CreateStep::ApplyLabels) {
                                draft.labels.clone()
                            } else {
                                vec![]
                            },
                        };
                        let id = item.id.clone();
                        store.items.insert(
                            id.clone(),
                            MockItem {
                                item,
                                status: "todo".to_owned(),
                                parent: None,
                                blocked_by: BTreeSet::new(),
                                steps: script.completed.clone(),
                            },
                        );
                        id
                    }
                };
                let stored = &store.items[&id];
                Some(ItemIdentity {
                    id: stored.item.id.clone(),
                    key: stored.item.key.clone(),
                    url: stored.item.url.clone(),
                })
            } else {
                None
            };

            return Err(ProviderError::PartialCreation(PartialFailure {
                identity,
                completed: script.completed,
                retryable: script.retryable,
                message: "scripted creation failure".to_owned(),
            }));
        }

        // Converge an existing (possibly partial) record.
        if let Some(id) = store.find_by_marker(&draft.body) {
            let stored = store.items.get_mut(&id).expect("id came from the store");
            stored.item.item_type = draft.item_type;
            for label in &draft.labels {
                if !stored.item.labels.iter().any(|l| l == label) {
                    stored.item.labels.push(label.clone());
                }
            }
            stored.steps = CreateStep::ALL.to_vec();
            return Ok(stored.item.clone());
        }

        store.next_key += 1;
        let key = format!("MK-{}", store.next_key);
        let item = Item {
            id: Uuid::new_v4().to_string(),
            key: key.clone(),
            url: format!("mock://board/{key}"),
            title: draft.title.clone(),
            body: draft.body.clone(),
            item_type: draft.item_type,
            labels: draft.labels.clone(),
        };
        store.items.insert(
            item.id.clone(),
            MockItem {
                item: item.clone(),
                status: "todo".to_owned(),
                parent: None,
                blocked_by: BTreeSet::new(),
                steps: CreateStep::ALL.to_vec(),
            },
        );
        Ok(item)
    }

    async fn update_item(&self, id: &str, update: &ItemUpdate) -> Result<Item, ProviderError> {
        let plan_item_id = Self::plan_item_id_of(&update.body);
        self.record(CallRecord::Update {
            plan_item_id: plan_item_id.clone(),
        });
        let _guard = self.begin_call().await;

        {
            let mut failures = self.fail_update.lock().unwrap();
            if let Some(times) = failures.get_mut(&plan_item_id) {
                if *times > 0 {
                    *times -= 1;
                    return Err(ProviderError::permanent("scripted update failure"));
                }
            }
        }

        let mut store = self.store.lock().unwrap();
        let stored = store
            .items
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))?;
        stored.item.title = update.title.clone();
        stored.item.body = update.body.clone();
        stored.item.item_type = update.item_type;
        for label in &update.ensure_labels {
            if !stored.item.labels.iter().any(|l| l == label) {
                stored.item.labels.push(label.clone());
            }
        }
        Ok(stored.item.clone())
    }

    async fn get_item(&self, id: &str) -> Result<Item, ProviderError> {
        self.record(CallRecord::Get { id: id.to_owned() });
        let _guard = self.begin_call().await;
        let store = self.store.lock().unwrap();
        store
            .items
            .get(id)
            .map(|s| s.item.clone())
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))
    }

    async fn delete_item(&self, id: &str) -> Result<(), ProviderError> {
        self.record(CallRecord::Delete { id: id.to_owned() });
        let _guard = self.begin_call().await;
        let mut store = self.store.lock().unwrap();
        store
            .items
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(id.to_owned()))
    }

    async fn set_parent(&self, item_id: &str, parent_id: &str) -> Result<(), ProviderError> {
        if !self.capabilities.set_parent {
            return Err(ProviderError::Capability(
                "mock set_parent disabled".to_owned(),
            ));
        }
        self.record(CallRecord::SetParent {
            child: item_id.to_owned(),
            parent: parent_id.to_owned(),
        });
        let _guard = self.begin_call().await;
        let mut store = self.store.lock().unwrap();
        if !store.items.contains_key(parent_id) {
            return Err(ProviderError::NotFound(parent_id.to_owned()));
        }
        let stored = store
            .items
            .get_mut(item_id)
            .ok_or_else(|| ProviderError::NotFound(item_id.to_owned()))?;
        stored.parent = Some(parent_id.to_owned());
        Ok(())
    }

    async fn add_dependency(
        &self,
        item_id: &str,
        blocked_by_id: &str,
    ) -> Result<(), ProviderError> {
        if !self.capabilities.add_dependency {
            return Err(ProviderError::Capability(
                "mock add_dependency disabled".to_owned(),
            ));
        }
        self.record(CallRecord::AddDependency {
            from: item_id.to_owned(),
            to: blocked_by_id.to_owned(),
        });
        let _guard = self.begin_call().await;
        let mut store = self.store.lock().unwrap();
        if !store.items.contains_key(blocked_by_id) {
            return Err(ProviderError::NotFound(blocked_by_id.to_owned()));
        }
        let stored = store
            .items
            .get_mut(item_id)
            .ok_or_else(|| ProviderError::NotFound(item_id.to_owned()))?;
        stored.blocked_by.insert(blocked_by_id.to_owned());
        Ok(())
    }
}
