//! planpilot-core: the plan-to-tracker synchronization core.
//!
//! Converts a hierarchical project plan (epics, stories, tasks) into
//! state in an external work tracker and keeps that state idempotently
//! reconciled across runs. The pieces, leaves first:
//!
//! - [`plan`]: the typed plan model, file loading, relational validation,
//!   and the deterministic plan identifier.
//! - [`provider`]: the adapter contract for external trackers, the
//!   reliability toolkit adapters build on, and the in-memory reference
//!   adapter.
//! - [`render`]: the body-rendering contract and the metadata marker
//!   that correlates external records back to plan items.
//! - [`engine`]: the multi-phase sync pipeline driving a provider under
//!   bounded concurrency.

pub mod engine;
pub mod plan;
pub mod provider;
pub mod render;
