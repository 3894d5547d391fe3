//! Plan management: data model, file loading, relational validation, and
//! deterministic content hashing.

pub mod hasher;
pub mod loader;
pub mod model;
pub mod validator;

pub use hasher::{PLAN_ID_LEN, compute_plan_id};
pub use loader::{PlanLoadError, PlanSource, load_plan};
pub use model::{ItemType, Plan, PlanItem};
pub use validator::{ValidateMode, ValidationError, ValidationIssue, validate};
