//! The provider boundary: the adapter contract the sync engine drives,
//! the data types crossing it, and the reliability toolkit adapters build
//! on (retry with backoff, shared rate-limit gate).

pub mod memory;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod trait_def;
pub mod types;

pub use memory::MemoryProvider;
pub use rate_limit::RateGate;
pub use registry::ProviderRegistry;
pub use retry::{RetryPolicy, with_retry};
pub use trait_def::Provider;
pub use types::{
    Capabilities, CreateStep, Item, ItemDraft, ItemIdentity, ItemUpdate, PartialFailure,
    ProviderError, SearchFilter, SessionContext,
};
