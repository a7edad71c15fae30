//! Login sync and cache invalidation.
//!
//! The [`SyncOrchestrator`] is the only component that triggers a full
//! resync. Views learn about new data through the [`InvalidationBus`].

mod invalidation;
mod orchestrator;
mod state;

pub use invalidation::{Invalidation, InvalidationBus};
pub use orchestrator::SyncOrchestrator;
pub use state::{
    SyncPhase, SyncReport, SyncState, SyncTimeouts, DEFAULT_EXTENDED_TIMEOUT,
    DEFAULT_FRESH_ACCOUNT_TIMEOUT, DEFAULT_RELAY_LIST_WAIT,
};
