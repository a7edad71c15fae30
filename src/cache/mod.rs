//! Local, offline-first event cache.
//!
//! The cache is a dumb store: it never talks to the network and never
//! decides which version of a record is current. Readers resolve with
//! [`resolve_latest`] after loading.

mod resolve;
mod storage;

pub use resolve::resolve_latest;
pub use storage::{CachedEvent, EventCache};
