//! Relay connectivity: single connections, the pool, and transports.
//!
//! # Architecture
//!
//! ```text
//! Routers (which relays?)
//!     │
//!     ▼
//! RelayPool ── query / publish fan-out, dedup, visibility lifecycle
//!     │
//!     ▼
//! RelayConnection ── lazy open, NIP-42 AUTH via the current signer
//!     │
//!     ▼
//! RelayTransport ── nostr-sdk client (optionally over Tor), or the
//!                   in-memory network under `test-utils`
//! ```
//!
//! Relays are independently operated and unreliable. Nothing in this
//! module retries: a relay that fails is skipped for that one operation,
//! and the caller only hears about it when every relay failed.

mod connection;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
mod pool;
mod sdk;
mod types;

pub use connection::{RelayConnection, RelayConnector, RelayTransport};
pub use error::{RelayError, RelayResult};
pub use pool::{RelayPool, DEFAULT_PUBLISH_TIMEOUT};
pub use sdk::SdkConnector;
pub use types::{
    PublishResult, Relay, RelayConnectionStatus, RelayStatus, Visibility, DEFAULT_RELAYS,
};
