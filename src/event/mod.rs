//! Nostr event vocabulary for tracked records.
//!
//! # Architecture
//!
//! ```text
//! RecordDraft ──► Signer::encrypt (optional, to own key)
//!                      │
//!                      ▼
//!            EventBuilder + TagBuilder tags
//!                      │
//!                      ▼
//!               Signer::sign_event
//!                      │
//!                      ▼
//!             Event (ready for relays)
//! ```
//!
//! Categories map onto a fixed set of kinds (see [`kinds`]). Incoming tags
//! are read through [`RecordTags`] rather than raw arrays.

mod error;
pub mod kinds;
mod signer;
mod tags;

pub use error::{EventError, Result};
pub use kinds::Category;
pub use signer::{KeysSigner, Signer, SignerKind};
pub use tags::{
    identifier, referenced_coordinates, referenced_ids, relay_list_entries, Coordinate,
    RecordTags, RelayListEntry, TagBuilder, ENCRYPTION_NIP44,
};
