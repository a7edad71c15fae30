//! Hearth Core Library
//!
//! Core functionality for Hearth - personal home records (vehicles, pets,
//! appliances, maintenance and more) kept on the user's own Nostr relays.
//!
//! The crate keeps a local event cache that every view renders from, and
//! reconciles it with the relays in the background. Records in sensitive
//! categories can be NIP-44 encrypted to the user's own key and kept off
//! public relays; reads for them are routed to private relays first.
//!
//! Start with [`Tracker`].

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod cache;
pub mod config;
pub mod deletion;
pub mod error;
pub mod event;
pub mod policy;
pub mod records;
pub mod relay;
pub mod routing;
pub mod store;
pub mod sync;

pub use api::Tracker;
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use records::{Record, RecordDraft};
