//! Deleting a logical record everywhere it lives.
//!
//! One logical record can exist as several events: older versions of an
//! addressable record, a plaintext copy from before encryption was
//! turned on, copies that only ever reached a private relay. Deleting it
//! means finding every sibling id and naming all of them in one NIP-09
//! deletion event.
//!
//! Nothing here is persisted. A [`PendingDeletion`] lives only as long as
//! it takes to publish it.

mod resolver;

use nostr::{EventBuilder, EventId, Kind, PublicKey, Timestamp};

pub use resolver::DeletionResolver;

use crate::event::kinds::is_addressable;
use crate::event::{EventError, TagBuilder};

/// What identifies the siblings of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiblingScope {
    /// Addressable records: every version sharing the `d` tag.
    Identifier(String),
    /// Regular records: every event created at the same instant.
    CreatedAt(Timestamp),
}

/// A resolved set of sibling ids, ready to publish as a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    /// Kind of the deleted record.
    pub kind: Kind,
    /// Author of the deleted record.
    pub pubkey: PublicKey,
    /// How the siblings were found.
    pub scope: SiblingScope,
    /// Every sibling id found.
    pub sibling_ids: Vec<EventId>,
}

impl PendingDeletion {
    /// Builds the kind 5 deletion event.
    ///
    /// One `e` tag per sibling, an `a` coordinate for addressable records,
    /// and a `k` tag naming the kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a tag cannot be built.
    pub fn builder(&self) -> Result<EventBuilder, EventError> {
        let mut raw: Vec<Vec<String>> = self.sibling_ids.iter().map(TagBuilder::e_tag).collect();
        if let SiblingScope::Identifier(d) = &self.scope {
            if is_addressable(self.kind) {
                raw.push(TagBuilder::a_tag(self.kind, &self.pubkey, d));
            }
        }
        raw.push(TagBuilder::k_tag(self.kind));
        Ok(EventBuilder::new(Kind::EventDeletion, "").tags(TagBuilder::into_tags(raw)?))
    }
}
