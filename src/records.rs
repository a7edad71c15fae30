//! Tracked records and their event encoding.
//!
//! A record's payload is opaque JSON owned by the host application. On
//! the way out it is optionally NIP-44 encrypted to the user's own key and
//! wrapped in an addressable (or, for maintenance logs, regular) event.
//! On the way in, encrypted content is decrypted with the same signer.

use nostr::{Event, EventBuilder, EventId, Kind, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{Category, EventError, RecordTags, Signer, TagBuilder};

/// Errors from encoding or decoding records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The event's kind belongs to no category.
    #[error("Event kind {0} is not a tracked record")]
    UntrackedKind(u16),

    /// Maintenance is the only category with log entries.
    #[error("Category {0} has no log entries")]
    NoLogKind(Category),

    /// Signing, encryption or tag building failed.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Result type for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// A record about to be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    /// Owning category.
    pub category: Category,
    /// `d` tag for addressable records, `None` for log entries.
    pub identifier: Option<String>,
    /// Plaintext payload.
    pub content: String,
    /// Override for the event timestamp.
    pub created_at: Option<Timestamp>,
}

impl RecordDraft {
    /// An addressable record, replaced by later drafts with the same `d`.
    #[must_use]
    pub fn entity(category: Category, identifier: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            category,
            identifier: Some(identifier.into()),
            content: content.into(),
            created_at: None,
        }
    }

    /// A maintenance completion log entry.
    #[must_use]
    pub fn log_entry(content: impl Into<String>) -> Self {
        Self {
            category: Category::Maintenance,
            identifier: None,
            content: content.into(),
            created_at: None,
        }
    }

    /// Sets the event timestamp.
    #[must_use]
    pub const fn at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// The event kind this draft will be published as.
    ///
    /// # Errors
    ///
    /// Returns an error for a log entry outside maintenance.
    pub fn kind(&self) -> Result<Kind> {
        match self.identifier {
            Some(_) => Ok(self.category.record_kind()),
            None => self
                .category
                .log_kind()
                .ok_or(RecordError::NoLogKind(self.category)),
        }
    }
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Event id of this version.
    pub id: EventId,
    /// Owning category.
    pub category: Category,
    /// Event kind.
    pub kind: Kind,
    /// Author.
    pub pubkey: PublicKey,
    /// `d` tag, for addressable records.
    pub identifier: Option<String>,
    /// Event timestamp.
    pub created_at: Timestamp,
    /// Plaintext payload.
    pub content: String,
    /// Whether the stored content was encrypted.
    pub encrypted: bool,
}

/// Signs a draft, encrypting the payload to the signer's own key first
/// when `encrypt` is set.
///
/// # Errors
///
/// Returns an error if the signer fails or the draft is invalid.
pub async fn encode(draft: &RecordDraft, signer: &dyn Signer, encrypt: bool) -> Result<Event> {
    let kind = draft.kind()?;
    let pubkey = signer.public_key().await?;

    let content = if encrypt {
        signer.encrypt(&pubkey, &draft.content).await?
    } else {
        draft.content.clone()
    };

    let mut raw = Vec::new();
    if let Some(d) = &draft.identifier {
        raw.push(TagBuilder::d_tag(d));
    }
    if encrypt {
        raw.push(TagBuilder::encrypted_tag());
    }
    raw.push(TagBuilder::alt_tag(draft.category.description()));

    let mut builder = EventBuilder::new(kind, content).tags(TagBuilder::into_tags(raw)?);
    if let Some(at) = draft.created_at {
        builder = builder.custom_created_at(at);
    }

    Ok(signer.sign_event(builder.build(pubkey)).await?)
}

/// Decodes a record event, decrypting with `signer` if needed.
///
/// # Errors
///
/// Returns an error if the kind is untracked or decryption fails.
pub async fn decode(event: &Event, signer: &dyn Signer) -> Result<Record> {
    let category =
        Category::from_kind(event.kind).ok_or(RecordError::UntrackedKind(event.kind.as_u16()))?;
    let tags = RecordTags::from_tags(&event.tags);
    let encrypted = tags.is_encrypted();

    let content = if encrypted {
        signer.decrypt(&event.pubkey, &event.content).await?
    } else {
        event.content.clone()
    };

    Ok(Record {
        id: event.id,
        category,
        kind: event.kind,
        pubkey: event.pubkey,
        identifier: tags.identifier,
        created_at: event.created_at,
        content,
        encrypted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeysSigner;
    use nostr::Keys;

    #[tokio::test]
    async fn plaintext_record_round_trip() {
        let signer = KeysSigner::new(Keys::generate());
        let draft = RecordDraft::entity(Category::Vehicles, "car-1", r#"{"make":"Volvo"}"#);

        let event = encode(&draft, &signer, false).await.unwrap();
        assert_eq!(event.kind, Category::Vehicles.record_kind());
        assert!(event.content.contains("Volvo"));

        let record = decode(&event, &signer).await.unwrap();
        assert_eq!(record.identifier.as_deref(), Some("car-1"));
        assert_eq!(record.category, Category::Vehicles);
        assert!(!record.encrypted);
    }

    #[tokio::test]
    async fn encrypted_record_hides_payload() {
        let signer = KeysSigner::new(Keys::generate());
        let draft = RecordDraft::entity(Category::Pets, "rex", r#"{"vet":"Dr. Who"}"#);

        let event = encode(&draft, &signer, true).await.unwrap();
        assert!(!event.content.contains("Dr. Who"));
        assert!(RecordTags::from_tags(&event.tags).is_encrypted());

        let record = decode(&event, &signer).await.unwrap();
        assert_eq!(record.content, r#"{"vet":"Dr. Who"}"#);
        assert!(record.encrypted);
    }

    #[tokio::test]
    async fn encrypted_entity_keeps_identifier() {
        let signer = KeysSigner::new(Keys::generate());
        let draft = RecordDraft::entity(Category::Warranties, "tv-2024", "{}");

        let event = encode(&draft, &signer, true).await.unwrap();
        let record = decode(&event, &signer).await.unwrap();

        assert_eq!(record.identifier.as_deref(), Some("tv-2024"));
        assert!(record.encrypted);
        assert_eq!(record.content, "{}");
    }

    #[tokio::test]
    async fn other_user_cannot_decode_encrypted_record() {
        let alice = KeysSigner::new(Keys::generate());
        let bob = KeysSigner::new(Keys::generate());
        let event = encode(&RecordDraft::entity(Category::Pets, "rex", "{}"), &alice, true)
            .await
            .unwrap();

        assert!(decode(&event, &bob).await.is_err());
    }

    #[tokio::test]
    async fn log_entry_uses_regular_kind() {
        let signer = KeysSigner::new(Keys::generate());
        let draft = RecordDraft::log_entry("{}").at(Timestamp::from(1_700_000_000));

        let event = encode(&draft, &signer, false).await.unwrap();

        assert_eq!(event.kind, Kind::Custom(1629));
        assert_eq!(event.created_at, Timestamp::from(1_700_000_000));
        assert_eq!(RecordTags::from_tags(&event.tags).identifier, None);
    }

    #[test]
    fn log_entry_outside_maintenance_is_invalid() {
        let mut draft = RecordDraft::log_entry("{}");
        draft.category = Category::Pets;
        assert!(matches!(draft.kind(), Err(RecordError::NoLogKind(Category::Pets))));
    }

    #[tokio::test]
    async fn untracked_kind_is_rejected() {
        let keys = Keys::generate();
        let signer = KeysSigner::new(keys.clone());
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .sign_with_keys(&keys)
            .unwrap();

        assert!(matches!(
            decode(&event, &signer).await,
            Err(RecordError::UntrackedKind(1))
        ));
    }
}
