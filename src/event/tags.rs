//! Tag builders and typed tag views for Nostr events.
//!
//! Outgoing tags are built with [`TagBuilder`] following the relevant NIPs:
//! - `d` tag: addressable record identifier (NIP-01)
//! - `alt` tag: human-readable description (NIP-31)
//! - `encrypted` tag: marks NIP-44 self-encrypted content
//! - `e`, `a`, `k` tags: deletion references (NIP-09)
//! - `r` tag: relay list entries (NIP-65)
//!
//! Incoming tags are mapped to [`RecordTags`] right after decode so the
//! rest of the crate never matches on positional string arrays.

use nostr::{EventId, Kind, PublicKey, Tag, Tags};

use crate::event::error::{EventError, Result};

/// Encryption scheme marker value for NIP-44 v2 self-encryption.
pub const ENCRYPTION_NIP44: &str = "nip44";

/// Builder for Nostr event tags.
///
/// Provides static methods for constructing properly formatted tags.
///
/// # Example
///
/// ```
/// use hearth_core::event::TagBuilder;
///
/// let d_tag = TagBuilder::d_tag("fridge-1");
/// assert_eq!(d_tag, vec!["d", "fridge-1"]);
/// ```
pub struct TagBuilder;

impl TagBuilder {
    /// Builds the `d` tag for addressable events.
    ///
    /// The `d` tag creates an addressable event that can be replaced
    /// by publishing a new event with the same `d` tag value.
    ///
    /// # Example
    ///
    /// ```
    /// use hearth_core::event::TagBuilder;
    ///
    /// let tag = TagBuilder::d_tag("truck");
    /// assert_eq!(tag, vec!["d", "truck"]);
    /// ```
    #[must_use]
    pub fn d_tag(identifier: &str) -> Vec<String> {
        vec!["d".to_string(), identifier.to_string()]
    }

    /// Builds the `alt` tag for NIP-31 human-readable descriptions.
    ///
    /// Provides a human-readable description for clients that don't
    /// understand the event kind.
    #[must_use]
    pub fn alt_tag(description: &str) -> Vec<String> {
        vec!["alt".to_string(), description.to_string()]
    }

    /// Builds the `encrypted` marker tag.
    ///
    /// Its presence tells readers the content is ciphertext addressed to
    /// the author's own key.
    #[must_use]
    pub fn encrypted_tag() -> Vec<String> {
        vec!["encrypted".to_string(), ENCRYPTION_NIP44.to_string()]
    }

    /// Builds an `e` tag referencing an event id.
    #[must_use]
    pub fn e_tag(id: &EventId) -> Vec<String> {
        vec!["e".to_string(), id.to_hex()]
    }

    /// Builds an `a` tag referencing an addressable entity.
    ///
    /// # Example
    ///
    /// ```
    /// use hearth_core::event::TagBuilder;
    /// use nostr::{Keys, Kind};
    ///
    /// let keys = Keys::generate();
    /// let tag = TagBuilder::a_tag(Kind::Custom(32628), &keys.public_key(), "truck");
    /// assert_eq!(tag[0], "a");
    /// assert!(tag[1].starts_with("32628:"));
    /// assert!(tag[1].ends_with(":truck"));
    /// ```
    #[must_use]
    pub fn a_tag(kind: Kind, pubkey: &PublicKey, identifier: &str) -> Vec<String> {
        vec![
            "a".to_string(),
            format!("{}:{}:{identifier}", kind.as_u16(), pubkey.to_hex()),
        ]
    }

    /// Builds a `k` tag naming the kind of the referenced events.
    #[must_use]
    pub fn k_tag(kind: Kind) -> Vec<String> {
        vec!["k".to_string(), kind.as_u16().to_string()]
    }

    /// Builds an `r` tag for a NIP-65 relay list entry.
    ///
    /// A relay that is both read and write carries no marker.
    #[must_use]
    pub fn r_tag(url: &str, read: bool, write: bool) -> Vec<String> {
        let mut tag = vec!["r".to_string(), url.to_string()];
        match (read, write) {
            (true, false) => tag.push("read".to_string()),
            (false, true) => tag.push("write".to_string()),
            _ => {}
        }
        tag
    }

    /// Converts raw tag arrays into `nostr` tags.
    ///
    /// # Errors
    ///
    /// Returns an error if any tag is empty or malformed.
    pub fn into_tags(raw: Vec<Vec<String>>) -> Result<Vec<Tag>> {
        raw.into_iter()
            .map(|tag| Tag::parse(&tag).map_err(|e| EventError::InvalidTag(e.to_string())))
            .collect()
    }
}

/// Typed view of the tags on a tracked record event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTags {
    /// The `d` tag value, for addressable records.
    pub identifier: Option<String>,
    /// The encryption scheme, if the content is encrypted.
    pub encryption: Option<String>,
    /// NIP-31 description.
    pub alt: Option<String>,
}

impl RecordTags {
    /// Extracts record tags from an event's tag list.
    ///
    /// The first occurrence of each tag name wins.
    #[must_use]
    pub fn from_tags(tags: &Tags) -> Self {
        let mut parsed = Self::default();
        for tag in tags.iter() {
            let parts = tag.as_slice();
            let (Some(name), Some(value)) = (parts.first(), parts.get(1)) else {
                continue;
            };
            let slot = match name.as_str() {
                "d" => &mut parsed.identifier,
                "encrypted" => &mut parsed.encryption,
                "alt" => &mut parsed.alt,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.clone());
            }
        }
        parsed
    }

    /// Returns true if the content is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }
}

/// Returns the `d` tag value of an event, if present.
#[must_use]
pub fn identifier(tags: &Tags) -> Option<String> {
    RecordTags::from_tags(tags).identifier
}

/// Returns the event ids referenced by `e` tags.
///
/// Malformed ids are skipped.
#[must_use]
pub fn referenced_ids(tags: &Tags) -> Vec<EventId> {
    tags.iter()
        .filter_map(|tag| {
            let parts = tag.as_slice();
            match (parts.first().map(String::as_str), parts.get(1)) {
                (Some("e"), Some(id)) => EventId::from_hex(id).ok(),
                _ => None,
            }
        })
        .collect()
}

/// An addressable record coordinate, `kind:pubkey:d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    /// Record kind.
    pub kind: Kind,
    /// Author.
    pub pubkey: PublicKey,
    /// The `d` tag value.
    pub identifier: String,
}

impl Coordinate {
    /// Parses `kind:pubkeyhex:d`. The identifier may itself contain `:`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let kind = parts.next()?.parse::<u16>().ok()?;
        let pubkey = PublicKey::from_hex(parts.next()?).ok()?;
        let identifier = parts.next()?.to_string();
        Some(Self {
            kind: Kind::from(kind),
            pubkey,
            identifier,
        })
    }
}

/// Returns the coordinates referenced by `a` tags.
///
/// Malformed coordinates are skipped.
#[must_use]
pub fn referenced_coordinates(tags: &Tags) -> Vec<Coordinate> {
    tags.iter()
        .filter_map(|tag| {
            let parts = tag.as_slice();
            match (parts.first().map(String::as_str), parts.get(1)) {
                (Some("a"), Some(raw)) => Coordinate::parse(raw),
                _ => None,
            }
        })
        .collect()
}

/// One `r` tag of a NIP-65 relay list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayListEntry {
    /// Relay URL as written in the tag, unvalidated.
    pub url: String,
    /// Whether the author reads from this relay.
    pub read: bool,
    /// Whether the author writes to this relay.
    pub write: bool,
}

/// Returns the relay entries of a NIP-65 relay list.
///
/// An entry without a marker is both read and write; unknown markers
/// read as unmarked. Tags without a URL are skipped.
#[must_use]
pub fn relay_list_entries(tags: &Tags) -> Vec<RelayListEntry> {
    tags.iter()
        .filter_map(|tag| {
            let parts = tag.as_slice();
            if parts.first().map(String::as_str) != Some("r") {
                return None;
            }
            let url = parts.get(1)?.clone();
            let (read, write) = match parts.get(2).map(String::as_str) {
                Some("read") => (true, false),
                Some("write") => (false, true),
                _ => (true, true),
            };
            Some(RelayListEntry { url, read, write })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Keys};

    fn tags_of(raw: Vec<Vec<String>>) -> Tags {
        let keys = Keys::generate();
        EventBuilder::new(Kind::Custom(32627), "")
            .tags(TagBuilder::into_tags(raw).unwrap())
            .sign_with_keys(&keys)
            .unwrap()
            .tags
    }

    #[test]
    fn d_tag_format() {
        let tag = TagBuilder::d_tag("washer");
        assert_eq!(tag.len(), 2);
        assert_eq!(tag[0], "d");
        assert_eq!(tag[1], "washer");
    }

    #[test]
    fn d_tag_empty_identifier() {
        let tag = TagBuilder::d_tag("");
        assert_eq!(tag, vec!["d", ""]);
    }

    #[test]
    fn alt_tag_with_special_chars() {
        let tag = TagBuilder::alt_tag("Line1\nLine2\t\"quoted\"");
        assert_eq!(tag[1], "Line1\nLine2\t\"quoted\"");
    }

    #[test]
    fn encrypted_tag_names_scheme() {
        assert_eq!(TagBuilder::encrypted_tag(), vec!["encrypted", "nip44"]);
    }

    #[test]
    fn k_tag_format() {
        assert_eq!(TagBuilder::k_tag(Kind::Custom(32628)), vec!["k", "32628"]);
    }

    #[test]
    fn r_tag_markers() {
        assert_eq!(TagBuilder::r_tag("wss://a.com", true, true), vec!["r", "wss://a.com"]);
        assert_eq!(
            TagBuilder::r_tag("wss://a.com", true, false),
            vec!["r", "wss://a.com", "read"]
        );
        assert_eq!(
            TagBuilder::r_tag("wss://a.com", false, true),
            vec!["r", "wss://a.com", "write"]
        );
    }

    #[test]
    fn relay_list_entries_read_markers() {
        let tags = tags_of(vec![
            TagBuilder::r_tag("wss://both.com", true, true),
            TagBuilder::r_tag("wss://read.com", true, false),
            TagBuilder::r_tag("wss://write.com", false, true),
            vec!["r".to_string(), "wss://odd.com".to_string(), "inbox".to_string()],
            vec!["r".to_string()],
            TagBuilder::d_tag("car"),
        ]);

        let entries = relay_list_entries(&tags);

        let flags: Vec<(&str, bool, bool)> = entries
            .iter()
            .map(|e| (e.url.as_str(), e.read, e.write))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("wss://both.com", true, true),
                ("wss://read.com", true, false),
                ("wss://write.com", false, true),
                ("wss://odd.com", true, true),
            ]
        );
    }

    #[test]
    fn into_tags_rejects_empty_tag() {
        let result = TagBuilder::into_tags(vec![vec![]]);
        assert!(matches!(result, Err(EventError::InvalidTag(_))));
    }

    #[test]
    fn record_tags_parse_known_tags() {
        let tags = tags_of(vec![
            TagBuilder::d_tag("fridge"),
            TagBuilder::encrypted_tag(),
            TagBuilder::alt_tag("Home appliance record"),
        ]);
        let parsed = RecordTags::from_tags(&tags);

        assert_eq!(parsed.identifier.as_deref(), Some("fridge"));
        assert!(parsed.is_encrypted());
        assert_eq!(parsed.alt.as_deref(), Some("Home appliance record"));
    }

    #[test]
    fn record_tags_first_occurrence_wins() {
        let tags = tags_of(vec![TagBuilder::d_tag("first"), TagBuilder::d_tag("second")]);
        assert_eq!(identifier(&tags).as_deref(), Some("first"));
    }

    #[test]
    fn record_tags_plaintext_has_no_encryption() {
        let tags = tags_of(vec![TagBuilder::d_tag("x")]);
        assert!(!RecordTags::from_tags(&tags).is_encrypted());
    }

    #[test]
    fn referenced_ids_skips_malformed() {
        let id = EventId::all_zeros();
        let tags = tags_of(vec![
            TagBuilder::e_tag(&id),
            vec!["e".to_string(), "not-hex".to_string()],
        ]);
        assert_eq!(referenced_ids(&tags), vec![id]);
    }

    #[test]
    fn coordinate_roundtrips_through_a_tag() {
        let keys = Keys::generate();
        let tags = tags_of(vec![TagBuilder::a_tag(
            Kind::Custom(32628),
            &keys.public_key(),
            "car:blue",
        )]);

        let coords = referenced_coordinates(&tags);

        assert_eq!(coords.len(), 1);
        assert_eq!(coords[0].kind, Kind::Custom(32628));
        assert_eq!(coords[0].pubkey, keys.public_key());
        assert_eq!(coords[0].identifier, "car:blue");
    }

    #[test]
    fn coordinate_rejects_bad_pubkey() {
        assert!(Coordinate::parse("32628:nothex:car").is_none());
        assert!(Coordinate::parse("32628").is_none());
    }
}
