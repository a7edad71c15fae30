//! Signer capability consumed by the sync layer.
//!
//! The core never holds private key material itself. Signing, NIP-44
//! encryption and NIP-42 challenge responses are all delegated to a
//! [`Signer`] supplied by the host application: a local key, a browser
//! extension, or a remote companion-device signer (NIP-46).
//!
//! Remote signers add a relay round-trip per operation, which the sync
//! orchestrator accounts for when choosing its network timeout.

use async_trait::async_trait;
use nostr::nips::nip44::{self, Version};
use nostr::{Event, Keys, PublicKey, UnsignedEvent};
use serde::{Deserialize, Serialize};

use crate::event::error::{EventError, Result};

/// Where a signer keeps its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerKind {
    /// Keys held in-process.
    Local,
    /// Browser or OS extension (NIP-07 style).
    Extension,
    /// Remote companion device reached over relays (NIP-46).
    Remote,
}

impl SignerKind {
    /// Returns true if every signer operation costs a network round-trip.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Remote)
    }
}

/// External signing and encryption capability.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The kind of signer, used to tune timeouts.
    fn kind(&self) -> SignerKind;

    /// Returns the user's public key.
    async fn public_key(&self) -> Result<PublicKey>;

    /// Signs an unsigned event.
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event>;

    /// Encrypts `plaintext` for `recipient` with NIP-44.
    async fn encrypt(&self, recipient: &PublicKey, plaintext: &str) -> Result<String>;

    /// Decrypts NIP-44 `ciphertext` sent by `sender`.
    async fn decrypt(&self, sender: &PublicKey, ciphertext: &str) -> Result<String>;
}

/// In-process signer backed by [`nostr::Keys`].
///
/// # Example
///
/// ```
/// use hearth_core::event::{KeysSigner, Signer, SignerKind};
/// use nostr::Keys;
///
/// let signer = KeysSigner::new(Keys::generate());
/// assert_eq!(signer.kind(), SignerKind::Local);
/// ```
pub struct KeysSigner {
    keys: Keys,
}

impl KeysSigner {
    /// Wraps a set of keys.
    #[must_use]
    pub const fn new(keys: Keys) -> Self {
        Self { keys }
    }
}

impl std::fmt::Debug for KeysSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysSigner")
            .field("public_key", &self.keys.public_key().to_hex())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for KeysSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Local
    }

    async fn public_key(&self) -> Result<PublicKey> {
        Ok(self.keys.public_key())
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event> {
        unsigned
            .sign_with_keys(&self.keys)
            .map_err(|e| EventError::Signing(e.to_string()))
    }

    async fn encrypt(&self, recipient: &PublicKey, plaintext: &str) -> Result<String> {
        nip44::encrypt(self.keys.secret_key(), recipient, plaintext, Version::V2)
            .map_err(|e| EventError::Encryption(e.to_string()))
    }

    async fn decrypt(&self, sender: &PublicKey, ciphertext: &str) -> Result<String> {
        nip44::decrypt(self.keys.secret_key(), sender, ciphertext)
            .map_err(|e| EventError::Decryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventBuilder, Kind};

    #[test]
    fn remote_kind_is_remote() {
        assert!(SignerKind::Remote.is_remote());
        assert!(!SignerKind::Local.is_remote());
        assert!(!SignerKind::Extension.is_remote());
    }

    #[tokio::test]
    async fn self_encryption_roundtrip() {
        let signer = KeysSigner::new(Keys::generate());
        let me = signer.public_key().await.unwrap();

        let ciphertext = signer.encrypt(&me, r#"{"make":"Volvo"}"#).await.unwrap();
        assert!(!ciphertext.contains("Volvo"));

        let plaintext = signer.decrypt(&me, &ciphertext).await.unwrap();
        assert_eq!(plaintext, r#"{"make":"Volvo"}"#);
    }

    #[tokio::test]
    async fn decrypt_with_other_key_fails() {
        let alice = KeysSigner::new(Keys::generate());
        let bob = KeysSigner::new(Keys::generate());
        let alice_pk = alice.public_key().await.unwrap();

        let ciphertext = alice.encrypt(&alice_pk, "secret").await.unwrap();
        let result = bob.decrypt(&alice_pk, &ciphertext).await;

        assert!(matches!(result, Err(EventError::Decryption(_))));
    }

    #[tokio::test]
    async fn sign_event_produces_valid_signature() {
        let signer = KeysSigner::new(Keys::generate());
        let pubkey = signer.public_key().await.unwrap();
        let unsigned = EventBuilder::new(Kind::Custom(32627), "content").build(pubkey);

        let event = signer.sign_event(unsigned).await.unwrap();

        assert_eq!(event.pubkey, pubkey);
        event.verify().expect("signature must be valid");
    }

    #[test]
    fn debug_hides_secret() {
        let signer = KeysSigner::new(Keys::generate());
        let debug_str = format!("{signer:?}");
        assert!(debug_str.contains("KeysSigner"));
        assert!(!debug_str.contains("secret"));
    }
}
