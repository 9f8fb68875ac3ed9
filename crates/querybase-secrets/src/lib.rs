//! Credential vault (C1): symmetric authenticated encryption of backend
//! passwords at rest.
//!
//! # Encryption flow
//!
//! Backend passwords are never stored in plaintext. The vault encrypts each
//! credential with AES-256-GCM under a single process-wide key loaded at
//! startup (§4.1, `vault.key` in configuration). The flow:
//!
//! 1. **Encrypt** -- a fresh 96-bit nonce is drawn for every call, the
//!    plaintext is sealed with AES-256-GCM (the nonce doubles as
//!    associated authentication, preventing ciphertext reuse across
//!    credentials), and `nonce || ciphertext‖tag` is base64-encoded into
//!    one opaque blob ([`EncryptedCredential`]).
//! 2. **Decrypt** -- the blob is base64-decoded, split back into nonce and
//!    sealed box, and opened. A tampered or mis-keyed blob fails the AEAD
//!    tag check and is surfaced as [`VaultError::DecryptionFailed`].
//!
//! No plaintext credential is ever logged, returned by an API path, or
//! embedded in an event payload -- callers receive a [`zeroize::Zeroizing`]
//! guard that scrubs the buffer on drop.

mod key;

pub use key::VaultKey;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;

/// Errors raised by vault operations. Decryption failure is fatal to the
/// *caller's* operation (§4.1) -- it is never swallowed or retried.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("encrypted credential blob is malformed")]
    MalformedBlob,

    #[error("decryption failed: authentication tag mismatch or wrong key")]
    DecryptionFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// An encrypted backend credential as stored in `backends.encrypted_credential`.
/// Opaque outside this crate: the base64 text is `nonce || ciphertext‖tag`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct EncryptedCredential(String);

impl EncryptedCredential {
    /// Wrap an already-encoded blob (e.g. read back from the metadata store).
    #[must_use]
    pub fn from_stored(blob: String) -> Self {
        Self(blob)
    }

    /// The base64 blob as persisted.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The process-wide credential vault.
pub struct Vault {
    cipher: Aes256Gcm,
}

impl Vault {
    /// Build a vault from a loaded [`VaultKey`]. Key loading itself is
    /// fatal-at-startup and handled by the caller (§7 "Fatal: vault key
    /// missing/invalid at startup").
    #[must_use]
    pub fn new(key: &VaultKey) -> Self {
        Self {
            cipher: Aes256Gcm::new_from_slice(key.as_bytes())
                .expect("VaultKey is always exactly 32 bytes"),
        }
    }

    /// Encrypt a plaintext credential, producing a fresh nonce per call.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedCredential, VaultError> {
        let mut nonce_bytes = [0_u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(EncryptedCredential(STANDARD.encode(blob)))
    }

    /// Decrypt a stored credential back into plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedBlob`] if the blob cannot be decoded
    /// or is shorter than a nonce, and [`VaultError::DecryptionFailed`] if
    /// the AEAD tag check fails (wrong key or tampered ciphertext).
    pub fn decrypt(&self, credential: &EncryptedCredential) -> Result<Zeroizing<String>, VaultError> {
        let raw = STANDARD
            .decode(&credential.0)
            .map_err(|_| VaultError::MalformedBlob)?;

        if raw.len() < NONCE_LEN {
            return Err(VaultError::MalformedBlob);
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed)
            .map_err(|_| VaultError::DecryptionFailed)?;

        let text = String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed)?;
        Ok(Zeroizing::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = VaultKey::generate();
        let vault = Vault::new(&key);

        let encrypted = vault.encrypt("s3cret-password").unwrap();
        let decrypted = vault.decrypt(&encrypted).unwrap();

        assert_eq!(&*decrypted, "s3cret-password");
    }

    #[test]
    fn distinct_nonces_produce_distinct_ciphertexts() {
        let key = VaultKey::generate();
        let vault = Vault::new(&key);

        let a = vault.encrypt("same-plaintext").unwrap();
        let b = vault.encrypt("same-plaintext").unwrap();

        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = VaultKey::generate();
        let key_b = VaultKey::generate();
        let vault_a = Vault::new(&key_a);
        let vault_b = Vault::new(&key_b);

        let encrypted = vault_a.encrypt("top-secret").unwrap();
        let result = vault_b.decrypt(&encrypted);

        assert!(matches!(result, Err(VaultError::DecryptionFailed)));
    }

    #[test]
    fn malformed_blob_is_rejected() {
        let key = VaultKey::generate();
        let vault = Vault::new(&key);
        let garbage = EncryptedCredential::from_stored("not-base64!!".to_string());

        assert!(matches!(vault.decrypt(&garbage), Err(VaultError::MalformedBlob)));
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let key = VaultKey::generate();
        let vault = Vault::new(&key);
        let short = EncryptedCredential::from_stored(STANDARD.encode([0_u8; 4]));

        assert!(matches!(vault.decrypt(&short), Err(VaultError::MalformedBlob)));
    }
}
