use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use zeroize::Zeroize;

const KEY_LEN: usize = 32;

/// The process-wide AES-256-GCM key. Loaded once at startup from
/// configuration and held for the life of the process; never logged,
/// serialized, or round-tripped through the metadata store.
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    /// Parse a key from its base64 representation, as found in `vault.key`
    /// or the `QUERYBASE_VAULT_KEY` environment variable.
    ///
    /// Returns `None` if the value does not decode to exactly 32 bytes --
    /// callers should treat this as a fatal startup condition
    /// (`ConfigError::VaultKeyInvalid`).
    #[must_use]
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let mut decoded = STANDARD.decode(encoded.trim()).ok()?;
        if decoded.len() != KEY_LEN {
            decoded.zeroize();
            return None;
        }
        let mut bytes = [0_u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Some(Self(bytes))
    }

    /// Generate a fresh random key. Used by tests and by operator tooling
    /// to provision a new `vault.key` value.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        let short = STANDARD.encode([0_u8; 16]);
        assert!(VaultKey::from_base64(&short).is_none());
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(VaultKey::from_base64("not valid base64 !!!").is_none());
    }

    #[test]
    fn accepts_well_formed_key() {
        let encoded = STANDARD.encode([7_u8; KEY_LEN]);
        assert!(VaultKey::from_base64(&encoded).is_some());
    }
}
