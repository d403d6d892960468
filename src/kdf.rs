//! Passphrase key derivation using PBKDF2-HMAC-SHA256
//!
//! Every party derives the same key from the same shared passphrase, so the
//! salt is an application-wide constant rather than a per-message value. It
//! only separates this use of the passphrase from any other use.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

/// Length of derived key in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Application salt for key derivation.
///
/// Versioned constant: changing it makes every previously written envelope
/// undecryptable. Introduce a new algorithm id instead.
pub const DEFAULT_SALT: &[u8] = b"rc-chat-salt-v1";

/// PBKDF2 iteration count.
///
/// Versioned constant, same rules as [`DEFAULT_SALT`]. Low for a stored
/// login credential; it is kept because existing envelopes depend on it.
pub const DEFAULT_ITERATIONS: u32 = 1000;

/// Salt and iteration count used to stretch a passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    salt: Vec<u8>,
    iterations: u32,
}

impl KdfParams {
    /// Custom parameters. An iteration count of zero is treated as one.
    pub fn new(salt: impl Into<Vec<u8>>, iterations: u32) -> Self {
        Self {
            salt: salt.into(),
            iterations: iterations.max(1),
        }
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(DEFAULT_SALT, DEFAULT_ITERATIONS)
    }
}

/// A symmetric key derived from a passphrase. Wiped from memory on drop.
///
/// No `PartialEq`: a derived comparison is not constant time.
#[derive(Clone)]
pub struct DerivedKey {
    key: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 32-byte key from a passphrase.
///
/// Returns `None` for an empty passphrase, which callers treat as
/// "encryption unavailable" and fall back to plaintext.
pub fn derive_key(passphrase: &str, params: &KdfParams) -> Option<DerivedKey> {
    if passphrase.is_empty() {
        return None;
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        &params.salt,
        params.iterations,
        &mut key,
    );

    Some(DerivedKey { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_empty_passphrase_has_no_key() {
        assert!(derive_key("", &KdfParams::default()).is_none());
    }

    #[test]
    fn test_deterministic() {
        let params = KdfParams::default();
        let k1 = derive_key("correct horse", &params).unwrap();
        let k2 = derive_key("correct horse", &params).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_known_answer_default_params() {
        // Changing this value means DEFAULT_SALT or DEFAULT_ITERATIONS
        // changed, and old envelopes will no longer decrypt.
        let key = derive_key("correct horse", &KdfParams::default()).unwrap();
        assert_eq!(
            hex(key.as_bytes()),
            "af872cd2617d009cbbde4a200f983eab58f6271238d60d51ae5329c620b41192"
        );
    }

    #[test]
    fn test_known_answer_custom_params() {
        let key = derive_key("correct horse", &KdfParams::new(*b"test-salt", 1)).unwrap();
        assert_eq!(
            hex(key.as_bytes()),
            "0e561a7352154282a8b7240bc13643d47c7442a3efacb19d223bdf7f6f472f32"
        );
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let params = KdfParams::new(*b"test-salt", 1);
        let k1 = derive_key("tenant", &params).unwrap();
        let k2 = derive_key("landlord", &params).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_salt_separates_domains() {
        let k1 = derive_key("tenant", &KdfParams::new(*b"salt-a", 1)).unwrap();
        let k2 = derive_key("tenant", &KdfParams::new(*b"salt-b", 1)).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_zero_iterations_clamped() {
        assert_eq!(KdfParams::new(*b"s", 0).iterations(), 1);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_key("secret", &KdfParams::new(*b"s", 1)).unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("REDACTED"));
    }
}
