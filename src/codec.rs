//! Message encryption and decryption using PBKDF2 + AES-256-CBC
//!
//! Encryption is opportunistic: with no passphrase configured, messages go
//! out as plaintext. Decryption is best effort: anything that is not an
//! envelope, or that fails to decrypt, is handed back unchanged so the chat
//! can always render something.

use std::sync::{LazyLock, Mutex, PoisonError};

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::envelope::{Envelope, IV_LEN, is_envelope};
use crate::error::{ErrorCategory, ErrorKind, Result, SealError};
use crate::kdf::{DerivedKey, KdfParams, derive_key};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

static DEFAULT_CODEC: LazyLock<MessageCodec> = LazyLock::new(MessageCodec::default);

/// Successful outcome of [`MessageCodec::try_decrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    /// Payload is not an envelope (legacy or plaintext message).
    PassThrough,
    /// Payload is an envelope but no passphrase is configured.
    Locked,
    /// Payload decrypted to this text.
    Plaintext(String),
}

struct CachedKey {
    passphrase: Zeroizing<String>,
    key: DerivedKey,
}

/// Stateless-by-contract message codec.
///
/// The only interior state is a cache of the key derived for the most
/// recently used passphrase.
pub struct MessageCodec {
    params: KdfParams,
    cache: Mutex<Option<CachedKey>>,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(KdfParams::default())
    }
}

impl MessageCodec {
    pub fn new(params: KdfParams) -> Self {
        Self {
            params,
            cache: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    fn key_for(&self, passphrase: &str) -> Option<DerivedKey> {
        if passphrase.is_empty() {
            return None;
        }

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache
                .as_ref()
                .filter(|c| c.passphrase.as_str() == passphrase)
            {
                return Some(cached.key.clone());
            }
        }

        // PBKDF2 runs outside the lock.
        let key = derive_key(passphrase, &self.params)?;
        debug!("derived message key for new passphrase");
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        *cache = Some(CachedKey {
            passphrase: Zeroizing::new(passphrase.to_owned()),
            key: key.clone(),
        });
        Some(key)
    }

    /// Encrypt a chat message.
    ///
    /// Returns an empty string for empty input and the plaintext unchanged
    /// when `passphrase` is empty. Fails only if the OS random source cannot
    /// produce an IV.
    pub fn encrypt_message(&self, plaintext: &str, passphrase: &str) -> Result<String> {
        self.encrypt_with_rng(plaintext, passphrase, &mut OsRng)
    }

    pub(crate) fn encrypt_with_rng<R: RngCore>(
        &self,
        plaintext: &str,
        passphrase: &str,
        rng: &mut R,
    ) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let Some(key) = self.key_for(passphrase) else {
            return Ok(plaintext.to_owned());
        };

        let mut iv = [0u8; IV_LEN];
        rng.try_fill_bytes(&mut iv).map_err(|e| {
            SealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::RandomUnavailable,
                format!("failed to generate iv: {}", e),
                e,
            )
        })?;

        Ok(seal(&key, &iv, plaintext.as_bytes()))
    }

    /// Encrypt with a caller-provided IV.
    ///
    /// This function is ONLY for producing deterministic test vectors.
    /// NEVER use this in production - reusing an IV under the same key leaks
    /// information. Use `encrypt_message()`, which draws a fresh IV.
    pub fn encrypt_with_iv(&self, plaintext: &str, passphrase: &str, iv: &[u8; IV_LEN]) -> String {
        if plaintext.is_empty() {
            return String::new();
        }
        match self.key_for(passphrase) {
            Some(key) => seal(&key, iv, plaintext.as_bytes()),
            None => plaintext.to_owned(),
        }
    }

    /// Decrypt a payload, reporting why it could not be decrypted.
    pub fn try_decrypt(&self, payload: &str, passphrase: &str) -> Result<Decrypted> {
        if !is_envelope(payload) {
            return Ok(Decrypted::PassThrough);
        }
        let Some(key) = self.key_for(passphrase) else {
            return Ok(Decrypted::Locked);
        };

        let envelope = Envelope::parse(payload)?;
        open(&key, &envelope).map(Decrypted::Plaintext)
    }

    /// Decrypt a chat message. Never fails.
    ///
    /// Non-envelope payloads, envelopes with no passphrase configured, and
    /// envelopes that fail to decrypt are all returned unchanged.
    pub fn decrypt_message(&self, payload: &str, passphrase: &str) -> String {
        if payload.is_empty() {
            return String::new();
        }
        match self.try_decrypt(payload, passphrase) {
            Ok(Decrypted::Plaintext(text)) => text,
            Ok(Decrypted::PassThrough) => payload.to_owned(),
            Ok(Decrypted::Locked) => {
                debug!("encrypted message left sealed, no passphrase configured");
                payload.to_owned()
            }
            Err(e) => {
                warn!(kind = ?e.kind, "failed to decrypt message, showing ciphertext: {}", e);
                payload.to_owned()
            }
        }
    }
}

fn seal(key: &DerivedKey, iv: &[u8; IV_LEN], plaintext: &[u8]) -> String {
    let ciphertext = Aes256CbcEnc::new(key.as_bytes().into(), iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Envelope::new(*iv, ciphertext).format()
}

fn open(key: &DerivedKey, envelope: &Envelope) -> Result<String> {
    let plain = Aes256CbcDec::new(key.as_bytes().into(), (&envelope.iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(&envelope.ciphertext)
        .map_err(|_| {
            SealError::with_kind(
                ErrorCategory::User,
                ErrorKind::DecryptionFailed,
                "corrupt input or bad passphrase",
            )
        })?;

    let text = String::from_utf8(plain).map_err(|e| {
        SealError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidUtf8,
            "decrypted message is not valid UTF-8; likely a bad passphrase",
            e.utf8_error(),
        )
    })?;

    if text.is_empty() {
        return Err(SealError::with_kind(
            ErrorCategory::User,
            ErrorKind::EmptyPlaintext,
            "decrypted message is empty",
        ));
    }

    Ok(text)
}

/// Encrypt with the production key derivation parameters.
pub fn encrypt_message(plaintext: &str, passphrase: &str) -> Result<String> {
    DEFAULT_CODEC.encrypt_message(plaintext, passphrase)
}

/// Decrypt with the production key derivation parameters. Never fails.
pub fn decrypt_message(payload: &str, passphrase: &str) -> String {
    DEFAULT_CODEC.decrypt_message(payload, passphrase)
}
