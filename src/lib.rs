//! rcseal - Passphrase-based envelope encryption for rental chat messages
//!
//! Messages are sealed with AES-256-CBC under a key derived from a shared
//! passphrase and carried as `rc::aes256::<iv>::<ciphertext>` strings.
//! Decryption never fails: legacy plaintext and undecryptable envelopes are
//! returned as-is.

#![forbid(unsafe_code)]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod passphrase;
pub mod store;

pub use codec::{MessageCodec, decrypt_message, encrypt_message};
pub use passphrase::PassphraseStore;
