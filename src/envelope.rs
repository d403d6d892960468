//! Tagged text envelope for encrypted chat messages
//!
//! The envelope format is:
//!
//! ```text
//! rc::aes256::{iv, standard base64}::{ciphertext, standard base64}
//! ```
//!
//! The delimiter `::` cannot occur in the tag, the algorithm id or the base64
//! alphabet, so splitting on it is unambiguous. Anything that does not start
//! with `rc::` is not an envelope and is left alone by the decoder.

use crate::error::{ErrorCategory, ErrorKind, Result, SealError};
use base64::{Engine, engine::general_purpose::STANDARD};

/// Literal tag identifying this application's envelope scheme.
pub const TAG: &str = "rc";

/// Algorithm/version identifier for AES-256-CBC with PBKDF2 keys.
pub const ALGORITHM_ID: &str = "aes256";

/// Field delimiter.
pub const DELIMITER: &str = "::";

/// Prefix every envelope starts with (tag followed by the delimiter).
pub const TAG_PREFIX: &str = "rc::";

/// Length of the CBC initialization vector in bytes
pub const IV_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

const FIELD_COUNT: usize = 4;

/// Decoded envelope fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

/// Returns true if `payload` claims to be an envelope.
///
/// This only looks at the prefix; a payload can claim to be an envelope and
/// still fail to parse.
pub fn is_envelope(payload: &str) -> bool {
    payload.starts_with(TAG_PREFIX)
}

impl Envelope {
    pub fn new(iv: [u8; IV_LEN], ciphertext: Vec<u8>) -> Self {
        Self { iv, ciphertext }
    }

    /// Render the envelope as its wire string.
    pub fn format(&self) -> String {
        format!(
            "{TAG}{DELIMITER}{ALGORITHM_ID}{DELIMITER}{}{DELIMITER}{}",
            STANDARD.encode(self.iv),
            STANDARD.encode(&self.ciphertext)
        )
    }

    /// Parse a wire string back into its fields.
    pub fn parse(payload: &str) -> Result<Self> {
        if !is_envelope(payload) {
            return Err(SealError::with_kind(
                ErrorCategory::User,
                ErrorKind::EnvelopeInvalid,
                "input unrecognized as an rc envelope",
            ));
        }

        let fields: Vec<&str> = payload.split(DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(SealError::with_kind(
                ErrorCategory::User,
                ErrorKind::EnvelopeInvalid,
                format!(
                    "envelope has {} fields, expected {}",
                    fields.len(),
                    FIELD_COUNT
                ),
            ));
        }

        if fields[1] != ALGORITHM_ID {
            return Err(SealError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedAlgorithm,
                format!("unsupported envelope algorithm {:?}", fields[1]),
            ));
        }

        let iv_bytes = decode_field("iv", fields[2])?;
        let iv: [u8; IV_LEN] = iv_bytes.as_slice().try_into().map_err(|_| {
            SealError::with_kind(
                ErrorCategory::User,
                ErrorKind::EnvelopeInvalid,
                format!("iv must be {} bytes, got {}", IV_LEN, iv_bytes.len()),
            )
        })?;

        let ciphertext = decode_field("ciphertext", fields[3])?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(SealError::with_kind(
                ErrorCategory::User,
                ErrorKind::EnvelopeInvalid,
                format!(
                    "ciphertext length {} is not a positive multiple of the block size",
                    ciphertext.len()
                ),
            ));
        }

        Ok(Self { iv, ciphertext })
    }
}

fn decode_field(name: &str, encoded: &str) -> Result<Vec<u8>> {
    STANDARD.decode(encoded).map_err(|e| {
        SealError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::EnvelopeDecode,
            format!("base64 decoding of {} failed: {}", name, e),
            e,
        )
    })
}
