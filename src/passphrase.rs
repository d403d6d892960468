//! Passphrase persistence and input
//!
//! The chat passphrase lives in a single slot of persisted key-value storage.
//! Loading never fails: missing storage, a missing slot and a broken backend
//! all read as "no passphrase", which turns encryption off rather than
//! breaking the chat.

use crate::error::{ErrorCategory, ErrorKind, Result, SealError};
use crate::store::{FileStore, KeyValueStore};
use std::io::{self, IsTerminal, Read, Write};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Storage key of the passphrase slot.
pub const PASSPHRASE_STORAGE_KEY: &str = "rc_chat_passphrase";

/// Saves and loads the chat passphrase.
pub struct PassphraseStore {
    backend: Option<Box<dyn KeyValueStore>>,
}

impl PassphraseStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Some(Box::new(backend)),
        }
    }

    /// A store for environments without persisted storage. Saves are
    /// dropped and loads return an empty passphrase.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    /// File-backed store at the platform default location, or
    /// [`PassphraseStore::unavailable`] when the platform has no data dir.
    pub fn open_default() -> Self {
        match FileStore::default_path() {
            Some(path) => Self::new(FileStore::new(path)),
            None => {
                warn!("no data directory available, passphrase will not persist");
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Overwrite the stored passphrase. An empty passphrase clears the slot.
    ///
    /// No strength validation is performed.
    pub fn save_passphrase(&self, passphrase: &str) -> Result<()> {
        let Some(backend) = &self.backend else {
            debug!("persisted storage unavailable, passphrase not saved");
            return Ok(());
        };

        let result = if passphrase.is_empty() {
            backend.remove(PASSPHRASE_STORAGE_KEY)
        } else {
            backend.set(PASSPHRASE_STORAGE_KEY, passphrase)
        };
        result.map_err(|e| e.with_context("failed to save passphrase"))
    }

    /// The stored passphrase, or an empty string if there is none.
    pub fn load_passphrase(&self) -> Zeroizing<String> {
        let Some(backend) = &self.backend else {
            return Zeroizing::new(String::new());
        };

        match backend.get(PASSPHRASE_STORAGE_KEY) {
            Ok(value) => Zeroizing::new(value.unwrap_or_default()),
            Err(e) => {
                warn!(kind = ?e.kind, "failed to load passphrase, treating as unset: {}", e);
                Zeroizing::new(String::new())
            }
        }
    }
}

/// Trait for reading passphrases from various sources
pub trait PassphraseReader {
    /// Read a passphrase. The result is wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>>;
}

/// Reads a passphrase from any io::Read source
///
/// One trailing line ending is stripped, so `echo secret | rcseal ...`
/// yields `secret`.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        let mut data = Zeroizing::new(String::new());
        self.reader.read_to_string(&mut data).map_err(|e| {
            let category = if e.kind() == io::ErrorKind::InvalidData {
                ErrorCategory::User
            } else {
                ErrorCategory::Internal
            };
            SealError::with_kind_and_source(
                category,
                ErrorKind::PassphraseUnavailable,
                format!("error reading passphrase: {}", e),
                e,
            )
        })?;

        if data.ends_with('\n') {
            data.pop();
            if data.ends_with('\r') {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Reads passphrase from terminal with no echo
#[derive(Default)]
pub struct TerminalPassphraseReader;

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(SealError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(b"Passphrase (rcseal): ")
            .and_then(|()| stderr.flush())
            .map_err(|e| {
                SealError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;

        // Read password *without echo*
        let passphrase = rpassword::read_password().map_err(|e| {
            SealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading passphrase: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase))
    }
}
