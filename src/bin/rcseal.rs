//! rcseal CLI - Chat message envelope encryption
//!
//! Command-line interface for sealing and opening chat messages with the
//! shared chat passphrase, and for managing the stored passphrase.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use rcseal::error::{ErrorCategory, ErrorKind, Result, SealError};
use rcseal::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use rcseal::store::FileStore;
use rcseal::{PassphraseStore, decrypt_message, encrypt_message};

#[derive(Parser)]
#[command(name = "rcseal")]
#[command(version)]
#[command(about = "Passphrase-based chat message encryption.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of the stored passphrase or terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Path of the store file holding the saved passphrase
    #[arg(long, global = true, env = "RCSEAL_STORE", value_name = "FILE")]
    store: Option<PathBuf>,

    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the saved chat passphrase
    #[command(subcommand)]
    Passphrase(PassphraseCommand),

    /// Encrypt a message and print the envelope
    #[command(alias = "e")]
    Encrypt {
        /// Message text; read from stdin when omitted
        text: Option<String>,
    },

    /// Decrypt an envelope and print the message
    #[command(alias = "d")]
    Decrypt {
        /// Envelope or legacy plaintext; read from stdin when omitted
        payload: Option<String>,
    },
}

#[derive(Subcommand)]
enum PassphraseCommand {
    /// Save a new passphrase, replacing any existing one
    Set,
    /// Remove the saved passphrase
    Clear,
    /// Report whether a passphrase is saved
    Status,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", render_chain(&e));
        let code = match e.category {
            ErrorCategory::User => 2,
            _ => 1,
        };
        process::exit(code);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let store = match &cli.store {
        Some(path) => PassphraseStore::new(FileStore::new(path)),
        None => PassphraseStore::open_default(),
    };

    match cli.command {
        Commands::Passphrase(PassphraseCommand::Set) => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            let passphrase = reader.read_passphrase()?;
            if passphrase.is_empty() {
                return Err(SealError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::PassphraseUnavailable,
                    "empty passphrase; use 'passphrase clear' to remove the saved one",
                ));
            }
            store.save_passphrase(&passphrase)
        }
        Commands::Passphrase(PassphraseCommand::Clear) => store.save_passphrase(""),
        Commands::Passphrase(PassphraseCommand::Status) => {
            if store.load_passphrase().is_empty() {
                println!("not set");
            } else {
                println!("set");
            }
            Ok(())
        }
        Commands::Encrypt { text } => {
            let passphrase = resolve_passphrase(&store, cli.passphrase_stdin)?;
            let text = message_argument(text, cli.passphrase_stdin)?;
            if passphrase.is_empty() {
                warn!("no passphrase set, message left unencrypted");
            }
            let sealed =
                encrypt_message(&text, &passphrase).map_err(|e| e.with_context("encryption failed"))?;
            println!("{}", sealed);
            Ok(())
        }
        Commands::Decrypt { payload } => {
            let passphrase = resolve_passphrase(&store, cli.passphrase_stdin)?;
            let payload = message_argument(payload, cli.passphrase_stdin)?;
            println!("{}", decrypt_message(&payload, &passphrase));
            Ok(())
        }
    }
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader)
    }
}

fn resolve_passphrase(store: &PassphraseStore, use_stdin: bool) -> Result<Zeroizing<String>> {
    if use_stdin {
        ReaderPassphraseReader::new(Box::new(io::stdin())).read_passphrase()
    } else {
        Ok(store.load_passphrase())
    }
}

/// Message text from the argument, or from stdin when the argument is absent.
fn message_argument(arg: Option<String>, passphrase_on_stdin: bool) -> Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if passphrase_on_stdin {
        return Err(SealError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            "message must be passed as an argument when --passphrase-stdin is used",
        ));
    }

    let mut text = String::new();
    io::stdin().read_to_string(&mut text).map_err(|e| {
        SealError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to read message from stdin: {}", e),
            e,
        )
    })?;
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    Ok(text)
}

fn render_chain(err: &SealError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
