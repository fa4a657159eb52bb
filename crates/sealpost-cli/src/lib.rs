//! Sealpost command-line front end.
//!
//! # Usage
//!
//! ```bash
//! # First contact: emits our KEY EXCHANGE only
//! echo hello | sealpost --home ~/.sealpost send bob > to-bob.txt
//!
//! # Absorb bob's reply (KEY EXCHANGE and/or ENCRYPTED MESSAGE blocks)
//! sealpost --home ~/.sealpost receive bob < from-bob.txt
//!
//! # Now messages go through
//! echo hello | sealpost --home ~/.sealpost send bob > to-bob.txt
//! ```
//!
//! Standard output carries only envelopes (send) or plaintext (receive).
//! Diagnostics go to standard error.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod reply_file;
mod system_env;

use std::{
    io::{Read, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
pub use error::CliError;
use sealpost_core::{
    ClientConfig, Environment, FileStorage, IdentityStore, Orchestrator, PeerId, SendOutcome,
    SessionStatus, SessionStore,
};
use sealpost_crypto::SealEngine;
use reply_file::ReplyFile;
pub use system_env::SystemEnv;

/// Per-peer ratchet sessions over any text channel
#[derive(Parser, Debug)]
#[command(name = "sealpost")]
#[command(about = "Encrypt and decrypt messages with per-peer ratchet sessions")]
#[command(version)]
pub struct Cli {
    /// Directory holding sessions, bootstrap markers and the identity key
    #[arg(long, env = "SEALPOST_HOME", default_value = ".", global = true)]
    pub home: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Operation to perform
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate the local identity key if none exists
    Init,

    /// Encrypt standard input for PEER and write envelopes to standard output
    Send {
        /// Peer name
        peer: String,
    },

    /// Read envelopes from PEER on standard input and write plaintext to
    /// standard output
    Receive {
        /// Peer name
        peer: String,

        /// Write our key exchange reply (first contact only) to this file
        /// instead of standard output
        #[arg(long)]
        reply_to: Option<PathBuf>,
    },

    /// Delete the session with PEER so the next send starts over
    Forget {
        /// Peer name
        peer: String,
    },

    /// Report the session state with PEER
    Status {
        /// Peer name
        peer: String,
    },
}

/// Run `cli` with the OS entropy source.
pub fn run<R, W>(cli: &Cli, input: &mut R, output: &mut W) -> Result<(), CliError>
where
    R: Read + ?Sized,
    W: Write,
{
    run_with(cli, SystemEnv::new()?, input, output)
}

/// Run `cli` with an explicit randomness source.
pub fn run_with<E, R, W>(cli: &Cli, env: E, input: &mut R, output: &mut W) -> Result<(), CliError>
where
    E: Environment,
    R: Read + ?Sized,
    W: Write,
{
    let peer = match &cli.command {
        Command::Init => None,
        Command::Send { peer }
        | Command::Receive { peer, .. }
        | Command::Forget { peer }
        | Command::Status { peer } => Some(peer.parse::<PeerId>()?),
    };

    let storage = FileStorage::new(ClientConfig::new(&cli.home));
    let identity = IdentityStore::new(storage.clone()).load_or_generate(&env)?;

    let Some(peer) = peer else {
        tracing::info!(path = %storage.config().identity_path().display(), "identity ready");
        return Ok(());
    };

    let sessions = SessionStore::new(storage);
    let engine = SealEngine::new(env);
    let orchestrator = Orchestrator::new(&engine, &sessions, &identity);

    match &cli.command {
        Command::Init => {},
        Command::Send { .. } => {
            if orchestrator.send(&peer, input, output)? == SendOutcome::Bootstrapped {
                tracing::info!(
                    %peer,
                    "message not sent; retry once the peer has replied with their key exchange"
                );
            }
        },
        Command::Receive { reply_to, .. } => {
            let mut reply_file = reply_to.as_ref().map(ReplyFile::new);
            let replies = reply_file.as_mut().map(|file| file as &mut dyn Write);
            let outcome = orchestrator.receive(&peer, input, output, replies)?;
            tracing::debug!(%peer, ?outcome, "receive complete");
        },
        Command::Forget { .. } => {
            if !orchestrator.forget(&peer)? {
                tracing::info!(%peer, "no session to forget");
            }
        },
        Command::Status { .. } => {
            let status = match orchestrator.status(&peer)? {
                SessionStatus::NoSession => "no session",
                SessionStatus::Bootstrapping => "bootstrapping",
                SessionStatus::Established => "established",
            };
            writeln!(output, "{status}")?;
            output.flush()?;
        },
    }

    Ok(())
}
