//! Error types for every layer, from the PTY up to the configuration file.

use crate::event::ErrorKind;
use crate::patterns::RuleTag;
use crate::protocol::ProtocolState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the session driver.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch `{command}`: {reason}")]
    Launch { command: String, reason: String },

    #[error("wallet shell has exited")]
    Dead,

    #[error("wallet shell I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of one protocol step.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("timed out after {after:?} waiting for {expected}")]
    Timeout {
        expected: &'static str,
        after: Duration,
    },

    #[error("wallet shell exited unexpectedly")]
    SessionDead,

    #[error("wallet rejected the password: {0}")]
    AuthFailed(String),

    #[error("wallet reported {kind}: {raw}")]
    Reported { kind: ErrorKind, raw: String },

    #[error("unexpected prompt from wallet: {0}")]
    UnexpectedPrompt(String),

    #[error("`{operation}` is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ProtocolState,
    },

    #[error("wallet output out of step with the dialogue: {0}")]
    OutOfStep(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Session(SessionError),
}

impl From<SessionError> for ProtocolError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Dead => ProtocolError::SessionDead,
            other => ProtocolError::Session(other),
        }
    }
}

impl ProtocolError {
    /// Errors after which no further command can be sent on this session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::SessionDead
                | ProtocolError::AuthFailed(_)
                | ProtocolError::OutOfStep(_)
                | ProtocolError::Cancelled
                | ProtocolError::Session(_)
        )
    }
}

/// Failure of a single ledger lookup. Every variant counts as one used
/// verification attempt.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger returned HTTP {0}")]
    Status(u16),

    #[error("unreadable ledger response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid regex for pattern `{tag}`: {source}")]
    Pattern { tag: RuleTag, source: regex::Error },

    #[error("unknown network `{0}`")]
    UnknownNetwork(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
}

#[derive(Debug, Error)]
pub enum RecipientError {
    #[error("failed to read redistribution file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("incorrect file format: `Address,Amount` header missing")]
    MissingHeader,
}
