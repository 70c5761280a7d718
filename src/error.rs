use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::orchestrator::state::ProvisioningPhase;

/// Coarse classification of every failure the crate can produce.
///
/// Orchestration decisions (retry in-phase, escalate, swallow) are taken on the
/// kind, never on the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure or timeout. Potentially transient.
    TransportFailure,
    /// Definitive business-rule rejection by one of the remote services.
    RejectedByRemote,
    /// The remote answered with a shape we could not understand.
    DecodeFailure,
    /// Local misconfiguration or misuse of the state machine.
    Local,
}

/// Business-rule rejections. The payload is kept verbatim for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("the caller identity already holds an active reservation")]
    AlreadyReserved,

    #[error("the requested server or time window is no longer available")]
    NotFound,

    #[error("reservation service rejected the request with status {status}: {errors:?}")]
    Reservation { status: u16, errors: BTreeMap<String, String> },

    #[error("control service: {0}")]
    ControlService(String),

    #[error("reserved server {actual} does not match the expected server {expected}")]
    ServerMismatch { expected: u64, actual: u64 },

    #[error("reservation {id} reported status '{status}' before the server became usable")]
    ReservationFailed { id: u64, status: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rejected by remote: {0}")]
    Rejected(#[from] Rejection),

    #[error("failed to decode remote response: {0}")]
    Decode(String),

    #[error("timestamp '{value}' does not match the expected format: {source}")]
    TimeParse { value: String, source: chrono::ParseError },

    #[error("connection to the control service was lost")]
    ConnectionLost,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("illegal phase transition {from:?} -> {to:?}")]
    InvalidTransition { from: ProvisioningPhase, to: ProvisioningPhase },

    #[error("match {0} is no longer live")]
    MatchClosed(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("match directory: {0}")]
    Directory(String),

    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) | Error::ConnectionLost => ErrorKind::TransportFailure,
            Error::Rejected(_) => ErrorKind::RejectedByRemote,
            Error::Decode(_) | Error::TimeParse { .. } | Error::DeserializationError(_) => ErrorKind::DecodeFailure,
            Error::Config(_) | Error::InvalidTransition { .. } | Error::MatchClosed(_) | Error::Archive(_) | Error::Directory(_) | Error::IoError(_) => {
                ErrorKind::Local
            }
        }
    }

    /// A lost connection is fatal, so only plain transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Error::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() { Error::Decode(err.to_string()) } else { Error::Transport(err.to_string()) }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::Transport(format!("call timed out: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
