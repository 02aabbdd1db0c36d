use crate::command::Command;
use thiserror::Error;

/// A call that was refused before anything went over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("no authenticated session")]
    NoSession,
    #[error("transport channel is not open")]
    NoChannel,
    #[error("no persona is bound to this account")]
    NoIdentity,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed")]
    Request(#[from] reqwest::Error),
    #[error("backend responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid session token: {0}")]
    Token(String),
    #[error("malformed gateway envelope")]
    Envelope(#[source] serde_json::Error),
}

impl TransportError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            body: body.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status { status: 404, .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TransportError::Status { status: 409, .. })
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no authenticated session")]
    Missing,
    #[error("authentication failed")]
    Auth(#[source] TransportError),
    #[error("session expired and could not be refreshed; re-authenticate")]
    Refresh(#[source] TransportError),
    #[error("failed to open transport channel")]
    Channel(#[source] TransportError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("`{command}` returned no payload")]
    MissingPayload { command: Command },
    #[error("`{command}` returned an unexpected payload shape")]
    Shape {
        command: Command,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{command}` returned an empty transaction hash")]
    EmptyTxHash { command: Command },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Session(SessionError),
    #[error("`{command}` transport failure")]
    Transport {
        command: Command,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to encode `{command}` payload")]
    Encode {
        command: Command,
        #[source]
        source: serde_json::Error,
    },
}

impl From<SessionError> for DispatchError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Missing => PreconditionError::NoSession.into(),
            other => DispatchError::Session(other),
        }
    }
}

impl DispatchError {
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            DispatchError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("failed to look up existing persona")]
    Lookup(#[source] DispatchError),
    #[error("persona tag `{tag}` is already claimed")]
    Conflict {
        tag: String,
        #[source]
        source: DispatchError,
    },
    #[error("claim for persona tag `{tag}` failed")]
    Failed {
        tag: String,
        #[source]
        source: DispatchError,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("receipt request failed")]
    Request(#[from] reqwest::Error),
    #[error("receipt endpoint responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid receipt batch payload")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("tick clock unavailable; cannot bound the wait")]
    Query(#[source] DispatchError),
    #[error("failed to fetch receipts")]
    Fetch(#[from] FetchError),
    #[error("confirmation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Confirm(#[from] ConfirmError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
