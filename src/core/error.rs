use thiserror::Error;

use crate::core::uri::AppUri;

/// Errors surfaced while routing a message or standing up a remote.
///
/// These never escape the crate's public entry points as `Result::Err` — per `spec.md` §7,
/// they are always converted into a synthetic `cmd_result` dispatched back along the original
/// message's reply path. They exist as a typed enum (rather than bare strings) so callers and
/// tests can match on `kind()` instead of parsing `to_string()`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Could not find suitable remote based on uri: {0}")]
    NotFound(AppUri),

    #[error("Failed to create remote ({0})")]
    CreateFailed(AppUri),

    #[error("Failed to connect to {0}")]
    ConnectFailed(AppUri),

    #[error("Receive a start_graph cmd after graph is built.")]
    PostBuildStartGraph,

    #[error("{0}")]
    SendFailed(String),
}

impl RemoteError {
    /// The detail string placed on the synthetic `cmd_result`, matching `spec.md` §7 verbatim.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

/// Precondition violations on [`crate::remote::table::RemoteTable`] that a caller can recover
/// from, as opposed to the invariant violations `spec.md` §4.1 says should panic (a strong
/// remote already existing for a URI is a programmer error at the call site; this enum is for
/// the handful of operations where the caller legitimately doesn't know in advance, e.g. an
/// inbound connection racing a local `start_graph` dial for the same peer).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteTableError {
    #[error("a strong remote already exists for uri: {0}")]
    StrongRemoteAlreadyExists(AppUri),
}

/// Errors from requesting the engine close, matching `spec.md` §4.7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineCloseError {
    /// `close_async` was called again while a close was already in progress. Not an error
    /// condition per se (`is_closing` is monotonic and idempotent), but callers that want to
    /// detect a redundant close request can match on this.
    #[error("engine is already closing")]
    AlreadyClosing,
}
