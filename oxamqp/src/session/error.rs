use oxamqp_types::definitions;

use crate::connection::AllocSessionError;

/// Error beginning a session
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BeginError {
    /// No channel could be allocated on the connection
    #[error(transparent)]
    AllocSession(#[from] AllocSessionError),

    /// The peer ended the session instead of mapping it
    #[error("Remote peer ended the session {:?}", .0)]
    RemoteEnded(Option<definitions::Error>),

    /// The connection stopped before the peer answered
    #[error("Connection is closed")]
    ConnectionClosed,
}

/// Error ending a session
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The session is not mapped
    #[error("Illegal session state")]
    IllegalState,

    /// The session was ended locally after the peer violated the protocol
    #[error("Local error {}", .0)]
    LocalError(definitions::Error),

    /// The peer ended the session with an error
    #[error("Remote error {}", .0)]
    RemoteEnded(definitions::Error),

    /// The connection stopped before the session ended
    #[error("Connection is closed")]
    ConnectionClosed,
}
