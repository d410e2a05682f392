//! Implements errors associated with the connection

use std::io;

use oxamqp_types::definitions::{self, AmqpError};
use tokio::task::JoinError;

use crate::transport::{self, NegotiationError, WriterClosed};

/// Errors associated with [`crate::Connection`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The transport ended before the connection was closed
    #[error("Transport closed before the connection was closed")]
    TransportClosed,

    /// This could occur only when the user attempts to close the connection
    #[error(transparent)]
    JoinError(#[from] JoinError),

    /// The connection was closed locally with an error
    #[error("Local error {}", .0)]
    Local(definitions::Error),

    /// The remote peer closed with the provided error
    #[error("Remote error {}", .0)]
    Remote(definitions::Error),

    /// The event loop has already been awaited
    #[error("Connection is already closed")]
    AlreadyClosed,
}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        match err {
            transport::Error::Io(err) => Self::Io(err),
            other => match other.as_amqp_error() {
                Some(error) => Self::Local(error),
                None => Self::TransportClosed,
            },
        }
    }
}

/// Error associated with allocation of new session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocSessionError {
    /// The connection is not open
    #[error("Illegal local state")]
    IllegalState,

    /// Every channel up to the negotiated channel-max is in use
    #[error("Reached connection channel max")]
    ChannelMaxReached,
}

/// Error associated with openning a connection
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// Error parsing the url
    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    /// Scheme is invalid or not found
    #[error(r#"Invalid scheme. Only "amqp" is supported."#)]
    InvalidScheme,

    /// Domain is invalid or not found
    #[error("Invalid domain")]
    InvalidDomain,

    /// Protocol header or SASL negotiation failed
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// The first frame could not be read
    #[error(transparent)]
    Transport(#[from] transport::Error),

    /// The peer answered the open with a close
    #[error("Remote peer closed the connection {:?}", .0)]
    RemoteClosed(Option<definitions::Error>),

    /// The peer sent something other than an open
    #[error("Expecting an open frame, found {0}")]
    UnexpectedFrame(&'static str),

    /// The writer task stopped before the open was sent
    #[error(transparent)]
    WriterClosed(#[from] WriterClosed),
}

impl OpenError {
    /// Condition describing the failure, if the failure is a protocol violation
    pub fn as_amqp_error(&self) -> Option<definitions::Error> {
        match self {
            OpenError::Negotiation(err) => Some(err.as_amqp_error()),
            OpenError::Transport(err) => err.as_amqp_error(),
            OpenError::UnexpectedFrame(name) => Some(definitions::Error::with_description(
                AmqpError::IllegalState,
                format!("expecting open, found {}", name),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_types::definitions::{AmqpError, ErrorCondition};

    use crate::transport::NegotiationError;

    use super::OpenError;

    #[test]
    fn header_mismatch_is_an_invalid_field() {
        let err = OpenError::from(NegotiationError::ProtocolHeaderMismatch(*b"AMQQ\x00\x01\x00\x00"));
        let error = err.as_amqp_error().unwrap();
        assert_eq!(
            error.condition,
            ErrorCondition::AmqpError(AmqpError::InvalidField)
        );
        assert!(error.description.unwrap().contains("41"));
    }
}
