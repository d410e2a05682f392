use std::io;

use oxamqp_types::definitions::{self, AmqpError, ConnectionError};

use crate::{frames, sasl::SaslError};

/// Errors of the transport
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// No frame arrived within the local idle timeout
    #[error("Idle timeout")]
    IdleTimeout,

    /// Inbound bytes could not be framed or decoded
    #[error(transparent)]
    Frame(frames::Error),
}

impl From<frames::Error> for Error {
    fn from(err: frames::Error) -> Self {
        match err {
            frames::Error::Io(io) => Self::Io(io),
            other => Self::Frame(other),
        }
    }
}

impl Error {
    /// The error to send in a Close frame, `None` if the transport cannot carry one
    pub fn as_amqp_error(&self) -> Option<definitions::Error> {
        let error = match self {
            Error::Io(_) => return None,
            Error::IdleTimeout => definitions::Error::with_description(
                AmqpError::ResourceLimitExceeded,
                "local idle timeout expired",
            ),
            Error::Frame(err @ frames::Error::FrameSizeExceeded { .. }) => {
                definitions::Error::with_description(AmqpError::InvalidField, err)
            }
            Error::Frame(err @ frames::Error::Decode(_)) => {
                definitions::Error::with_description(AmqpError::DecodeError, err)
            }
            Error::Frame(err @ frames::Error::Encode(_)) => {
                definitions::Error::with_description(AmqpError::InternalError, err)
            }
            Error::Frame(err) => {
                definitions::Error::with_description(ConnectionError::FramingError, err)
            }
        };
        Some(error)
    }
}

/// Errors of the protocol header exchange
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// The peer answered with a different protocol header
    #[error("Protocol header mismatch: received {0:02x?}")]
    ProtocolHeaderMismatch([u8; 8]),

    /// The SASL exchange failed
    #[error(transparent)]
    Sasl(#[from] SaslError),
}

impl NegotiationError {
    /// Condition describing the failure
    pub fn as_amqp_error(&self) -> definitions::Error {
        match self {
            NegotiationError::ProtocolHeaderMismatch(_) => {
                definitions::Error::with_description(AmqpError::InvalidField, self)
            }
            NegotiationError::Io(_) | NegotiationError::Sasl(_) => {
                definitions::Error::with_description(AmqpError::IllegalState, self)
            }
        }
    }
}
