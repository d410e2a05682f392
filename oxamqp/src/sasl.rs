//! Boundary to the SASL negotiation phase
//!
//! The engine exchanges the SASL protocol header and then hands the raw stream to a
//! [`SaslNegotiator`]. Mechanism selection and credential exchange are left to the negotiator.
//! Once it reports success the AMQP protocol header exchange starts on the same stream.

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

/// A stream the SASL negotiator can read from and write to
pub trait AsyncIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Outcome code of a failed SASL exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslCode {
    /// Connection authentication failed due to an unspecified problem with the supplied
    /// credentials
    Auth = 1,
    /// Connection authentication failed due to a system error
    Sys = 2,
    /// Connection authentication failed due to a system error that is unlikely to be corrected
    /// without intervention
    SysPerm = 3,
    /// Connection authentication failed due to a transient system error
    SysTemp = 4,
}

/// Errors reported by a [`SaslNegotiator`]
#[derive(Debug, thiserror::Error)]
pub enum SaslError {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] std::io::Error),

    /// The peer rejected the credentials
    #[error("SASL outcome {code:?}")]
    Outcome {
        /// Outcome code sent by the peer
        code: SaslCode,
    },

    /// The negotiator received something it does not understand
    #[error("SASL negotiation failed: {0}")]
    Negotiation(String),
}

/// Performs the SASL exchange after both SASL protocol headers have been exchanged
pub trait SaslNegotiator: Send {
    /// Runs the exchange to completion over `io`
    fn negotiate<'a>(&'a mut self, io: &'a mut dyn AsyncIo) -> BoxFuture<'a, Result<(), SaslError>>;
}

impl std::fmt::Debug for dyn SaslNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SaslNegotiator")
    }
}
