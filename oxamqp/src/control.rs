//! Controls for the connection event loop

use oxamqp_types::definitions::Error;

/// Commands sent from a [`ConnectionHandle`](crate::connection::ConnectionHandle) to its engine
#[derive(Debug)]
pub(crate) enum ConnectionControl {
    /// Send a close, with an optional error, and wait for the peer's close
    Close(Option<Error>),
}
