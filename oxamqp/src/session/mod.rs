//! Sessions: sequenced, flow-controlled conversations on one connection channel

use oxamqp_types::{definitions, states::SessionState};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::link::{
    receiver::Receiver,
    sender::Sender,
    RemoteLink,
};

pub mod builder;
pub(crate) mod endpoint;
pub mod error;

pub use builder::Builder;
pub use error::{BeginError, Error};

use endpoint::{IncomingLink, SharedSession};

/// Default incoming_window and outgoing_window
pub const DEFAULT_WINDOW: u32 = 2048;

/// Default handle-max
pub const DEFAULT_HANDLE_MAX: u32 = u32::MAX;

/// Handle to a mapped session
///
/// Dropping the handle ends the session if it is still mapped.
#[derive(Debug)]
pub struct SessionHandle {
    pub(crate) session: SharedSession,
    incoming_links: mpsc::UnboundedReceiver<IncomingLink>,
}

impl SessionHandle {
    pub(crate) fn new(
        session: SharedSession,
        incoming_links: mpsc::UnboundedReceiver<IncomingLink>,
    ) -> Self {
        Self {
            session,
            incoming_links,
        }
    }

    /// Creates a builder for a session
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Begins a session with default settings
    pub async fn begin(
        connection: &mut crate::connection::ConnectionHandle,
    ) -> Result<SessionHandle, BeginError> {
        Builder::new().begin(connection).await
    }

    /// The channel this session sends on
    pub fn outgoing_channel(&self) -> u16 {
        self.session.lock().outgoing_channel
    }

    /// Current state of the session
    pub fn state(&self) -> SessionState {
        self.session.lock().local_state
    }

    /// Ends the session and waits for the peer's end
    pub async fn end(&mut self) -> Result<(), Error> {
        self.end_inner(None).await
    }

    /// Ends the session with an error
    pub async fn end_with_error(&mut self, error: impl Into<definitions::Error>) -> Result<(), Error> {
        self.end_inner(Some(error.into())).await
    }

    #[instrument(skip_all)]
    async fn end_inner(&mut self, error: Option<definitions::Error>) -> Result<(), Error> {
        let ended = self.session.lock().end(error)?;
        match ended.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Waits for the next link attached by the peer
    ///
    /// Returns `None` once the session has ended.
    pub async fn next_link(&mut self) -> Option<RemoteLink> {
        let incoming = self.incoming_links.recv().await?;
        let link = match incoming {
            IncomingLink::Sender {
                key,
                id,
                name,
                notify,
            } => RemoteLink::Sender(Sender::new(self.session.clone(), key, id, name, notify)),
            IncomingLink::Receiver {
                key,
                id,
                name,
                deliveries,
            } => RemoteLink::Receiver(Receiver::new(
                self.session.clone(),
                key,
                id,
                name,
                deliveries,
            )),
        };
        Some(link)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.session.lock().release();
    }
}
