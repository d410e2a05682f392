//! Session builder

use oxamqp_codec::primitives::{Array, Symbol};
use oxamqp_types::definitions::{Handle, TransferNumber};
use tracing::instrument;

use crate::connection::ConnectionHandle;

use super::{endpoint::SessionConfig, BeginError, SessionHandle, DEFAULT_HANDLE_MAX, DEFAULT_WINDOW};

/// Builder of a [`SessionHandle`]
#[derive(Debug, Clone)]
pub struct Builder {
    /// The transfer-id of the first transfer frame the session sends
    pub next_outgoing_id: TransferNumber,

    /// The number of transfer frames the peer may send before the window is replenished
    pub incoming_window: TransferNumber,

    /// Advertised number of transfer frames the session may send
    pub outgoing_window: TransferNumber,

    /// The largest handle the peer may use
    pub handle_max: Handle,

    /// Extension capabilities the sender supports
    pub offered_capabilities: Option<Array<Symbol>>,

    /// Extension capabilities the sender can use if the receiver supports them
    pub desired_capabilities: Option<Array<Symbol>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Creates a builder with the default windows
    pub fn new() -> Self {
        Self {
            next_outgoing_id: 0,
            incoming_window: DEFAULT_WINDOW,
            outgoing_window: DEFAULT_WINDOW,
            handle_max: Handle(DEFAULT_HANDLE_MAX),
            offered_capabilities: None,
            desired_capabilities: None,
        }
    }

    /// The first outgoing transfer-id
    pub fn next_outgoing_id(mut self, value: TransferNumber) -> Self {
        self.next_outgoing_id = value;
        self
    }

    /// The incoming window
    pub fn incoming_window(mut self, value: TransferNumber) -> Self {
        self.incoming_window = value;
        self
    }

    /// The outgoing window
    pub fn outgoing_window(mut self, value: TransferNumber) -> Self {
        self.outgoing_window = value;
        self
    }

    /// The largest handle the peer may use
    pub fn handle_max(mut self, value: impl Into<Handle>) -> Self {
        self.handle_max = value.into();
        self
    }

    /// Adds an offered capability
    pub fn add_offered_capabilities(mut self, capability: impl Into<Symbol>) -> Self {
        self.offered_capabilities
            .get_or_insert_with(|| Array(Vec::new()))
            .0
            .push(capability.into());
        self
    }

    /// Adds a desired capability
    pub fn add_desired_capabilities(mut self, capability: impl Into<Symbol>) -> Self {
        self.desired_capabilities
            .get_or_insert_with(|| Array(Vec::new()))
            .0
            .push(capability.into());
        self
    }

    pub(crate) fn into_config(self) -> SessionConfig {
        SessionConfig {
            next_outgoing_id: self.next_outgoing_id,
            incoming_window: self.incoming_window,
            outgoing_window: self.outgoing_window,
            handle_max: self.handle_max.0,
            offered_capabilities: self.offered_capabilities,
            desired_capabilities: self.desired_capabilities,
        }
    }

    /// Begins the session on the connection and waits for the peer's begin
    #[instrument(skip_all)]
    pub async fn begin(self, connection: &mut ConnectionHandle) -> Result<SessionHandle, BeginError> {
        let (session, begun, incoming_links) = connection.allocate_session(self.into_config())?;
        let handle = SessionHandle::new(session, incoming_links);
        match begun.await {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BeginError::ConnectionClosed),
        }
    }
}
