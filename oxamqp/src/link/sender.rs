//! Implementation of AMQP1.0 sender

use std::sync::Arc;

use oxamqp_types::{definitions, messaging::Outcome};
use tokio::sync::Notify;
use tracing::trace;

use crate::{
    link::{
        builder::Builder,
        delivery::{DeliveryFut, Sendable},
        error::{DetachError, LinkStateError, SendError},
        role::SenderMarker,
        state::LinkState,
    },
    session::{endpoint::SharedSession, SessionHandle},
    util::Uninitialized,
};

use super::AttachError;

/// An AMQP1.0 sender
///
/// Dropping an attached sender closes the link.
#[derive(Debug)]
pub struct Sender {
    session: SharedSession,
    key: usize,
    id: u64,
    name: String,
    notify: Arc<Notify>,
}

impl Sender {
    pub(crate) fn new(
        session: SharedSession,
        key: usize,
        id: u64,
        name: String,
        notify: Arc<Notify>,
    ) -> Self {
        Self {
            session,
            key,
            id,
            name,
            notify,
        }
    }

    /// Creates a builder for the sender
    pub fn builder() -> Builder<SenderMarker, Uninitialized> {
        Builder::new().sender()
    }

    /// Attach the sender link to a session with default configuration
    /// with the `name` and the `address` of the target
    pub async fn attach(
        session: &mut SessionHandle,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<Sender, AttachError> {
        Self::builder()
            .name(name)
            .target(address.into())
            .attach(session)
            .await
    }

    /// Name of the link
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Link credit granted by the receiver and not used yet
    pub fn credit(&self) -> u32 {
        self.session
            .lock()
            .link_credit(self.key, self.id)
            .unwrap_or(0)
    }

    /// Current state of the link
    pub fn state(&self) -> LinkState {
        self.session
            .lock()
            .link_state(self.key, self.id)
            .unwrap_or(LinkState::Detached)
    }

    /// Sends a message and waits for its outcome
    ///
    /// A pre-settled message resolves to [`Outcome::Accepted`] once it has been written.
    pub async fn send(&mut self, sendable: impl Into<Sendable>) -> Result<Outcome, SendError> {
        let fut = self.send_batchable(sendable).await?;
        fut.await
    }

    /// Sends a message without waiting for its outcome
    ///
    /// Waits until the link has credit and the session's remote incoming window can take the
    /// transfer frames of the message. The returned future resolves when the receiver settles.
    pub async fn send_batchable(
        &mut self,
        sendable: impl Into<Sendable>,
    ) -> Result<DeliveryFut, SendError> {
        let sendable = sendable.into();
        loop {
            let sent = self.session.lock().try_send(self.key, self.id, &sendable)?;
            match sent {
                Some(fut) => return Ok(fut),
                None => {
                    trace!(link = %self.name, "waiting for credit");
                    self.notify.notified().await;
                }
            }
        }
    }

    /// Detaches the link without closing it
    pub async fn detach(self) -> Result<(), DetachError> {
        self.detach_inner(false, None).await
    }

    /// Detaches the link with an error
    pub async fn detach_with_error(
        self,
        error: impl Into<definitions::Error>,
    ) -> Result<(), DetachError> {
        self.detach_inner(false, Some(error.into())).await
    }

    /// Closes the link
    pub async fn close(self) -> Result<(), DetachError> {
        self.detach_inner(true, None).await
    }

    async fn detach_inner(
        self,
        closed: bool,
        error: Option<definitions::Error>,
    ) -> Result<(), DetachError> {
        let detached = self
            .session
            .lock()
            .detach(self.key, self.id, closed, error);
        match detached.await {
            Ok(result) => result,
            Err(_) => Err(DetachError::State(LinkStateError::TransportClosed)),
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.session.lock().release_link(self.key, self.id);
    }
}
