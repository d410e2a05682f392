//! Implementation of AMQP1.0 receiver

use oxamqp_types::{
    definitions::{self, DeliveryNumber},
    messaging::{Accepted, DeliveryState, Modified, Rejected, Released},
};
use tracing::trace;

use crate::{
    link::{
        builder::Builder,
        delivery::Delivery,
        error::{DetachError, DispositionError, LinkStateError, RecvError},
        role::ReceiverMarker,
        state::LinkState,
        AttachError, CreditMode, DeliveryReceiver,
    },
    session::{endpoint::SharedSession, SessionHandle},
    util::Uninitialized,
};

/// An AMQP1.0 receiver
///
/// Dropping an attached receiver closes the link.
#[derive(Debug)]
pub struct Receiver {
    session: SharedSession,
    key: usize,
    id: u64,
    name: String,
    deliveries: DeliveryReceiver,
}

impl Receiver {
    pub(crate) fn new(
        session: SharedSession,
        key: usize,
        id: u64,
        name: String,
        deliveries: DeliveryReceiver,
    ) -> Self {
        Self {
            session,
            key,
            id,
            name,
            deliveries,
        }
    }

    /// Creates a builder for the receiver
    pub fn builder() -> Builder<ReceiverMarker, Uninitialized> {
        Builder::new().receiver()
    }

    /// Attach the receiver link to a session with default configuration
    /// with the `name` and the `address` of the source
    pub async fn attach(
        session: &mut SessionHandle,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<Receiver, AttachError> {
        Self::builder()
            .name(name)
            .source(address.into())
            .attach(session)
            .await
    }

    /// Name of the link
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Link credit the sender has not used yet
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

    /// Waits for the next complete delivery
    ///
    /// Taking a delivery frees its transfer frames from the session's incoming window and, in
    /// the default credit mode, tops the link credit back up.
    pub async fn recv(&mut self) -> Result<Delivery, RecvError> {
        match self.deliveries.recv().await {
            Some(Ok(delivery)) => {
                trace!(link = %self.name, delivery_id = delivery.delivery_id, "delivery taken");
                self.session
                    .lock()
                    .on_delivery_taken(self.key, self.id, delivery.frames);
                Ok(delivery)
            }
            Some(Err(err)) => Err(err),
            None => Err(RecvError::State(LinkStateError::Detached)),
        }
    }

    /// Replaces the link credit
    ///
    /// In [`CreditMode::Auto`] the new credit also becomes the value the link is topped up to.
    /// A manual receiver stays manual.
    pub fn set_credit(&mut self, credit: u32) -> Result<(), DispositionError> {
        self.session.lock().set_credit(self.key, self.id, credit)
    }

    /// Switches how the link credit is replenished
    pub fn set_credit_mode(&mut self, mode: CreditMode) -> Result<(), DispositionError> {
        self.session.lock().set_credit_mode(self.key, self.id, mode)
    }

    /// Asks the sender to use up or give back all remaining credit
    ///
    /// The credit mode is left as it is, so an automatic receiver tops its credit back up with
    /// the next delivery it takes after the drain.
    pub fn drain(&mut self) -> Result<(), DispositionError> {
        self.session.lock().drain(self.key, self.id)
    }

    /// Accepts a delivery
    pub fn accept(&mut self, delivery: &Delivery) -> Result<(), DispositionError> {
        self.dispose(delivery, DeliveryState::Accepted(Accepted {}))
    }

    /// Rejects a delivery
    pub fn reject(
        &mut self,
        delivery: &Delivery,
        error: impl Into<Option<definitions::Error>>,
    ) -> Result<(), DispositionError> {
        let rejected = Rejected {
            error: error.into(),
        };
        self.dispose(delivery, DeliveryState::Rejected(rejected))
    }

    /// Releases a delivery
    pub fn release(&mut self, delivery: &Delivery) -> Result<(), DispositionError> {
        self.dispose(delivery, DeliveryState::Released(Released {}))
    }

    /// Modifies a delivery
    pub fn modify(
        &mut self,
        delivery: &Delivery,
        modified: Modified,
    ) -> Result<(), DispositionError> {
        self.dispose(delivery, DeliveryState::Modified(modified))
    }

    /// Updates the state of a delivery
    ///
    /// Deliveries that are already settled are skipped.
    pub fn dispose(
        &mut self,
        delivery: &Delivery,
        state: DeliveryState,
    ) -> Result<(), DispositionError> {
        self.check_owner(delivery)?;
        self.session
            .lock()
            .dispose(self.key, self.id, &[delivery.delivery_id], state)
    }

    /// Updates the state of several deliveries
    ///
    /// Consecutive delivery ids share one disposition frame.
    pub fn dispose_all<'a>(
        &mut self,
        deliveries: impl IntoIterator<Item = &'a Delivery>,
        state: DeliveryState,
    ) -> Result<(), DispositionError> {
        let delivery_ids = deliveries
            .into_iter()
            .map(|delivery| {
                self.check_owner(delivery)?;
                Ok(delivery.delivery_id)
            })
            .collect::<Result<Vec<DeliveryNumber>, DispositionError>>()?;
        self.session
            .lock()
            .dispose(self.key, self.id, &delivery_ids, state)
    }

    /// Accepts several deliveries
    pub fn accept_all<'a>(
        &mut self,
        deliveries: impl IntoIterator<Item = &'a Delivery>,
    ) -> Result<(), DispositionError> {
        self.dispose_all(deliveries, DeliveryState::Accepted(Accepted {}))
    }

    fn check_owner(&self, delivery: &Delivery) -> Result<(), DispositionError> {
        match delivery.link_id == self.id {
            true => Ok(()),
            false => Err(DispositionError::ForeignDelivery),
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

impl Drop for Receiver {
    fn drop(&mut self) {
        self.session.lock().release_link(self.key, self.id);
    }
}
