//! Link builder

use std::marker::PhantomData;

use oxamqp_types::{
    definitions::{ReceiverSettleMode, SenderSettleMode, SequenceNo},
    messaging::{Source, Target},
};
use tracing::debug;

use crate::{
    session::SessionHandle,
    util::{Initialized, Uninitialized},
};

use super::{
    error::{AttachError, LinkStateError},
    receiver::Receiver,
    role::{self, IntoRole},
    sender::Sender,
    CreditMode, LinkConfig,
};

/// Builder of a [`Sender`] or a [`Receiver`]
///
/// The role and the name must be set before the link can be attached.
#[derive(Debug, Clone)]
pub struct Builder<Role, NameState> {
    /// The name of the link
    pub name: String,

    /// Settlement policy for the sender
    pub snd_settle_mode: SenderSettleMode,

    /// The settlement policy of the receiver
    pub rcv_settle_mode: ReceiverSettleMode,

    /// The source for messages
    pub source: Option<Source>,

    /// The target for messages
    pub target: Option<Target>,

    /// The initial delivery count of a sender
    pub initial_delivery_count: SequenceNo,

    /// The maximum message size supported by the link endpoint
    pub max_message_size: Option<u64>,

    /// Credit mode of the link. This has no effect if a sender is built
    pub credit_mode: CreditMode,

    role: PhantomData<Role>,
    name_state: PhantomData<NameState>,
}

impl Default for Builder<Uninitialized, Uninitialized> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<Uninitialized, Uninitialized> {
    /// Creates a builder without a role or a name
    pub fn new() -> Self {
        Self {
            name: String::new(),
            snd_settle_mode: Default::default(),
            rcv_settle_mode: Default::default(),
            source: None,
            target: None,
            initial_delivery_count: 0,
            max_message_size: None,
            credit_mode: CreditMode::default(),
            role: PhantomData,
            name_state: PhantomData,
        }
    }
}

impl<R, NameState> Builder<R, NameState> {
    fn into_state<R2, N2>(self) -> Builder<R2, N2> {
        Builder {
            name: self.name,
            snd_settle_mode: self.snd_settle_mode,
            rcv_settle_mode: self.rcv_settle_mode,
            source: self.source,
            target: self.target,
            initial_delivery_count: self.initial_delivery_count,
            max_message_size: self.max_message_size,
            credit_mode: self.credit_mode,
            role: PhantomData,
            name_state: PhantomData,
        }
    }

    /// The name of the link
    pub fn name(mut self, name: impl Into<String>) -> Builder<R, Initialized> {
        self.name = name.into();
        self.into_state()
    }

    /// Set the link's role to sender
    pub fn sender(self) -> Builder<role::SenderMarker, NameState> {
        self.into_state()
    }

    /// Set the link's role to receiver
    pub fn receiver(self) -> Builder<role::ReceiverMarker, NameState> {
        self.into_state()
    }

    /// Settlement policy for the sender
    pub fn sender_settle_mode(mut self, mode: SenderSettleMode) -> Self {
        self.snd_settle_mode = mode;
        self
    }

    /// The settlement policy of the receiver
    pub fn receiver_settle_mode(mut self, mode: ReceiverSettleMode) -> Self {
        self.rcv_settle_mode = mode;
        self
    }

    /// The source for messages
    pub fn source(mut self, source: impl Into<Source>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The target for messages
    pub fn target(mut self, target: impl Into<Target>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// The maximum message size supported by the link endpoint
    pub fn max_message_size(mut self, max_size: u64) -> Self {
        self.max_message_size = Some(max_size);
        self
    }
}

impl<NameState> Builder<role::SenderMarker, NameState> {
    /// This MUST NOT be null if role is sender,
    /// and it is ignored if the role is receiver.
    /// See subsection 2.6.7.
    pub fn initial_delivery_count(mut self, count: SequenceNo) -> Self {
        self.initial_delivery_count = count;
        self
    }
}

impl<NameState> Builder<role::ReceiverMarker, NameState> {
    /// How the receiver replenishes link credit
    pub fn credit_mode(mut self, mode: CreditMode) -> Self {
        self.credit_mode = mode;
        self
    }
}

impl<R: IntoRole> Builder<R, Initialized> {
    fn into_config(self) -> LinkConfig {
        LinkConfig {
            name: self.name,
            role: R::into_role(),
            snd_settle_mode: self.snd_settle_mode,
            rcv_settle_mode: self.rcv_settle_mode,
            source: self.source.map(Box::new),
            target: self.target.map(Box::new),
            max_message_size: self.max_message_size,
            initial_delivery_count: self.initial_delivery_count,
            credit_mode: self.credit_mode,
        }
    }
}

impl Builder<role::SenderMarker, Initialized> {
    /// Attach the link as a sender
    pub async fn attach(self, session: &mut SessionHandle) -> Result<Sender, AttachError> {
        let name = self.name.clone();
        let config = self.into_config();

        let attached = session.session.lock().attach(config)?;
        let (key, id) = (attached.key, attached.id);
        let result = match attached.attached.await {
            Ok(result) => result,
            Err(_) => Err(AttachError::State(LinkStateError::TransportClosed)),
        };
        if let Err(err) = result {
            debug!(link = %name, ?err, "attach failed");
            session.session.lock().release_link(key, id);
            return Err(err);
        }
        Ok(Sender::new(
            session.session.clone(),
            key,
            id,
            name,
            attached.notify,
        ))
    }
}

impl Builder<role::ReceiverMarker, Initialized> {
    /// Attach the link as a receiver
    pub async fn attach(self, session: &mut SessionHandle) -> Result<Receiver, AttachError> {
        let name = self.name.clone();
        let config = self.into_config();

        let attached = session.session.lock().attach(config)?;
        let (key, id) = (attached.key, attached.id);
        let result = match attached.attached.await {
            Ok(result) => result,
            Err(_) => Err(AttachError::State(LinkStateError::TransportClosed)),
        };
        let deliveries = match (result, attached.deliveries) {
            (Ok(()), Some(deliveries)) => deliveries,
            (Ok(()), None) => {
                session.session.lock().release_link(key, id);
                return Err(AttachError::State(LinkStateError::IllegalState));
            }
            (Err(err), _) => {
                debug!(link = %name, ?err, "attach failed");
                session.session.lock().release_link(key, id);
                return Err(err);
            }
        };
        Ok(Receiver::new(
            session.session.clone(),
            key,
            id,
            name,
            deliveries,
        ))
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_types::definitions::{ReceiverSettleMode, Role, SenderSettleMode};

    use crate::link::CreditMode;

    use super::Builder;

    #[test]
    fn receiver_config_carries_settings() {
        let config = Builder::new()
            .receiver()
            .name("inbox")
            .source("q1")
            .receiver_settle_mode(ReceiverSettleMode::Second)
            .credit_mode(CreditMode::Manual)
            .into_config();
        assert_eq!(config.role, Role::Receiver);
        assert_eq!(config.name, "inbox");
        assert_eq!(
            config.source.and_then(|s| s.address),
            Some(String::from("q1"))
        );
        assert_eq!(config.rcv_settle_mode, ReceiverSettleMode::Second);
        assert_eq!(config.credit_mode, CreditMode::Manual);
    }

    #[test]
    fn sender_config_keeps_initial_delivery_count() {
        let config = Builder::new()
            .name("outbox")
            .sender()
            .target("q1")
            .initial_delivery_count(42)
            .sender_settle_mode(SenderSettleMode::Settled)
            .into_config();
        assert_eq!(config.role, Role::Sender);
        assert_eq!(config.initial_delivery_count, 42);
        assert_eq!(config.snd_settle_mode, SenderSettleMode::Settled);
        assert!(config.source.is_none());
    }
}
