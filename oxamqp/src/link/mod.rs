//! Links: unidirectional routes between a source and a target

use std::{collections::VecDeque, sync::Arc};

use bytes::Bytes;
use oxamqp_types::{
    definitions::{self, AmqpError, Handle, LinkError, ReceiverSettleMode, Role, SenderSettleMode},
    messaging::{Source, Target},
    performatives::{Attach, Detach, Transfer},
};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::Payload;

pub mod builder;
pub mod delivery;
pub mod error;
mod incomplete_transfer;
pub mod receiver;
pub mod sender;
pub mod state;

pub use builder::Builder;
pub use delivery::{Delivery, DeliveryFut, MessageDecode, Sendable};
pub use error::{AttachError, DetachError, DispositionError, LinkStateError, RecvError, SendError};
pub use receiver::Receiver;
pub use sender::Sender;
pub use state::{LinkFlow, LinkState};

use incomplete_transfer::IncompleteTransfer;
use state::LinkFlowState;

/// Default link credit a receiver grants
pub const DEFAULT_CREDIT: u32 = 200;

pub mod role {
    //! Type state for [`Builder`](super::Builder)

    use oxamqp_types::definitions::Role;

    /// Type state for link::builder::Builder
    #[derive(Debug)]
    pub struct SenderMarker {}

    /// Type state for link::builder::Builder
    #[derive(Debug)]
    pub struct ReceiverMarker {}

    /// Maps a type state to the role it builds
    pub trait IntoRole {
        /// The link role
        fn into_role() -> Role;
    }

    impl IntoRole for SenderMarker {
        fn into_role() -> Role {
            Role::Sender
        }
    }

    impl IntoRole for ReceiverMarker {
        fn into_role() -> Role {
            Role::Receiver
        }
    }
}

/// A link attached by the remote peer
#[derive(Debug)]
pub enum RemoteLink {
    /// The peer attached as a receiver, the local end sends
    Sender(Sender),
    /// The peer attached as a sender, the local end receives
    Receiver(Receiver),
}

/// How a receiver replenishes link credit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditMode {
    /// Credit only changes when the application sets it
    Manual,
    /// Credit is topped back up to the value once half of it has been used
    Auto(u32),
}

impl Default for CreditMode {
    fn default() -> Self {
        CreditMode::Auto(DEFAULT_CREDIT)
    }
}

pub(crate) type DeliverySender = mpsc::UnboundedSender<Result<Delivery, RecvError>>;
pub(crate) type DeliveryReceiver = mpsc::UnboundedReceiver<Result<Delivery, RecvError>>;

/// What an incoming transfer frame completed
#[derive(Debug)]
pub(crate) enum TransferProgress {
    /// More frames of the delivery are expected
    Incomplete,
    /// The sender aborted the delivery after this many frames
    Aborted { frames: u32 },
    /// The delivery is complete
    Complete(Delivery),
}

/// A link-scoped violation found while assembling a delivery
#[derive(Debug)]
pub(crate) struct TransferError {
    pub error: definitions::Error,
    /// Transfer frames of the failed delivery held against the session's incoming window
    pub frames: u32,
}

impl TransferError {
    fn new(error: definitions::Error, frames: u32) -> Self {
        Self { error, frames }
    }
}

/// Transfer frames of an outgoing delivery held back by the peer's incoming window
#[derive(Debug)]
pub(crate) struct PendingTransfer {
    pub chunks: VecDeque<Payload>,
    /// Resolves a pre-settled delivery once its last frame is written
    pub written: Option<delivery::OutcomeSender>,
}

/// Link parameters chosen by the local application
#[derive(Debug, Clone)]
pub(crate) struct LinkConfig {
    pub name: String,
    pub role: Role,
    pub snd_settle_mode: SenderSettleMode,
    pub rcv_settle_mode: ReceiverSettleMode,
    pub source: Option<Box<Source>>,
    pub target: Option<Box<Target>>,
    pub max_message_size: Option<u64>,
    pub initial_delivery_count: u32,
    pub credit_mode: CreditMode,
}

/// State of one link endpoint, owned by its session
#[derive(Debug)]
pub(crate) struct LinkEndpoint {
    /// Distinguishes links that reuse an output handle
    pub id: u64,
    pub name: String,
    pub role: Role,
    pub output_handle: Handle,
    pub input_handle: Option<Handle>,
    pub state: LinkState,

    pub snd_settle_mode: SenderSettleMode,
    pub rcv_settle_mode: ReceiverSettleMode,
    pub source: Option<Box<Source>>,
    pub target: Option<Box<Target>>,
    pub max_message_size: Option<u64>,
    pub remote_max_message_size: Option<u64>,

    pub flow: LinkFlowState,
    pub credit_mode: CreditMode,
    next_tag: u64,
    incomplete: Option<IncompleteTransfer>,
    pub outgoing: Option<PendingTransfer>,

    /// Wakes a sender waiting for credit, window or a state change
    pub notify: Arc<Notify>,
    pub deliveries: Option<DeliverySender>,
    pub attach_responder: Option<oneshot::Sender<Result<(), AttachError>>>,
    pub detach_responder: Option<oneshot::Sender<Result<(), DetachError>>>,

    /// Why the link became unusable
    pub failure: Option<LinkStateError>,
    /// The application handle is gone, the entry is freed once detached
    pub dropped: bool,
}

impl LinkEndpoint {
    pub fn new(id: u64, output_handle: Handle, config: LinkConfig) -> Self {
        let flow = match config.role {
            Role::Sender => LinkFlowState::sender(config.initial_delivery_count),
            Role::Receiver => match config.credit_mode {
                CreditMode::Auto(credit) => LinkFlowState::receiver(credit),
                CreditMode::Manual => LinkFlowState::receiver(0),
            },
        };
        Self {
            id,
            name: config.name,
            role: config.role,
            output_handle,
            input_handle: None,
            state: LinkState::Unattached,
            snd_settle_mode: config.snd_settle_mode,
            rcv_settle_mode: config.rcv_settle_mode,
            source: config.source,
            target: config.target,
            max_message_size: config.max_message_size,
            remote_max_message_size: None,
            flow,
            credit_mode: config.credit_mode,
            next_tag: 0,
            incomplete: None,
            outgoing: None,
            notify: Arc::new(Notify::new()),
            deliveries: None,
            attach_responder: None,
            detach_responder: None,
            failure: None,
            dropped: false,
        }
    }

    pub fn attach_frame(&self) -> Attach {
        Attach {
            name: self.name.clone(),
            handle: self.output_handle,
            role: self.role,
            snd_settle_mode: self.snd_settle_mode,
            rcv_settle_mode: self.rcv_settle_mode,
            source: self.source.clone(),
            target: self.target.clone(),
            unsettled: None,
            incomplete_unsettled: false,
            initial_delivery_count: match self.role {
                Role::Sender => Some(self.flow.initial_delivery_count),
                Role::Receiver => None,
            },
            max_message_size: self.max_message_size,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
        }
    }

    pub fn detach_frame(&self, closed: bool, error: Option<definitions::Error>) -> Detach {
        Detach {
            handle: self.output_handle,
            closed,
            error,
        }
    }

    /// Adopts the fields of the peer's attach
    pub fn on_remote_attach(&mut self, attach: &Attach) {
        self.input_handle = Some(attach.handle);
        self.remote_max_message_size = attach.max_message_size.filter(|max| *max > 0);
        match self.role {
            Role::Sender => {
                // The receiver decides the settle mode on its end and where messages land
                self.rcv_settle_mode = attach.rcv_settle_mode;
                if attach.target.is_some() {
                    self.target = attach.target.clone();
                }
            }
            Role::Receiver => {
                self.snd_settle_mode = attach.snd_settle_mode;
                if attach.source.is_some() {
                    self.source = attach.source.clone();
                }
                let initial = attach.initial_delivery_count.unwrap_or(0);
                self.flow.initial_delivery_count = initial;
                self.flow.delivery_count = initial;
            }
        }
    }

    /// Whether the peer answered without the terminus it is responsible for
    pub fn is_refused(&self, attach: &Attach) -> bool {
        match self.role {
            Role::Sender => attach.target.is_none(),
            Role::Receiver => attach.source.is_none(),
        }
    }

    /// Whether a sender would settle this delivery before sending it
    pub fn presettle(&self, requested: Option<bool>) -> bool {
        match self.snd_settle_mode {
            SenderSettleMode::Settled => true,
            SenderSettleMode::Unsettled => false,
            SenderSettleMode::Mixed => requested.unwrap_or(false),
        }
    }

    pub fn next_delivery_tag(&mut self) -> Bytes {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        Bytes::copy_from_slice(&tag.to_be_bytes())
    }

    /// Assembles an incoming transfer frame on a receiver link
    ///
    /// On error the partial delivery is dropped and every frame it held is reported.
    pub fn on_transfer(
        &mut self,
        transfer: &Transfer,
        payload: &Payload,
    ) -> Result<TransferProgress, TransferError> {
        if self.role != Role::Receiver {
            return Err(TransferError::new(
                definitions::Error::with_description(
                    AmqpError::NotAllowed,
                    "transfer received on a sending link",
                ),
                1,
            ));
        }

        let incomplete = match self.incomplete.take() {
            Some(mut incomplete) => match incomplete.append(transfer, payload) {
                Ok(()) => incomplete,
                Err(error) => return Err(TransferError::new(error, incomplete.frames + 1)),
            },
            None => {
                let incomplete = IncompleteTransfer::first(transfer, payload)
                    .map_err(|error| TransferError::new(error, 1))?;
                if self.flow.consume_receiver().is_err() {
                    return Err(TransferError::new(
                        definitions::Error::with_description(
                            LinkError::TransferLimitExceeded,
                            "transfer received without link credit",
                        ),
                        1,
                    ));
                }
                incomplete
            }
        };

        if transfer.aborted {
            return Ok(TransferProgress::Aborted {
                frames: incomplete.frames,
            });
        }

        if let Err(error) = incomplete.ensure_within(self.max_message_size) {
            return Err(TransferError::new(error, incomplete.frames));
        }

        if transfer.more {
            self.incomplete = Some(incomplete);
            return Ok(TransferProgress::Incomplete);
        }

        Ok(TransferProgress::Complete(incomplete.into_delivery(self.id)))
    }

    /// Drops the frames of a partially received delivery
    pub fn take_incomplete_frames(&mut self) -> u32 {
        self.incomplete.take().map(|i| i.frames).unwrap_or(0)
    }

    /// Gives up on the unwritten frames of an outgoing delivery
    pub fn abandon_outgoing(&mut self, error: &LinkStateError) {
        if let Some(written) = self.outgoing.take().and_then(|pending| pending.written) {
            let _ = written.send(Err(SendError::State(error.clone())));
        }
    }

    /// Fails every pending operation on the link
    pub fn fail(&mut self, error: LinkStateError) {
        self.abandon_outgoing(&error);
        if let Some(responder) = self.attach_responder.take() {
            let err = match &error {
                LinkStateError::RemoteDetached(err) => AttachError::RemoteDetached(err.clone()),
                other => AttachError::State(other.clone()),
            };
            let _ = responder.send(Err(err));
        }
        if let Some(responder) = self.detach_responder.take() {
            let _ = responder.send(Err(DetachError::State(error.clone())));
        }
        if let Some(deliveries) = self.deliveries.take() {
            let _ = deliveries.send(Err(RecvError::State(error.clone())));
        }
        self.failure = Some(error);
        self.notify.notify_one();
    }

    /// The state error reported to operations once the link is unusable
    pub fn state_error(&self) -> LinkStateError {
        self.failure.clone().unwrap_or(LinkStateError::IllegalState)
    }
}
