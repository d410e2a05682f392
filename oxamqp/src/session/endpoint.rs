//! The session state machine
//!
//! A [`SessionEndpoint`] is shared between the connection engine, which feeds it the frames
//! received on its channel, and the application handles, which call into it to attach links,
//! send transfers and settle deliveries. Every call runs to completion under the session lock
//! and hands the frames it produces to the connection's [`FrameWriter`].

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use bytes::Bytes;
use oxamqp_codec::primitives::{Array, Symbol};
use oxamqp_types::{
    definitions::{
        self, serial, AmqpError, ConnectionError, DeliveryNumber, Handle, ReceiverSettleMode,
        Role, SessionError, TransferNumber,
    },
    messaging::{Accepted, DeliveryState, Outcome},
    performatives::{Attach, Begin, Detach, Disposition, End, Flow, Transfer},
    states::SessionState,
};
use parking_lot::Mutex;
use slab::Slab;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, trace, warn};

use crate::{
    frames::{
        amqp::{Frame, FrameBody},
        FRAME_HEADER_SIZE,
    },
    link::{
        delivery::{contiguous_ranges, DeliveryFut, OutcomeSender},
        state::{LinkFlow, LinkState},
        AttachError, CreditMode, DeliveryReceiver, DetachError, DispositionError, LinkConfig,
        LinkEndpoint, LinkStateError, PendingTransfer, SendError, Sendable, TransferError,
        TransferProgress, DEFAULT_CREDIT,
    },
    transport::FrameWriter,
    Payload,
};

use super::error::{BeginError, Error};

pub(crate) type SharedSession = Arc<Mutex<SessionEndpoint>>;

/// Session parameters chosen by the local application
#[derive(Debug, Clone)]
pub(crate) struct SessionConfig {
    pub next_outgoing_id: TransferNumber,
    pub incoming_window: u32,
    pub outgoing_window: u32,
    pub handle_max: u32,
    pub offered_capabilities: Option<Array<Symbol>>,
    pub desired_capabilities: Option<Array<Symbol>>,
}

/// A link attached by the peer, waiting to be picked up by the application
#[derive(Debug)]
pub(crate) enum IncomingLink {
    Sender {
        key: usize,
        id: u64,
        name: String,
        notify: Arc<Notify>,
    },
    Receiver {
        key: usize,
        id: u64,
        name: String,
        deliveries: DeliveryReceiver,
    },
}

/// What the application gets back when it attaches a link
#[derive(Debug)]
pub(crate) struct AttachedLink {
    pub key: usize,
    pub id: u64,
    pub notify: Arc<Notify>,
    pub deliveries: Option<DeliveryReceiver>,
    pub attached: oneshot::Receiver<Result<(), AttachError>>,
}

/// Protocol violations found while handling a frame, by the scope they terminate
#[derive(Debug)]
enum Violation {
    Connection(definitions::Error),
    Session(definitions::Error),
    Link {
        key: usize,
        error: definitions::Error,
        /// Frames of the failed delivery to give back to the incoming window
        frames: u32,
    },
}

#[derive(Debug)]
struct UnsettledOutgoing {
    link_key: usize,
    responder: OutcomeSender,
}

#[derive(Debug)]
struct UnsettledIncoming {
    link_key: usize,
    mode: ReceiverSettleMode,
    /// A non-settling disposition was sent, the sender is expected to settle
    awaiting_settle: bool,
}

#[derive(Debug)]
pub(crate) struct SessionEndpoint {
    pub(crate) local_state: SessionState,
    pub(crate) outgoing_channel: u16,
    pub(crate) incoming_channel: Option<u16>,
    writer: FrameWriter,
    /// The peer's max-frame-size
    max_frame_size: usize,

    initial_outgoing_id: TransferNumber,
    next_outgoing_id: TransferNumber,
    incoming_window_limit: u32,
    incoming_window: u32,
    outgoing_window_limit: u32,
    /// Transfer frames that may still be sent before the outgoing window is re-advertised
    outgoing_window: u32,
    handle_max: u32,
    offered_capabilities: Option<Array<Symbol>>,
    desired_capabilities: Option<Array<Symbol>>,

    next_incoming_id: Option<TransferNumber>,
    remote_incoming_window: u32,
    remote_outgoing_window: u32,
    remote_handle_max: u32,
    /// Transfer frames handed to the application since the last session flow
    consumed_since_flow: u32,

    links: Slab<LinkEndpoint>,
    link_by_name: HashMap<String, usize>,
    link_by_input_handle: HashMap<u32, usize>,
    next_link_id: u64,

    outgoing_unsettled: HashMap<DeliveryNumber, UnsettledOutgoing>,
    incoming_unsettled: HashMap<DeliveryNumber, UnsettledIncoming>,

    begin_responder: Option<oneshot::Sender<Result<(), BeginError>>>,
    end_responder: Option<oneshot::Sender<Result<(), Error>>>,
    incoming_links: Option<mpsc::UnboundedSender<IncomingLink>>,

    /// Error this session ended with locally
    pub(crate) local_error: Option<definitions::Error>,
    /// Error carried by the peer's end
    pub(crate) remote_error: Option<definitions::Error>,
}

impl SessionEndpoint {
    fn new(
        outgoing_channel: u16,
        config: SessionConfig,
        writer: FrameWriter,
        max_frame_size: usize,
        incoming_links: mpsc::UnboundedSender<IncomingLink>,
    ) -> Self {
        Self {
            local_state: SessionState::Unmapped,
            outgoing_channel,
            incoming_channel: None,
            writer,
            max_frame_size,
            initial_outgoing_id: config.next_outgoing_id,
            next_outgoing_id: config.next_outgoing_id,
            incoming_window_limit: config.incoming_window,
            incoming_window: config.incoming_window,
            outgoing_window_limit: config.outgoing_window,
            outgoing_window: config.outgoing_window,
            handle_max: config.handle_max,
            offered_capabilities: config.offered_capabilities,
            desired_capabilities: config.desired_capabilities,
            next_incoming_id: None,
            remote_incoming_window: 0,
            remote_outgoing_window: 0,
            remote_handle_max: 0,
            consumed_since_flow: 0,
            links: Slab::new(),
            link_by_name: HashMap::new(),
            link_by_input_handle: HashMap::new(),
            next_link_id: 0,
            outgoing_unsettled: HashMap::new(),
            incoming_unsettled: HashMap::new(),
            begin_responder: None,
            end_responder: None,
            incoming_links: Some(incoming_links),
            local_error: None,
            remote_error: None,
        }
    }

    /// Creates a locally initiated session and sends its begin
    pub(crate) fn begin_local(
        outgoing_channel: u16,
        config: SessionConfig,
        writer: FrameWriter,
        max_frame_size: usize,
    ) -> (
        SharedSession,
        oneshot::Receiver<Result<(), BeginError>>,
        mpsc::UnboundedReceiver<IncomingLink>,
    ) {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let (responder, begun) = oneshot::channel();
        let session = Arc::new(Mutex::new(Self::new(
            outgoing_channel,
            config,
            writer,
            max_frame_size,
            links_tx,
        )));
        {
            let mut endpoint = session.lock();
            let begin = endpoint.begin_frame(None);
            endpoint.send(FrameBody::Begin(begin));
            endpoint.local_state = SessionState::BeginSent;
            endpoint.begin_responder = Some(responder);
        }
        (session, begun, links_rx)
    }

    /// Accepts a session begun by the peer and replies with a begin
    pub(crate) fn begin_remote(
        outgoing_channel: u16,
        incoming_channel: u16,
        remote_begin: &Begin,
        config: SessionConfig,
        writer: FrameWriter,
        max_frame_size: usize,
    ) -> (SharedSession, mpsc::UnboundedReceiver<IncomingLink>) {
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Mutex::new(Self::new(
            outgoing_channel,
            config,
            writer,
            max_frame_size,
            links_tx,
        )));
        {
            let mut endpoint = session.lock();
            endpoint.local_state = SessionState::BeginReceived;
            endpoint.incoming_channel = Some(incoming_channel);
            endpoint.apply_remote_begin(remote_begin);
            let begin = endpoint.begin_frame(Some(incoming_channel));
            endpoint.send(FrameBody::Begin(begin));
            endpoint.local_state = SessionState::Mapped;
        }
        (session, links_rx)
    }

    fn begin_frame(&self, remote_channel: Option<u16>) -> Begin {
        Begin {
            remote_channel,
            next_outgoing_id: self.next_outgoing_id,
            incoming_window: self.incoming_window,
            outgoing_window: self.outgoing_window,
            handle_max: Handle(self.handle_max),
            offered_capabilities: self.offered_capabilities.clone(),
            desired_capabilities: self.desired_capabilities.clone(),
            properties: None,
        }
    }

    fn apply_remote_begin(&mut self, begin: &Begin) {
        self.next_incoming_id = Some(begin.next_outgoing_id);
        self.remote_incoming_window = begin.incoming_window;
        self.remote_outgoing_window = begin.outgoing_window;
        self.remote_handle_max = begin.handle_max.0;
    }

    fn send(&self, body: FrameBody) {
        if let Err(err) = self.writer.submit(Frame::new(self.outgoing_channel, body)) {
            debug!(channel = self.outgoing_channel, %err, "frame dropped");
        }
    }

    fn session_flow(&self) -> Flow {
        Flow {
            next_incoming_id: self.next_incoming_id,
            incoming_window: self.incoming_window,
            next_outgoing_id: self.next_outgoing_id,
            outgoing_window: self.outgoing_window,
            ..Default::default()
        }
    }

    fn send_session_flow(&self) {
        let flow = self.session_flow();
        self.send(FrameBody::Flow(flow));
    }

    fn send_link_flow(&self, key: usize, echo: bool) {
        let link = match self.links.get(key) {
            Some(link) => link,
            None => return,
        };
        let LinkFlow {
            handle,
            delivery_count,
            link_credit,
            available,
            drain,
            echo,
            properties,
        } = link.flow.as_link_flow(link.output_handle, echo);
        let flow = Flow {
            handle: Some(handle),
            delivery_count,
            link_credit,
            available,
            drain,
            echo,
            properties,
            ..self.session_flow()
        };
        self.send(FrameBody::Flow(flow));
    }

    fn is_mapped(&self) -> bool {
        matches!(self.local_state, SessionState::Mapped)
    }

    /// Error reported to link operations once the session is unusable
    fn ended_error(&self) -> LinkStateError {
        LinkStateError::SessionEnded(self.local_error.clone().or_else(|| self.remote_error.clone()))
    }

    fn link_mut(&mut self, key: usize, id: u64) -> Option<&mut LinkEndpoint> {
        self.links.get_mut(key).filter(|link| link.id == id)
    }

    /* --------------------------------- incoming frames --------------------------------- */

    /// Handles the peer's begin answering a locally initiated session
    pub(crate) fn on_begin(&mut self, incoming_channel: u16, begin: &Begin) {
        self.incoming_channel = Some(incoming_channel);
        self.apply_remote_begin(begin);
        if self.local_state == SessionState::BeginSent {
            self.local_state = SessionState::Mapped;
            if let Some(responder) = self.begin_responder.take() {
                let _ = responder.send(Ok(()));
            }
        }
    }

    /// Dispatches a frame received on this session's channel
    ///
    /// An `Err` is a violation that must close the connection.
    pub(crate) fn on_frame(&mut self, body: FrameBody) -> Result<(), definitions::Error> {
        trace!(channel = self.incoming_channel, frame = ?body, "RECV");

        let result = match self.local_state {
            SessionState::Mapped => self.on_mapped_frame(body),
            SessionState::EndSent | SessionState::Discarding => match body {
                FrameBody::End(end) => {
                    self.on_end(end);
                    Ok(())
                }
                // Frames crossing our end are discarded
                _ => Ok(()),
            },
            _ => match body {
                FrameBody::End(end) => {
                    self.on_end(end);
                    Ok(())
                }
                other => Err(Violation::Connection(definitions::Error::with_description(
                    AmqpError::IllegalState,
                    format!("{} received on an unmapped session", other.name()),
                ))),
            },
        };

        match result {
            Ok(()) => Ok(()),
            Err(Violation::Connection(error)) => Err(error),
            Err(Violation::Session(error)) => {
                self.end_with_error(error);
                Ok(())
            }
            Err(Violation::Link { key, error, frames }) => {
                self.detach_with_error(key, error, frames);
                Ok(())
            }
        }
    }

    fn on_mapped_frame(&mut self, body: FrameBody) -> Result<(), Violation> {
        match body {
            FrameBody::Attach(attach) => self.on_attach(attach),
            FrameBody::Flow(flow) => self.on_flow(flow),
            FrameBody::Transfer {
                performative,
                payload,
            } => self.on_transfer(performative, payload),
            FrameBody::Disposition(disposition) => self.on_disposition(disposition),
            FrameBody::Detach(detach) => self.on_detach(detach),
            FrameBody::End(end) => {
                self.on_end(end);
                Ok(())
            }
            other => Err(Violation::Connection(definitions::Error::with_description(
                AmqpError::IllegalState,
                format!("{} is not a session frame", other.name()),
            ))),
        }
    }

    fn on_attach(&mut self, attach: Attach) -> Result<(), Violation> {
        let input = attach.handle;
        if input.0 > self.handle_max {
            return Err(Violation::Connection(definitions::Error::with_description(
                ConnectionError::FramingError,
                format!("handle {} exceeds handle-max {}", input.0, self.handle_max),
            )));
        }
        if self.link_by_input_handle.contains_key(&input.0) {
            return Err(Violation::Session(definitions::Error::with_description(
                SessionError::HandleInUse,
                format!("handle {} is already attached", input.0),
            )));
        }

        match self.link_by_name.get(&attach.name).copied() {
            Some(key) => self.on_attach_reply(key, attach),
            None => self.on_peer_attach(attach),
        }
    }

    /// The peer's attach answers one sent locally
    fn on_attach_reply(&mut self, key: usize, attach: Attach) -> Result<(), Violation> {
        let link = match self.links.get_mut(key) {
            Some(link) => link,
            None => return Ok(()),
        };
        if link.state != LinkState::AttachSent || link.role == attach.role {
            return Err(Violation::Session(definitions::Error::with_description(
                AmqpError::IllegalState,
                format!("unexpected attach for link {}", attach.name),
            )));
        }

        link.on_remote_attach(&attach);
        self.link_by_input_handle.insert(attach.handle.0, key);

        if link.is_refused(&attach) {
            // The peer follows up with a detach, which frees the entry
            link.state = LinkState::AttachReceived;
            link.dropped = true;
            if let Some(responder) = link.attach_responder.take() {
                let _ = responder.send(Err(AttachError::Refused));
            }
            return Ok(());
        }

        link.state = LinkState::Attached;
        if let Some(responder) = link.attach_responder.take() {
            let _ = responder.send(Ok(()));
        }
        debug!(name = %link.name, handle = link.output_handle.0, "attached");

        if link.dropped {
            let detach = link.detach_frame(true, None);
            link.state = LinkState::DetachSent;
            self.send(FrameBody::Detach(detach));
        } else if link.role == Role::Receiver && link.flow.link_credit > 0 {
            self.send_link_flow(key, false);
        }
        Ok(())
    }

    /// The peer initiates a link, which is accepted with the mirrored role
    fn on_peer_attach(&mut self, attach: Attach) -> Result<(), Violation> {
        let key = self.links.vacant_key();
        if key as u64 > self.remote_handle_max as u64 {
            return Err(Violation::Session(definitions::Error::with_description(
                AmqpError::ResourceLimitExceeded,
                "no local handle available",
            )));
        }

        let role = attach.role.opposite();
        let config = LinkConfig {
            name: attach.name.clone(),
            role,
            snd_settle_mode: attach.snd_settle_mode,
            rcv_settle_mode: attach.rcv_settle_mode,
            source: attach.source.clone(),
            target: attach.target.clone(),
            max_message_size: None,
            initial_delivery_count: 0,
            credit_mode: CreditMode::Auto(DEFAULT_CREDIT),
        };
        let id = self.allocate_link_id();
        let mut link = LinkEndpoint::new(id, Handle(key as u32), config);
        link.on_remote_attach(&attach);
        link.state = LinkState::Attached;

        let info = match role {
            Role::Sender => IncomingLink::Sender {
                key,
                id,
                name: attach.name.clone(),
                notify: link.notify.clone(),
            },
            Role::Receiver => {
                let (tx, rx) = mpsc::unbounded_channel();
                link.deliveries = Some(tx);
                IncomingLink::Receiver {
                    key,
                    id,
                    name: attach.name.clone(),
                    deliveries: rx,
                }
            }
        };

        self.send(FrameBody::Attach(link.attach_frame()));
        let inserted = self.links.insert(link);
        debug_assert_eq!(inserted, key);
        self.link_by_name.insert(attach.name.clone(), key);
        self.link_by_input_handle.insert(attach.handle.0, key);
        debug!(name = %attach.name, ?role, "remote link attached");

        if role == Role::Receiver {
            self.send_link_flow(key, false);
        }

        let delivered = match &self.incoming_links {
            Some(tx) => tx.send(info).is_ok(),
            None => false,
        };
        if !delivered {
            self.release_link(key, id);
        }
        Ok(())
    }

    fn on_flow(&mut self, flow: Flow) -> Result<(), Violation> {
        // The peer's incoming window as of the frames it had seen when it sent the flow
        let next_incoming_id = flow.next_incoming_id.unwrap_or(self.initial_outgoing_id);
        let unseen = self.next_outgoing_id.wrapping_sub(next_incoming_id);
        self.remote_incoming_window = flow.incoming_window.saturating_sub(unseen);
        self.remote_outgoing_window = flow.outgoing_window;

        let flow = match LinkFlow::try_from(flow) {
            Ok(flow) => flow,
            Err(flow) => {
                self.flush_outgoing();
                self.notify_senders();
                if flow.echo {
                    self.send_session_flow();
                }
                return Ok(());
            }
        };

        let key = self.input_link(flow.handle)?;
        let reply = match self.links.get_mut(key) {
            Some(link) => match link.role {
                Role::Sender => {
                    let reply = link.flow.on_sender_flow(&flow);
                    link.notify.notify_one();
                    reply
                }
                Role::Receiver => link.flow.on_receiver_flow(&flow),
            },
            None => false,
        };
        self.flush_outgoing();
        self.notify_senders();
        if reply {
            self.send_link_flow(key, false);
        }
        Ok(())
    }

    fn notify_senders(&self) {
        if self.remote_incoming_window == 0 {
            return;
        }
        for (_, link) in self.links.iter() {
            if link.role == Role::Sender && link.flow.link_credit > 0 {
                link.notify.notify_one();
            }
        }
    }

    fn input_link(&self, handle: Handle) -> Result<usize, Violation> {
        self.link_by_input_handle
            .get(&handle.0)
            .copied()
            .ok_or_else(|| {
                Violation::Session(definitions::Error::with_description(
                    SessionError::UnattachedHandle,
                    format!("handle {} is not attached", handle.0),
                ))
            })
    }

    fn on_transfer(&mut self, transfer: Transfer, payload: Payload) -> Result<(), Violation> {
        if self.incoming_window == 0 {
            return Err(Violation::Session(definitions::Error::with_description(
                SessionError::WindowViolation,
                "transfer received with a closed incoming window",
            )));
        }
        if self.remote_outgoing_window == 0 {
            return Err(Violation::Session(definitions::Error::with_description(
                SessionError::WindowViolation,
                "transfer received beyond the peer's outgoing window",
            )));
        }
        self.incoming_window -= 1;
        self.next_incoming_id = self.next_incoming_id.map(|id| id.wrapping_add(1));
        self.remote_outgoing_window = self.remote_outgoing_window.saturating_sub(1);

        let key = self.input_link(transfer.handle)?;
        let link = match self.links.get_mut(key) {
            Some(link) => link,
            None => return Ok(()),
        };
        if !link.state.is_attached() {
            // Frames racing a detach are dropped
            self.restore_incoming_window(1);
            return Ok(());
        }

        let progress = link
            .on_transfer(&transfer, &payload)
            .map_err(|TransferError { error, frames }| Violation::Link { key, error, frames })?;
        let consumed = match progress {
            TransferProgress::Incomplete => 0,
            TransferProgress::Aborted { frames } => frames,
            TransferProgress::Complete(delivery) => {
                let frames = delivery.frames;
                if !delivery.settled {
                    let mode = transfer.rcv_settle_mode.unwrap_or(link.rcv_settle_mode);
                    self.incoming_unsettled.insert(
                        delivery.delivery_id,
                        UnsettledIncoming {
                            link_key: key,
                            mode,
                            awaiting_settle: false,
                        },
                    );
                }
                let delivered = link
                    .deliveries
                    .as_ref()
                    .map(|tx| tx.send(Ok(delivery)).is_ok())
                    .unwrap_or(false);
                if delivered {
                    0
                } else {
                    frames
                }
            }
        };
        if consumed > 0 {
            self.restore_incoming_window(consumed);
        }
        Ok(())
    }

    fn on_disposition(&mut self, disposition: Disposition) -> Result<(), Violation> {
        let first = disposition.first;
        let last = disposition.last_id();

        match disposition.role {
            // The peer's receiver settles or updates our outgoing deliveries
            Role::Receiver => {
                let terminal = disposition
                    .state
                    .as_ref()
                    .map(DeliveryState::is_terminal)
                    .unwrap_or(false);
                if !disposition.settled && !terminal {
                    return Ok(());
                }

                let ids: Vec<DeliveryNumber> = self
                    .outgoing_unsettled
                    .keys()
                    .copied()
                    .filter(|id| serial::in_range(*id, first, last))
                    .collect();
                let mut settle_back = false;
                for id in ids {
                    if let Some(unsettled) = self.outgoing_unsettled.remove(&id) {
                        let outcome = match disposition.state.clone().map(Outcome::try_from) {
                            Some(Ok(outcome)) => Ok(outcome),
                            _ => Err(SendError::IllegalDeliveryState),
                        };
                        let _ = unsettled.responder.send(outcome);
                        settle_back |= !disposition.settled;
                    }
                }

                // The receiver settles second, settling here completes the delivery
                if settle_back {
                    self.send(FrameBody::Disposition(Disposition {
                        role: Role::Sender,
                        first,
                        last: disposition.last,
                        settled: true,
                        state: disposition.state,
                        batchable: false,
                    }));
                }
            }
            // The peer's sender settles deliveries we received
            Role::Sender => {
                if disposition.settled {
                    self.incoming_unsettled
                        .retain(|id, _| !serial::in_range(*id, first, last));
                }
            }
        }
        Ok(())
    }

    fn on_detach(&mut self, detach: Detach) -> Result<(), Violation> {
        let key = self.input_link(detach.handle)?;
        self.link_by_input_handle.remove(&detach.handle.0);

        let link = match self.links.get_mut(key) {
            Some(link) => link,
            None => return Ok(()),
        };
        match link.state {
            LinkState::DetachSent => {
                link.state = LinkState::Detached;
                let result = match detach.error.clone() {
                    Some(error) => Err(DetachError::Remote(error)),
                    None => Ok(()),
                };
                if let Some(responder) = link.detach_responder.take() {
                    let _ = responder.send(result);
                }
                link.failure.get_or_insert(LinkStateError::Detached);
                link.notify.notify_one();
                debug!(name = %link.name, "detached");
            }
            _ => {
                link.state = LinkState::DetachReceived;
                let reply = link.detach_frame(detach.closed, None);
                self.send(FrameBody::Detach(reply));
                let link = match self.links.get_mut(key) {
                    Some(link) => link,
                    None => return Ok(()),
                };
                link.state = LinkState::Detached;
                if let Some(error) = &detach.error {
                    warn!(name = %link.name, %error, "remote detached");
                }
                link.fail(LinkStateError::RemoteDetached(detach.error));
            }
        }

        let dropped = self.links.get(key).map(|link| link.dropped).unwrap_or(false);
        self.unregister_link(key);
        if dropped {
            self.remove_link(key);
        }
        Ok(())
    }

    fn on_end(&mut self, end: End) {
        match self.local_state {
            SessionState::EndSent | SessionState::Discarding => {
                self.local_state = SessionState::Unmapped;
                if let Some(responder) = self.end_responder.take() {
                    let result = match (&self.local_error, &end.error) {
                        (Some(error), _) => Err(Error::LocalError(error.clone())),
                        (None, Some(error)) => Err(Error::RemoteEnded(error.clone())),
                        (None, None) => Ok(()),
                    };
                    let _ = responder.send(result);
                }
                self.remote_error = end.error;
                let error = self.ended_error();
                self.fail_all(error);
            }
            _ => {
                self.local_state = SessionState::EndReceived;
                self.send(FrameBody::End(End { error: None }));
                self.local_state = SessionState::Unmapped;
                if let Some(error) = &end.error {
                    warn!(channel = self.outgoing_channel, %error, "remote ended");
                }
                if let Some(responder) = self.begin_responder.take() {
                    let _ = responder.send(Err(BeginError::RemoteEnded(end.error.clone())));
                }
                self.remote_error = end.error;
                let error = self.ended_error();
                self.fail_all(error);
            }
        }
        debug!(channel = self.outgoing_channel, "Unmapped");
    }

    /* --------------------------------- local violations -------------------------------- */

    fn end_with_error(&mut self, error: definitions::Error) {
        error!(channel = self.outgoing_channel, %error, "ending session");
        if matches!(
            self.local_state,
            SessionState::Mapped | SessionState::BeginSent
        ) {
            self.send(FrameBody::End(End {
                error: Some(error.clone()),
            }));
            self.local_state = SessionState::Discarding;
        }
        self.local_error = Some(error);
        let error = self.ended_error();
        self.fail_all(error);
    }

    fn detach_with_error(&mut self, key: usize, error: definitions::Error, frames: u32) {
        let link = match self.links.get_mut(key) {
            Some(link) => link,
            None => return,
        };
        error!(name = %link.name, %error, "detaching link");
        let detach = link.detach_frame(true, Some(error.clone()));
        link.state = LinkState::DetachSent;
        let frames = frames + link.take_incomplete_frames();
        link.fail(LinkStateError::LocalDetached(error.clone()));
        self.send(FrameBody::Detach(detach));
        self.fail_link_deliveries(key, LinkStateError::LocalDetached(error));
        if frames > 0 {
            self.restore_incoming_window(frames);
        }
    }

    fn fail_all(&mut self, error: LinkStateError) {
        for (_, link) in self.links.iter_mut() {
            link.state = LinkState::Detached;
            link.fail(error.clone());
        }
        for (_, unsettled) in self.outgoing_unsettled.drain() {
            let _ = unsettled
                .responder
                .send(Err(SendError::State(error.clone())));
        }
        self.incoming_unsettled.clear();
        self.link_by_name.clear();
        self.link_by_input_handle.clear();
        self.incoming_links = None;
    }

    /// The connection stopped before the session ended
    pub(crate) fn on_connection_closed(&mut self) {
        if let Some(responder) = self.begin_responder.take() {
            let _ = responder.send(Err(BeginError::ConnectionClosed));
        }
        if let Some(responder) = self.end_responder.take() {
            let _ = responder.send(Err(Error::ConnectionClosed));
        }
        if self.local_state != SessionState::Unmapped {
            self.local_state = SessionState::Unmapped;
        }
        self.fail_all(LinkStateError::TransportClosed);
    }

    fn fail_link_deliveries(&mut self, key: usize, error: LinkStateError) {
        let ids: Vec<DeliveryNumber> = self
            .outgoing_unsettled
            .iter()
            .filter(|(_, unsettled)| unsettled.link_key == key)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(unsettled) = self.outgoing_unsettled.remove(&id) {
                let _ = unsettled
                    .responder
                    .send(Err(SendError::State(error.clone())));
            }
        }
        self.incoming_unsettled
            .retain(|_, unsettled| unsettled.link_key != key);
    }

    /// Frees the name and input handle of a detached link
    fn unregister_link(&mut self, key: usize) {
        if let Some(link) = self.links.get(key) {
            if self.link_by_name.get(&link.name) == Some(&key) {
                self.link_by_name.remove(&link.name);
            }
        }
        self.link_by_input_handle.retain(|_, k| *k != key);
    }

    fn remove_link(&mut self, key: usize) {
        self.unregister_link(key);
        self.fail_link_deliveries(key, LinkStateError::TransportClosed);
        if self.links.contains(key) {
            self.links.remove(key);
        }
    }

    fn allocate_link_id(&mut self) -> u64 {
        let id = self.next_link_id;
        self.next_link_id += 1;
        id
    }

    /// Gives back incoming window for frames the application no longer holds
    ///
    /// Returns `true` if a session flow is due.
    fn restore_incoming_window(&mut self, frames: u32) -> bool {
        self.incoming_window = self
            .incoming_window
            .saturating_add(frames)
            .min(self.incoming_window_limit);
        self.consumed_since_flow = self.consumed_since_flow.saturating_add(frames);
        let due = self.consumed_since_flow >= (self.incoming_window_limit / 2).max(1);
        if due && self.is_mapped() {
            self.consumed_since_flow = 0;
            self.send_session_flow();
        }
        due
    }

    /* -------------------------------- application calls -------------------------------- */

    pub(crate) fn end(
        &mut self,
        error: Option<definitions::Error>,
    ) -> Result<oneshot::Receiver<Result<(), Error>>, Error> {
        let (responder, ended) = oneshot::channel();
        match self.local_state {
            SessionState::Mapped => {
                self.send(FrameBody::End(End { error }));
                self.local_state = SessionState::EndSent;
                self.end_responder = Some(responder);
            }
            SessionState::EndSent | SessionState::Discarding => {
                self.end_responder = Some(responder);
            }
            SessionState::Unmapped => {
                let result = match (&self.local_error, &self.remote_error) {
                    (Some(error), _) => Err(Error::LocalError(error.clone())),
                    (None, Some(error)) => Err(Error::RemoteEnded(error.clone())),
                    (None, None) => Ok(()),
                };
                let _ = responder.send(result);
            }
            _ => return Err(Error::IllegalState),
        }
        Ok(ended)
    }

    /// Ends the session when its handle is dropped
    pub(crate) fn release(&mut self) {
        if self.is_mapped() {
            self.send(FrameBody::End(End { error: None }));
            self.local_state = SessionState::EndSent;
        }
    }

    pub(crate) fn attach(&mut self, config: LinkConfig) -> Result<AttachedLink, AttachError> {
        if !self.is_mapped() {
            return Err(AttachError::IllegalSessionState);
        }
        if self.link_by_name.contains_key(&config.name) {
            return Err(AttachError::DuplicatedLinkName);
        }
        let key = self.links.vacant_key();
        if key as u64 > self.remote_handle_max as u64 {
            return Err(AttachError::HandleMaxReached);
        }

        let id = self.allocate_link_id();
        let role = config.role;
        let mut link = LinkEndpoint::new(id, Handle(key as u32), config);
        let (responder, attached) = oneshot::channel();
        link.attach_responder = Some(responder);
        let deliveries = match role {
            Role::Receiver => {
                let (tx, rx) = mpsc::unbounded_channel();
                link.deliveries = Some(tx);
                Some(rx)
            }
            Role::Sender => None,
        };
        let notify = link.notify.clone();

        self.send(FrameBody::Attach(link.attach_frame()));
        link.state = LinkState::AttachSent;
        self.link_by_name.insert(link.name.clone(), key);
        let inserted = self.links.insert(link);
        debug_assert_eq!(inserted, key);

        Ok(AttachedLink {
            key,
            id,
            notify,
            deliveries,
            attached,
        })
    }

    /// Starts a local detach
    pub(crate) fn detach(
        &mut self,
        key: usize,
        id: u64,
        closed: bool,
        error: Option<definitions::Error>,
    ) -> oneshot::Receiver<Result<(), DetachError>> {
        let (responder, detached) = oneshot::channel();
        let ended = self.ended_error();
        let mapped = self.is_mapped();
        let link = match self.link_mut(key, id) {
            Some(link) => link,
            None => {
                let _ = responder.send(Err(DetachError::State(LinkStateError::IllegalState)));
                return detached;
            }
        };

        match link.state {
            LinkState::Attached | LinkState::AttachReceived if mapped => {
                let detach = link.detach_frame(closed, error);
                link.state = LinkState::DetachSent;
                link.abandon_outgoing(&LinkStateError::Detached);
                link.detach_responder = Some(responder);
                self.send(FrameBody::Detach(detach));
            }
            LinkState::DetachSent => {
                link.detach_responder = Some(responder);
            }
            LinkState::Detached => {
                let result = match link.state_error() {
                    LinkStateError::RemoteDetached(None) => Ok(()),
                    LinkStateError::RemoteDetached(Some(error)) => Err(DetachError::Remote(error)),
                    LinkStateError::Detached | LinkStateError::LocalDetached(_) => Ok(()),
                    other => Err(DetachError::State(other)),
                };
                let _ = responder.send(result);
            }
            _ if !mapped => {
                let _ = responder.send(Err(DetachError::State(ended)));
            }
            _ => {
                let _ = responder.send(Err(DetachError::State(LinkStateError::IllegalState)));
            }
        }
        detached
    }

    /// Detaches the link of a dropped handle and frees its entry once the peer replies
    pub(crate) fn release_link(&mut self, key: usize, id: u64) {
        let mapped = self.is_mapped();
        let link = match self.link_mut(key, id) {
            Some(link) => link,
            None => return,
        };
        link.dropped = true;
        match link.state {
            LinkState::Attached if mapped => {
                let detach = link.detach_frame(true, None);
                link.state = LinkState::DetachSent;
                link.abandon_outgoing(&LinkStateError::Detached);
                self.send(FrameBody::Detach(detach));
            }
            LinkState::AttachSent | LinkState::DetachSent | LinkState::AttachReceived
                if mapped => {}
            _ => self.remove_link(key),
        }
    }

    /// Writes one transfer frame, re-advertising the outgoing window once it is used up
    fn send_transfer(&mut self, performative: Transfer, payload: Payload) {
        if self.outgoing_window == 0 {
            self.outgoing_window = self.outgoing_window_limit.max(1);
            self.send_session_flow();
        }
        self.send(FrameBody::Transfer {
            performative,
            payload,
        });
        self.next_outgoing_id = self.next_outgoing_id.wrapping_add(1);
        self.remote_incoming_window = self.remote_incoming_window.saturating_sub(1);
        self.outgoing_window -= 1;
    }

    /// Writes continuation frames while the peer's incoming window has room
    fn write_continuations(&mut self, handle: Handle, chunks: &mut VecDeque<Payload>) {
        while self.remote_incoming_window > 0 {
            let payload = match chunks.pop_front() {
                Some(payload) => payload,
                None => break,
            };
            self.send_transfer(Transfer::continuation(handle, !chunks.is_empty()), payload);
        }
    }

    /// Resumes deliveries held back by the peer's incoming window
    fn flush_outgoing(&mut self) {
        let keys: Vec<usize> = self
            .links
            .iter()
            .filter(|(_, link)| link.outgoing.is_some())
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            if self.remote_incoming_window == 0 {
                break;
            }
            let (handle, mut pending) = match self.links.get_mut(key) {
                Some(link) if link.state == LinkState::Attached => match link.outgoing.take() {
                    Some(pending) => (link.output_handle, pending),
                    None => continue,
                },
                _ => continue,
            };
            self.write_continuations(handle, &mut pending.chunks);

            let link = match self.links.get_mut(key) {
                Some(link) => link,
                None => continue,
            };
            if pending.chunks.is_empty() {
                trace!(name = %link.name, "delivery written");
                if let Some(written) = pending.written.take() {
                    let _ = written.send(Ok(Outcome::Accepted(Accepted {})));
                }
                link.notify.notify_one();
            } else {
                link.outgoing = Some(pending);
            }
        }
    }

    /// Sends a delivery if link credit and the peer's incoming window allow it
    ///
    /// A delivery needing more frames than the window has room for is written as far as the
    /// window goes and resumed when the peer's flow opens it again. Returns `Ok(None)` when
    /// the sender has to wait.
    pub(crate) fn try_send(
        &mut self,
        key: usize,
        id: u64,
        sendable: &Sendable,
    ) -> Result<Option<DeliveryFut>, SendError> {
        if !self.is_mapped() {
            return Err(SendError::State(self.ended_error()));
        }
        let max_frame_size = self.max_frame_size;
        let remote_incoming_window = self.remote_incoming_window;
        let delivery_id = self.next_outgoing_id;

        let link = self
            .link_mut(key, id)
            .ok_or(SendError::State(LinkStateError::IllegalState))?;
        match link.state {
            LinkState::Attached => {}
            LinkState::AttachSent | LinkState::Unattached => return Ok(None),
            _ => return Err(SendError::State(link.state_error())),
        }

        let size = sendable.payload.len() as u64;
        if let Some(max) = link.remote_max_message_size {
            if size > max {
                return Err(SendError::MessageSizeExceeded { size, max });
            }
        }
        if link.flow.link_credit == 0 || link.outgoing.is_some() || remote_incoming_window == 0 {
            return Ok(None);
        }
        if link.flow.consume_sender().is_err() {
            return Ok(None);
        }

        let settled = link.presettle(sendable.settled);
        let handle = link.output_handle;
        let delivery_tag = link.next_delivery_tag();
        let first = Transfer {
            handle,
            delivery_id: Some(delivery_id),
            delivery_tag: Some(delivery_tag.clone()),
            message_format: Some(sendable.message_format),
            settled: Some(settled),
            more: false,
            rcv_settle_mode: None,
            state: None,
            resume: false,
            aborted: false,
            batchable: false,
        };
        let mut chunks: VecDeque<Payload> =
            split_payload(&first, &sendable.payload, max_frame_size).into();
        let payload = chunks.pop_front().unwrap_or_default();
        let more = !chunks.is_empty();
        self.send_transfer(Transfer { more, ..first }, payload);
        self.write_continuations(handle, &mut chunks);

        let (fut, written) = match (settled, chunks.is_empty()) {
            (true, true) => (DeliveryFut::settled(delivery_id), None),
            (true, false) => {
                let (fut, written) = DeliveryFut::written(delivery_id);
                (fut, Some(written))
            }
            (false, _) => {
                let (fut, responder) = DeliveryFut::unsettled(delivery_id, delivery_tag);
                self.outgoing_unsettled.insert(
                    delivery_id,
                    UnsettledOutgoing {
                        link_key: key,
                        responder,
                    },
                );
                (fut, None)
            }
        };
        if !chunks.is_empty() {
            trace!(delivery_id, remaining = chunks.len(), "waiting for incoming window");
            if let Some(link) = self.links.get_mut(key) {
                link.outgoing = Some(PendingTransfer { chunks, written });
            }
        }
        Ok(Some(fut))
    }

    /// Settles or updates deliveries received on a link
    ///
    /// Ids that are not unsettled anymore are skipped, so disposing a delivery twice only
    /// sends one disposition.
    pub(crate) fn dispose(
        &mut self,
        key: usize,
        id: u64,
        delivery_ids: &[DeliveryNumber],
        state: DeliveryState,
    ) -> Result<(), DispositionError> {
        if !self.is_mapped() {
            if self.link_mut(key, id).is_none() {
                return Err(DispositionError::State(LinkStateError::IllegalState));
            }
            return Ok(());
        }
        if self.link_mut(key, id).is_none() {
            return Err(DispositionError::State(LinkStateError::IllegalState));
        }

        let mut settle_first = Vec::new();
        let mut settle_second = Vec::new();
        for delivery_id in delivery_ids {
            match self.incoming_unsettled.get(delivery_id) {
                Some(unsettled) if unsettled.link_key == key && !unsettled.awaiting_settle => {
                    match unsettled.mode {
                        ReceiverSettleMode::First => settle_first.push(*delivery_id),
                        ReceiverSettleMode::Second => settle_second.push(*delivery_id),
                    }
                }
                _ => {}
            }
        }

        for (first, last) in contiguous_ranges(&settle_first) {
            self.send_disposition(first, last, true, &state);
        }
        for delivery_id in &settle_first {
            self.incoming_unsettled.remove(delivery_id);
        }

        for (first, last) in contiguous_ranges(&settle_second) {
            self.send_disposition(first, last, false, &state);
        }
        for delivery_id in &settle_second {
            if let Some(unsettled) = self.incoming_unsettled.get_mut(delivery_id) {
                unsettled.awaiting_settle = true;
            }
        }
        Ok(())
    }

    fn send_disposition(&self, first: DeliveryNumber, last: DeliveryNumber, settled: bool, state: &DeliveryState) {
        self.send(FrameBody::Disposition(Disposition {
            role: Role::Receiver,
            first,
            last: (last != first).then(|| last),
            settled,
            state: Some(state.clone()),
            batchable: false,
        }));
    }

    /// The application took a delivery out of a receiver
    pub(crate) fn on_delivery_taken(&mut self, key: usize, id: u64, frames: u32) {
        let mapped = self.is_mapped();
        let mut link_flow = false;
        if let Some(link) = self.link_mut(key, id) {
            if let CreditMode::Auto(credit) = link.credit_mode {
                if mapped && link.state.is_attached() && link.flow.link_credit <= credit / 2 {
                    link.flow.link_credit = credit;
                    link_flow = true;
                }
            }
        }

        self.incoming_window = self
            .incoming_window
            .saturating_add(frames)
            .min(self.incoming_window_limit);
        self.consumed_since_flow = self.consumed_since_flow.saturating_add(frames);
        let session_flow = self.consumed_since_flow >= (self.incoming_window_limit / 2).max(1);

        if !mapped {
            return;
        }
        if link_flow {
            // A link flow carries the session fields too
            self.consumed_since_flow = 0;
            self.send_link_flow(key, false);
        } else if session_flow {
            self.consumed_since_flow = 0;
            self.send_session_flow();
        }
    }

    /// Replaces the link credit of a receiver
    ///
    /// A receiver in automatic credit mode keeps it, topping up to the new credit from then on.
    pub(crate) fn set_credit(&mut self, key: usize, id: u64, credit: u32) -> Result<(), DispositionError> {
        self.send_credit(key, id, Some(credit), false)
    }

    /// Asks the sender to use up or give back the remaining credit, leaving the credit mode
    pub(crate) fn drain(&mut self, key: usize, id: u64) -> Result<(), DispositionError> {
        self.send_credit(key, id, None, true)
    }

    fn send_credit(
        &mut self,
        key: usize,
        id: u64,
        credit: Option<u32>,
        drain: bool,
    ) -> Result<(), DispositionError> {
        let mapped = self.is_mapped();
        let ended = self.ended_error();
        let link = self
            .link_mut(key, id)
            .ok_or(DispositionError::State(LinkStateError::IllegalState))?;
        if !mapped {
            return Err(DispositionError::State(ended));
        }
        if !link.state.is_attached() {
            return Err(DispositionError::State(link.state_error()));
        }
        if let Some(credit) = credit {
            if let CreditMode::Auto(_) = link.credit_mode {
                link.credit_mode = CreditMode::Auto(credit);
            }
            link.flow.link_credit = credit;
        }
        link.flow.drain = drain;
        self.send_link_flow(key, false);
        if let Some(link) = self.link_mut(key, id) {
            link.flow.drain = false;
        }
        Ok(())
    }

    /// Switches how a receiver replenishes its credit
    pub(crate) fn set_credit_mode(&mut self, key: usize, id: u64, mode: CreditMode) -> Result<(), DispositionError> {
        let link = self
            .link_mut(key, id)
            .ok_or(DispositionError::State(LinkStateError::IllegalState))?;
        link.credit_mode = mode;
        Ok(())
    }

    /// Current link credit of a link
    pub(crate) fn link_credit(&self, key: usize, id: u64) -> Option<u32> {
        self.links
            .get(key)
            .filter(|link| link.id == id)
            .map(|link| link.flow.link_credit)
    }

    /// Current state of a link
    pub(crate) fn link_state(&self, key: usize, id: u64) -> Option<LinkState> {
        self.links
            .get(key)
            .filter(|link| link.id == id)
            .map(|link| link.state)
    }
}

// a transfer that cannot be encoded is rejected by the frame encoder
fn encoded_len(transfer: &Transfer) -> usize {
    oxamqp_codec::to_bytes(transfer).map_or(0, |buf| buf.len())
}

/// Splits a payload into the chunks carried by each transfer frame of a delivery
fn split_payload(first: &Transfer, payload: &Payload, max_frame_size: usize) -> Vec<Payload> {
    let mut more = first.clone();
    more.more = true;
    more.delivery_tag = Some(Bytes::from_static(&[0u8; 8]));
    let first_overhead = FRAME_HEADER_SIZE + encoded_len(&more);

    let continuation = Transfer::continuation(first.handle, true);
    let continuation_overhead = FRAME_HEADER_SIZE + encoded_len(&continuation);

    let mut remaining = payload.clone();
    let mut chunks = Vec::new();
    let mut capacity = max_frame_size.saturating_sub(first_overhead).max(1);
    loop {
        if remaining.len() <= capacity {
            chunks.push(remaining);
            break;
        }
        chunks.push(remaining.split_to(capacity));
        capacity = max_frame_size.saturating_sub(continuation_overhead).max(1);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use oxamqp_types::{definitions::Handle, performatives::Transfer};

    use super::split_payload;

    fn transfer() -> Transfer {
        Transfer {
            handle: Handle(1),
            delivery_id: Some(7),
            delivery_tag: None,
            message_format: Some(0),
            settled: Some(false),
            more: false,
            rcv_settle_mode: None,
            state: None,
            resume: false,
            aborted: false,
            batchable: false,
        }
    }

    #[test]
    fn small_payload_fits_one_frame() {
        let payload = Bytes::from(vec![1u8; 100]);
        let chunks = split_payload(&transfer(), &payload, 512);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 100);
    }

    #[test]
    fn large_payload_is_split_within_frame_size() {
        let payload = Bytes::from(vec![1u8; 2000]);
        let chunks = split_payload(&transfer(), &payload, 512);
        assert!(chunks.len() >= 4);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 2000);
        assert!(chunks.iter().all(|c| c.len() < 512));
    }

    #[test]
    fn empty_payload_still_sends_a_frame() {
        let chunks = split_payload(&transfer(), &Bytes::new(), 512);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }
}
