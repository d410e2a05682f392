//! Implements AMQP1.0 Connection

use std::{collections::HashMap, sync::Arc};

use oxamqp_types::{
    definitions::{self, AmqpError, ConnectionError},
    performatives::{Begin, Close, Open},
    states::{ConnectionState, SessionState},
};
use parking_lot::Mutex;
use slab::Slab;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, trace};

use crate::{
    control::ConnectionControl,
    frames::amqp::{Frame, FrameBody},
    session::{
        endpoint::{IncomingLink, SessionConfig, SessionEndpoint, SharedSession},
        BeginError, Builder as SessionBuilder, SessionHandle,
    },
    transport::FrameWriter,
};

mod builder;
pub use builder::*;

pub(crate) mod engine;

mod error;
pub mod heartbeat;
pub use error::*;

/// Default max-frame-size
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 256 * 1024;

/// Default channel-max
pub const DEFAULT_CHANNEL_MAX: u16 = 255;

pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// A session begun by the peer, waiting to be picked up by the application
#[derive(Debug)]
pub(crate) struct IncomingSession {
    session: SharedSession,
    incoming_links: mpsc::UnboundedReceiver<IncomingLink>,
}

/// An AMQP 1.0 Connection.
///
/// The connection endpoint is owned by its event loop and reached through a
/// [`ConnectionHandle`].
///
/// ```rust, ignore
/// let mut connection = Connection::builder()
///     .container_id("connection-1")
///     .max_frame_size(4096)
///     .channel_max(64)
///     .idle_time_out(50_000)
///     .open("amqp://localhost:5672")
///     .await?;
/// ```
///
/// ## Default configuration
///
/// | Field | Default Value |
/// |-------|---------------|
/// |`max_frame_size`| [`DEFAULT_MAX_FRAME_SIZE`] |
/// |`channel_max`| [`DEFAULT_CHANNEL_MAX`] |
/// |`idle_time_out`| `None` |
#[derive(Debug)]
pub struct Connection {
    local_state: ConnectionState,
    local_open: Open,
    remote_open: Option<Open>,
    writer: FrameWriter,

    /// The smaller of both channel-max values
    channel_max: u16,
    /// The peer's max-frame-size, limit of every outgoing frame
    max_frame_size: usize,

    /// Indexed by outgoing channel
    sessions: Slab<SharedSession>,
    session_by_incoming_channel: HashMap<u16, usize>,
    incoming_sessions: mpsc::UnboundedSender<IncomingSession>,

    local_error: Option<definitions::Error>,
    remote_error: Option<definitions::Error>,
}

impl Connection {
    /// Creates a builder for [`Connection`]
    pub fn builder() -> Builder<crate::util::Uninitialized> {
        Builder::new()
    }

    /// Opens a connection with the default configuration
    pub async fn open(
        container_id: impl Into<String>,
        url: impl TryInto<url::Url, Error = url::ParseError>,
    ) -> Result<ConnectionHandle, OpenError> {
        Builder::new().container_id(container_id).open(url).await
    }

    pub(crate) fn new(
        local_open: Open,
        remote_open: Open,
        writer: FrameWriter,
    ) -> (Self, mpsc::UnboundedReceiver<IncomingSession>) {
        let (incoming_sessions, incoming_rx) = mpsc::unbounded_channel();
        let channel_max = local_open.channel_max.min(remote_open.channel_max);
        let max_frame_size = remote_open
            .max_frame_size
            .max(definitions::MIN_MAX_FRAME_SIZE) as usize;
        let connection = Self {
            local_state: ConnectionState::Opened,
            local_open,
            remote_open: Some(remote_open),
            writer,
            channel_max,
            max_frame_size,
            sessions: Slab::new(),
            session_by_incoming_channel: HashMap::new(),
            incoming_sessions,
            local_error: None,
            remote_error: None,
        };
        (connection, incoming_rx)
    }

    /// Current state of the connection
    pub fn local_state(&self) -> ConnectionState {
        self.local_state
    }

    /// The open sent to the peer
    pub fn local_open(&self) -> &Open {
        &self.local_open
    }

    /// The open received from the peer
    pub fn remote_open(&self) -> Option<&Open> {
        self.remote_open.as_ref()
    }

    /// The negotiated channel-max
    pub fn channel_max(&self) -> u16 {
        self.channel_max
    }

    /// The largest frame that may be sent to the peer
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn send(&self, body: FrameBody) {
        if let Err(err) = self.writer.submit(Frame::new(0u16, body)) {
            debug!(%err, "frame dropped");
        }
    }

    fn allocate_channel(&self) -> Result<u16, AllocSessionError> {
        let key = self.sessions.vacant_key();
        match u16::try_from(key) {
            Ok(channel) if channel <= self.channel_max => Ok(channel),
            _ => Err(AllocSessionError::ChannelMaxReached),
        }
    }

    /// Allocates an outgoing channel for a new session and sends its begin
    pub(crate) fn allocate_session(
        &mut self,
        config: SessionConfig,
    ) -> Result<
        (
            SharedSession,
            oneshot::Receiver<Result<(), BeginError>>,
            mpsc::UnboundedReceiver<IncomingLink>,
        ),
        AllocSessionError,
    > {
        if self.local_state != ConnectionState::Opened {
            return Err(AllocSessionError::IllegalState);
        }
        let channel = self.allocate_channel()?;
        let (session, begun, incoming_links) = SessionEndpoint::begin_local(
            channel,
            config,
            self.writer.clone(),
            self.max_frame_size,
        );
        let key = self.sessions.insert(session.clone());
        debug_assert_eq!(key, channel as usize);
        debug!(channel, "session allocated");
        Ok((session, begun, incoming_links))
    }

    /// Dispatches a frame read from the transport
    ///
    /// An `Err` is a violation that must close the connection.
    pub(crate) fn on_frame(&mut self, frame: Frame) -> Result<(), definitions::Error> {
        let Frame { channel, body } = frame;
        trace!(channel, frame = ?body, "RECV");

        if let FrameBody::Close(close) = body {
            self.on_close(close);
            return Ok(());
        }
        match self.local_state {
            ConnectionState::Opened | ConnectionState::CloseSent => {}
            // Everything but a close is ignored once closing with an error
            ConnectionState::Discarding | ConnectionState::End => return Ok(()),
            _ => {
                return Err(definitions::Error::with_description(
                    AmqpError::IllegalState,
                    format!("{} received in state {:?}", body.name(), self.local_state),
                ))
            }
        }

        match body {
            FrameBody::Open(_) => Err(definitions::Error::with_description(
                AmqpError::IllegalState,
                "connection is already open",
            )),
            FrameBody::Begin(begin) => self.on_begin(channel, begin),
            FrameBody::Empty => Ok(()),
            body => {
                let key = match self.session_by_incoming_channel.get(&channel) {
                    Some(key) => *key,
                    None => {
                        return Err(definitions::Error::with_description(
                            ConnectionError::FramingError,
                            format!("{} on unbound channel {}", body.name(), channel),
                        ))
                    }
                };
                let ended = match self.sessions.get(key) {
                    Some(session) => {
                        let mut session = session.lock();
                        session.on_frame(body)?;
                        session.local_state == SessionState::Unmapped
                    }
                    None => true,
                };
                if ended {
                    self.unmap_session(key, channel);
                }
                Ok(())
            }
        }
    }

    fn on_begin(&mut self, channel: u16, begin: Begin) -> Result<(), definitions::Error> {
        if self.session_by_incoming_channel.contains_key(&channel) {
            return Err(definitions::Error::with_description(
                ConnectionError::FramingError,
                format!("begin on channel {} which is already in use", channel),
            ));
        }

        match begin.remote_channel {
            Some(outgoing_channel) => {
                let key = outgoing_channel as usize;
                let session = match self.sessions.get(key) {
                    Some(session) => session,
                    None => {
                        return Err(definitions::Error::with_description(
                            ConnectionError::FramingError,
                            format!("begin answers unknown channel {}", outgoing_channel),
                        ))
                    }
                };
                let mut session = session.lock();
                if session.local_state != SessionState::BeginSent {
                    return Err(definitions::Error::with_description(
                        ConnectionError::FramingError,
                        format!("channel {} was already answered", outgoing_channel),
                    ));
                }
                session.on_begin(channel, &begin);
                drop(session);
                self.session_by_incoming_channel.insert(channel, key);
                debug!(outgoing_channel, incoming_channel = channel, "session mapped");
            }
            None => {
                let outgoing_channel = match self.allocate_channel() {
                    Ok(outgoing_channel) => outgoing_channel,
                    Err(_) => {
                        return Err(definitions::Error::with_description(
                            ConnectionError::FramingError,
                            format!("no channel left to answer begin on channel {}", channel),
                        ))
                    }
                };
                let config = SessionBuilder::new().into_config();
                let (session, incoming_links) = SessionEndpoint::begin_remote(
                    outgoing_channel,
                    channel,
                    &begin,
                    config,
                    self.writer.clone(),
                    self.max_frame_size,
                );
                let key = self.sessions.insert(session.clone());
                self.session_by_incoming_channel.insert(channel, key);
                debug!(outgoing_channel, incoming_channel = channel, "session begun by peer");

                let incoming = IncomingSession {
                    session,
                    incoming_links,
                };
                if let Err(mpsc::error::SendError(incoming)) = self.incoming_sessions.send(incoming)
                {
                    // Nobody is accepting sessions. Ending the session right away keeps the
                    // peer from waiting on it.
                    incoming.session.lock().release();
                }
            }
        }
        Ok(())
    }

    fn unmap_session(&mut self, key: usize, incoming_channel: u16) {
        self.session_by_incoming_channel.remove(&incoming_channel);
        if self.sessions.contains(key) {
            self.sessions.remove(key);
        }
        debug!(outgoing_channel = key, incoming_channel, "session unmapped");
    }

    fn on_close(&mut self, close: Close) {
        if let Some(error) = &close.error {
            error!(%error, "connection closed by peer");
        }
        self.remote_error = close.error;
        match self.local_state {
            ConnectionState::CloseSent | ConnectionState::Discarding => {}
            _ => {
                self.local_state = ConnectionState::CloseReceived;
                self.send(FrameBody::Close(Close { error: None }));
            }
        }
        self.local_state = ConnectionState::End;
        debug!("connection closed");
    }

    /// Starts a local close
    ///
    /// Closing with an error discards every frame but the peer's close.
    pub(crate) fn close(&mut self, error: Option<definitions::Error>) {
        match self.local_state {
            ConnectionState::Opened | ConnectionState::CloseReceived => {}
            _ => return,
        }
        self.local_state = match error {
            Some(_) => ConnectionState::Discarding,
            None => ConnectionState::CloseSent,
        };
        self.local_error = error.clone();
        self.send(FrameBody::Close(Close { error }));
    }

    pub(crate) fn send_heartbeat(&self) {
        if self.local_state == ConnectionState::Opened {
            if let Err(err) = self.writer.submit(Frame::empty()) {
                debug!(%err, "heartbeat dropped");
            }
        }
    }

    /// Fails every session once the event loop stops
    pub(crate) fn on_transport_closed(&mut self) {
        for (_, session) in self.sessions.iter() {
            session.lock().on_connection_closed();
        }
        self.sessions.clear();
        self.session_by_incoming_channel.clear();
        self.writer.shutdown();
    }

    /// Outcome reported to [`ConnectionHandle::close`]
    pub(crate) fn close_result(&self) -> Result<(), Error> {
        match (&self.local_error, &self.remote_error) {
            (Some(error), _) => Err(Error::Local(error.clone())),
            (None, Some(error)) => Err(Error::Remote(error.clone())),
            (None, None) if self.local_state == ConnectionState::End => Ok(()),
            (None, None) => Err(Error::TransportClosed),
        }
    }
}

/// A handle to the [`Connection`] event loop.
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub(crate) connection: SharedConnection,
    control: mpsc::UnboundedSender<ConnectionControl>,
    engine: Option<JoinHandle<Result<(), Error>>>,
    incoming_sessions: mpsc::UnboundedReceiver<IncomingSession>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        connection: SharedConnection,
        control: mpsc::UnboundedSender<ConnectionControl>,
        engine: JoinHandle<Result<(), Error>>,
        incoming_sessions: mpsc::UnboundedReceiver<IncomingSession>,
    ) -> Self {
        Self {
            connection,
            control,
            engine: Some(engine),
            incoming_sessions,
        }
    }

    /// Checks if the underlying event loop has stopped
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }

    /// Current state of the connection
    pub fn state(&self) -> ConnectionState {
        self.connection.lock().local_state()
    }

    /// The open received from the peer
    pub fn remote_open(&self) -> Option<Open> {
        self.connection.lock().remote_open().cloned()
    }

    /// Close the connection and wait for the peer's close
    pub async fn close(&mut self) -> Result<(), Error> {
        // A failed send means the event loop already stopped, `on_close` reports why
        let _ = self.control.send(ConnectionControl::Close(None));
        self.on_close().await
    }

    /// Close the connection with an error
    pub async fn close_with_error(
        &mut self,
        error: impl Into<definitions::Error>,
    ) -> Result<(), Error> {
        let _ = self
            .control
            .send(ConnectionControl::Close(Some(error.into())));
        self.on_close().await
    }

    /// Returns when the underlying event loop has stopped
    pub async fn on_close(&mut self) -> Result<(), Error> {
        match self.engine.take() {
            Some(engine) => engine.await?,
            None => Err(Error::AlreadyClosed),
        }
    }

    pub(crate) fn allocate_session(
        &mut self,
        config: SessionConfig,
    ) -> Result<
        (
            SharedSession,
            oneshot::Receiver<Result<(), BeginError>>,
            mpsc::UnboundedReceiver<IncomingLink>,
        ),
        AllocSessionError,
    > {
        self.connection.lock().allocate_session(config)
    }

    /// Waits for the next session begun by the peer
    ///
    /// Returns `None` once the connection has stopped.
    pub async fn next_session(&mut self) -> Option<SessionHandle> {
        let incoming = self.incoming_sessions.recv().await?;
        Some(SessionHandle::new(incoming.session, incoming.incoming_links))
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let _ = self.control.send(ConnectionControl::Close(None));
    }
}
