//! Connection builder

use std::{marker::PhantomData, sync::Arc, time::Duration};

use futures_util::StreamExt;
use oxamqp_codec::primitives::{Array, Symbol};
use oxamqp_types::{
    definitions::{self, AmqpError, Fields, Milliseconds, MIN_MAX_FRAME_SIZE},
    performatives::{Close, Open},
    states::ConnectionState,
};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::mpsc,
};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    frames::amqp::{Frame, FrameBody, FrameCodec},
    pool::{BufferPool, DEFAULT_POOL_CAPACITY},
    sasl::SaslNegotiator,
    transport::{self, protocol_header::ProtocolHeader, NegotiationError, Transport},
    util::{Initialized, Uninitialized},
};

use super::{
    engine::ConnectionEngine, heartbeat::HeartBeat, Connection, ConnectionHandle, OpenError,
    DEFAULT_CHANNEL_MAX, DEFAULT_MAX_FRAME_SIZE,
};

/// Connection builder
#[derive(Debug)]
pub struct Builder<Mode> {
    /// The id of the source container
    pub container_id: String,

    /// The name of the target host
    pub hostname: Option<String>,

    /// Proposed maximum frame size
    pub max_frame_size: u32,

    /// The maximum channel number that can be used on the connection
    pub channel_max: u16,

    /// Idle time-out
    pub idle_time_out: Option<Milliseconds>,

    /// Extension capabilities the sender supports
    pub offered_capabilities: Option<Array<Symbol>>,

    /// Extension capabilities the sender can use if the receiver supports them
    pub desired_capabilities: Option<Array<Symbol>>,

    /// Connection properties
    pub properties: Option<Fields>,

    /// Number of idle buffers kept by the frame writer
    pub buffer_pool_capacity: usize,

    /// Runs the SASL exchange before the AMQP header, if set
    pub sasl_negotiator: Option<Box<dyn SaslNegotiator>>,

    // type state marker
    marker: PhantomData<Mode>,
}

impl Default for Builder<Uninitialized> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<Uninitialized> {
    /// Creates a builder with the default configuration
    pub fn new() -> Self {
        Self {
            container_id: String::new(),
            hostname: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_max: DEFAULT_CHANNEL_MAX,
            idle_time_out: None,
            offered_capabilities: None,
            desired_capabilities: None,
            properties: None,
            buffer_pool_capacity: DEFAULT_POOL_CAPACITY,
            sasl_negotiator: None,
            marker: PhantomData,
        }
    }
}

impl<Mode> Builder<Mode> {
    /// The id of the source container
    pub fn container_id(self, id: impl Into<String>) -> Builder<Initialized> {
        Builder {
            container_id: id.into(),
            hostname: self.hostname,
            max_frame_size: self.max_frame_size,
            channel_max: self.channel_max,
            idle_time_out: self.idle_time_out,
            offered_capabilities: self.offered_capabilities,
            desired_capabilities: self.desired_capabilities,
            properties: self.properties,
            buffer_pool_capacity: self.buffer_pool_capacity,
            sasl_negotiator: self.sasl_negotiator,
            marker: PhantomData,
        }
    }

    /// The name of the target host
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Proposed maximum frame size, raised to 512 if smaller
    pub fn max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.max_frame_size = max_frame_size.max(MIN_MAX_FRAME_SIZE);
        self
    }

    /// The maximum channel number that can be used on the connection
    pub fn channel_max(mut self, channel_max: u16) -> Self {
        self.channel_max = channel_max;
        self
    }

    /// Idle time-out in milliseconds
    pub fn idle_time_out(mut self, idle_time_out: Milliseconds) -> Self {
        self.idle_time_out = Some(idle_time_out);
        self
    }

    /// Add one extension capability the sender supports
    pub fn add_offered_capabilities(mut self, capability: impl Into<Symbol>) -> Self {
        self.offered_capabilities
            .get_or_insert_with(|| Array(Vec::new()))
            .0
            .push(capability.into());
        self
    }

    /// Add one extension capability the sender can use if the receiver supports it
    pub fn add_desired_capabilities(mut self, capability: impl Into<Symbol>) -> Self {
        self.desired_capabilities
            .get_or_insert_with(|| Array(Vec::new()))
            .0
            .push(capability.into());
        self
    }

    /// Connection properties
    pub fn properties(mut self, properties: Fields) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Number of idle buffers kept by the frame writer
    pub fn buffer_pool_capacity(mut self, capacity: usize) -> Self {
        self.buffer_pool_capacity = capacity;
        self
    }

    /// Runs `negotiator` after the SASL protocol header exchange
    pub fn sasl_negotiator(mut self, negotiator: impl SaslNegotiator + 'static) -> Self {
        self.sasl_negotiator = Some(Box::new(negotiator));
        self
    }
}

impl Builder<Initialized> {
    fn local_open(&mut self) -> Open {
        Open {
            container_id: std::mem::take(&mut self.container_id),
            hostname: self.hostname.take(),
            max_frame_size: self.max_frame_size,
            channel_max: self.channel_max,
            idle_time_out: self.idle_time_out,
            outgoing_locales: None,
            incoming_locales: None,
            offered_capabilities: self.offered_capabilities.take(),
            desired_capabilities: self.desired_capabilities.take(),
            properties: self.properties.take(),
        }
    }

    /// Opens a connection over an established stream
    ///
    /// Exchanges the protocol headers, sends the local open and waits for the peer's open before
    /// the event loop is spawned.
    #[instrument(skip_all)]
    pub async fn open_with_stream<Io>(mut self, mut stream: Io) -> Result<ConnectionHandle, OpenError>
    where
        Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut local_state = ConnectionState::Start;
        if let Some(mut negotiator) = self.sasl_negotiator.take() {
            transport::negotiate(&mut stream, &mut local_state, ProtocolHeader::sasl()).await?;
            negotiator
                .negotiate(&mut stream)
                .await
                .map_err(NegotiationError::from)?;
            debug!("SASL negotiation succeeded");
            local_state = ConnectionState::Start;
        }
        transport::negotiate(&mut stream, &mut local_state, ProtocolHeader::amqp()).await?;
        debug!("protocol header exchanged");

        let (reader, writer_io) = tokio::io::split(stream);
        let (writer, outgoing) = transport::FrameWriter::new();
        let pool = BufferPool::new(self.buffer_pool_capacity);
        let writer_task = tokio::spawn(transport::write_loop(writer_io, outgoing, pool));

        let local_open = self.local_open();
        let idle_timeout = local_open
            .idle_time_out
            .map(|millis| Duration::from_millis(u64::from(millis)));
        let codec = FrameCodec::new(local_open.max_frame_size as usize);
        let mut transport = Transport::bind(reader, codec, idle_timeout);

        if let Err(err) = writer.submit(Frame::new(0u16, FrameBody::Open(local_open.clone()))) {
            writer.shutdown();
            return Err(err.into());
        }

        let remote_open = match transport.next().await {
            Some(Ok(Frame {
                body: FrameBody::Open(open),
                ..
            })) => open,
            Some(Ok(Frame {
                body: FrameBody::Close(close),
                ..
            })) => {
                let _ = writer.submit(Frame::new(0u16, FrameBody::Close(Close { error: None })));
                writer.shutdown();
                return Err(OpenError::RemoteClosed(close.error));
            }
            Some(Ok(frame)) => {
                let name = frame.body().name();
                let error = definitions::Error::with_description(
                    AmqpError::IllegalState,
                    format!("expecting open, found {}", name),
                );
                let _ = writer.submit(Frame::new(0u16, FrameBody::Close(Close { error: Some(error) })));
                writer.shutdown();
                return Err(OpenError::UnexpectedFrame(name));
            }
            Some(Err(err)) => {
                if let Some(error) = err.as_amqp_error() {
                    let _ = writer.submit(Frame::new(0u16, FrameBody::Close(Close { error: Some(error) })));
                }
                writer.shutdown();
                return Err(err.into());
            }
            None => {
                writer.shutdown();
                return Err(OpenError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        };
        debug!(
            remote_container_id = %remote_open.container_id,
            max_frame_size = remote_open.max_frame_size,
            channel_max = remote_open.channel_max,
            "connection opened"
        );

        let heartbeat = HeartBeat::for_remote_idle_timeout(remote_open.idle_time_out);
        let (connection, incoming_sessions) = Connection::new(local_open, remote_open, writer);
        let connection = Arc::new(Mutex::new(connection));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let engine = ConnectionEngine::new(
            transport,
            connection.clone(),
            control_rx,
            heartbeat,
            writer_task,
        )
        .spawn();

        Ok(ConnectionHandle::new(
            connection,
            control_tx,
            engine,
            incoming_sessions,
        ))
    }

    /// Opens a connection to `amqp://host[:port]` over TCP
    pub async fn open(
        mut self,
        url: impl TryInto<Url, Error = url::ParseError>,
    ) -> Result<ConnectionHandle, OpenError> {
        let url: Url = url.try_into()?;
        if url.scheme() != "amqp" {
            return Err(OpenError::InvalidScheme);
        }
        let host = url.host_str().ok_or(OpenError::InvalidDomain)?;
        if self.hostname.is_none() {
            self.hostname = Some(host.to_string());
        }
        let port = url.port().unwrap_or(definitions::PORT);
        let stream = TcpStream::connect((host, port)).await?;
        self.open_with_stream(stream).await
    }
}

#[cfg(test)]
mod tests {
    use oxamqp_types::definitions::MIN_MAX_FRAME_SIZE;

    use super::Builder;
    use crate::connection::{OpenError, DEFAULT_CHANNEL_MAX, DEFAULT_MAX_FRAME_SIZE};

    #[test]
    fn defaults_and_floor() {
        let builder = Builder::new();
        assert_eq!(builder.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(builder.channel_max, DEFAULT_CHANNEL_MAX);

        let mut builder = Builder::new()
            .max_frame_size(100)
            .container_id("c1")
            .hostname("example.org");
        assert_eq!(builder.max_frame_size, MIN_MAX_FRAME_SIZE);
        let open = builder.local_open();
        assert_eq!(open.container_id, "c1");
        assert_eq!(open.hostname.as_deref(), Some("example.org"));
    }

    #[tokio::test]
    async fn rejects_other_schemes() {
        let result = Builder::new()
            .container_id("c1")
            .open("amqps://localhost:5671")
            .await;
        assert!(matches!(result, Err(OpenError::InvalidScheme)));
    }
}
