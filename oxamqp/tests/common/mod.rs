//! A scripted AMQP peer speaking raw frames over an in-memory stream

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use oxamqp::{
    frames::amqp::{Frame, FrameBody, FrameCodec},
    types::{
        definitions::{Handle, ReceiverSettleMode, Role, SenderSettleMode},
        messaging::{Source, Target},
        performatives::{Attach, Begin, Flow, Open, Transfer},
    },
    Connection, ConnectionHandle, Payload,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
    time::timeout,
};
use tokio_util::codec::Framed;

pub const AMQP_HEADER: [u8; 8] = *b"AMQP\x00\x01\x00\x00";

pub const PEER_MAX_FRAME_SIZE: u32 = 64 * 1024;

/// The remote side of a connection under test
pub struct Peer {
    pub framed: Framed<DuplexStream, FrameCodec>,
}

impl Peer {
    /// Completes the header exchange and waits for the client's open
    pub async fn accept(mut io: DuplexStream) -> (Self, Open) {
        let mut header = [0u8; 8];
        io.read_exact(&mut header).await.unwrap();
        assert_eq!(header, AMQP_HEADER);
        io.write_all(&AMQP_HEADER).await.unwrap();

        let mut peer = Self {
            framed: Framed::new(io, FrameCodec::new(PEER_MAX_FRAME_SIZE as usize)),
        };
        let open = match peer.recv().await.body {
            FrameBody::Open(open) => open,
            other => panic!("expecting open, found {:?}", other),
        };
        (peer, open)
    }

    pub async fn send(&mut self, channel: u16, body: FrameBody) {
        self.framed.send(Frame::new(channel, body)).await.unwrap();
    }

    /// Next frame, heartbeats included
    pub async fn recv_any(&mut self) -> Frame {
        timeout(Duration::from_secs(5), self.framed.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream closed")
            .unwrap()
    }

    /// Next frame, skipping heartbeats
    pub async fn recv(&mut self) -> Frame {
        loop {
            let frame = self.recv_any().await;
            if !matches!(frame.body, FrameBody::Empty) {
                return frame;
            }
        }
    }

    /// Asserts that nothing but heartbeats arrives for `duration`
    pub async fn expect_silence(&mut self, duration: Duration) {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            match tokio::time::timeout_at(deadline, self.framed.next()).await {
                Err(_) => return,
                Ok(Some(Ok(Frame {
                    body: FrameBody::Empty,
                    ..
                }))) => continue,
                Ok(other) => panic!("expecting no frame, found {:?}", other.map(|r| r.map(|f| f.body))),
            }
        }
    }

    /// Answers the client's begin on channel 0
    pub async fn accept_begin(&mut self, incoming_window: u32) -> Begin {
        let frame = self.recv().await;
        let begin = match frame.body {
            FrameBody::Begin(begin) => begin,
            other => panic!("expecting begin, found {:?}", other),
        };
        self.send(
            0,
            FrameBody::Begin(Begin {
                remote_channel: Some(frame.channel),
                next_outgoing_id: 0,
                incoming_window,
                outgoing_window: 100,
                handle_max: Handle(15),
                offered_capabilities: None,
                desired_capabilities: None,
                properties: None,
            }),
        )
        .await;
        begin
    }

    /// Answers the client's attach with the mirrored role
    pub async fn accept_attach(&mut self, handle: u32) -> Attach {
        let attach = match self.recv().await.body {
            FrameBody::Attach(attach) => attach,
            other => panic!("expecting attach, found {:?}", other),
        };
        let reply = Attach {
            handle: Handle(handle),
            role: attach.role.opposite(),
            initial_delivery_count: match attach.role {
                Role::Sender => None,
                Role::Receiver => Some(0),
            },
            source: Some(Box::new(Source::with_address("q1"))),
            target: Some(Box::new(Target::with_address("q1"))),
            ..attach.clone()
        };
        self.send(0, FrameBody::Attach(reply)).await;
        attach
    }

    /// Grants link credit to the client's sender
    pub async fn grant(&mut self, handle: u32, delivery_count: u32, link_credit: u32, next_incoming_id: u32) {
        self.grant_within(handle, delivery_count, link_credit, next_incoming_id, 100)
            .await
    }

    /// Grants link credit while advertising `incoming_window`
    pub async fn grant_within(
        &mut self,
        handle: u32,
        delivery_count: u32,
        link_credit: u32,
        next_incoming_id: u32,
        incoming_window: u32,
    ) {
        self.send(
            0,
            FrameBody::Flow(Flow {
                next_incoming_id: Some(next_incoming_id),
                incoming_window,
                next_outgoing_id: 0,
                outgoing_window: 100,
                handle: Some(Handle(handle)),
                delivery_count: Some(delivery_count),
                link_credit: Some(link_credit),
                ..Default::default()
            }),
        )
        .await;
    }

    /// Sends a session flow opening the incoming window
    pub async fn session_flow(&mut self, next_incoming_id: u32, incoming_window: u32) {
        self.send(
            0,
            FrameBody::Flow(Flow {
                next_incoming_id: Some(next_incoming_id),
                incoming_window,
                next_outgoing_id: 0,
                outgoing_window: 100,
                ..Default::default()
            }),
        )
        .await;
    }

    /// Sends a single frame delivery
    pub async fn transfer(&mut self, handle: u32, delivery_id: u32, payload: &'static [u8]) {
        self.transfer_frame(handle, Some(delivery_id), false, payload)
            .await
    }

    /// Sends one frame of a delivery, continuation frames carry no delivery id
    pub async fn transfer_frame(
        &mut self,
        handle: u32,
        delivery_id: Option<u32>,
        more: bool,
        payload: &'static [u8],
    ) {
        let performative = match delivery_id {
            Some(delivery_id) => Transfer {
                delivery_id: Some(delivery_id),
                delivery_tag: Some(Payload::copy_from_slice(&delivery_id.to_be_bytes())),
                message_format: Some(0),
                settled: Some(false),
                ..Transfer::continuation(Handle(handle), more)
            },
            None => Transfer::continuation(Handle(handle), more),
        };
        self.send(
            0,
            FrameBody::Transfer {
                performative,
                payload: Payload::from_static(payload),
            },
        )
        .await;
    }
}

/// A client connection and the scripted peer it is connected to
pub async fn connect() -> (ConnectionHandle, Peer) {
    let mut reply = Open::new("peer");
    reply.max_frame_size = PEER_MAX_FRAME_SIZE;
    connect_with(reply).await
}

/// Same as [`connect`], with the peer answering with `reply`
pub async fn connect_with(reply: Open) -> (ConnectionHandle, Peer) {
    let (client_io, peer_io) = tokio::io::duplex(1024 * 1024);
    let client = Connection::builder()
        .container_id("client")
        .open_with_stream(client_io);
    let peer = async move {
        let (mut peer, open) = Peer::accept(peer_io).await;
        assert_eq!(open.container_id, "client");
        peer.send(0, FrameBody::Open(reply)).await;
        peer
    };
    let (client, peer) = tokio::join!(client, peer);
    (client.unwrap(), peer)
}

pub fn attach_defaults(name: &str, role: Role) -> Attach {
    Attach {
        name: name.to_string(),
        handle: Handle(0),
        role,
        snd_settle_mode: SenderSettleMode::Mixed,
        rcv_settle_mode: ReceiverSettleMode::First,
        source: Some(Box::new(Source::with_address("q1"))),
        target: Some(Box::new(Target::with_address("q1"))),
        unsettled: None,
        incomplete_unsettled: false,
        initial_delivery_count: None,
        max_message_size: None,
        offered_capabilities: None,
        desired_capabilities: None,
        properties: None,
    }
}
