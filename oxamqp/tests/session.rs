mod common;

use std::time::Duration;

use common::{attach_defaults, connect, connect_with, Peer};
use oxamqp::{
    frames::amqp::FrameBody,
    link::{CreditMode, LinkStateError},
    session::{BeginError, Error as SessionError},
    types::{
        definitions::{
            self, ErrorCondition, Handle, LinkError, Role, SenderSettleMode,
            SessionError as SessionCondition,
        },
        messaging::{Accepted, Outcome},
        performatives::{Detach, End, Open},
        states::SessionState,
    },
    Connection, Receiver, RemoteLink, Sendable, Sender, Session,
};

/// Expects the session to end with `condition` and answers the end
async fn expect_end_with(peer: &mut Peer, condition: SessionCondition) {
    match peer.recv().await.body {
        FrameBody::End(End { error: Some(error) }) => {
            assert_eq!(error.condition, ErrorCondition::from(condition))
        }
        other => panic!("expecting end, found {:?}", other),
    }
    peer.send(0, FrameBody::End(End { error: None })).await;
}

/// Expects the client to detach `handle` with `condition` and answers the detach
async fn expect_detach_with(peer: &mut Peer, handle: u32, condition: LinkError) {
    match peer.recv().await.body {
        FrameBody::Detach(detach) => {
            assert!(detach.closed);
            let error = detach.error.expect("detach carries the link error");
            assert_eq!(error.condition, ErrorCondition::from(condition));
        }
        other => panic!("expecting detach, found {:?}", other),
    }
    peer.send(
        0,
        FrameBody::Detach(Detach {
            handle: Handle(handle),
            closed: true,
            error: None,
        }),
    )
    .await;
}

async fn attached_receiver(peer: &mut Peer, session: &mut Session, name: &str, handle: u32) -> Receiver {
    let (receiver, _) = tokio::join!(Receiver::attach(session, name, "q1"), peer.accept_attach(handle));
    // Initial link credit
    assert!(matches!(peer.recv().await.body, FrameBody::Flow(_)));
    receiver.unwrap()
}

#[tokio::test]
async fn begin_then_end() {
    let (mut client, mut peer) = connect().await;

    let (session, begin) = tokio::join!(Session::begin(&mut client), peer.accept_begin(100));
    let mut session = session.unwrap();
    assert_eq!(begin.remote_channel, None);
    assert_eq!(session.state(), SessionState::Mapped);

    let (result, _) = tokio::join!(session.end(), async {
        let frame = peer.recv().await;
        assert!(matches!(frame.body, FrameBody::End(End { error: None })));
        peer.send(0, FrameBody::End(End { error: None })).await;
    });
    assert!(result.is_ok());
    assert_eq!(session.state(), SessionState::Unmapped);
}

#[tokio::test]
async fn remote_end_with_error_is_reported() {
    let (mut client, mut peer) = connect().await;

    let (result, _) = tokio::join!(Session::begin(&mut client), async {
        let frame = peer.recv().await;
        assert!(matches!(frame.body, FrameBody::Begin(_)));
        peer.send(
            0,
            FrameBody::Begin(oxamqp::types::performatives::Begin {
                remote_channel: Some(frame.channel),
                next_outgoing_id: 0,
                incoming_window: 0,
                outgoing_window: 0,
                handle_max: Default::default(),
                offered_capabilities: None,
                desired_capabilities: None,
                properties: None,
            }),
        )
        .await;
    });
    let mut session = result.unwrap();

    let error = oxamqp::types::definitions::Error::with_description(
        SessionCondition::UnattachedHandle,
        "going away",
    );
    peer.send(
        0,
        FrameBody::End(End {
            error: Some(error.clone()),
        }),
    )
    .await;
    let frame = peer.recv().await;
    assert!(matches!(frame.body, FrameBody::End(End { error: None })));
    assert!(matches!(session.end().await, Err(SessionError::RemoteEnded(e)) if e == error));
}

#[tokio::test]
async fn transfer_beyond_incoming_window_ends_the_session() {
    let (mut client, mut peer) = connect().await;

    let (session, _) = tokio::join!(
        Session::builder().incoming_window(10).begin(&mut client),
        peer.accept_begin(100)
    );
    let mut session = session.unwrap();

    let (receiver, attach) = tokio::join!(
        Receiver::attach(&mut session, "receiver-1", "q1"),
        peer.accept_attach(0)
    );
    let mut receiver = receiver.unwrap();
    assert_eq!(attach.role, Role::Receiver);

    // Initial link credit
    let frame = peer.recv().await;
    match frame.body {
        FrameBody::Flow(flow) => assert!(flow.link_credit.unwrap() > 10),
        other => panic!("expecting flow, found {:?}", other),
    }

    for delivery_id in 0..11 {
        peer.transfer(0, delivery_id, b"payload").await;
    }

    let frame = peer.recv().await;
    match frame.body {
        FrameBody::End(End { error: Some(error) }) => assert_eq!(
            error.condition,
            ErrorCondition::from(SessionCondition::WindowViolation)
        ),
        other => panic!("expecting end, found {:?}", other),
    }
    peer.send(0, FrameBody::End(End { error: None })).await;

    // The deliveries queued before the violation are still handed out
    let delivery = receiver.recv().await.unwrap();
    assert_eq!(delivery.delivery_id(), 0);
    let mut last = Ok(delivery);
    for _ in 0..10 {
        last = receiver.recv().await;
        if last.is_err() {
            break;
        }
    }
    assert!(matches!(
        last,
        Err(oxamqp::link::RecvError::State(LinkStateError::SessionEnded(Some(_))))
    ));
    assert!(matches!(session.end().await, Err(SessionError::LocalError(_))));
}

#[tokio::test]
async fn peer_attached_link_is_handed_out() {
    let (mut client, mut peer) = connect().await;

    let (session, _) = tokio::join!(Session::begin(&mut client), peer.accept_begin(100));
    let mut session = session.unwrap();

    let mut attach = attach_defaults("remote-sender", Role::Sender);
    attach.initial_delivery_count = Some(0);
    peer.send(0, FrameBody::Attach(attach)).await;

    let frame = peer.recv().await;
    match frame.body {
        FrameBody::Attach(reply) => {
            assert_eq!(reply.name, "remote-sender");
            assert_eq!(reply.role, Role::Receiver);
        }
        other => panic!("expecting attach, found {:?}", other),
    }
    let frame = peer.recv().await;
    assert!(matches!(frame.body, FrameBody::Flow(_)));

    let mut receiver = match session.next_link().await {
        Some(RemoteLink::Receiver(receiver)) => receiver,
        other => panic!("expecting a receiver, found {:?}", other),
    };
    assert_eq!(receiver.name(), "remote-sender");

    peer.transfer(0, 0, b"from the peer").await;
    let delivery = receiver.recv().await.unwrap();
    assert_eq!(&delivery.payload()[..], b"from the peer");
}

#[tokio::test]
async fn begin_on_closed_connection_fails() {
    let (mut client, mut peer) = connect().await;

    let (_, _) = tokio::join!(client.close(), async {
        let _ = peer.recv().await;
        peer.send(0, FrameBody::Close(Default::default())).await;
    });

    let result = Session::begin(&mut client).await;
    assert!(matches!(result, Err(BeginError::AllocSession(_))));
}

#[tokio::test]
async fn sender_reopens_its_outgoing_window() {
    let (a_io, b_io) = tokio::io::duplex(1024 * 1024);
    let (a, b) = tokio::join!(
        Connection::builder().container_id("a").open_with_stream(a_io),
        Connection::builder().container_id("b").open_with_stream(b_io),
    );
    let (mut a, mut b) = (a.unwrap(), b.unwrap());

    let (session_a, session_b) = tokio::join!(
        Session::builder().outgoing_window(3).begin(&mut a),
        b.next_session()
    );
    let mut session_a = session_a.unwrap();
    let mut session_b = session_b.unwrap();

    let (sender, link) = tokio::join!(
        Sender::attach(&mut session_a, "sender-1", "q1"),
        session_b.next_link()
    );
    let mut sender = sender.unwrap();
    let mut receiver = match link {
        Some(RemoteLink::Receiver(receiver)) => receiver,
        other => panic!("expecting a receiver, found {:?}", other),
    };

    let accepting = tokio::spawn(async move {
        for _ in 0..6 {
            let delivery = receiver.recv().await.unwrap();
            receiver.accept(&delivery).unwrap();
        }
        receiver
    });
    for _ in 0..6 {
        let outcome = sender.send("message").await.unwrap();
        assert_eq!(outcome, Outcome::Accepted(Accepted {}));
    }
    let _receiver = accepting.await.unwrap();

    assert_eq!(session_a.state(), SessionState::Mapped);
    assert_eq!(session_b.state(), SessionState::Mapped);
}

#[tokio::test]
async fn delivery_larger_than_the_peer_window_is_written_as_it_opens() {
    let mut reply = Open::new("peer");
    reply.max_frame_size = 512;
    let (mut client, mut peer) = connect_with(reply).await;

    let (session, _) = tokio::join!(Session::begin(&mut client), peer.accept_begin(2));
    let mut session = session.unwrap();
    let (sender, _) = tokio::join!(
        Sender::builder()
            .name("sender-1")
            .target("q1")
            .sender_settle_mode(SenderSettleMode::Settled)
            .attach(&mut session),
        peer.accept_attach(0)
    );
    let mut sender = sender.unwrap();
    peer.grant_within(0, 0, 10, 0, 2).await;

    let sendable = Sendable::builder().payload(vec![7u8; 2000]).build();
    let (outcome, frames) = tokio::join!(sender.send(sendable), async {
        let mut frames = Vec::new();
        loop {
            // two frames fit in the window at a time
            for _ in 0..2 {
                let (performative, payload) = match peer.recv().await.body {
                    FrameBody::Transfer {
                        performative,
                        payload,
                    } => (performative, payload),
                    other => panic!("expecting transfer, found {:?}", other),
                };
                let more = performative.more;
                frames.push((performative, payload));
                if !more {
                    return frames;
                }
            }
            peer.expect_silence(Duration::from_millis(100)).await;
            peer.session_flow(frames.len() as u32, 2).await;
        }
    });

    assert_eq!(outcome.unwrap(), Outcome::Accepted(Accepted {}));
    assert!(frames.len() > 2);
    assert_eq!(frames[0].0.delivery_id, Some(0));
    assert!(frames[1..].iter().all(|(transfer, _)| transfer.delivery_id.is_none()));
    assert!(frames.iter().all(|(_, payload)| payload.len() < 512));
    assert_eq!(frames.iter().map(|(_, payload)| payload.len()).sum::<usize>(), 2000);
}

#[tokio::test]
async fn oversized_delivery_detaches_only_its_link() {
    let (mut client, mut peer) = connect().await;

    let (session, _) = tokio::join!(
        Session::builder().incoming_window(4).begin(&mut client),
        peer.accept_begin(100)
    );
    let mut session = session.unwrap();

    let (receiver, _) = tokio::join!(
        Receiver::builder()
            .name("receiver-1")
            .source("q1")
            .max_message_size(10)
            .attach(&mut session),
        peer.accept_attach(0)
    );
    let _receiver = receiver.unwrap();
    assert!(matches!(peer.recv().await.body, FrameBody::Flow(_)));

    peer.transfer(0, 0, b"more than ten bytes").await;
    expect_detach_with(&mut peer, 0, LinkError::MessageSizeExceeded).await;
    assert_eq!(session.state(), SessionState::Mapped);

    // the whole window is available again
    let mut second = attached_receiver(&mut peer, &mut session, "receiver-2", 1).await;
    for delivery_id in 1..5 {
        peer.transfer(1, delivery_id, b"payload").await;
    }
    for delivery_id in 1..5 {
        assert_eq!(second.recv().await.unwrap().delivery_id(), delivery_id);
    }
    assert_eq!(session.state(), SessionState::Mapped);
}

#[tokio::test]
async fn transfer_without_credit_detaches_only_its_link() {
    let (mut client, mut peer) = connect().await;

    let (session, _) = tokio::join!(
        Session::builder().incoming_window(2).begin(&mut client),
        peer.accept_begin(100)
    );
    let mut session = session.unwrap();

    let (receiver, _) = tokio::join!(
        Receiver::builder()
            .name("receiver-1")
            .source("q1")
            .credit_mode(CreditMode::Manual)
            .attach(&mut session),
        peer.accept_attach(0)
    );
    let _receiver = receiver.unwrap();

    peer.transfer(0, 0, b"unasked").await;
    expect_detach_with(&mut peer, 0, LinkError::TransferLimitExceeded).await;
    assert_eq!(session.state(), SessionState::Mapped);

    let mut second = attached_receiver(&mut peer, &mut session, "receiver-2", 1).await;
    peer.transfer(1, 1, b"first").await;
    peer.transfer(1, 2, b"second").await;
    assert_eq!(&second.recv().await.unwrap().payload()[..], b"first");
    assert_eq!(&second.recv().await.unwrap().payload()[..], b"second");
    assert_eq!(session.state(), SessionState::Mapped);
}

#[tokio::test]
async fn attach_on_a_used_handle_ends_the_session() {
    let (mut client, mut peer) = connect().await;

    let (session, _) = tokio::join!(Session::begin(&mut client), peer.accept_begin(100));
    let mut session = session.unwrap();

    let mut attach = attach_defaults("remote-sender-1", Role::Sender);
    attach.initial_delivery_count = Some(0);
    peer.send(0, FrameBody::Attach(attach.clone())).await;
    assert!(matches!(peer.recv().await.body, FrameBody::Attach(_)));
    assert!(matches!(peer.recv().await.body, FrameBody::Flow(_)));

    attach.name = "remote-sender-2".to_string();
    peer.send(0, FrameBody::Attach(attach)).await;
    expect_end_with(&mut peer, SessionCondition::HandleInUse).await;

    assert!(matches!(session.end().await, Err(SessionError::LocalError(_))));
    assert_eq!(session.state(), SessionState::Unmapped);
}

#[tokio::test]
async fn transfer_on_an_unattached_handle_ends_the_session() {
    let (mut client, mut peer) = connect().await;

    let (session, _) = tokio::join!(Session::begin(&mut client), peer.accept_begin(100));
    let mut session = session.unwrap();

    peer.transfer(5, 0, b"nowhere").await;
    expect_end_with(&mut peer, SessionCondition::UnattachedHandle).await;

    match session.end().await {
        Err(SessionError::LocalError(error)) => assert_eq!(
            error,
            definitions::Error::with_description(
                SessionCondition::UnattachedHandle,
                "handle 5 is not attached"
            )
        ),
        other => panic!("expecting a local error, found {:?}", other),
    }
}
