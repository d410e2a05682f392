mod common;

use std::time::Duration;

use common::{connect, Peer};
use oxamqp::{
    frames::amqp::FrameBody,
    link::{AttachError, DetachError, LinkState, LinkStateError, RecvError, DEFAULT_CREDIT},
    types::{
        definitions::{self, Handle, LinkError, ReceiverSettleMode, Role, SenderSettleMode},
        messaging::{Accepted, DeliveryState, Outcome},
        performatives::{Detach, Disposition, Flow},
    },
    ConnectionHandle, Receiver, Sender, Session,
};

async fn session(peer: &mut Peer, client: &mut ConnectionHandle) -> Session {
    let (session, _) = tokio::join!(Session::begin(client), peer.accept_begin(100));
    session.unwrap()
}

async fn attached_receiver(peer: &mut Peer, session: &mut Session) -> Receiver {
    let (receiver, _) = tokio::join!(
        Receiver::attach(session, "receiver-1", "q1"),
        peer.accept_attach(0)
    );
    // Initial link credit
    let frame = peer.recv().await;
    assert!(matches!(frame.body, FrameBody::Flow(_)));
    receiver.unwrap()
}

#[tokio::test]
async fn send_waits_for_link_credit() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;

    let (sender, attach) = tokio::join!(
        Sender::builder()
            .name("sender-1")
            .target("q1")
            .sender_settle_mode(SenderSettleMode::Settled)
            .attach(&mut session),
        peer.accept_attach(0)
    );
    let mut sender = sender.unwrap();
    assert_eq!(attach.role, Role::Sender);
    assert_eq!(attach.initial_delivery_count, Some(0));

    peer.grant(0, 0, 5, 0).await;
    for _ in 0..5 {
        let outcome = sender.send("message").await.unwrap();
        assert!(matches!(outcome, Outcome::Accepted(_)));
    }
    for expected in 0..5 {
        match peer.recv().await.body {
            FrameBody::Transfer { performative, .. } => {
                assert_eq!(performative.delivery_id, Some(expected));
                assert_eq!(performative.settled, Some(true));
            }
            other => panic!("expecting transfer, found {:?}", other),
        }
    }
    assert_eq!(sender.credit(), 0);

    let (outcome, _) = tokio::join!(sender.send("sixth"), async {
        peer.expect_silence(Duration::from_millis(200)).await;
        peer.grant(0, 5, 5, 5).await;
        match peer.recv().await.body {
            FrameBody::Transfer { performative, .. } => {
                assert_eq!(performative.delivery_id, Some(5))
            }
            other => panic!("expecting transfer, found {:?}", other),
        }
    });
    assert!(outcome.is_ok());
    assert_eq!(sender.credit(), 4);
}

#[tokio::test]
async fn unsettled_send_resolves_with_the_outcome() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;

    let (sender, _) = tokio::join!(
        Sender::attach(&mut session, "sender-1", "q1"),
        peer.accept_attach(0)
    );
    let mut sender = sender.unwrap();

    let (outcome, _) = tokio::join!(sender.send("message"), async {
        peer.grant(0, 0, 10, 0).await;
        let delivery_id = match peer.recv().await.body {
            FrameBody::Transfer { performative, .. } => {
                assert_eq!(performative.settled, Some(false));
                performative.delivery_id.unwrap()
            }
            other => panic!("expecting transfer, found {:?}", other),
        };
        peer.send(
            0,
            FrameBody::Disposition(Disposition {
                role: Role::Receiver,
                first: delivery_id,
                last: None,
                settled: true,
                state: Some(DeliveryState::Accepted(Accepted {})),
                batchable: false,
            }),
        )
        .await;
    });
    assert_eq!(outcome.unwrap(), Outcome::Accepted(Accepted {}));
}

#[tokio::test]
async fn disposing_twice_sends_one_disposition() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;
    let mut receiver = attached_receiver(&mut peer, &mut session).await;

    peer.transfer(0, 0, b"message").await;
    let delivery = receiver.recv().await.unwrap();
    assert_eq!(&delivery.payload()[..], b"message");

    receiver.accept(&delivery).unwrap();
    receiver.accept(&delivery).unwrap();

    match peer.recv().await.body {
        FrameBody::Disposition(disposition) => {
            assert_eq!(disposition.role, Role::Receiver);
            assert_eq!(disposition.first, 0);
            assert!(disposition.settled);
            assert_eq!(disposition.state, Some(DeliveryState::Accepted(Accepted {})));
        }
        other => panic!("expecting disposition, found {:?}", other),
    }
    peer.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn delivery_from_another_link_is_refused() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;
    let mut first = attached_receiver(&mut peer, &mut session).await;

    let (second, _) = tokio::join!(
        Receiver::attach(&mut session, "receiver-2", "q1"),
        peer.accept_attach(1)
    );
    let mut second = second.unwrap();

    peer.transfer(0, 0, b"message").await;
    let delivery = first.recv().await.unwrap();
    assert!(matches!(
        second.accept(&delivery),
        Err(oxamqp::link::DispositionError::ForeignDelivery)
    ));
}

#[tokio::test]
async fn detach_completes_on_the_peer_reply() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;
    let receiver = attached_receiver(&mut peer, &mut session).await;

    let (result, _) = tokio::join!(receiver.close(), async {
        match peer.recv().await.body {
            FrameBody::Detach(detach) => {
                assert!(detach.closed);
                assert!(detach.error.is_none());
            }
            other => panic!("expecting detach, found {:?}", other),
        }
        peer.send(
            0,
            FrameBody::Detach(Detach {
                handle: definitions::Handle(0),
                closed: true,
                error: None,
            }),
        )
        .await;
    });
    assert!(result.is_ok());
}

#[tokio::test]
async fn remote_detach_fails_the_receiver() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;
    let mut receiver = attached_receiver(&mut peer, &mut session).await;

    let error = definitions::Error::with_description(LinkError::DetachForced, "node deleted");
    peer.send(
        0,
        FrameBody::Detach(Detach {
            handle: definitions::Handle(0),
            closed: true,
            error: Some(error.clone()),
        }),
    )
    .await;

    match peer.recv().await.body {
        FrameBody::Detach(reply) => assert!(reply.closed),
        other => panic!("expecting detach, found {:?}", other),
    }
    match receiver.recv().await {
        Err(RecvError::State(LinkStateError::RemoteDetached(Some(remote)))) => {
            assert_eq!(remote, error)
        }
        other => panic!("expecting remote detach, found {:?}", other),
    }
    assert_eq!(receiver.state(), LinkState::Detached);
    assert!(matches!(receiver.detach().await, Err(DetachError::Remote(_))));
}

#[tokio::test]
async fn attach_without_terminus_is_refused() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;

    let (sender, _) = tokio::join!(Sender::attach(&mut session, "sender-1", "q1"), async {
        let attach = match peer.recv().await.body {
            FrameBody::Attach(attach) => attach,
            other => panic!("expecting attach, found {:?}", other),
        };
        let reply = oxamqp::types::performatives::Attach {
            role: Role::Receiver,
            target: None,
            ..attach
        };
        peer.send(0, FrameBody::Attach(reply)).await;
    });
    assert!(matches!(sender, Err(AttachError::Refused)));
}

fn expect_link_flow(peer_frame: FrameBody) -> Flow {
    match peer_frame {
        FrameBody::Flow(flow) if flow.is_link_flow() => flow,
        other => panic!("expecting link flow, found {:?}", other),
    }
}

#[tokio::test]
async fn drain_keeps_automatic_credit() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;
    let mut receiver = attached_receiver(&mut peer, &mut session).await;

    receiver.drain().unwrap();
    let flow = expect_link_flow(peer.recv().await.body);
    assert!(flow.drain);
    assert_eq!(flow.link_credit, Some(DEFAULT_CREDIT));

    // the sender used up the credit and asks for the receiver's state
    peer.send(
        0,
        FrameBody::Flow(Flow {
            next_incoming_id: Some(0),
            incoming_window: 100,
            next_outgoing_id: 0,
            outgoing_window: 100,
            handle: Some(Handle(0)),
            delivery_count: Some(DEFAULT_CREDIT),
            link_credit: Some(0),
            drain: true,
            echo: true,
            ..Default::default()
        }),
    )
    .await;
    let echoed = expect_link_flow(peer.recv().await.body);
    assert_eq!(echoed.delivery_count, Some(DEFAULT_CREDIT));
    assert_eq!(echoed.link_credit, Some(0));
    assert!(!echoed.drain);
    assert_eq!(receiver.credit(), 0);

    receiver.set_credit(4).unwrap();
    let flow = expect_link_flow(peer.recv().await.body);
    assert_eq!(flow.link_credit, Some(4));

    // taking half of the credit tops it back up
    peer.transfer(0, 0, b"first").await;
    peer.transfer(0, 1, b"second").await;
    receiver.recv().await.unwrap();
    receiver.recv().await.unwrap();
    let flow = expect_link_flow(peer.recv().await.body);
    assert_eq!(flow.link_credit, Some(4));
    assert_eq!(flow.delivery_count, Some(DEFAULT_CREDIT.wrapping_add(2)));
}

#[tokio::test]
async fn echo_is_answered_with_the_link_state() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;

    let (sender, _) = tokio::join!(
        Sender::attach(&mut session, "sender-1", "q1"),
        peer.accept_attach(0)
    );
    let sender = sender.unwrap();

    peer.send(
        0,
        FrameBody::Flow(Flow {
            next_incoming_id: Some(0),
            incoming_window: 100,
            next_outgoing_id: 0,
            outgoing_window: 100,
            handle: Some(Handle(0)),
            delivery_count: Some(0),
            link_credit: Some(3),
            echo: true,
            ..Default::default()
        }),
    )
    .await;
    let flow = expect_link_flow(peer.recv().await.body);
    assert_eq!(flow.handle, Some(Handle(0)));
    assert_eq!(flow.delivery_count, Some(0));
    assert_eq!(flow.link_credit, Some(3));
    assert_eq!(sender.credit(), 3);

    // a session flow asking for an echo gets a session flow back
    peer.send(
        0,
        FrameBody::Flow(Flow {
            next_incoming_id: Some(0),
            incoming_window: 100,
            next_outgoing_id: 0,
            outgoing_window: 100,
            echo: true,
            ..Default::default()
        }),
    )
    .await;
    match peer.recv().await.body {
        FrameBody::Flow(flow) => {
            assert!(!flow.is_link_flow());
            assert_eq!(flow.next_outgoing_id, 0);
        }
        other => panic!("expecting session flow, found {:?}", other),
    }
}

#[tokio::test]
async fn multi_frame_delivery_is_assembled() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;
    let mut receiver = attached_receiver(&mut peer, &mut session).await;

    peer.transfer_frame(0, Some(0), true, b"abc").await;
    peer.transfer_frame(0, None, true, b"def").await;
    peer.transfer_frame(0, None, false, b"ghi").await;
    peer.transfer(0, 1, b"single").await;

    let delivery = receiver.recv().await.unwrap();
    assert_eq!(delivery.delivery_id(), 0);
    assert_eq!(&delivery.payload()[..], b"abcdefghi");
    let delivery = receiver.recv().await.unwrap();
    assert_eq!(delivery.delivery_id(), 1);
    assert_eq!(&delivery.payload()[..], b"single");
}

#[tokio::test]
async fn second_mode_receiver_settles_after_the_sender() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;

    let (receiver, _) = tokio::join!(
        Receiver::builder()
            .name("receiver-1")
            .source("q1")
            .receiver_settle_mode(ReceiverSettleMode::Second)
            .attach(&mut session),
        peer.accept_attach(0)
    );
    let mut receiver = receiver.unwrap();
    expect_link_flow(peer.recv().await.body);

    peer.transfer(0, 0, b"message").await;
    let delivery = receiver.recv().await.unwrap();
    receiver.accept(&delivery).unwrap();
    match peer.recv().await.body {
        FrameBody::Disposition(disposition) => {
            assert_eq!(disposition.role, Role::Receiver);
            assert!(!disposition.settled);
            assert_eq!(disposition.state, Some(DeliveryState::Accepted(Accepted {})));
        }
        other => panic!("expecting disposition, found {:?}", other),
    }

    // waiting on the sender, a second accept sends nothing
    receiver.accept(&delivery).unwrap();
    peer.expect_silence(Duration::from_millis(100)).await;

    peer.send(
        0,
        FrameBody::Disposition(Disposition {
            role: Role::Sender,
            first: 0,
            last: None,
            settled: true,
            state: Some(DeliveryState::Accepted(Accepted {})),
            batchable: false,
        }),
    )
    .await;
    receiver.accept(&delivery).unwrap();
    peer.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn sender_settles_what_a_second_mode_receiver_accepted() {
    let (mut client, mut peer) = connect().await;
    let mut session = session(&mut peer, &mut client).await;

    let (sender, _) = tokio::join!(
        Sender::builder()
            .name("sender-1")
            .target("q1")
            .receiver_settle_mode(ReceiverSettleMode::Second)
            .attach(&mut session),
        peer.accept_attach(0)
    );
    let mut sender = sender.unwrap();

    let (outcome, _) = tokio::join!(sender.send("message"), async {
        peer.grant(0, 0, 10, 0).await;
        let delivery_id = match peer.recv().await.body {
            FrameBody::Transfer { performative, .. } => performative.delivery_id.unwrap(),
            other => panic!("expecting transfer, found {:?}", other),
        };
        peer.send(
            0,
            FrameBody::Disposition(Disposition {
                role: Role::Receiver,
                first: delivery_id,
                last: None,
                settled: false,
                state: Some(DeliveryState::Accepted(Accepted {})),
                batchable: false,
            }),
        )
        .await;
    });
    assert_eq!(outcome.unwrap(), Outcome::Accepted(Accepted {}));

    match peer.recv().await.body {
        FrameBody::Disposition(disposition) => {
            assert_eq!(disposition.role, Role::Sender);
            assert_eq!(disposition.first, 0);
            assert!(disposition.settled);
        }
        other => panic!("expecting disposition, found {:?}", other),
    }
}
