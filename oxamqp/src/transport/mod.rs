//! Implements low level transport framing
//!
//! The byte stream is split once the protocol headers have been exchanged. The read half is
//! wrapped in a [`Transport`], a `Stream` of decoded frames guarded by the local idle timeout.
//! The write half is owned by the writer task (see [`FrameWriter`]), which serializes every
//! submitted frame in submission order.

pub mod error;
pub mod protocol_header;
mod writer;

pub use error::{Error, NegotiationError};
pub use writer::{FrameWriter, WriterClosed};
pub(crate) use writer::write_loop;

use std::{convert::TryFrom, pin::Pin, task::Poll, time::Duration};

use futures_util::{Future, Stream};
use oxamqp_types::states::ConnectionState;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::trace;

use crate::{
    frames::amqp::{Frame, FrameCodec},
    util::IdleTimeout,
};

use self::protocol_header::ProtocolHeader;

pin_project! {
    /// Inbound frames of a connection
    #[derive(Debug)]
    pub struct Transport<R> {
        #[pin]
        framed: FramedRead<R, FrameCodec>,
        idle_timeout: Option<IdleTimeout>,
    }
}

impl<R> Transport<R>
where
    R: AsyncRead + Unpin,
{
    /// Binds a frame decoder with an optional idle timeout to the read half of a stream
    pub fn bind(reader: R, codec: FrameCodec, idle_timeout: Option<Duration>) -> Self {
        let framed = FramedRead::new(reader, codec);
        let idle_timeout = idle_timeout
            .filter(|duration| !duration.is_zero())
            .map(IdleTimeout::new);
        Self {
            framed,
            idle_timeout,
        }
    }

    /// Changes the largest inbound frame accepted
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.framed.decoder_mut().set_max_frame_size(max_frame_size);
        self
    }
}

impl<R> Stream for Transport<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Frame, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.framed.poll_next(cx) {
            Poll::Ready(next) => {
                if let Some(delay) = this.idle_timeout.as_mut() {
                    delay.reset();
                }
                Poll::Ready(next.map(|item| item.map_err(Into::into)))
            }
            Poll::Pending => match this.idle_timeout.as_mut() {
                Some(delay) => match Pin::new(&mut *delay).poll(cx) {
                    Poll::Ready(()) => {
                        delay.reset();
                        Poll::Ready(Some(Err(Error::IdleTimeout)))
                    }
                    Poll::Pending => Poll::Pending,
                },
                None => Poll::Pending,
            },
        }
    }
}

/// Writes the local protocol header
pub(crate) async fn send_proto_header<Io>(
    io: &mut Io,
    local_state: &mut ConnectionState,
    proto_header: ProtocolHeader,
) -> Result<(), NegotiationError>
where
    Io: AsyncWrite + Unpin,
{
    let buf: [u8; 8] = proto_header.into();
    io.write_all(&buf).await?;
    io.flush().await?;
    trace!(proto_header = ?buf, "SEND");
    *local_state = match local_state {
        ConnectionState::HeaderReceived => ConnectionState::HeaderExchange,
        _ => ConnectionState::HeaderSent,
    };
    Ok(())
}

/// Reads the peer's protocol header, which must match `proto_header` byte for byte
pub(crate) async fn recv_proto_header<Io>(
    io: &mut Io,
    local_state: &mut ConnectionState,
    proto_header: &ProtocolHeader,
) -> Result<ProtocolHeader, NegotiationError>
where
    Io: AsyncRead + Unpin,
{
    let mut inbound_buf = [0u8; 8];
    io.read_exact(&mut inbound_buf).await?;
    trace!(proto_header = ?inbound_buf, "RECV");

    match ProtocolHeader::try_from(inbound_buf) {
        Ok(incoming) if incoming == *proto_header => {
            *local_state = match local_state {
                ConnectionState::HeaderSent => ConnectionState::HeaderExchange,
                _ => ConnectionState::HeaderReceived,
            };
            Ok(incoming)
        }
        _ => {
            *local_state = ConnectionState::End;
            Err(NegotiationError::ProtocolHeaderMismatch(inbound_buf))
        }
    }
}

/// Exchanges protocol headers, sending first
pub(crate) async fn negotiate<Io>(
    io: &mut Io,
    local_state: &mut ConnectionState,
    proto_header: ProtocolHeader,
) -> Result<ProtocolHeader, NegotiationError>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    send_proto_header(io, local_state, proto_header.clone()).await?;
    recv_proto_header(io, local_state, &proto_header).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use oxamqp_types::states::ConnectionState;
    use tokio_test::io::Builder;

    use super::{negotiate, protocol_header::ProtocolHeader, Error, NegotiationError, Transport};
    use crate::frames::{
        self,
        amqp::{FrameBody, FrameCodec},
    };

    #[tokio::test]
    async fn header_exchange() {
        let mut mock = Builder::new()
            .write(b"AMQP")
            .write(&[0, 1, 0, 0])
            .read(b"AMQP")
            .read(&[0, 1, 0, 0])
            .build();

        let mut local_state = ConnectionState::Start;
        let header = negotiate(&mut mock, &mut local_state, ProtocolHeader::amqp())
            .await
            .unwrap();
        assert!(header.is_amqp());
        assert_eq!(local_state, ConnectionState::HeaderExchange);
    }

    #[tokio::test]
    async fn mismatched_header_fails_with_received_bytes() {
        let mut mock = Builder::new()
            .write(b"AMQP\x00\x01\x00\x00")
            .read(b"AMQQ\x00\x01\x00\x00")
            .build();

        let mut local_state = ConnectionState::Start;
        let err = negotiate(&mut mock, &mut local_state, ProtocolHeader::amqp())
            .await
            .unwrap_err();
        match err {
            NegotiationError::ProtocolHeaderMismatch(bytes) => {
                assert_eq!(&bytes, b"AMQQ\x00\x01\x00\x00")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(local_state, ConnectionState::End);
    }

    #[tokio::test]
    async fn transport_yields_decoded_frames() {
        let mock = Builder::new()
            .read(&[0x00, 0x00, 0x00, 0x08, 0x02, 0x00, 0x00, 0x01])
            .build();
        let mut transport = Transport::bind(mock, FrameCodec::new(512), None);
        let frame = transport.next().await.unwrap().unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.body, FrameBody::Empty);
        assert!(transport.next().await.is_none());
    }

    #[tokio::test]
    async fn transport_rejects_oversized_frame() {
        let mock = Builder::new()
            .read(&[0x00, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00])
            .build();
        let mut transport = Transport::bind(mock, FrameCodec::new(512), None);
        let err = transport.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(frames::Error::FrameSizeExceeded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fires_without_inbound_frames() {
        let (_peer, local) = tokio::io::duplex(64);
        let mut transport =
            Transport::bind(local, FrameCodec::new(512), Some(Duration::from_millis(100)));
        let err = transport.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::IdleTimeout));
    }
}
