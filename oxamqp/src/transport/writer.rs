//! The per-connection frame writer
//!
//! Frames are submitted through an unbounded channel so submission never blocks. The writer task
//! encodes everything that is already queued into one pooled buffer and writes it with a single
//! `write_all`, so frames leave in exactly the order they were submitted.

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::codec::Encoder;
use tracing::{debug, instrument, trace};

use crate::{
    frames::amqp::{Frame, FrameCodec},
    pool::{BufferPool, DEFAULT_BUFFER_SIZE},
};

use super::Error;

/// Items queued for the writer task
#[derive(Debug)]
pub(crate) enum Outgoing {
    Frame(Frame),

    /// Flush what is queued before this item, then shut the stream down
    Shutdown,
}

/// The writer task has stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Frame writer is closed")]
pub struct WriterClosed;

/// Handle used to submit frames to the writer task
#[derive(Debug, Clone)]
pub struct FrameWriter {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl FrameWriter {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a frame
    pub fn submit(&self, frame: Frame) -> Result<(), WriterClosed> {
        trace!(channel = frame.channel, frame = ?frame.body, "SEND");
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| WriterClosed)
    }

    /// Asks the writer to flush and shut the stream down
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Outgoing::Shutdown);
    }

    /// Whether the writer task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Runs until a shutdown is requested, every handle is dropped or the stream fails
#[instrument(name = "FrameWriter::write_loop", skip_all)]
pub(crate) async fn write_loop<W>(
    mut io: W,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    pool: BufferPool,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let mut codec = FrameCodec::default();
    let mut shutdown = false;

    while let Some(first) = rx.recv().await {
        let mut buf = pool.take(DEFAULT_BUFFER_SIZE);
        let mut frames = 0usize;

        let mut next = Some(first);
        while let Some(outgoing) = next.take() {
            match outgoing {
                Outgoing::Frame(frame) => {
                    codec.encode(frame, &mut buf)?;
                    frames += 1;
                }
                Outgoing::Shutdown => {
                    shutdown = true;
                    break;
                }
            }
            next = rx.try_recv().ok();
        }

        if !buf.is_empty() {
            io.write_all(&buf).await?;
            io.flush().await?;
            trace!(frames, bytes = buf.len(), "written");
        }

        if shutdown {
            break;
        }
    }

    rx.close();
    debug!("Stopped");
    io.shutdown().await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use futures_util::StreamExt;
    use tokio::io::AsyncReadExt;
    use tokio_util::codec::FramedRead;

    use super::{write_loop, FrameWriter};
    use crate::{
        frames::amqp::{Frame, FrameBody, FrameCodec},
        pool::BufferPool,
    };

    #[tokio::test]
    async fn frames_are_written_in_submission_order() {
        let (local, remote) = tokio::io::duplex(4096);
        let (writer, rx) = FrameWriter::new();
        let pool = BufferPool::new(2);
        let task = tokio::spawn(write_loop(local, rx, pool.clone()));

        for channel in 0u16..5 {
            writer.submit(Frame::new(channel, FrameBody::Empty)).unwrap();
        }
        writer.shutdown();
        task.await.unwrap().unwrap();

        let mut framed = FramedRead::new(remote, FrameCodec::new(512));
        for channel in 0u16..5 {
            let frame = framed.next().await.unwrap().unwrap();
            assert_eq!(frame.channel, channel);
        }
        assert!(framed.next().await.is_none());
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn heartbeat_is_written_as_a_bare_header() {
        let (local, mut remote) = tokio::io::duplex(4096);
        let (writer, rx) = FrameWriter::new();
        tokio::spawn(write_loop(local, rx, BufferPool::default()));

        writer.submit(Frame::empty()).unwrap();

        let mut buf = BytesMut::with_capacity(8);
        remote.read_buf(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0x08, 0x02, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn submit_fails_after_shutdown() {
        let (local, _remote) = tokio::io::duplex(64);
        let (writer, rx) = FrameWriter::new();
        let task = tokio::spawn(write_loop(local, rx, BufferPool::default()));
        writer.shutdown();
        task.await.unwrap().unwrap();
        assert!(writer.is_closed());
        assert!(writer.submit(Frame::empty()).is_err());
    }
}
