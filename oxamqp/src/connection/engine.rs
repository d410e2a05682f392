//! The engine reads frames from the transport and dispatches them into the connection, session
//! and link state under their locks. Outgoing frames never pass through it, they are queued on the
//! [`FrameWriter`](crate::transport::FrameWriter) by whoever produces them.

use futures_util::StreamExt;
use oxamqp_types::states::ConnectionState;
use tokio::{io::AsyncRead, sync::mpsc, task::JoinHandle};
use tracing::{debug, error, instrument, warn};

use crate::{
    control::ConnectionControl,
    frames::amqp::Frame,
    transport::{self, Transport},
    util::Running,
};

use super::{heartbeat::HeartBeat, Error, SharedConnection};

pub(crate) struct ConnectionEngine<R> {
    transport: Transport<R>,
    connection: SharedConnection,
    control: mpsc::UnboundedReceiver<ConnectionControl>,
    heartbeat: HeartBeat,
    writer_task: JoinHandle<Result<(), transport::Error>>,
}

impl<R> ConnectionEngine<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    pub(crate) fn new(
        transport: Transport<R>,
        connection: SharedConnection,
        control: mpsc::UnboundedReceiver<ConnectionControl>,
        heartbeat: HeartBeat,
        writer_task: JoinHandle<Result<(), transport::Error>>,
    ) -> Self {
        Self {
            transport,
            connection,
            control,
            heartbeat,
            writer_task,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(self.event_loop())
    }

    fn on_incoming(&mut self, incoming: Option<Result<Frame, transport::Error>>) -> Running {
        let mut connection = self.connection.lock();
        match incoming {
            Some(Ok(frame)) => {
                if let Err(error) = connection.on_frame(frame) {
                    error!(%error, "protocol violation");
                    connection.close(Some(error));
                }
            }
            Some(Err(transport::Error::Io(err))) => {
                debug!(?err, "transport failed");
                return Running::Stop;
            }
            Some(Err(err)) => {
                if matches!(
                    connection.local_state(),
                    ConnectionState::CloseSent | ConnectionState::Discarding
                ) {
                    // The peer never answered the close
                    warn!(%err, "closing without the peer's close");
                    return Running::Stop;
                }
                match err.as_amqp_error() {
                    Some(error) => {
                        error!(%error, "transport error");
                        connection.close(Some(error));
                    }
                    None => return Running::Stop,
                }
            }
            None => {
                debug!("incoming stream closed");
                return Running::Stop;
            }
        }

        match connection.local_state() {
            ConnectionState::End => Running::Stop,
            _ => Running::Continue,
        }
    }

    fn on_control(&mut self, control: Option<ConnectionControl>) -> Running {
        let mut connection = self.connection.lock();
        match control {
            Some(ConnectionControl::Close(error)) => connection.close(error),
            // The handle is gone
            None => connection.close(None),
        }
        match connection.local_state() {
            ConnectionState::End => Running::Stop,
            _ => Running::Continue,
        }
    }

    #[instrument(name = "ConnectionEngine::event_loop", skip_all)]
    async fn event_loop(mut self) -> Result<(), Error> {
        let mut control_open = true;
        loop {
            let running = tokio::select! {
                _ = self.heartbeat.next() => {
                    self.connection.lock().send_heartbeat();
                    Running::Continue
                },
                incoming = self.transport.next() => self.on_incoming(incoming),
                control = self.control.recv(), if control_open => {
                    control_open = control.is_some();
                    self.on_control(control)
                },
            };

            if let Running::Stop = running {
                break;
            }
        }

        let result = {
            let mut connection = self.connection.lock();
            connection.on_transport_closed();
            connection.close_result()
        };
        // Frames queued before the shutdown, including a final close, are still written
        match self.writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(?err, "writer stopped with error"),
            Err(err) => debug!(?err, "writer task failed"),
        }
        debug!(?result, "stopped");
        result
    }
}
