//! Definition of connection state and session state

/// Connection states as defined in the AMQP 1.0 Protocol Part 2.4.6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing has been sent or received
    Start,

    /// The connection header has been received from the peer but not sent
    HeaderReceived,

    /// The connection header has been sent to the peer but not received
    HeaderSent,

    /// Connection headers have been sent and received
    HeaderExchange,

    /// Both the connection header and the open frame have been sent but nothing has been
    /// received
    OpenPipe,

    /// Header, open and close have been sent but nothing has been received
    OpenClosePipe,

    /// An open frame has been received from the peer but an open frame has not been sent
    OpenReceived,

    /// An open frame has been sent to the peer but no open frame has yet been received
    OpenSent,

    /// Open and close have been sent but no open frame has yet been received
    ClosePipe,

    /// The open frame has been both sent and received
    Opened,

    /// A close frame has been received, frames can still be sent
    CloseReceived,

    /// A close frame has been sent. It is illegal to write anything more onto the connection
    CloseSent,

    /// A variant of CloseSent where the close is triggered by an error. Incoming frames are
    /// discarded until the peer's close frame is received
    Discarding,

    /// It is illegal for either endpoint to write anything more onto the connection
    End,
}

/// 2.5.5 Session States
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// UNMAPPED
    Unmapped,

    /// BEGIN SENT
    BeginSent,

    /// BEGIN RCVD
    BeginReceived,

    /// MAPPED
    Mapped,

    /// END SENT
    EndSent,

    /// END RCVD
    EndReceived,

    /// DISCARDING, the session ended with an error and is waiting for the peer's end
    Discarding,
}
