use oxamqp_types::definitions;

/// The link can no longer be used
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkStateError {
    /// Operation is not allowed in the current link state
    #[error("Illegal link state")]
    IllegalState,

    /// The peer detached the link
    #[error("Link was detached by the remote peer {:?}", .0)]
    RemoteDetached(Option<definitions::Error>),

    /// The link was detached locally
    #[error("Link is detached")]
    Detached,

    /// The link was detached locally after the peer violated the protocol
    #[error("Link was detached with error {}", .0)]
    LocalDetached(definitions::Error),

    /// The session the link is attached to has ended
    #[error("Session ended {:?}", .0)]
    SessionEnded(Option<definitions::Error>),

    /// The connection engine has stopped
    #[error("Transport is closed")]
    TransportClosed,
}

/// Error attaching a link
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttachError {
    /// The session is not mapped
    #[error("Illegal session state")]
    IllegalSessionState,

    /// The session already has a link with the same name
    #[error("Link name must be unique")]
    DuplicatedLinkName,

    /// No handle below the session's handle-max is free
    #[error("Handle max reached")]
    HandleMaxReached,

    /// The peer answered without a terminus on its side
    #[error("Link was refused by the remote peer")]
    Refused,

    /// The peer detached the link instead of attaching
    #[error("Link was detached by the remote peer {:?}", .0)]
    RemoteDetached(Option<definitions::Error>),

    /// The session ended or the connection stopped before the attach completed
    #[error(transparent)]
    State(#[from] LinkStateError),
}

/// Error sending a message
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SendError {
    /// The link or its session is unusable
    #[error(transparent)]
    State(#[from] LinkStateError),

    /// The message exceeds the receiver's max-message-size
    #[error("Message of {size} bytes exceeds the max message size {max}")]
    MessageSizeExceeded {
        /// Size of the payload
        size: u64,
        /// Value of max-message-size advertised by the receiver
        max: u64,
    },

    /// The receiver settled the delivery without a terminal outcome
    #[error("Delivery was settled without an outcome")]
    IllegalDeliveryState,
}

/// Error receiving a delivery
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecvError {
    /// The link or its session is unusable
    #[error(transparent)]
    State(#[from] LinkStateError),
}

/// Error detaching a link
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetachError {
    /// The link or its session is unusable
    #[error(transparent)]
    State(#[from] LinkStateError),

    /// The peer replied with an error
    #[error("Remote peer detached with error {}", .0)]
    Remote(definitions::Error),
}

/// Error sending a disposition or a flow
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispositionError {
    /// The link or its session is unusable
    #[error(transparent)]
    State(#[from] LinkStateError),

    /// The delivery was received on another link
    #[error("Delivery does not belong to this link")]
    ForeignDelivery,
}
