#![warn(missing_docs, missing_debug_implementations)]

//! An AMQP 1.0 protocol engine on top of tokio
//!
//! A [`Connection`] multiplexes [`Session`]s over one byte stream, and each session carries
//! [`Sender`] and [`Receiver`] links. One event loop task per connection reads frames and applies
//! them to the shared endpoint state; a writer task serializes every outgoing frame.
//!
//! ```rust, ignore
//! use oxamqp::{Connection, Receiver, Sender, Session};
//!
//! let mut connection = Connection::open("connection-1", "amqp://localhost:5672").await?;
//! let mut session = Session::begin(&mut connection).await?;
//!
//! let mut sender = Sender::attach(&mut session, "rust-sender-link-1", "q1").await?;
//! let outcome = sender.send("hello AMQP").await?;
//!
//! let mut receiver = Receiver::attach(&mut session, "rust-receiver-link-1", "q1").await?;
//! let delivery = receiver.recv().await?;
//! receiver.accept(&delivery)?;
//!
//! sender.close().await?;
//! receiver.close().await?;
//! session.end().await?;
//! connection.close().await?;
//! ```

pub(crate) mod control;
pub(crate) mod util;

pub mod connection;
pub mod frames;
pub mod link;
pub mod pool;
pub mod sasl;
pub mod session;
pub mod transport;

/// Raw bytes of an encoded message
pub type Payload = bytes::Bytes;

pub use connection::{Connection, ConnectionHandle};
pub use link::{Delivery, DeliveryFut, Receiver, RemoteLink, Sendable, Sender};
pub use session::SessionHandle as Session;
pub use util::{Initialized, Uninitialized};

pub use oxamqp_types as types;
