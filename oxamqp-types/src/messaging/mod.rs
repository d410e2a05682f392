//! Types defined in AMQP 1.0 specification Part 3: Messaging
//!
//! Only the terminus and delivery state types are provided, message sections are left to the
//! application.

mod delivery_state;
pub use delivery_state::*;

mod source;
pub use source::*;

mod target;
pub use target::*;

mod terminus;
pub use terminus::*;
