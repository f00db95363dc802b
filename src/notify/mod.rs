//! Frame notification bus.
//!
//! Every transport owns a [`NotificationBus`]. A successful nonempty
//! `read()` publishes the frame to the bus before returning it, so
//! subscribers observe inbound data without polling the transport.

mod bus;

pub use bus::{NotificationBus, Subscriber, SubscriptionId};
