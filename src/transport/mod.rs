//! Concrete transports.
//!
//! - [`StreamTransport`]: TCP, client or single-peer server, with bounded
//!   connect retries and write-side reconnection
//! - [`DatagramTransport`]: UDP with a fixed destination
//! - [`SerialTransport`]: raw-mode Unix TTY (feature `serial`)
//!
//! All three implement [`Transport`](crate::core::Transport) and share the
//! [`ConnectionState`] lifecycle.

mod connection;
mod datagram;
#[cfg(all(unix, feature = "serial"))]
mod serial;
mod stream;

pub use connection::{ConnectionState, ConnectionStateMachine};
pub use datagram::DatagramTransport;
#[cfg(all(unix, feature = "serial"))]
#[cfg_attr(docsrs, doc(cfg(all(unix, feature = "serial"))))]
pub use serial::SerialTransport;
pub use stream::StreamTransport;
