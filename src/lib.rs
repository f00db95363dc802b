//! # tether
//!
//! One connection-oriented interface over three media:
//!
//! - **Stream** (TCP): client with bounded connect retries, or a server that
//!   accepts a single peer in the background. A failed write reconnects
//!   once and retries.
//! - **Datagram** (UDP): fixed destination, receives from any source.
//! - **Serial**: raw-mode Unix TTY with configurable baud rate, data bits,
//!   stop bits and parity.
//!
//! Every transport exposes the same `open` / `read` / `write` / `close`
//! surface through [`Transport`], reports its lifecycle as a
//! [`ConnectionState`], bounds each call by an operation deadline, and
//! publishes received frames to a [`NotificationBus`].
//!
//! ## Feature Flags
//!
//! - `serial` (default): serial line transport (Unix only, uses `libc`)
//!
//! ## Modules
//!
//! - [`core`]: frames, configuration, retry policy, errors, the
//!   [`Transport`] trait
//! - [`transport`]: the concrete transports and the connection state machine
//! - [`notify`]: the subscriber registry
//! - [`factory`]: construction from a configuration value
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::prelude::*;
//!
//! # async fn run() -> TransportResult<()> {
//! let transport = TransportFactory::create_datagram("127.0.0.1", 9000, 9001);
//! transport.open().await?;
//!
//! let printer = Arc::new(|frame: &Frame| println!("received {frame}"));
//! transport.notifications().add_subscriber(&printer);
//!
//! transport.write(Frame::from("ping")).await?;
//! let frame = transport.read().await?;
//! if frame.is_empty() {
//!     println!("nothing arrived before the deadline");
//! }
//! transport.close().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod factory;
pub mod notify;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::factory::{TransportConfig, TransportFactory};
    pub use crate::notify::{NotificationBus, Subscriber, SubscriptionId};
    #[cfg(all(unix, feature = "serial"))]
    pub use crate::transport::SerialTransport;
    pub use crate::transport::{
        ConnectionState, ConnectionStateMachine, DatagramTransport, StreamTransport,
    };
}

// Re-export commonly used items at crate root
pub use self::core::{Frame, Transport, TransportError, TransportResult};
pub use self::factory::TransportFactory;
pub use self::notify::NotificationBus;
pub use self::transport::ConnectionState;
