//! Core traits shared by every transport.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::watch;

use super::error::TransportResult;
use super::frame::Frame;
use crate::notify::NotificationBus;
use crate::transport::ConnectionState;

/// Transport medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Connection-oriented byte stream (TCP).
    Stream,
    /// Connectionless datagrams (UDP).
    Datagram,
    /// Serial line.
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Stream => "stream",
            TransportKind::Datagram => "datagram",
            TransportKind::Serial => "serial",
        };
        f.write_str(name)
    }
}

/// Open/close/read/write over one communication medium.
///
/// Every operation on one instance is serialized by the transport's own
/// lock, so a `read()` waiting for data delays a concurrent `write()` on
/// the same instance.
///
/// # Contract
///
/// - `read` and `write` fail with `NotConnected` unless the state is
///   [`ConnectionState::Connected`].
/// - `read` returns an empty [`Frame`] when nothing arrives before the
///   operation deadline. That is not an error and does not change state.
/// - A nonempty frame returned by `read` has already been delivered to the
///   transport's [`NotificationBus`].
/// - `close` is idempotent and legal in every state.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Medium of this transport.
    fn kind(&self) -> TransportKind;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Receiver that observes every state transition.
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// Bus notified with every nonempty frame returned by `read`.
    fn notifications(&self) -> &NotificationBus;

    /// Establish the OS channel.
    async fn open(&self) -> TransportResult<()>;

    /// Release the OS channel. Never fails.
    async fn close(&self);

    /// Wait for at most one buffer of inbound bytes.
    async fn read(&self) -> TransportResult<Frame>;

    /// Send one frame.
    async fn write(&self, frame: Frame) -> TransportResult<()>;
}
