//! Datagram (UDP) transport.
//!
//! One bound socket sends to a fixed remote and receives from any source.
//! There is no handshake, so `open()` goes straight to Connected.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, watch};
use tokio::time;

use super::connection::{ConnectionState, ConnectionStateMachine};
use crate::core::constants::{POLL_INTERVAL, READ_BUFFER_SIZE};
use crate::core::{
    DatagramConfig, Deadline, Frame, Transport, TransportError, TransportKind, TransportResult,
    resolve,
};
use crate::notify::NotificationBus;

/// Bound socket plus the resolved destination.
#[derive(Debug)]
struct Link {
    socket: UdpSocket,
    remote: SocketAddr,
}

/// UDP transport with a fixed destination.
///
/// The link lock is held for the whole of every operation, so calls on
/// one instance are serialized.
#[derive(Debug)]
pub struct DatagramTransport {
    config: DatagramConfig,
    link: Mutex<Option<Link>>,
    machine: ConnectionStateMachine,
    bus: NotificationBus,
}

impl DatagramTransport {
    /// Create a closed transport.
    pub fn new(config: DatagramConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
            machine: ConnectionStateMachine::new(),
            bus: NotificationBus::new(),
        }
    }

    /// Configuration this transport was created with.
    pub fn config(&self) -> &DatagramConfig {
        &self.config
    }

    /// Local address of the bound socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.link
            .lock()
            .await
            .as_ref()
            .and_then(|link| link.socket.local_addr().ok())
    }

    fn connected<'a>(&self, link: &'a Option<Link>) -> TransportResult<&'a Link> {
        let state = self.machine.state();
        match (state.is_connected(), link) {
            (true, Some(link)) => Ok(link),
            _ => Err(TransportError::NotConnected { state }),
        }
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.operation_deadline)
    }
}

#[async_trait]
impl Transport for DatagramTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Datagram
    }

    fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.machine.subscribe()
    }

    fn notifications(&self) -> &NotificationBus {
        &self.bus
    }

    async fn open(&self) -> TransportResult<()> {
        let mut link = self.link.lock().await;
        if self.machine.state().is_connected() {
            return Ok(());
        }

        let remote = match resolve(&self.config.remote_address, self.config.remote_port).await {
            Ok(remote) => remote,
            Err(err) => {
                self.machine.transition(ConnectionState::Closed);
                return Err(err.into());
            }
        };

        let local = SocketAddr::new(self.config.local_address, self.config.local_port);
        let socket = match UdpSocket::bind(local).await {
            Ok(socket) => socket,
            Err(err) => {
                tracing::error!(%local, error = %err, "datagram bind failed");
                if self.machine.state() != ConnectionState::Failed {
                    self.machine.fail();
                }
                return Err(TransportError::Io(err));
            }
        };

        tracing::info!(local = ?socket.local_addr().ok(), %remote, "datagram transport open");
        *link = Some(Link { socket, remote });
        self.machine.transition(ConnectionState::Connected);
        Ok(())
    }

    async fn close(&self) {
        let released = self.link.lock().await.take().is_some();
        if self.machine.state() != ConnectionState::Closed {
            self.machine.transition(ConnectionState::Closed);
            tracing::info!(released, "datagram transport closed");
        }
    }

    async fn read(&self) -> TransportResult<Frame> {
        let guard = self.link.lock().await;
        let link = self.connected(&guard)?;
        let deadline = self.deadline();
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let Some(remaining) = deadline.remaining() else {
                return Ok(Frame::empty());
            };
            match time::timeout(remaining.min(POLL_INTERVAL), link.socket.recv_from(&mut buf)).await
            {
                Err(_) => continue,
                Ok(Ok((len, source))) => {
                    let frame = Frame::copy_from_slice(&buf[..len]);
                    tracing::trace!(%source, len, data = %frame.to_hex(), "datagram received");
                    if !frame.is_empty() {
                        self.bus.notify(&frame);
                    }
                    return Ok(frame);
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "datagram receive failed");
                    return Err(TransportError::Io(err));
                }
            }
        }
    }

    async fn write(&self, frame: Frame) -> TransportResult<()> {
        let guard = self.link.lock().await;
        let link = self.connected(&guard)?;
        let deadline = self.deadline();
        let Some(remaining) = deadline.remaining() else {
            return Err(TransportError::Timeout(deadline.budget()));
        };

        match time::timeout(remaining, link.socket.send_to(frame.as_bytes(), link.remote)).await {
            Ok(Ok(sent)) if sent == frame.len() => {
                tracing::trace!(remote = %link.remote, len = sent, "datagram sent");
                Ok(())
            }
            Ok(Ok(sent)) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram send: {sent} of {} bytes", frame.len()),
            ))),
            Ok(Err(err)) => {
                tracing::warn!(remote = %link.remote, error = %err, "datagram send failed");
                Err(TransportError::Io(err))
            }
            Err(_) => Err(TransportError::Timeout(deadline.budget())),
        }
    }
}
