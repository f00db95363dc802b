//! Transport construction.
//!
//! [`TransportFactory`] turns a [`TransportConfig`] into an unopened
//! `Box<dyn Transport>`. Construction never performs I/O; parameter
//! problems such as an unsupported baud rate surface from `open()`.
//!
//! ```no_run
//! use std::time::Duration;
//! use tether::prelude::*;
//!
//! # async fn run() -> TransportResult<()> {
//! let transport = TransportFactory::create_stream(
//!     "127.0.0.1",
//!     0,
//!     7000,
//!     Mode::Client,
//!     3u32,
//!     Duration::from_millis(250),
//!     Duration::from_secs(2),
//! );
//! transport.open().await?;
//! transport.write(Frame::from("hello")).await?;
//! let reply = transport.read().await?;
//! println!("{reply}");
//! transport.close().await;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::{
    DatagramConfig, MaxAttempts, Mode, Parity, SerialConfig, StreamConfig, Transport,
    TransportKind,
};
#[cfg(all(unix, feature = "serial"))]
use crate::transport::SerialTransport;
use crate::transport::{DatagramTransport, StreamTransport};

/// Configuration for any transport variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// TCP client or server.
    Stream(StreamConfig),
    /// UDP with a fixed destination.
    Datagram(DatagramConfig),
    /// Serial line.
    Serial(SerialConfig),
}

impl TransportConfig {
    /// Variant this configuration builds.
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Stream(_) => TransportKind::Stream,
            TransportConfig::Datagram(_) => TransportKind::Datagram,
            TransportConfig::Serial(_) => TransportKind::Serial,
        }
    }
}

impl From<StreamConfig> for TransportConfig {
    fn from(config: StreamConfig) -> Self {
        TransportConfig::Stream(config)
    }
}

impl From<DatagramConfig> for TransportConfig {
    fn from(config: DatagramConfig) -> Self {
        TransportConfig::Datagram(config)
    }
}

impl From<SerialConfig> for TransportConfig {
    fn from(config: SerialConfig) -> Self {
        TransportConfig::Serial(config)
    }
}

/// Builds unopened transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportFactory;

impl TransportFactory {
    /// Build the transport described by `config`.
    pub fn create(config: impl Into<TransportConfig>) -> Box<dyn Transport> {
        let config = config.into();
        tracing::debug!(kind = %config.kind(), "creating transport");
        match config {
            TransportConfig::Stream(config) => Box::new(StreamTransport::new(config)),
            TransportConfig::Datagram(config) => Box::new(DatagramTransport::new(config)),
            TransportConfig::Serial(config) => serial(config),
        }
    }

    /// UDP transport sending to `remote_address:remote_port` from
    /// `local_port`.
    pub fn create_datagram(
        remote_address: impl Into<String>,
        local_port: u16,
        remote_port: u16,
    ) -> Box<dyn Transport> {
        Self::create(DatagramConfig::new(remote_address, local_port, remote_port))
    }

    /// Serial transport on `device`. The line parameters are validated by
    /// `open()`.
    pub fn create_serial(
        device: impl Into<PathBuf>,
        baud_rate: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: Parity,
    ) -> Box<dyn Transport> {
        Self::create(
            SerialConfig::new(device)
                .with_baud_rate(baud_rate)
                .with_data_bits(data_bits)
                .with_stop_bits(stop_bits)
                .with_parity(parity),
        )
    }

    /// TCP transport. In client mode `remote_address:remote_port` is dialed
    /// with up to `max_attempts` tries spaced by `retry_interval`; in server
    /// mode the transport listens on `local_port`.
    ///
    /// `operation_deadline` bounds each call, including the whole connect
    /// loop, so it must cover `max_attempts * retry_interval` for the
    /// attempt ceiling to be reached.
    pub fn create_stream(
        remote_address: impl Into<String>,
        local_port: u16,
        remote_port: u16,
        mode: Mode,
        max_attempts: impl Into<MaxAttempts>,
        retry_interval: Duration,
        operation_deadline: Duration,
    ) -> Box<dyn Transport> {
        Self::create(
            StreamConfig::builder()
                .remote_address(remote_address)
                .local_port(local_port)
                .remote_port(remote_port)
                .mode(mode)
                .max_attempts(max_attempts)
                .retry_interval(retry_interval)
                .operation_deadline(operation_deadline)
                .build(),
        )
    }
}

#[cfg(all(unix, feature = "serial"))]
fn serial(config: SerialConfig) -> Box<dyn Transport> {
    Box::new(SerialTransport::new(config))
}

#[cfg(not(all(unix, feature = "serial")))]
fn serial(config: SerialConfig) -> Box<dyn Transport> {
    Box::new(unavailable::SerialUnavailable::new(config))
}

/// Stand-in used when serial support is compiled out; `open()` always
/// reports the line as unsupported.
#[cfg(not(all(unix, feature = "serial")))]
mod unavailable {
    use std::io;

    use async_trait::async_trait;
    use tokio::sync::watch;

    use crate::core::{
        Frame, SerialConfig, Transport, TransportError, TransportKind, TransportResult,
    };
    use crate::notify::NotificationBus;
    use crate::transport::{ConnectionState, ConnectionStateMachine};

    #[derive(Debug)]
    pub(super) struct SerialUnavailable {
        config: SerialConfig,
        machine: ConnectionStateMachine,
        bus: NotificationBus,
    }

    impl SerialUnavailable {
        pub(super) fn new(config: SerialConfig) -> Self {
            Self {
                config,
                machine: ConnectionStateMachine::new(),
                bus: NotificationBus::new(),
            }
        }

        fn not_connected(&self) -> TransportError {
            TransportError::NotConnected {
                state: self.machine.state(),
            }
        }
    }

    #[async_trait]
    impl Transport for SerialUnavailable {
        fn kind(&self) -> TransportKind {
            TransportKind::Serial
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
            self.config.validate()?;
            if self.machine.state() != ConnectionState::Failed {
                self.machine.fail();
            }
            Err(TransportError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "serial support is not compiled in",
            )))
        }

        async fn close(&self) {
            self.machine.transition(ConnectionState::Closed);
        }

        async fn read(&self) -> TransportResult<Frame> {
            Err(self.not_connected())
        }

        async fn write(&self, _frame: Frame) -> TransportResult<()> {
            Err(self.not_connected())
        }
    }
}
