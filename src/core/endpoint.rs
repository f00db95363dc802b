//! Endpoint configuration for each transport medium.
//!
//! Construction never validates: every value is checked when the transport
//! is opened, so a bad parameter surfaces as a
//! [`ConfigError`](super::ConfigError) from `open()`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use super::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS, DEFAULT_OPERATION_DEADLINE, DEFAULT_STOP_BITS,
    EXTENDED_BAUD_RATES, STANDARD_BAUD_RATES,
};
use super::error::ConfigError;
use super::retry::{MaxAttempts, RetryPolicy};

/// Which side of a stream connection this transport plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Actively connects to the remote endpoint.
    #[default]
    Client,
    /// Binds the local port and accepts a single peer.
    Server,
}

/// Stream (TCP) endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Remote host, as an IP literal or a resolvable name.
    pub remote_address: String,
    /// Local interface to bind in server mode, or for a fixed client port.
    pub local_address: IpAddr,
    /// Local port. Zero picks an ephemeral port.
    pub local_port: u16,
    /// Remote port to connect to in client mode.
    pub remote_port: u16,
    /// Client or server role.
    pub mode: Mode,
    /// Connection and I/O retry policy.
    pub retry: RetryPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            remote_address: Ipv4Addr::LOCALHOST.to_string(),
            local_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: 0,
            remote_port: 0,
            mode: Mode::Client,
            retry: RetryPolicy::default(),
        }
    }
}

impl StreamConfig {
    /// Start building a stream configuration.
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::new()
    }
}

/// Builder for [`StreamConfig`].
#[derive(Debug)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    /// Create a builder with default values.
    pub fn new() -> Self {
        Self {
            config: StreamConfig::default(),
        }
    }

    /// Set the remote host.
    pub fn remote_address(mut self, address: impl Into<String>) -> Self {
        self.config.remote_address = address.into();
        self
    }

    /// Set the local interface.
    pub fn local_address(mut self, address: IpAddr) -> Self {
        self.config.local_address = address;
        self
    }

    /// Set the local port.
    pub fn local_port(mut self, port: u16) -> Self {
        self.config.local_port = port;
        self
    }

    /// Set the remote port.
    pub fn remote_port(mut self, port: u16) -> Self {
        self.config.remote_port = port;
        self
    }

    /// Set client or server mode.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the connection attempt ceiling.
    pub fn max_attempts(mut self, max: impl Into<MaxAttempts>) -> Self {
        self.config.retry.max_attempts = max.into();
        self
    }

    /// Set the pause between connection attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry.retry_interval = interval;
        self
    }

    /// Set the per-call deadline.
    pub fn operation_deadline(mut self, deadline: Duration) -> Self {
        self.config.retry.operation_deadline = deadline;
        self
    }

    /// Replace the whole retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the stream configuration.
    pub fn build(self) -> StreamConfig {
        self.config
    }
}

impl Default for StreamConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Datagram (UDP) endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramConfig {
    /// Remote host every frame is sent to.
    pub remote_address: String,
    /// Local interface to bind.
    pub local_address: IpAddr,
    /// Local port. Zero picks an ephemeral port.
    pub local_port: u16,
    /// Remote port.
    pub remote_port: u16,
    /// Bound on one read/write call.
    pub operation_deadline: Duration,
}

impl DatagramConfig {
    /// Create a configuration sending to `remote_address:remote_port`.
    pub fn new(remote_address: impl Into<String>, local_port: u16, remote_port: u16) -> Self {
        Self {
            remote_address: remote_address.into(),
            local_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port,
            remote_port,
            operation_deadline: DEFAULT_OPERATION_DEADLINE,
        }
    }

    /// Set the local interface.
    pub fn with_local_address(mut self, address: IpAddr) -> Self {
        self.local_address = address;
        self
    }

    /// Set the per-call deadline.
    pub fn with_operation_deadline(mut self, deadline: Duration) -> Self {
        self.operation_deadline = deadline;
        self
    }
}

/// Serial line parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
    /// Parity bit always set. Linux only.
    Mark,
    /// Parity bit always clear. Linux only.
    Space,
}

impl Parity {
    /// Check if the running platform can configure this parity.
    pub fn is_supported(self) -> bool {
        match self {
            Parity::None | Parity::Odd | Parity::Even => true,
            Parity::Mark | Parity::Space => cfg!(target_os = "linux"),
        }
    }
}

/// Numeric codes used by command surfaces: 0 none, 1 odd, 2 even, 3 mark,
/// 4 space.
impl TryFrom<u8> for Parity {
    type Error = ConfigError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            3 => Ok(Parity::Mark),
            4 => Ok(Parity::Space),
            other => Err(ConfigError::InvalidParityCode(other)),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
            Parity::Mark => "mark",
            Parity::Space => "space",
        };
        f.write_str(name)
    }
}

/// Serial line configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub device: PathBuf,
    /// Line speed in bits per second.
    pub baud_rate: u32,
    /// Bits per character, 5 to 8.
    pub data_bits: u8,
    /// Stop bits, 1 or 2.
    pub stop_bits: u8,
    /// Parity mode.
    pub parity: Parity,
    /// Bound on one read/write call.
    pub operation_deadline: Duration,
}

impl SerialConfig {
    /// Create a 115200 8N1 configuration for `device`.
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DEFAULT_DATA_BITS,
            stop_bits: DEFAULT_STOP_BITS,
            parity: Parity::None,
            operation_deadline: DEFAULT_OPERATION_DEADLINE,
        }
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the data bits.
    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set the stop bits.
    pub fn with_stop_bits(mut self, stop_bits: u8) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set the parity.
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the per-call deadline.
    pub fn with_operation_deadline(mut self, deadline: Duration) -> Self {
        self.operation_deadline = deadline;
        self
    }

    /// Check every line parameter without touching the device.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_supported_baud_rate(self.baud_rate) {
            return Err(ConfigError::UnsupportedBaudRate(self.baud_rate));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::InvalidDataBits(self.data_bits));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(ConfigError::InvalidStopBits(self.stop_bits));
        }
        if !self.parity.is_supported() {
            return Err(ConfigError::UnsupportedParity(self.parity));
        }
        Ok(())
    }
}

/// Check if `baud_rate` can be configured on the running platform.
pub fn is_supported_baud_rate(baud_rate: u32) -> bool {
    STANDARD_BAUD_RATES.contains(&baud_rate)
        || (cfg!(target_os = "linux") && EXTENDED_BAUD_RATES.contains(&baud_rate))
}

/// Resolve `host:port` to the first matching socket address.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let invalid = || ConfigError::InvalidAddress(format!("{host}:{port}"));
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| invalid())?
        .next()
        .ok_or_else(invalid)
}
