//! Error types for tether transports.

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::endpoint::Parity;
use crate::transport::ConnectionState;

/// Invalid medium parameters, detected before any socket or device is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Baud rate is not a standard rate on this platform.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// Data bits outside 5..=8.
    #[error("invalid data bits: {0} (expected 5, 6, 7 or 8)")]
    InvalidDataBits(u8),

    /// Stop bits other than 1 or 2.
    #[error("invalid stop bits: {0} (expected 1 or 2)")]
    InvalidStopBits(u8),

    /// Parity mode not available on this platform.
    #[error("parity {0} is not supported on this platform")]
    UnsupportedParity(Parity),

    /// Numeric parity code outside 0..=4.
    #[error("invalid parity code: {0}")]
    InvalidParityCode(u8),

    /// Address could not be parsed or resolved.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Configuration error; the transport stays closed.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Read or write attempted outside the Connected state.
    #[error("transport not connected (state: {state})")]
    NotConnected {
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// Connection attempt budget consumed without success.
    #[error("connection retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of connection attempts made.
        attempts: u32,
        /// Error from the last attempt, if any attempt was made.
        #[source]
        source: Option<io::Error>,
    },

    /// Operation deadline elapsed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// OS-level send/receive failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Check if this error should end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Configuration(_) | TransportError::RetriesExhausted { .. }
        )
    }

    /// Check if the session can continue after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_) | TransportError::Timeout(_) | TransportError::NotConnected { .. }
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
