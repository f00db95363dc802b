//! Chat settings read from `TETHER_*` environment variables.

use std::time::Duration;

use tether::core::{
    DatagramConfig, MaxAttempts, Mode, Parity, SerialConfig, StreamConfig,
};
use tether::factory::TransportConfig;

/// Settings errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A variable holds a value that cannot be parsed.
    #[error("invalid value {value:?} for {name}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// A variable the selected transport needs is not set.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// Parity code outside 0..=4.
    #[error(transparent)]
    Parity(#[from] tether::core::ConfigError),
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, SettingsError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| SettingsError::Invalid { name, value }),
    }
}

/// Build a transport configuration from `lookup`.
///
/// `TETHER_KIND` selects `datagram` (default), `stream` or `serial`.
pub fn from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<TransportConfig, SettingsError> {
    let kind = lookup("TETHER_KIND").unwrap_or_else(|| "datagram".to_owned());
    let remote = lookup("TETHER_REMOTE").unwrap_or_else(|| "127.0.0.1".to_owned());

    match kind.trim() {
        "datagram" | "udp" => Ok(DatagramConfig::new(
            remote,
            parse(&lookup, "TETHER_LOCAL_PORT", 0)?,
            parse(&lookup, "TETHER_REMOTE_PORT", 0)?,
        )
        .into()),
        "stream" | "tcp" => {
            let mode = match lookup("TETHER_MODE").as_deref().map(str::trim) {
                None | Some("client") => Mode::Client,
                Some("server") => Mode::Server,
                Some(other) => {
                    return Err(SettingsError::Invalid {
                        name: "TETHER_MODE",
                        value: other.to_owned(),
                    });
                }
            };
            let max_attempts = match lookup("TETHER_MAX_ATTEMPTS").as_deref().map(str::trim) {
                None => MaxAttempts::default(),
                Some("unlimited") => MaxAttempts::Unlimited,
                Some(value) => MaxAttempts::Limited(value.parse().map_err(|_| {
                    SettingsError::Invalid {
                        name: "TETHER_MAX_ATTEMPTS",
                        value: value.to_owned(),
                    }
                })?),
            };
            let retry_ms: u64 = parse(&lookup, "TETHER_RETRY_MS", 100)?;
            Ok(StreamConfig::builder()
                .remote_address(remote)
                .local_port(parse(&lookup, "TETHER_LOCAL_PORT", 0)?)
                .remote_port(parse(&lookup, "TETHER_REMOTE_PORT", 0)?)
                .mode(mode)
                .max_attempts(max_attempts)
                .retry_interval(Duration::from_millis(retry_ms))
                .build()
                .into())
        }
        "serial" => {
            let device = lookup("TETHER_DEVICE").ok_or(SettingsError::Missing("TETHER_DEVICE"))?;
            let parity_code: u8 = parse(&lookup, "TETHER_PARITY", 0)?;
            Ok(SerialConfig::new(device)
                .with_baud_rate(parse(&lookup, "TETHER_BAUD", 115_200)?)
                .with_data_bits(parse(&lookup, "TETHER_DATA_BITS", 8)?)
                .with_stop_bits(parse(&lookup, "TETHER_STOP_BITS", 1)?)
                .with_parity(Parity::try_from(parity_code)?)
                .into())
        }
        other => Err(SettingsError::Invalid {
            name: "TETHER_KIND",
            value: other.to_owned(),
        }),
    }
}
