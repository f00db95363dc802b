//! Transport constants.
//!
//! Defaults here mirror the behavior the transports were tuned against;
//! callers override them through the configuration types.

use std::time::Duration;

// =============================================================================
// I/O SIZES
// =============================================================================

/// Maximum number of bytes a single `read()` returns.
pub const READ_BUFFER_SIZE: usize = 1024;

// =============================================================================
// TIMING
// =============================================================================

/// Granularity of the readiness wait inside `read()`.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of connection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between consecutive connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound on a single open/read/write call.
pub const DEFAULT_OPERATION_DEADLINE: Duration = Duration::from_secs(1);

// =============================================================================
// SERIAL LINE DEFAULTS
// =============================================================================

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default serial data bits.
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Default serial stop bits.
pub const DEFAULT_STOP_BITS: u8 = 1;

/// Baud rates accepted on every Unix platform.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115_200, 230_400,
];

/// Additional high baud rates available on Linux.
pub const EXTENDED_BAUD_RATES: &[u32] = &[
    460_800, 500_000, 576_000, 921_600, 1_000_000, 1_152_000, 1_500_000, 2_000_000, 2_500_000,
    3_000_000, 3_500_000, 4_000_000,
];
