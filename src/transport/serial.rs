//! Serial line transport over a Unix TTY device.
//!
//! The device is opened non-blocking and put in raw mode: no line editing,
//! no echo, no flow control, `VMIN = 0` and `VTIME = 0`. Readiness comes
//! from the tokio reactor through [`AsyncFd`].

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

use async_trait::async_trait;
use tokio::io::unix::AsyncFd;
use tokio::sync::{Mutex, watch};
use tokio::time;

use super::connection::{ConnectionState, ConnectionStateMachine};
use crate::core::constants::{POLL_INTERVAL, READ_BUFFER_SIZE};
use crate::core::{
    Deadline, Frame, Parity, SerialConfig, Transport, TransportError, TransportKind,
    TransportResult,
};
use crate::notify::NotificationBus;

type Port = AsyncFd<File>;

/// Serial transport. Calls on one instance are serialized by the port lock.
#[derive(Debug)]
pub struct SerialTransport {
    config: SerialConfig,
    port: Mutex<Option<Port>>,
    machine: ConnectionStateMachine,
    bus: NotificationBus,
}

impl SerialTransport {
    /// Create a closed transport. The line parameters are checked by
    /// `open()`, before the device is touched.
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            port: Mutex::new(None),
            machine: ConnectionStateMachine::new(),
            bus: NotificationBus::new(),
        }
    }

    /// Configuration this transport was created with.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn connected<'a>(&self, port: &'a Option<Port>) -> TransportResult<&'a Port> {
        let state = self.machine.state();
        match (state.is_connected(), port) {
            (true, Some(port)) => Ok(port),
            _ => Err(TransportError::NotConnected { state }),
        }
    }

    fn open_device(&self) -> io::Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&self.config.device)?;
        configure(file.as_raw_fd(), &self.config)?;
        Ok(file)
    }
}

fn register(file: File) -> io::Result<Port> {
    // SAFETY: the `File` owns its descriptor and moves into the `AsyncFd`,
    // so the descriptor stays open and unchanged until the port is dropped.
    let port = unsafe { AsyncFd::register(file) }?;
    Ok(port)
}

fn cvt(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn baud_constant(rate: u32) -> Option<libc::speed_t> {
    let speed = match rate {
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        500_000 => libc::B500000,
        #[cfg(target_os = "linux")]
        576_000 => libc::B576000,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        #[cfg(target_os = "linux")]
        1_000_000 => libc::B1000000,
        #[cfg(target_os = "linux")]
        1_152_000 => libc::B1152000,
        #[cfg(target_os = "linux")]
        1_500_000 => libc::B1500000,
        #[cfg(target_os = "linux")]
        2_000_000 => libc::B2000000,
        #[cfg(target_os = "linux")]
        2_500_000 => libc::B2500000,
        #[cfg(target_os = "linux")]
        3_000_000 => libc::B3000000,
        #[cfg(target_os = "linux")]
        3_500_000 => libc::B3500000,
        #[cfg(target_os = "linux")]
        4_000_000 => libc::B4000000,
        _ => return None,
    };
    Some(speed)
}

/// Apply raw mode and the configured line parameters, then discard any
/// bytes queued in either direction.
fn configure(fd: RawFd, config: &SerialConfig) -> io::Result<()> {
    let speed = baud_constant(config.baud_rate).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {}", config.baud_rate),
        )
    })?;

    // SAFETY: termios is plain data; tcgetattr fills every field before use.
    let mut tty: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open descriptor and `tty` a valid out-pointer.
    cvt(unsafe { libc::tcgetattr(fd, &mut tty) })?;
    // SAFETY: `tty` was initialised by tcgetattr.
    unsafe {
        libc::cfmakeraw(&mut tty);
        cvt(libc::cfsetispeed(&mut tty, speed))?;
        cvt(libc::cfsetospeed(&mut tty, speed))?;
    }

    tty.c_cflag &= !libc::CSIZE;
    tty.c_cflag |= match config.data_bits {
        5 => libc::CS5,
        6 => libc::CS6,
        7 => libc::CS7,
        _ => libc::CS8,
    };

    tty.c_cflag &= !(libc::PARENB | libc::PARODD);
    #[cfg(target_os = "linux")]
    {
        tty.c_cflag &= !libc::CMSPAR;
    }
    match config.parity {
        Parity::None => {}
        Parity::Odd => tty.c_cflag |= libc::PARENB | libc::PARODD,
        Parity::Even => tty.c_cflag |= libc::PARENB,
        #[cfg(target_os = "linux")]
        Parity::Mark => tty.c_cflag |= libc::PARENB | libc::CMSPAR | libc::PARODD,
        #[cfg(target_os = "linux")]
        Parity::Space => tty.c_cflag |= libc::PARENB | libc::CMSPAR,
        #[cfg(not(target_os = "linux"))]
        Parity::Mark | Parity::Space => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{} parity is not available on this platform", config.parity),
            ));
        }
    }

    if config.stop_bits == 2 {
        tty.c_cflag |= libc::CSTOPB;
    } else {
        tty.c_cflag &= !libc::CSTOPB;
    }

    tty.c_cflag |= libc::CLOCAL | libc::CREAD;
    #[cfg(target_os = "linux")]
    {
        tty.c_cflag &= !libc::CRTSCTS;
    }
    tty.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    tty.c_cc[libc::VMIN] = 0;
    tty.c_cc[libc::VTIME] = 0;

    // SAFETY: `fd` is open and `tty` fully initialised.
    cvt(unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) })?;
    // SAFETY: `fd` is open.
    cvt(unsafe { libc::tcflush(fd, libc::TCIOFLUSH) })
}

#[async_trait]
impl Transport for SerialTransport {
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
        let mut slot = self.port.lock().await;
        if self.machine.state().is_connected() {
            return Ok(());
        }

        let device = self.config.device.display();
        if let Err(err) = self.config.validate() {
            tracing::error!(%device, error = %err, "invalid serial configuration");
            self.machine.transition(ConnectionState::Closed);
            return Err(err.into());
        }

        let port = match self.open_device().and_then(register) {
            Ok(port) => port,
            Err(err) => {
                tracing::error!(%device, error = %err, "serial open failed");
                if self.machine.state() != ConnectionState::Failed {
                    self.machine.fail();
                }
                return Err(TransportError::Io(err));
            }
        };

        tracing::info!(
            %device,
            baud = self.config.baud_rate,
            data_bits = self.config.data_bits,
            stop_bits = self.config.stop_bits,
            parity = %self.config.parity,
            "serial transport open"
        );
        *slot = Some(port);
        self.machine.transition(ConnectionState::Connected);
        Ok(())
    }

    async fn close(&self) {
        let released = self.port.lock().await.take().is_some();
        if self.machine.state() != ConnectionState::Closed {
            self.machine.transition(ConnectionState::Closed);
            tracing::info!(released, "serial transport closed");
        }
    }

    async fn read(&self) -> TransportResult<Frame> {
        let slot = self.port.lock().await;
        let port = self.connected(&slot)?;
        let deadline = Deadline::after(self.config.operation_deadline);
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let Some(remaining) = deadline.remaining() else {
                return Ok(Frame::empty());
            };
            let mut guard = match time::timeout(remaining.min(POLL_INTERVAL), port.readable()).await
            {
                Err(_) => continue,
                Ok(Ok(guard)) => guard,
                Ok(Err(err)) => return Err(TransportError::Io(err)),
            };
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(&mut buf)
            }) {
                // VMIN = 0 reports an empty line as a zero-length read.
                Ok(Ok(0)) => guard.clear_ready(),
                Ok(Ok(n)) => {
                    let frame = Frame::copy_from_slice(&buf[..n]);
                    tracing::trace!(len = n, data = %frame.to_hex(), "serial bytes received");
                    self.bus.notify(&frame);
                    return Ok(frame);
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "serial read failed");
                    return Err(TransportError::Io(err));
                }
                Err(_would_block) => {}
            }
        }
    }

    async fn write(&self, frame: Frame) -> TransportResult<()> {
        let slot = self.port.lock().await;
        let port = self.connected(&slot)?;
        let deadline = Deadline::after(self.config.operation_deadline);
        let mut written = 0;

        while written < frame.len() {
            let Some(remaining) = deadline.remaining() else {
                return Err(TransportError::Timeout(deadline.budget()));
            };
            let mut guard = match time::timeout(remaining, port.writable()).await {
                Err(_) => return Err(TransportError::Timeout(deadline.budget())),
                Ok(Ok(guard)) => guard,
                Ok(Err(err)) => return Err(TransportError::Io(err)),
            };
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(&frame[written..])
            }) {
                Ok(Ok(0)) => {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "serial device accepted no bytes",
                    )));
                }
                Ok(Ok(n)) => written += n,
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "serial write failed");
                    return Err(TransportError::Io(err));
                }
                Err(_would_block) => {}
            }
        }
        tracing::trace!(len = written, "serial bytes sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalid_baud_rate_leaves_closed() {
        let transport =
            SerialTransport::new(SerialConfig::new("/dev/does-not-exist").with_baud_rate(12_345));

        let result = transport.open().await;
        assert!(matches!(
            result,
            Err(TransportError::Configuration(ConfigError::UnsupportedBaudRate(12_345)))
        ));
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_data_bits_leaves_closed() {
        let transport =
            SerialTransport::new(SerialConfig::new("/dev/does-not-exist").with_data_bits(9));

        assert!(matches!(
            transport.open().await,
            Err(TransportError::Configuration(ConfigError::InvalidDataBits(9)))
        ));
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_missing_device_fails() {
        let transport = SerialTransport::new(SerialConfig::new("/dev/does-not-exist"));

        let result = transport.open().await;
        assert!(matches!(result, Err(TransportError::Io(_))), "{result:?}");
        assert_eq!(transport.state(), ConnectionState::Failed);

        transport.close().await;
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_baud_table_covers_standard_rates() {
        for &rate in crate::core::constants::STANDARD_BAUD_RATES {
            assert!(baud_constant(rate).is_some(), "{rate}");
        }
        assert!(baud_constant(12_345).is_none());
    }

    #[cfg(target_os = "linux")]
    mod pty {
        use super::*;
        use std::ffi::CStr;
        use std::os::unix::io::FromRawFd;
        use std::path::PathBuf;

        /// Open a pseudo-terminal pair, returning the master and the slave
        /// path. `None` when the environment has no pty support.
        fn open_pty() -> Option<(File, PathBuf)> {
            unsafe {
                let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
                if master < 0 {
                    return None;
                }
                let master_file = File::from_raw_fd(master);
                if libc::grantpt(master) != 0 || libc::unlockpt(master) != 0 {
                    return None;
                }
                let mut name = [0 as libc::c_char; 128];
                if libc::ptsname_r(master, name.as_mut_ptr(), name.len()) != 0 {
                    return None;
                }
                let path = CStr::from_ptr(name.as_ptr()).to_str().ok()?.to_owned();
                Some((master_file, PathBuf::from(path)))
            }
        }

        #[tokio::test]
        async fn test_pty_round_trip() {
            let Some((mut master, slave)) = open_pty() else {
                eprintln!("no pty support, skipping");
                return;
            };
            let config = SerialConfig::new(slave)
                .with_baud_rate(9600)
                .with_operation_deadline(Duration::from_millis(500));
            let transport = SerialTransport::new(config);
            transport.open().await.unwrap();
            assert_eq!(transport.state(), ConnectionState::Connected);

            master.write_all(b"hello").unwrap();
            let mut received = Vec::new();
            for _ in 0..5 {
                received.extend_from_slice(&transport.read().await.unwrap());
                if received.len() >= 5 {
                    break;
                }
            }
            assert_eq!(received, b"hello");

            transport.write(Frame::from("world")).await.unwrap();
            let mut echoed = [0u8; 5];
            master.read_exact(&mut echoed).unwrap();
            assert_eq!(&echoed, b"world");

            transport.close().await;
            assert_eq!(transport.state(), ConnectionState::Closed);
        }

        #[tokio::test]
        async fn test_pty_read_timeout_returns_empty() {
            let Some((_master, slave)) = open_pty() else {
                return;
            };
            let transport = SerialTransport::new(
                SerialConfig::new(slave).with_operation_deadline(Duration::from_millis(100)),
            );
            transport.open().await.unwrap();

            assert!(transport.read().await.unwrap().is_empty());
            assert_eq!(transport.state(), ConnectionState::Connected);
        }
    }
}
