//! Stream (TCP) transport with bounded connect retries and write-side
//! reconnection.
//!
//! A client connects with up to `max_attempts` tries spaced by
//! `retry_interval`, all inside the operation deadline. A server binds
//! synchronously in `open()` and accepts its single peer on a background
//! task, so `open()` returns while the transport is still Listening.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time;

use super::connection::{ConnectionState, ConnectionStateMachine};
use crate::core::constants::{POLL_INTERVAL, READ_BUFFER_SIZE};
use crate::core::{
    Deadline, Frame, Mode, StreamConfig, Transport, TransportError, TransportKind,
    TransportResult, resolve,
};
use crate::notify::NotificationBus;

/// Channel state guarded by the I/O lock.
#[derive(Debug, Default)]
struct Channel {
    stream: Option<TcpStream>,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    /// A read saw the peer hang up; the next write reconnects first.
    broken: bool,
    /// Bumped by close so a stale accept task drops its peer.
    generation: u64,
}

impl Channel {
    fn install(&mut self, stream: TcpStream) {
        self.local_addr = stream.local_addr().ok();
        self.peer_addr = stream.peer_addr().ok();
        self.stream = Some(stream);
        self.broken = false;
    }

    async fn release(&mut self) -> bool {
        self.broken = false;
        self.peer_addr = None;
        match self.stream.take() {
            Some(mut stream) => {
                if let Err(err) = stream.shutdown().await {
                    tracing::debug!(error = %err, "stream shutdown failed");
                }
                true
            }
            None => false,
        }
    }
}

/// TCP transport in client or server mode.
#[derive(Debug)]
pub struct StreamTransport {
    config: StreamConfig,
    channel: Arc<Mutex<Channel>>,
    machine: Arc<ConnectionStateMachine>,
    bus: NotificationBus,
    accept_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    /// Create a closed transport. Nothing touches the network until `open()`.
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            channel: Arc::new(Mutex::new(Channel::default())),
            machine: Arc::new(ConnectionStateMachine::new()),
            bus: NotificationBus::new(),
            accept_task: SyncMutex::new(None),
        }
    }

    /// Configuration this transport was created with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Connection attempts made by the current or last connect sequence.
    pub fn attempts(&self) -> u32 {
        self.machine.attempts()
    }

    /// Local address of the listener (server) or of the connected socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.channel.lock().await.local_addr
    }

    /// Address of the connected peer.
    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        self.channel.lock().await.peer_addr
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        let state = self.machine.state();
        if state.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected { state })
        }
    }

    async fn open_client(&self, channel: &mut Channel) -> TransportResult<()> {
        let remote = match resolve(&self.config.remote_address, self.config.remote_port).await {
            Ok(remote) => remote,
            Err(err) => {
                self.machine.transition(ConnectionState::Closed);
                return Err(err.into());
            }
        };
        channel.remote_addr = Some(remote);

        let deadline = self.config.retry.start_deadline();
        self.machine.transition(ConnectionState::Connecting);
        match self.connect_with_retries(remote, &deadline).await {
            Ok(stream) => {
                channel.install(stream);
                self.machine.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                self.machine.fail();
                Err(err)
            }
        }
    }

    async fn open_server(&self, channel: &mut Channel) -> TransportResult<()> {
        self.machine.transition(ConnectionState::Listening);
        let bind_addr = SocketAddr::new(self.config.local_address, self.config.local_port);
        let listener = match bind(bind_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                self.machine.fail();
                return Err(err);
            }
        };
        channel.local_addr = listener.local_addr().ok();
        tracing::info!(addr = ?channel.local_addr, "waiting for a peer");

        let task = tokio::spawn(accept_peer(
            listener,
            Arc::clone(&self.channel),
            Arc::clone(&self.machine),
            channel.generation,
        ));
        if let Some(previous) = self.accept_task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Run connect attempts until one succeeds, the attempt budget is spent,
    /// or the deadline passes. The pause between attempts is skipped after
    /// the last allowed attempt.
    async fn connect_with_retries(
        &self,
        remote: SocketAddr,
        deadline: &Deadline,
    ) -> TransportResult<TcpStream> {
        let policy = &self.config.retry;
        let mut last_error = None;

        loop {
            let made = self.machine.attempts();
            if !policy.max_attempts.allows(made) {
                tracing::error!(attempts = made, %remote, "connection retries exhausted");
                return Err(TransportError::RetriesExhausted {
                    attempts: made,
                    source: last_error,
                });
            }
            let Some(remaining) = deadline.remaining() else {
                tracing::error!(attempts = made, %remote, "connect deadline passed");
                return Err(TransportError::Timeout(deadline.budget()));
            };

            let attempt = self.machine.record_attempt();
            tracing::debug!(attempt, max = %policy.max_attempts, %remote, "connecting");
            match time::timeout(remaining, self.connect_once(remote)).await {
                Ok(Ok(stream)) => {
                    tracing::info!(%remote, attempt, "connected");
                    return Ok(stream);
                }
                Ok(Err(err)) => {
                    tracing::warn!(attempt, %remote, error = %err, "connect attempt failed");
                    last_error = Some(err);
                }
                Err(_) => {
                    tracing::error!(attempt, %remote, "connect deadline passed");
                    return Err(TransportError::Timeout(deadline.budget()));
                }
            }

            if policy.max_attempts.allows(self.machine.attempts()) {
                if let Some(left) = deadline.remaining() {
                    time::sleep(policy.retry_interval.min(left)).await;
                }
            }
        }
    }

    async fn connect_once(&self, remote: SocketAddr) -> io::Result<TcpStream> {
        if self.config.local_port == 0 {
            return TcpStream::connect(remote).await;
        }
        let socket = if remote.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::new(
            self.config.local_address,
            self.config.local_port,
        ))?;
        socket.connect(remote).await
    }

    /// Drop the broken stream and re-run the connect (client) or accept
    /// (server) sequence inside `deadline`.
    async fn reconnect(&self, channel: &mut Channel, deadline: &Deadline) -> TransportResult<()> {
        self.machine.transition(ConnectionState::Reconnecting);
        channel.release().await;

        let result = match self.config.mode {
            Mode::Client => match channel.remote_addr {
                Some(remote) => self.connect_with_retries(remote, deadline).await,
                None => Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no remote address resolved",
                ))),
            },
            Mode::Server => {
                let addr = channel.local_addr.unwrap_or_else(|| {
                    SocketAddr::new(self.config.local_address, self.config.local_port)
                });
                accept_within(addr, deadline).await
            }
        };

        match result {
            Ok(stream) => {
                channel.install(stream);
                self.machine.transition(ConnectionState::Connected);
                tracing::info!(peer = ?channel.peer_addr, "reconnected");
                Ok(())
            }
            Err(err) => {
                self.machine.fail();
                Err(err)
            }
        }
    }

    async fn send(
        &self,
        channel: &mut Channel,
        frame: &Frame,
        deadline: &Deadline,
    ) -> TransportResult<()> {
        let Some(remaining) = deadline.remaining() else {
            return Err(TransportError::Timeout(deadline.budget()));
        };
        let stream = channel.stream.as_mut().ok_or_else(missing_stream)?;
        match time::timeout(remaining, stream.write_all(frame.as_bytes())).await {
            Ok(Ok(())) => {
                tracing::trace!(len = frame.len(), "frame sent");
                Ok(())
            }
            Ok(Err(err)) => Err(TransportError::Io(err)),
            Err(_) => Err(TransportError::Timeout(deadline.budget())),
        }
    }
}

async fn bind(addr: SocketAddr) -> TransportResult<TcpListener> {
    TcpListener::bind(addr).await.map_err(|err| {
        tracing::error!(%addr, error = %err, "bind failed");
        TransportError::Io(err)
    })
}

async fn accept_peer(
    listener: TcpListener,
    channel: Arc<Mutex<Channel>>,
    machine: Arc<ConnectionStateMachine>,
    generation: u64,
) {
    let accepted = listener.accept().await;
    let mut channel = channel.lock().await;
    if channel.generation != generation {
        tracing::debug!("transport closed while accepting, dropping peer");
        return;
    }
    match accepted {
        Ok((stream, peer)) => {
            tracing::info!(%peer, "peer connected");
            channel.install(stream);
            machine.transition(ConnectionState::Connected);
        }
        Err(err) => {
            tracing::error!(error = %err, "accept failed");
            machine.fail();
        }
    }
}

async fn accept_within(addr: SocketAddr, deadline: &Deadline) -> TransportResult<TcpStream> {
    let listener = bind(addr).await?;
    let Some(remaining) = deadline.remaining() else {
        return Err(TransportError::Timeout(deadline.budget()));
    };
    tracing::info!(%addr, "waiting for the peer to come back");
    match time::timeout(remaining, listener.accept()).await {
        Ok(Ok((stream, peer))) => {
            tracing::info!(%peer, "peer connected");
            Ok(stream)
        }
        Ok(Err(err)) => Err(TransportError::Io(err)),
        Err(_) => Err(TransportError::Timeout(deadline.budget())),
    }
}

fn missing_stream() -> TransportError {
    TransportError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "stream handle missing",
    ))
}

#[async_trait]
impl Transport for StreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
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
        let mut channel = self.channel.lock().await;
        let state = self.machine.state();
        if state.is_connected() || state == ConnectionState::Listening {
            tracing::debug!(%state, "stream transport already open");
            return Ok(());
        }

        match self.config.mode {
            Mode::Client => self.open_client(&mut channel).await,
            Mode::Server => self.open_server(&mut channel).await,
        }
    }

    async fn close(&self) {
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            task.abort();
            // Wait for the listener to be dropped so the port is free on return.
            let _ = task.await;
        }

        let mut channel = self.channel.lock().await;
        channel.generation = channel.generation.wrapping_add(1);
        let released = channel.release().await;
        channel.local_addr = None;
        if self.machine.state() != ConnectionState::Closed {
            self.machine.transition(ConnectionState::Closed);
            tracing::info!(released, "stream transport closed");
        }
    }

    async fn read(&self) -> TransportResult<Frame> {
        let mut guard = self.channel.lock().await;
        self.ensure_connected()?;
        let channel = &mut *guard;
        let deadline = self.config.retry.start_deadline();
        let stream = channel.stream.as_mut().ok_or_else(missing_stream)?;
        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let Some(remaining) = deadline.remaining() else {
                tracing::trace!("no data before read deadline");
                return Ok(Frame::empty());
            };
            match time::timeout(remaining.min(POLL_INTERVAL), stream.read(&mut buf)).await {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    tracing::warn!(peer = ?channel.peer_addr, "peer closed the connection");
                    channel.broken = true;
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the connection",
                    )));
                }
                Ok(Ok(n)) => {
                    let frame = Frame::copy_from_slice(&buf[..n]);
                    tracing::trace!(len = n, data = %frame.to_hex(), "frame received");
                    self.bus.notify(&frame);
                    return Ok(frame);
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "stream read failed");
                    channel.broken = true;
                    return Err(TransportError::Io(err));
                }
            }
        }
    }

    async fn write(&self, frame: Frame) -> TransportResult<()> {
        let mut channel = self.channel.lock().await;
        self.ensure_connected()?;
        let deadline = self.config.retry.start_deadline();

        if channel.broken {
            tracing::warn!("peer hung up earlier, reconnecting before send");
            self.reconnect(&mut channel, &deadline).await?;
            return self.send(&mut channel, &frame, &deadline).await;
        }

        match self.send(&mut channel, &frame, &deadline).await {
            Err(TransportError::Io(err)) => {
                tracing::warn!(error = %err, "send failed, reconnecting");
                self.reconnect(&mut channel, &deadline).await?;
                self.send(&mut channel, &frame, &deadline).await
            }
            other => other,
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MaxAttempts;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::{Duration, Instant};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[derive(Default)]
    struct Recorder {
        frames: parking_lot::Mutex<Vec<Frame>>,
    }

    impl crate::notify::Subscriber for Recorder {
        fn update(&self, frame: &Frame) {
            self.frames.lock().push(frame.clone());
        }
    }

    fn unused_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn client_config(port: u16, deadline: Duration) -> StreamConfig {
        StreamConfig::builder()
            .remote_address("127.0.0.1")
            .remote_port(port)
            .retry_interval(Duration::from_millis(20))
            .operation_deadline(deadline)
            .build()
    }

    async fn wait_connected(transport: &dyn Transport) {
        let mut rx = transport.watch_state();
        time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_connected()))
            .await
            .unwrap()
            .unwrap();
    }

    async fn connected_pair(deadline: Duration) -> (StreamTransport, StreamTransport) {
        let server = StreamTransport::new(
            StreamConfig::builder()
                .local_address(LOCALHOST)
                .mode(Mode::Server)
                .operation_deadline(deadline)
                .build(),
        );
        server.open().await.unwrap();
        let port = server.local_addr().await.unwrap().port();

        let client = StreamTransport::new(client_config(port, deadline));
        client.open().await.unwrap();
        wait_connected(&server).await;
        (server, client)
    }

    #[tokio::test]
    async fn test_not_connected_before_open() {
        let transport =
            StreamTransport::new(client_config(unused_port(), Duration::from_millis(100)));

        assert!(matches!(
            transport.read().await,
            Err(TransportError::NotConnected { state: ConnectionState::Closed })
        ));
        assert!(matches!(
            transport.write(Frame::from("x")).await,
            Err(TransportError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let config = StreamConfig::builder()
            .remote_address("127.0.0.1")
            .remote_port(unused_port())
            .max_attempts(3u32)
            .retry_interval(Duration::from_millis(50))
            .operation_deadline(Duration::from_secs(5))
            .build();
        let transport = StreamTransport::new(config);

        let started = Instant::now();
        let result = transport.open().await;
        let elapsed = started.elapsed();

        match result {
            Err(TransportError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(source.is_some());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(100), "elapsed {elapsed:?}");
        assert_eq!(transport.state(), ConnectionState::Failed);
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test]
    async fn test_deadline_bounds_unlimited_attempts() {
        let config = StreamConfig::builder()
            .remote_address("127.0.0.1")
            .remote_port(unused_port())
            .max_attempts(MaxAttempts::Unlimited)
            .retry_interval(Duration::from_millis(50))
            .operation_deadline(Duration::from_millis(300))
            .build();
        let transport = StreamTransport::new(config);

        let started = Instant::now();
        let result = transport.open().await;

        assert!(matches!(result, Err(TransportError::Timeout(_))), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(transport.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_reopen_after_failure() {
        let port = unused_port();
        let config = StreamConfig::builder()
            .remote_address("127.0.0.1")
            .remote_port(port)
            .max_attempts(1u32)
            .operation_deadline(Duration::from_secs(1))
            .build();
        let transport = StreamTransport::new(config);
        assert!(transport.open().await.is_err());
        assert_eq!(transport.state(), ConnectionState::Failed);

        let listener = TcpListener::bind((LOCALHOST, port)).await.unwrap();
        transport.open().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert_eq!(transport.attempts(), 0);
        drop(listener);
    }

    #[tokio::test]
    async fn test_server_open_returns_while_listening() {
        let server = StreamTransport::new(
            StreamConfig::builder()
                .local_address(LOCALHOST)
                .mode(Mode::Server)
                .build(),
        );
        server.open().await.unwrap();

        assert_eq!(server.state(), ConnectionState::Listening);
        assert!(server.local_addr().await.unwrap().port() != 0);
        assert!(matches!(
            server.read().await,
            Err(TransportError::NotConnected { state: ConnectionState::Listening })
        ));

        server.close().await;
        assert_eq!(server.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_while_listening_frees_port() {
        let port = unused_port();
        let server = StreamTransport::new(
            StreamConfig::builder()
                .local_address(LOCALHOST)
                .local_port(port)
                .mode(Mode::Server)
                .build(),
        );
        server.open().await.unwrap();
        server.close().await;

        assert!(std::net::TcpListener::bind((LOCALHOST, port)).is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let server = StreamTransport::new(
            StreamConfig::builder()
                .local_address(LOCALHOST)
                .local_port(port)
                .mode(Mode::Server)
                .build(),
        );

        let result = server.open().await;
        assert!(matches!(result, Err(TransportError::Io(_))), "{result:?}");
        assert_eq!(server.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (server, client) = connected_pair(Duration::from_millis(300)).await;

        for payload in [Vec::<u8>::new(), vec![0x42], vec![0xA5; READ_BUFFER_SIZE]] {
            let frame = Frame::from(payload);
            client.write(frame.clone()).await.unwrap();
            assert_eq!(server.read().await.unwrap(), frame);
        }

        server.write(Frame::from("pong")).await.unwrap();
        assert_eq!(client.read().await.unwrap(), Frame::from("pong"));
    }

    #[tokio::test]
    async fn test_read_timeout_is_non_fatal() {
        let deadline = Duration::from_millis(150);
        let (server, client) = connected_pair(deadline).await;

        let started = Instant::now();
        let frame = client.read().await.unwrap();

        assert!(frame.is_empty());
        assert!(started.elapsed() >= deadline);
        assert_eq!(client.state(), ConnectionState::Connected);

        server.write(Frame::from("late")).await.unwrap();
        assert_eq!(client.read().await.unwrap(), Frame::from("late"));
    }

    #[tokio::test]
    async fn test_notification_delivery() {
        let (server, client) = connected_pair(Duration::from_millis(300)).await;
        let recorder = Arc::new(Recorder::default());
        server.notifications().add_subscriber(&recorder);

        client.write(Frame::from("one")).await.unwrap();
        let received = server.read().await.unwrap();
        assert_eq!(*recorder.frames.lock(), vec![received]);

        assert!(server.notifications().remove_subscriber(&recorder));
        client.write(Frame::from("two")).await.unwrap();
        assert_eq!(server.read().await.unwrap(), Frame::from("two"));
        assert_eq!(recorder.frames.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_read_does_not_notify() {
        let (_server, client) = connected_pair(Duration::from_millis(100)).await;
        let recorder = Arc::new(Recorder::default());
        client.notifications().add_subscriber(&recorder);

        assert!(client.read().await.unwrap().is_empty());
        assert!(recorder.frames.lock().is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_close() {
        let (server, client) = connected_pair(Duration::from_millis(300)).await;

        client.close().await;
        client.close().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.read().await,
            Err(TransportError::NotConnected { state: ConnectionState::Closed })
        ));

        // The peer sees exactly one orderly shutdown.
        assert!(matches!(server.read().await, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_write_reconnects_after_peer_hangup() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = StreamTransport::new(client_config(port, Duration::from_secs(1)));
        client.open().await.unwrap();

        let (first, _) = listener.accept().await.unwrap();
        drop(first);

        let result = client.read().await;
        assert!(matches!(result, Err(TransportError::Io(_))), "{result:?}");
        assert_eq!(client.state(), ConnectionState::Connected);

        let peer = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            buf.truncate(n);
            buf
        });

        client.write(Frame::from("again")).await.unwrap();
        assert_eq!(peer.await.unwrap(), b"again".to_vec());
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_reconnect_leaves_transport_failed() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = StreamConfig::builder()
            .remote_address("127.0.0.1")
            .remote_port(port)
            .max_attempts(2u32)
            .retry_interval(Duration::from_millis(20))
            .operation_deadline(Duration::from_secs(2))
            .build();
        let client = StreamTransport::new(config);
        client.open().await.unwrap();

        let (first, _) = listener.accept().await.unwrap();
        drop(first);
        drop(listener);
        assert!(matches!(client.read().await, Err(TransportError::Io(_))));

        let result = client.write(Frame::from("lost")).await;
        assert!(
            matches!(result, Err(TransportError::RetriesExhausted { attempts: 2, .. })),
            "{result:?}"
        );
        assert_eq!(client.state(), ConnectionState::Failed);

        assert!(matches!(
            client.write(Frame::from("lost")).await,
            Err(TransportError::NotConnected { state: ConnectionState::Failed })
        ));
    }

    #[tokio::test]
    async fn test_write_times_out_when_peer_stops_reading() {
        let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let deadline = Duration::from_millis(200);
        let client = StreamTransport::new(client_config(port, deadline));
        client.open().await.unwrap();
        let (_idle, _) = listener.accept().await.unwrap();

        let started = Instant::now();
        let result = client.write(Frame::from(vec![0u8; 64 * 1024 * 1024])).await;

        assert!(matches!(result, Err(TransportError::Timeout(d)) if d == deadline), "{result:?}");
        assert!(started.elapsed() >= deadline);
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_server_write_accepts_returning_peer() {
        let server = StreamTransport::new(
            StreamConfig::builder()
                .local_address(LOCALHOST)
                .mode(Mode::Server)
                .operation_deadline(Duration::from_secs(2))
                .build(),
        );
        server.open().await.unwrap();
        let port = server.local_addr().await.unwrap().port();

        let first = TcpStream::connect((LOCALHOST, port)).await.unwrap();
        wait_connected(&server).await;
        drop(first);
        assert!(matches!(server.read().await, Err(TransportError::Io(_))));

        let peer = tokio::spawn(async move {
            let mut stream = loop {
                match TcpStream::connect((LOCALHOST, port)).await {
                    Ok(stream) => break stream,
                    Err(_) => time::sleep(Duration::from_millis(20)).await,
                }
            };
            let mut buf = vec![0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            buf.truncate(n);
            buf
        });

        server.write(Frame::from("welcome back")).await.unwrap();
        assert_eq!(peer.await.unwrap(), b"welcome back".to_vec());
        assert_eq!(server.state(), ConnectionState::Connected);
        assert_eq!(server.local_addr().await.unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_server_reconnect_times_out_without_peer() {
        let deadline = Duration::from_millis(200);
        let (server, client) = connected_pair(deadline).await;
        client.close().await;
        assert!(matches!(server.read().await, Err(TransportError::Io(_))));

        let result = server.write(Frame::from("anyone?")).await;

        assert!(matches!(result, Err(TransportError::Timeout(_))), "{result:?}");
        assert_eq!(server.state(), ConnectionState::Failed);
    }
}
