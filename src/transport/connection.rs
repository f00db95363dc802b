//! Connection lifecycle state machine.
//!
//! Every transport owns one [`ConnectionStateMachine`]. Only the stream
//! transport uses the full lifecycle; datagram and serial transports move
//! between Closed, Connected and Failed.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::watch;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No OS handle is held.
    #[default]
    Closed,
    /// Client connect attempts in progress.
    Connecting,
    /// Server socket bound, waiting for the single peer.
    Listening,
    /// Channel established; reads and writes are allowed.
    Connected,
    /// Broken channel dropped, connect or accept sequence re-running.
    Reconnecting,
    /// Retries exhausted or the channel could not be set up.
    Failed,
}

impl ConnectionState {
    /// Check if the machine may move from `self` to `next`.
    ///
    /// Closing is legal from every state, including Closed.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (_, Closed) => true,
            (Closed | Failed, Connecting | Listening) => true,
            (Closed | Failed, Connected) => true,
            (Connecting | Listening | Reconnecting, Connected) => true,
            (Connecting | Listening | Reconnecting, Failed) => true,
            (Closed, Failed) => true,
            (Connected, Reconnecting | Failed) => true,
            _ => false,
        }
    }

    /// Check if reads and writes are allowed.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Check if an open or reconnect sequence is running.
    pub fn is_establishing(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Listening | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Listening => "listening",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state plus the attempt counter of the running connect sequence.
///
/// Transitions are published on a watch channel, so the state can be read
/// or awaited without taking the transport's I/O lock.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    /// Create a machine in the Closed state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            state,
            attempts: AtomicU32::new(0),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver observing every transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connection attempts made since the last time Connected was reached.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Count one more connection attempt and return the new total.
    pub fn record_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Move to `next`, returning the previous state.
    ///
    /// Every state except Failed starts a fresh attempt count, so the counter
    /// reads zero once Connected is reached and keeps the spent attempts
    /// after a failure. Illegal transitions are a bug in the calling
    /// transport; they are logged and applied.
    pub fn transition(&self, next: ConnectionState) -> ConnectionState {
        let previous = self.state.send_replace(next);
        if !previous.can_transition_to(next) {
            tracing::error!(from = %previous, to = %next, "illegal connection state transition");
            debug_assert!(false, "illegal transition {previous} -> {next}");
        }
        if next != ConnectionState::Failed {
            self.attempts.store(0, Ordering::Release);
        }
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state changed");
        }
        previous
    }

    /// Move to Failed.
    pub fn fail(&self) -> ConnectionState {
        self.transition(ConnectionState::Failed)
    }
}
