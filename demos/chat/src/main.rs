//! tether chat
//!
//! Opens one transport, prints every received frame, and sends each line
//! typed on stdin. Type `exit` to quit.
//!
//! Environment variables:
//! - TETHER_KIND: "datagram" (default), "stream" or "serial"
//! - TETHER_REMOTE: remote host (datagram, stream; default 127.0.0.1)
//! - TETHER_LOCAL_PORT / TETHER_REMOTE_PORT: ports (datagram, stream)
//! - TETHER_MODE: "client" (default) or "server" (stream)
//! - TETHER_MAX_ATTEMPTS: number or "unlimited" (stream, default 5)
//! - TETHER_RETRY_MS: pause between connect attempts (stream, default 100)
//! - TETHER_DEVICE: device path (serial)
//! - TETHER_BAUD / TETHER_DATA_BITS / TETHER_STOP_BITS: line settings
//! - TETHER_PARITY: 0 none, 1 odd, 2 even, 3 mark, 4 space
//! - RUST_LOG: log filter (default "warn")

mod settings;

use std::sync::Arc;
use std::time::Duration;

use tether::{Frame, Transport, TransportError, TransportFactory};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const READ_PAUSE: Duration = Duration::from_millis(500);

/// Chat driver errors.
#[derive(Debug, thiserror::Error)]
enum ChatError {
    #[error(transparent)]
    Settings(#[from] settings::SettingsError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("stdin: {0}")]
    Stdin(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ChatError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = settings::from_lookup(|name| std::env::var(name).ok())?;
    let transport: Arc<dyn Transport> = Arc::from(TransportFactory::create(config));
    transport.open().await?;
    tracing::info!(kind = %transport.kind(), state = %transport.state(), "transport open");

    let printer = Arc::new(|frame: &Frame| println!("received: {frame}"));
    transport.notifications().add_subscriber(&printer);

    let reader = tokio::spawn(receive_loop(Arc::clone(&transport)));
    let result = send_loop(transport.as_ref()).await;

    reader.abort();
    transport.close().await;
    result
}

/// Poll the transport; the printer subscriber shows what arrives.
async fn receive_loop(transport: Arc<dyn Transport>) {
    loop {
        match transport.read().await {
            Ok(_) => {}
            Err(err) if err.is_transient() => tracing::warn!(error = %err, "read failed"),
            Err(err) => {
                tracing::error!(error = %err, "giving up on reads");
                return;
            }
        }
        tokio::time::sleep(READ_PAUSE).await;
    }
}

async fn send_loop(transport: &dyn Transport) -> Result<(), ChatError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        println!("sending: {line}");
        match transport.write(Frame::from(line.to_owned())).await {
            Ok(()) => {}
            Err(err) if err.is_transient() => tracing::warn!(error = %err, "send failed"),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
