//! WebSocket acceptor: binds the listen address, routes the `/socket` path,
//! and hands each upgraded connection to the bridge loop in its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::bridge;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::registry::ConnectionRegistry;

/// Upgrade endpoint path.
pub const SOCKET_PATH: &str = "/socket";

/// Bind the configured listen address and serve until the process exits.
pub async fn serve(config: BridgeConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(listen = %config.listen_addr, "listening for incoming connections");
    accept_loop(listener, config, Arc::new(ConnectionRegistry::new())).await
}

/// Accept loop on an already-bound listener. Split out so tests can bind an
/// ephemeral port and keep a handle on the registry.
pub async fn accept_loop(
    listener: TcpListener,
    config: BridgeConfig,
    registry: Arc<ConnectionRegistry>,
) -> std::io::Result<()> {
    let config = Arc::new(config);
    loop {
        let (stream, remote) = listener.accept().await?;
        let config = Arc::clone(&config);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            handle_connection(stream, remote, &config, &registry).await;
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    remote: SocketAddr,
    config: &BridgeConfig,
    registry: &ConnectionRegistry,
) {
    // Peek at the request head to route without consuming the handshake
    // bytes. The request line may not have fully arrived yet, so retry a few
    // times before giving up on it.
    let mut peek_buf = [0u8; 1024];
    let mut head = String::new();
    for _ in 0..20 {
        let n = match stream.peek(&mut peek_buf).await {
            Ok(0) => return, // closed before sending a request line
            Ok(n) => n,
            Err(e) => {
                debug!(remote = %remote, error = %e, "peek failed");
                return;
            }
        };
        head = String::from_utf8_lossy(&peek_buf[..n]).into_owned();
        if head.contains("\r\n") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    if path != SOCKET_PATH {
        debug!(remote = %remote, path = %path, "not the upgrade endpoint");
        let _ = stream
            .write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot Found",
            )
            .await;
        return;
    }

    match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => bridge::run(ws, remote, config, registry).await,
        Err(e) => {
            let err = BridgeError::UpgradeFailed(e);
            warn!(remote = %remote, error = %err, "upgrade");
        }
    }
}
