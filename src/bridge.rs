//! Per-connection bridging loop.
//!
//! ## Lifecycle
//! accepted → descriptor → acknowledge → bridge → release. The registry is
//! incremented the moment a connection is handed in and decremented on every
//! exit path; the broker session is opened only after the descriptor is
//! acknowledged and is closed on every exit path. All failures are terminal
//! for the connection; reconnection is the client's job.

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info};

use crate::broker::BrokerSession;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::registry::ConnectionRegistry;
use crate::subscription::SubscriptionDescriptor;

/// Fixed acknowledgment frame sent once the descriptor is accepted.
pub const ACK_FRAME: &str = r#"{"msg": "acknowledged, starting write loop."}"#;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Bridge one upgraded client connection until either side fails or closes.
///
/// Owns the connection for its whole lifetime; the registry count and the
/// broker session are released no matter how the loop exits.
pub async fn run(
    ws: WebSocketStream<TcpStream>,
    remote: SocketAddr,
    config: &BridgeConfig,
    registry: &ConnectionRegistry,
) {
    let connections = registry.increment();
    info!(remote = %remote, connections, "new connection");

    match bridge(ws, remote, config).await {
        Ok(()) => info!(remote = %remote, "connection closed"),
        Err(e) => error!(
            remote = %remote,
            connections = registry.snapshot(),
            error = %e,
            "connection ended"
        ),
    }

    let connections = registry.decrement();
    debug!(remote = %remote, connections, "connection released");
}

async fn bridge(
    mut ws: WebSocketStream<TcpStream>,
    remote: SocketAddr,
    config: &BridgeConfig,
) -> Result<(), BridgeError> {
    let Some(descriptor) = read_descriptor(&mut ws, remote).await? else {
        // Peer went away before sending a descriptor; nothing to release.
        return Ok(());
    };

    ws.send(Message::Text(ACK_FRAME.to_string()))
        .await
        .map_err(BridgeError::AckWriteFailed)?;

    let session = BrokerSession::open(&config.amqp_url, &descriptor).await?;
    debug!(
        remote = %remote,
        exchange = %descriptor.exchange,
        queue = %session.queue(),
        "broker session open"
    );

    let (mut sink, mut frames) = ws.split();
    let outcome = pump(&mut sink, &mut frames, &session).await;

    session.close().await;
    let _ = sink.close().await;
    outcome
}

/// Wait for the first data frame and decode it as a subscription descriptor.
///
/// `Ok(None)` means the peer closed (or the transport died) before sending
/// one, a clean end, since no broker state exists yet. Control frames
/// arriving first are handled in place.
async fn read_descriptor(
    ws: &mut WebSocketStream<TcpStream>,
    remote: SocketAddr,
) -> Result<Option<SubscriptionDescriptor>, BridgeError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(remote = %remote, message = %text, "received message");
                return SubscriptionDescriptor::parse(text.as_bytes()).map(Some);
            }
            Some(Ok(Message::Binary(raw))) => {
                debug!(remote = %remote, bytes = raw.len(), "received message");
                return SubscriptionDescriptor::parse(&raw).map(Some);
            }
            Some(Ok(Message::Ping(payload))) => {
                if ws.send(Message::Pong(payload)).await.is_err() {
                    return Ok(None);
                }
            }
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(remote = %remote, error = %e, "read failed before descriptor");
                return Ok(None);
            }
        }
    }
}

/// Forward deliveries to the client, one at a time, in arrival order, until
/// the consumer stream ends, the client closes, or either side fails.
async fn pump(
    sink: &mut WsSink,
    frames: &mut WsSource,
    session: &BrokerSession,
) -> Result<(), BridgeError> {
    let mut deliveries = session.consume().await?;

    loop {
        tokio::select! {
            delivery = deliveries.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        debug!(
                            routing_key = %delivery.routing_key.as_str(),
                            bytes = delivery.data.len(),
                            "forwarding delivery"
                        );
                        sink.send(delivery_frame(delivery.data))
                            .await
                            .map_err(BridgeError::ForwardWriteFailed)?;
                    }
                    Some(Err(e)) => return Err(BridgeError::DeliveryPullFailed(e)),
                    // Channel closed or consumer cancelled: the sequence is done.
                    None => return Ok(()),
                }
            }
            frame = frames.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(Message::Ping(payload))) => {
                        sink.send(Message::Pong(payload))
                            .await
                            .map_err(BridgeError::ForwardWriteFailed)?;
                    }
                    // The protocol is one-directional after the descriptor;
                    // anything else the client says is ignored.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "client read failed");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Frame a delivery payload without altering its bytes: text when the
/// payload is valid UTF-8, binary otherwise.
fn delivery_frame(payload: Vec<u8>) -> Message {
    match String::from_utf8(payload) {
        Ok(text) => Message::Text(text),
        Err(raw) => Message::Binary(raw.into_bytes()),
    }
}
