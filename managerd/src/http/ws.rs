//! The WebSocket relay (C8): upgrade, spawn a reader that terminates on
//! EOF or a `"stop"` text frame, and forward each message from a
//! [`RelaySource`] as a JSON text frame until the reader signals
//! termination. Grounded in `examples/other_examples/.../device-
//! registry-src-main.rs.rs`'s `events_ws` (`socket.split()`, a
//! forwarding task plus a drain loop) and spec.md §4.7's exact
//! termination rule.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use manager_bus::message::BusMessage;
use manager_bus::service::TypedSubscription;
use manager_bus::Subscription;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One side of a relay: produces the next JSON value to forward, and
/// knows how to unsubscribe when the relay ends. Boxed so `relay` stays
/// unaware of which bus subscription shape is feeding it.
#[async_trait]
pub trait RelaySource: Send {
    async fn recv(&mut self) -> Option<Json>;
    fn stop(self: Box<Self>);
}

/// Relays whole-device property snapshots: each `BusMessage::Props` map
/// becomes one text frame (spec.md §6's "multi-property snapshots").
pub struct PropsSource(pub TypedSubscription);

#[async_trait]
impl RelaySource for PropsSource {
    async fn recv(&mut self) -> Option<Json> {
        loop {
            match self.0.recv().await? {
                Ok(BusMessage::Props(properties)) => return serde_json::to_value(properties).ok(),
                Ok(_other) => {
                    warn!("unexpected message kind on property stream, skipping");
                }
                Err(e) => {
                    warn!(error = %e, "malformed payload on property stream, skipping");
                }
            }
        }
    }

    fn stop(self: Box<Self>) {
        self.0.stop();
    }
}

/// Relays device-raised events.
pub struct EventSource(pub TypedSubscription);

#[async_trait]
impl RelaySource for EventSource {
    async fn recv(&mut self) -> Option<Json> {
        loop {
            match self.0.recv().await? {
                Ok(BusMessage::Event(event)) => return serde_json::to_value(event).ok(),
                Ok(_other) => {
                    warn!("unexpected message kind on event stream, skipping");
                }
                Err(e) => {
                    warn!(error = %e, "malformed payload on event stream, skipping");
                }
            }
        }
    }

    fn stop(self: Box<Self>) {
        self.0.stop();
    }
}

/// Relays the raw bytes published on an arbitrary topic (`GET /ms/
/// topic:watch`), for which no typed [`TypedSubscription`] shape
/// exists. Payloads on manager topics are already JSON-encoded, so the
/// bytes are parsed rather than wrapped again.
pub struct TopicSource(pub Subscription);

#[async_trait]
impl RelaySource for TopicSource {
    async fn recv(&mut self) -> Option<Json> {
        loop {
            let msg = self.0.recv().await?;
            match serde_json::from_slice(&msg.payload) {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!(error = %e, "non-JSON payload on watched topic, skipping");
                }
            }
        }
    }

    fn stop(self: Box<Self>) {
        self.0.stop();
    }
}

/// Drives one WebSocket connection to completion against `source`.
pub async fn relay(socket: WebSocket, mut source: Box<dyn RelaySource>) {
    let (mut tx, mut rx) = socket.split();
    let stop = CancellationToken::new();
    let reader_stop = stop.clone();

    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = rx.next().await {
            match msg {
                Message::Text(text) if text == "stop" => break,
                Message::Close(_) => break,
                _ => continue,
            }
        }
        reader_stop.cancel();
    });

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = source.recv() => {
                match next {
                    None => break,
                    Some(value) => match serde_json::to_string(&value) {
                        Ok(text) => {
                            if tx.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to serialize relay message, skipping");
                        }
                    },
                }
            }
        }
    }

    stop.cancel();
    reader.abort();
    source.stop();
}
