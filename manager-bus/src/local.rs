use crate::bus::{Message, MessageBus, Subscription};
use crate::topic;
use async_trait::async_trait;
use bytes::Bytes;
use manager_api::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

struct Route {
    pattern: String,
    sender: mpsc::Sender<Message>,
}

/// An in-process bus over `tokio::sync::mpsc`, used by the test suite
/// and by deployments that run the manager and its drivers in the
/// same process with no external broker configured.
///
/// Unlike `tokio::sync::broadcast`, routing is done explicitly against
/// each subscriber's pattern rather than relying on every subscriber
/// decoding every message off one shared channel — cheap enough at the
/// scale this bus is meant for, and it sidesteps `broadcast`'s lagging
/// receiver semantics entirely.
#[derive(Default)]
pub struct LocalBus {
    routes: Mutex<Vec<Route>>,
    reply_seq: AtomicU64,
}

impl LocalBus {
    pub fn new() -> Self {
        LocalBus::default()
    }

    async fn dispatch(&self, topic: &str, message: Message) {
        // Stopped subscriptions drop their receiver, which closes the
        // sender; prune those here so routes don't grow without bound
        // across repeated subscribe/stop cycles.
        let mut routes = self.routes.lock().await;
        routes.retain(|route| !route.sender.is_closed());

        for route in routes.iter() {
            if crate::topic::matches(&route.pattern, topic) {
                // A full subscriber queue must never block publishers;
                // a slow subscriber simply misses the message.
                let _ = route.sender.try_send(message.clone());
            }
        }
    }

    fn next_reply_topic(&self) -> String {
        let n = self.reply_seq.fetch_add(1, Ordering::Relaxed);
        format!("__reply/{n}")
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.dispatch(
            topic,
            Message {
                payload,
                reply_to: None,
            },
        )
        .await;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(256);
        let stop_token = CancellationToken::new();

        self.routes.lock().await.push(Route {
            pattern: pattern.to_string(),
            sender: tx,
        });

        Ok(Subscription::new(rx, stop_token))
    }

    async fn request(&self, topic: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let reply_topic = self.next_reply_topic();
        let mut reply_sub = self.subscribe(&reply_topic).await?;

        self.dispatch(
            topic,
            Message {
                payload,
                reply_to: Some(reply_topic),
            },
        )
        .await;

        match tokio::time::timeout(timeout, reply_sub.recv()).await {
            Ok(Some(msg)) => Ok(msg.payload),
            Ok(None) => Err(Error::bus("reply channel closed before a response arrived")),
            Err(_) => Err(Error::bus("timed out waiting for a reply")),
        }
    }
}

/// Convenience for constructing a shared handle, since every
/// subscriber and the operations layer hold the bus behind an `Arc`.
pub fn local_bus() -> Arc<dyn MessageBus> {
    Arc::new(LocalBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_wildcard_subscriber() {
        let bus = LocalBus::new();
        let mut sub = bus
            .subscribe(&topic::device_props("p1", "prod1", "dev1", topic::WILDCARD))
            .await
            .unwrap();

        bus.publish(&topic::device_props("p1", "prod1", "dev1", "temp"), Bytes::from_static(b"1"))
            .await
            .unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"1"));
        assert!(msg.reply_to.is_none());
    }

    #[tokio::test]
    async fn request_round_trips_through_a_private_reply_topic() {
        let bus = Arc::new(LocalBus::new());
        let cmd_topic = topic::driver_cmd("p1");

        let server_bus = bus.clone();
        let mut server_sub = bus.subscribe(&cmd_topic).await.unwrap();
        tokio::spawn(async move {
            let msg = server_sub.recv().await.unwrap();
            let reply_to = msg.reply_to.unwrap();
            server_bus
                .publish(&reply_to, Bytes::from_static(b"pong"))
                .await
                .unwrap();
        });

        let reply = bus
            .request(&cmd_topic, Bytes::from_static(b"ping"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn request_times_out_when_nobody_answers() {
        let bus = LocalBus::new();
        let err = bus
            .request(&topic::driver_cmd("nobody-home"), Bytes::new(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
