use async_trait::async_trait;
use bytes::Bytes;
use manager_api::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A message delivered to a subscriber. `reply_to`, when present,
/// names the topic the sender is waiting on — set only for messages
/// delivered through [`MessageBus::request`], mirroring the reply
/// subject a NATS message carries.
#[derive(Clone, Debug)]
pub struct Message {
    pub payload: Bytes,
    pub reply_to: Option<String>,
}

/// A live subscription. `recv` yields each message published to a
/// topic matching the subscription; dropping the subscription (or
/// calling [`stop`](Subscription::stop) explicitly) releases the
/// underlying transport resource and closes the channel, matching
/// spec §4.4's `(channel, stop, err)` shape.
pub struct Subscription {
    rx: mpsc::Receiver<Message>,
    stop_token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<Message>, stop_token: CancellationToken) -> Self {
        Subscription { rx, stop_token }
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Unsubscribes. Equivalent to dropping the subscription, spelled
    /// out for callers that want the intent to read explicitly.
    pub fn stop(self) {
        self.stop_token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop_token.cancel();
    }
}

/// A transport over which the manager publishes and subscribes to
/// topic-addressed messages, and performs request/reply calls to
/// drivers. Kept generic over the transport (spec.md §1 explicitly
/// excludes committing to a concrete message bus) so the coordinator,
/// recorder, and operations layer can run unmodified against an
/// in-process bus in tests and a real broker in production.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Subscribes to `topic`, which may contain `*` wildcard segments
    /// (see [`crate::topic::matches`]).
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    /// Publishes `payload` to `topic` and waits up to `timeout` for a
    /// single reply. Used by [`crate::client::ManagerClient`] to talk
    /// to a specific driver.
    async fn request(&self, topic: &str, payload: Bytes, timeout: Duration) -> Result<Bytes>;
}
