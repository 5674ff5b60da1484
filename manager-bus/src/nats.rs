use crate::bus::{Message, MessageBus, Subscription};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use manager_api::{Error, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A [`MessageBus`] backed by a NATS connection. Manager topics map
/// 1:1 onto NATS subjects via [`crate::topic::to_nats_subject`]; NATS
/// already wildcards a subject token with `*`, which is exactly this
/// bus's own topic convention, so no further translation is needed.
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    pub async fn connect(addr: impl async_nats::ToServerAddrs) -> Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .connect(addr)
            .await
            .map_err(|e| Error::bus(format!("connecting to nats: {e}")))?;
        Ok(NatsBus { client })
    }

    pub fn from_client(client: Client) -> Self {
        NatsBus { client }
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(crate::topic::to_nats_subject(topic), payload)
            .await
            .map_err(|e| Error::bus(format!("publishing to {topic}: {e}")))
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        use futures::StreamExt;

        let mut nats_sub = self
            .client
            .subscribe(crate::topic::to_nats_subject(topic))
            .await
            .map_err(|e| Error::bus(format!("subscribing to {topic}: {e}")))?;

        let (tx, rx) = mpsc::channel(256);
        let stop_token = CancellationToken::new();
        let forwarder_token = stop_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forwarder_token.cancelled() => break,
                    next = nats_sub.next() => {
                        let Some(msg) = next else { break };
                        let reply_to = msg.reply.map(|s| s.to_string());
                        if tx
                            .send(Message { payload: msg.payload, reply_to })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, stop_token))
    }

    async fn request(&self, topic: &str, payload: Bytes, timeout: Duration) -> Result<Bytes> {
        let fut = self
            .client
            .request(crate::topic::to_nats_subject(topic), payload);

        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(msg)) => Ok(msg.payload),
            Ok(Err(e)) => Err(Error::bus(format!("request to {topic}: {e}"))),
            Err(_) => Err(Error::bus("timed out waiting for a reply")),
        }
    }
}
