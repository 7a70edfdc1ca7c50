//! Publishing, with a queue for publishes issued mid-connect.
//!
//! While the bootstrapper is [`Connecting`](crate::ConnectionState::Connecting),
//! publishes are parked in a FIFO queue instead of racing the session
//! request. The bootstrapper drains the queue before any later publish is
//! allowed through the publish gate, so queued messages keep their order
//! and go out first.

use std::collections::VecDeque;
use std::sync::{Arc, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::client::HubcapInner;
use crate::error::{HubcapError, Result};
use crate::resource::{Message, PublishRequest};
use crate::session::Session;
use crate::transport::HttpRequest;

/// A publish waiting for the connection.
pub(crate) struct PendingPublish {
    channel: String,
    content: serde_json::Value,
    reply: oneshot::Sender<Result<Message>>,
}

impl HubcapInner {
    pub(crate) fn lock_queue(&self) -> MutexGuard<'_, VecDeque<PendingPublish>> {
        self.publish_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn pending_publishes(&self) -> usize {
        self.lock_queue().len()
    }

    pub(crate) async fn publish(
        self: &Arc<Self>,
        channel: &str,
        content: serde_json::Value,
    ) -> Result<Message> {
        let queued = {
            let mut queue = self.lock_queue();
            if self.state.borrow().is_connecting() {
                let (reply, rx) = oneshot::channel();
                queue.push_back(PendingPublish {
                    channel: channel.to_string(),
                    content: content.clone(),
                    reply,
                });
                debug!(channel, queued = queue.len(), "publish queued while connecting");
                Some(rx)
            } else {
                None
            }
        };

        if let Some(rx) = queued {
            return rx.await.unwrap_or(Err(HubcapError::Disconnected));
        }

        let session = self.connect().await?;
        let _gate = self.publish_gate.lock().await;
        self.publish_now(&session, channel, &content).await
    }

    async fn publish_now(
        &self,
        session: &Session,
        channel_name: &str,
        content: &serde_json::Value,
    ) -> Result<Message> {
        let channel = self.channel_in(session, channel_name).await?;
        let description = self.description().await?;

        let request = HttpRequest::post(channel.url()).capability(channel.capability());
        let request = description
            .exchange(request, "message")?
            .json(&PublishRequest { content })?;

        debug!(channel = channel_name, "publishing");
        self.transport.send(request).await?.into_json()
    }

    /// Send every queued publish in FIFO order. The caller holds the publish gate.
    pub(crate) async fn drain_publish_queue(&self, session: &Session) {
        loop {
            let next = self.lock_queue().pop_front();
            let Some(pending) = next else {
                break;
            };
            let result = self
                .publish_now(session, &pending.channel, &pending.content)
                .await;
            let _ = pending.reply.send(result);
        }
    }

    /// Hand a failed bootstrap's error to every queued publish.
    pub(crate) fn fail_publish_queue(&self, err: &HubcapError) {
        let drained: Vec<_> = self.lock_queue().drain(..).collect();
        for pending in drained {
            let _ = pending.reply.send(Err(err.duplicate()));
        }
    }
}
