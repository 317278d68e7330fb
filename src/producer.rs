//! NATS reply publishing

use anyhow::{Context, Result};
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes encoded replies to the requester's inbox
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish `payload` to `reply`
    pub async fn reply(&self, reply: Subject, payload: Vec<u8>) -> Result<()> {
        let len = payload.len();
        self.client
            .publish(reply.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish reply to {}", reply))?;

        debug!(reply = %reply, bytes = len, "Published reply");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running NATS server
}
