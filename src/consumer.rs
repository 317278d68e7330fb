//! NATS subscription for incoming inference requests

use crate::service::Route;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Receives every request under `<prefix>.>` and resolves its route
pub struct RequestConsumer {
    client: Client,
    prefix: String,
}

impl RequestConsumer {
    pub fn new(client: Client, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.trim_end_matches('.').to_string(),
        }
    }

    /// Wildcard subject covering all routes
    pub fn subject(&self) -> String {
        format!("{}.>", self.prefix)
    }

    /// Subscribe to all request subjects
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subject = self.subject();
        let subscriber = self.client.subscribe(subject.clone()).await?;
        info!(
            subject = %subject,
            routes = ?Route::ALL.map(|r| r.suffix()),
            "Subscribed to request subjects"
        );
        Ok(subscriber)
    }

    /// Route for a received message subject
    pub fn route(&self, subject: &str) -> Option<Route> {
        Route::from_subject(&self.prefix, subject)
    }
}

#[cfg(test)]
mod tests {
    // Subscription tests would require a running NATS server; routing is
    // covered by the service tests.
}
