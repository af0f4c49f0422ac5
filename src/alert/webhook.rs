//! Webhook alert sink: POSTs the record summary as JSON.

use std::time::Duration;

use url::Url;

use crate::alert::AlertSink;
use crate::resilience::record::RecordSummary;

/// Name the webhook sink is installed under.
pub const WEBHOOK_ALERT: &str = "webhook";

/// Fire-and-forget JSON webhook.
#[derive(Debug, Clone)]
pub struct WebhookAlert {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl WebhookAlert {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl AlertSink for WebhookAlert {
    fn notify(&self, summary: &RecordSummary) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(guard = %summary.operation, "No runtime to deliver webhook alert");
            return;
        };

        let request = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(summary);
        let guard = summary.operation.clone();
        let url = self.url.clone();

        handle.spawn(async move {
            match request.send().await {
                Ok(res) if res.status().is_success() => {
                    tracing::debug!(guard = %guard, url = %url, "Webhook alert delivered");
                }
                Ok(res) => {
                    tracing::warn!(guard = %guard, url = %url, status = %res.status(), "Webhook alert rejected");
                }
                Err(e) => {
                    tracing::warn!(guard = %guard, url = %url, error = %e, "Webhook alert failed");
                }
            }
        });
    }
}
