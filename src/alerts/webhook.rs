//! Webhook alert delivery.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{AlertEmitter, AlertError};
use crate::types::AlertRequest;

/// POSTs each alert as JSON to a fixed URL.
///
/// Any 2xx response counts as delivered. No retries: the receiver can
/// deduplicate on `AlertRequest::id` if it retries on its side.
#[derive(Clone)]
pub struct WebhookAlertEmitter {
    http: reqwest::Client,
    url: String,
}

impl WebhookAlertEmitter {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AlertError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertEmitter for WebhookAlertEmitter {
    async fn emit(&self, alert: AlertRequest) -> Result<(), AlertError> {
        let resp = self.http.post(&self.url).json(&alert).send().await?;

        if resp.status().is_success() {
            debug!(alert_id = %alert.id, status = %resp.status(), "Alert delivered to webhook");
            Ok(())
        } else {
            Err(AlertError::Status(resp.status()))
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
