//! Transport abstraction for a single delivery attempt (§4.11, §9).
//! Grounded in the observer system's webhook action executor: build a
//! request, POST it, and report success purely on HTTP status.

use std::time::Duration;

use async_trait::async_trait;
use querybase_error::WebhookError;
use reqwest::Client;
use serde_json::Value;

/// One attempt at delivering a notification payload. Implementors do
/// not retry internally -- the dispatcher owns the retry loop so it can
/// log and count attempts uniformly across transports.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Human-readable name used in logs (e.g. `"webhook:https://..."`).
    fn name(&self) -> String;

    /// Attempt one delivery. Errors are transient from the caller's
    /// point of view; the dispatcher decides whether to retry.
    async fn deliver(&self, event_type: &str, payload: &Value) -> Result<(), WebhookError>;
}

/// Posts the event as a JSON body to a fixed URL, HMAC-signed when a
/// secret is configured. This is the "Google-Chat-style webhook poster"
/// the core's events are meant to drive (§9).
pub struct WebhookTransport {
    client: Client,
    url: String,
    secret: Option<String>,
}

impl WebhookTransport {
    /// # Panics
    ///
    /// Panics if the underlying TLS backend fails to initialize, which
    /// only happens if the platform has no usable crypto provider.
    #[must_use]
    pub fn new(url: impl Into<String>, secret: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with default TLS backend");
        Self {
            client,
            url: url.into(),
            secret,
        }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn name(&self) -> String {
        format!("webhook:{}", self.url)
    }

    async fn deliver(&self, event_type: &str, payload: &Value) -> Result<(), WebhookError> {
        let body = serde_json::json!({ "event_type": event_type, "payload": payload });
        let bytes = serde_json::to_vec(&body).map_err(|err| WebhookError::DeliveryFailed {
            message: err.to_string(),
        })?;

        let mut request = self.client.post(&self.url).header("content-type", "application/json");
        if let Some(secret) = &self.secret {
            let signature = crate::signature::sign_payload(secret, &bytes);
            request = request.header("x-querybase-signature", signature);
        }

        let response = request
            .body(bytes)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    WebhookError::Timeout { timeout_secs: 30 }
                } else {
                    WebhookError::DeliveryFailed {
                        message: err.to_string(),
                    }
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(WebhookError::DeliveryFailed {
                message: format!("HTTP {}", response.status()),
            })
        }
    }
}
