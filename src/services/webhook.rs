//! Outbound merchant notifications.
//!
//! `enqueue` hands a job to an unbounded queue and returns immediately; a
//! background worker delivers each job on its own task. Deliveries are signed
//! with `X-Webhook-Signature: hex(HMAC-SHA256(secret, body))` and retried on
//! transport errors and 5xx with exponential backoff. A job that exhausts its
//! attempts is logged and dropped: there is no durable dead-letter store.

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::WebhookConfig;
use crate::utils::sanitize::sanitize_json;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("failed to encode webhook payload: {0}")]
    Encode(String),
    #[error("failed to sign webhook payload: {0}")]
    Signing(String),
    #[error("endpoint rejected webhook with status {status} after {attempts} attempt(s)")]
    Rejected { status: u16, attempts: u32 },
    #[error("webhook delivery gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
    #[error("webhook queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: u16,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub reference: String,
    pub url: String,
    pub body: String,
}

/// Signs and posts a single webhook, retrying per its policy.
pub struct WebhookSender {
    client: Client,
    secret: String,
    max_attempts: u32,
    base_backoff: Duration,
}

impl WebhookSender {
    pub fn new(config: &WebhookConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            secret: config.signing_secret.clone(),
            max_attempts: config.max_attempts.max(1),
            base_backoff: config.base_backoff,
        }
    }

    pub fn signature_for(&self, body: &[u8]) -> Result<String, WebhookError> {
        sign(&self.secret, body)
    }

    pub async fn send(&self, url: &str, body: &str) -> Result<DeliveryReport, WebhookError> {
        let signature = self.signature_for(body.as_bytes())?;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .header(SIGNATURE_HEADER, signature.as_str())
                .body(body.to_string())
                .send()
                .await;

            let last_error = match result {
                Ok(response) if response.status().is_success() => {
                    return Ok(DeliveryReport {
                        status: response.status().as_u16(),
                        attempts,
                    });
                }
                Ok(response) if response.status().is_server_error() => {
                    format!("endpoint returned {}", response.status())
                }
                Ok(response) => {
                    return Err(WebhookError::Rejected {
                        status: response.status().as_u16(),
                        attempts,
                    });
                }
                Err(e) => e.to_string(),
            };

            if attempts >= self.max_attempts {
                return Err(WebhookError::Exhausted {
                    attempts,
                    last_error,
                });
            }

            let delay = self.backoff(attempts);
            tracing::warn!(
                url = %url,
                attempt = attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %last_error,
                "Webhook delivery failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// `base * 2^(attempt-1)`.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::Signing(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Fire-and-forget front of the webhook pipeline.
#[derive(Clone)]
pub struct WebhookDispatcher {
    queue: mpsc::UnboundedSender<WebhookJob>,
}

impl WebhookDispatcher {
    /// Starts the background worker on the current runtime.
    pub fn spawn(config: &WebhookConfig) -> Self {
        Self::with_sender(Arc::new(WebhookSender::new(config)))
    }

    pub fn with_sender(sender: Arc<WebhookSender>) -> Self {
        let (queue, mut jobs) = mpsc::unbounded_channel::<WebhookJob>();

        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                let sender = sender.clone();
                tokio::spawn(async move { deliver(&sender, job).await });
            }
            tracing::debug!("Webhook queue closed");
        });

        Self { queue }
    }

    /// Queues `payload` for `url`. Never blocks and never fails the caller.
    pub fn enqueue<T: Serialize>(&self, reference: &str, url: &str, payload: &T) {
        if let Err(e) = self.try_enqueue(reference, url, payload) {
            tracing::error!(reference = %reference, url = %url, error = %e, "Webhook not queued");
        }
    }

    pub fn try_enqueue<T: Serialize>(
        &self,
        reference: &str,
        url: &str,
        payload: &T,
    ) -> Result<(), WebhookError> {
        let value = serde_json::to_value(payload).map_err(|e| WebhookError::Encode(e.to_string()))?;
        tracing::debug!(
            reference = %reference,
            url = %url,
            payload = %sanitize_json(&value),
            "Queueing webhook"
        );

        self.queue
            .send(WebhookJob {
                reference: reference.to_string(),
                url: url.to_string(),
                body: value.to_string(),
            })
            .map_err(|_| WebhookError::QueueClosed)
    }
}

async fn deliver(sender: &WebhookSender, job: WebhookJob) {
    match sender.send(&job.url, &job.body).await {
        Ok(report) => tracing::info!(
            reference = %job.reference,
            url = %job.url,
            status = report.status,
            attempts = report.attempts,
            "Webhook delivered"
        ),
        Err(e) => tracing::error!(
            reference = %job.reference,
            url = %job.url,
            error = %e,
            "Webhook delivery failed permanently"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32, base_backoff_ms: u64) -> WebhookConfig {
        WebhookConfig {
            signing_secret: "secret".to_string(),
            max_attempts,
            base_backoff: Duration::from_millis(base_backoff_ms),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let sender = WebhookSender::new(&config(5, 100));
        assert_eq!(sender.backoff(1), Duration::from_millis(100));
        assert_eq!(sender.backoff(2), Duration::from_millis(200));
        assert_eq!(sender.backoff(4), Duration::from_millis(800));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let sender = WebhookSender::new(&config(0, 10));
        assert_eq!(sender.max_attempts, 1);
    }

    #[test]
    fn test_signature_is_hex_hmac() {
        let signature = sign("my-secret", b"payload").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(signature, sign("other-secret", b"payload").unwrap());
    }
}
