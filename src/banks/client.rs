use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::BankError;
use crate::utils::sanitize::sanitize_json;

/// Raw partner reply: status plus body text, parsed by the caller.
#[derive(Debug, Clone)]
pub struct PartnerResponse {
    pub status: StatusCode,
    pub body: String,
}

impl PartnerResponse {
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Partner's `message` field if the body carries one, else the status.
    pub fn failure_message(&self) -> String {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("partner returned status {}", self.status))
    }

    /// Body for logs: JSON with sensitive fields masked, otherwise just its size.
    fn log_body(&self) -> String {
        match serde_json::from_str::<serde_json::Value>(&self.body) {
            Ok(value) => sanitize_json(&value).to_string(),
            Err(_) => format!("<{} bytes>", self.body.len()),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BankError> {
        serde_json::from_str(&self.body).map_err(|e| {
            BankError::InvalidResponse(format!("unexpected partner payload: {}", e))
        })
    }
}

/// HTTP client shared by partner adapters. Requests are bounded by `timeout`
/// and guarded by a consecutive-failure circuit breaker; nothing is retried.
#[derive(Clone)]
pub struct PartnerClient {
    client: Client,
    base_url: String,
    partner: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PartnerClient {
    pub fn new(partner: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_circuit_breaker(partner, base_url, timeout, 5, 60)
    }

    pub fn with_circuit_breaker(
        partner: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PartnerClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            partner: partner.into(),
            circuit_breaker,
        }
    }

    pub fn partner(&self) -> &str {
        &self.partner
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn execute(&self, request: RequestBuilder) -> Result<PartnerResponse, BankError> {
        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await.map_err(map_transport)?;
                let status = response.status();
                let body = response.text().await.map_err(map_transport)?;
                Ok::<_, BankError>(PartnerResponse { status, body })
            })
            .await;

        match result {
            Ok(response) => {
                tracing::debug!(
                    partner = %self.partner,
                    status = response.status.as_u16(),
                    body = %response.log_body(),
                    "Partner responded"
                );
                Ok(response)
            }
            Err(FailsafeError::Rejected) => {
                tracing::warn!(partner = %self.partner, "Partner circuit breaker is open");
                Err(BankError::CircuitOpen(self.partner.clone()))
            }
            Err(FailsafeError::Inner(e)) => {
                tracing::error!(partner = %self.partner, error = %e, "Partner call failed");
                Err(e)
            }
        }
    }
}

fn map_transport(err: reqwest::Error) -> BankError {
    if err.is_timeout() {
        BankError::Timeout
    } else {
        BankError::Transport(err.to_string())
    }
}
