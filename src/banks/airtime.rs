//! Airtime top-up partner used to settle BILL transactions.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;

use super::{format_amount, BankError, PartnerClient};
use crate::secrets::PartnerCredentials;

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
}

pub struct AirtimeClient {
    client: PartnerClient,
    credentials: PartnerCredentials,
}

impl AirtimeClient {
    pub fn new(client: PartnerClient, credentials: PartnerCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Client-credentials OAuth grant.
    pub async fn access_token(&self) -> Result<String, BankError> {
        let client_id = self.credentials.require("client_id")?;
        let client_secret = self.credentials.require("client_secret")?;
        let response = self
            .client
            .execute(
                self.client
                    .post("/oauth2/token")
                    .basic_auth(client_id, Some(client_secret))
                    .form(&[("grant_type", "client_credentials")]),
            )
            .await?;

        if !response.is_ok() {
            return Err(BankError::Rejected(response.failure_message()));
        }
        Ok(response.json::<TokenReply>()?.access_token)
    }

    /// Returns true when the partner accepted the top-up (HTTP 200).
    pub async fn topup(
        &self,
        token: &str,
        phone: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> Result<bool, BankError> {
        let body = json!({
            "msisdn": phone,
            "amount": format_amount(amount),
            "reference": reference,
        });
        let response = self
            .client
            .execute(self.client.post("/airtime/topup").bearer_auth(token).json(&body))
            .await?;

        if !response.is_ok() {
            tracing::warn!(
                reference = %reference,
                status = response.status.as_u16(),
                message = %response.failure_message(),
                "Airtime top-up declined"
            );
        }
        Ok(response.is_ok())
    }
}
