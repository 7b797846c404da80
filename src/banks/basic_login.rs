//! JSON REST partner that trades HTTP Basic credentials for an access token.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;

use super::{format_amount, BankAdapter, BankError, DebitOutcome, LinkVerification, PartnerClient};
use crate::domain::BankAccount;
use crate::secrets::PartnerCredentials;

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Reply {
    is_success: bool,
    #[serde(default)]
    message: String,
    reference: Option<String>,
}

pub struct BasicLoginAdapter {
    swift_code: String,
    client: PartnerClient,
    credentials: PartnerCredentials,
}

impl BasicLoginAdapter {
    pub fn new(swift_code: String, client: PartnerClient, credentials: PartnerCredentials) -> Self {
        Self {
            swift_code,
            client,
            credentials,
        }
    }
}

#[async_trait]
impl BankAdapter for BasicLoginAdapter {
    fn swift_code(&self) -> &str {
        &self.swift_code
    }

    async fn authenticate(&self) -> Result<String, BankError> {
        let username = self.credentials.require("username")?;
        let password = self.credentials.require("password")?;
        let response = self
            .client
            .execute(
                self.client
                    .post("/auth/token")
                    .basic_auth(username, Some(password)),
            )
            .await?;

        if !response.is_ok() {
            return Err(BankError::Rejected(format!(
                "token request failed with status {}",
                response.status
            )));
        }
        Ok(response.json::<TokenReply>()?.access_token)
    }

    async fn debit(
        &self,
        token: &str,
        reference: &str,
        amount: &BigDecimal,
        account: &BankAccount,
    ) -> Result<DebitOutcome, BankError> {
        let body = json!({
            "transactionReference": reference,
            "amount": format_amount(amount),
            "fromAccount": account.number,
            "narration": format!("SocialPay replenishment {}", reference),
        });
        let response = self
            .client
            .execute(self.client.post("/api/v1/debit").bearer_auth(token).json(&body))
            .await?;

        if !response.is_ok() {
            return Ok(DebitOutcome::declined(response.failure_message()));
        }
        let reply: Reply = response.json()?;
        if reply.is_success {
            Ok(DebitOutcome::success(reply.message, reply.reference))
        } else {
            Ok(DebitOutcome::declined(reply.message))
        }
    }

    async fn verify_account(&self, account: &BankAccount) -> Result<LinkVerification, BankError> {
        let token = self.authenticate().await?;
        let response = self
            .client
            .execute(
                self.client
                    .get(&format!("/api/v1/accounts/{}", account.number))
                    .bearer_auth(token),
            )
            .await?;

        if !response.is_ok() {
            return Err(BankError::Rejected(response.failure_message()));
        }
        let reply: Reply = response.json()?;
        if reply.is_success {
            Ok(LinkVerification::Verified)
        } else {
            Err(BankError::Rejected(reply.message))
        }
    }
}
