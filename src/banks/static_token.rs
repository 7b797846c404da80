//! JSON REST partner authenticated with a long-lived bearer token.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;

use super::{format_amount, BankAdapter, BankError, DebitOutcome, LinkVerification, PartnerClient};
use crate::domain::BankAccount;
use crate::secrets::PartnerCredentials;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentReply {
    status: String,
    #[serde(default)]
    message: String,
    payment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountReply {
    status: String,
    #[serde(default)]
    customer_name: String,
}

pub struct StaticTokenAdapter {
    swift_code: String,
    client: PartnerClient,
    credentials: PartnerCredentials,
}

impl StaticTokenAdapter {
    pub fn new(swift_code: String, client: PartnerClient, credentials: PartnerCredentials) -> Self {
        Self {
            swift_code,
            client,
            credentials,
        }
    }
}

#[async_trait]
impl BankAdapter for StaticTokenAdapter {
    fn swift_code(&self) -> &str {
        &self.swift_code
    }

    async fn authenticate(&self) -> Result<String, BankError> {
        Ok(self.credentials.require("token")?.to_string())
    }

    async fn debit(
        &self,
        token: &str,
        reference: &str,
        amount: &BigDecimal,
        account: &BankAccount,
    ) -> Result<DebitOutcome, BankError> {
        let body = json!({
            "externalReference": reference,
            "amount": format_amount(amount),
            "debitAccount": account.number,
        });
        let response = self
            .client
            .execute(self.client.post("/payments/debit").bearer_auth(token).json(&body))
            .await?;

        if !response.is_ok() {
            return Ok(DebitOutcome::declined(response.failure_message()));
        }
        let reply: PaymentReply = response.json()?;
        if reply.status == "SUCCESS" {
            Ok(DebitOutcome::success(reply.message, reply.payment_id))
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
                    .get(&format!("/accounts/{}", account.number))
                    .bearer_auth(token),
            )
            .await?;

        if !response.is_ok() {
            return Err(BankError::Rejected(response.failure_message()));
        }
        let reply: AccountReply = response.json()?;
        if reply.status != "ACTIVE" {
            return Err(BankError::Rejected(format!(
                "account of {} is {}",
                reply.customer_name, reply.status
            )));
        }
        Ok(LinkVerification::Verified)
    }
}
