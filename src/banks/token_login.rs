//! JSON REST partner with username/password login and SMS-confirmed linking.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;

use super::{format_amount, BankAdapter, BankError, DebitOutcome, LinkVerification, PartnerClient};
use crate::domain::BankAccount;
use crate::secrets::PartnerCredentials;

const SUCCESS_CODE: &str = "00";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartnerReply {
    response_code: String,
    #[serde(default)]
    message: String,
    transaction_id: Option<String>,
    otp_length: Option<u8>,
    otp_expires_in: Option<u32>,
}

impl PartnerReply {
    fn is_success(&self) -> bool {
        self.response_code == SUCCESS_CODE
    }
}

pub struct TokenLoginAdapter {
    swift_code: String,
    client: PartnerClient,
    credentials: PartnerCredentials,
}

impl TokenLoginAdapter {
    pub fn new(swift_code: String, client: PartnerClient, credentials: PartnerCredentials) -> Self {
        Self {
            swift_code,
            client,
            credentials,
        }
    }

    async fn call(
        &self,
        path: &str,
        token: &str,
        body: serde_json::Value,
    ) -> Result<PartnerReply, BankError> {
        let response = self
            .client
            .execute(self.client.post(path).bearer_auth(token).json(&body))
            .await?;

        if !response.is_ok() {
            return Ok(PartnerReply {
                message: response.failure_message(),
                ..PartnerReply::default()
            });
        }
        response.json()
    }
}

#[async_trait]
impl BankAdapter for TokenLoginAdapter {
    fn swift_code(&self) -> &str {
        &self.swift_code
    }

    async fn authenticate(&self) -> Result<String, BankError> {
        let body = json!({
            "username": self.credentials.require("username")?,
            "password": self.credentials.require("password")?,
        });
        let response = self
            .client
            .execute(self.client.post("/auth/login").json(&body))
            .await?;

        if !response.is_ok() {
            return Err(BankError::Rejected(format!(
                "login failed with status {}",
                response.status
            )));
        }
        Ok(response.json::<LoginResponse>()?.token)
    }

    async fn debit(
        &self,
        token: &str,
        reference: &str,
        amount: &BigDecimal,
        account: &BankAccount,
    ) -> Result<DebitOutcome, BankError> {
        let body = json!({
            "reference": reference,
            "amount": format_amount(amount),
            "accountNumber": account.number,
            "accountHolder": account.holder.name,
        });
        let reply = self.call("/transfers/debit", token, body).await?;

        if reply.is_success() {
            Ok(DebitOutcome::success(reply.message, reply.transaction_id))
        } else {
            Ok(DebitOutcome::declined(reply.message))
        }
    }

    async fn verify_account(&self, account: &BankAccount) -> Result<LinkVerification, BankError> {
        let token = self.authenticate().await?;
        let body = json!({
            "accountNumber": account.number,
            "phone": account.holder.phone,
        });
        let reply = self.call("/accounts/link", &token, body).await?;

        if !reply.is_success() {
            return Err(BankError::Rejected(reply.message));
        }
        Ok(LinkVerification::PendingOtp {
            length: reply.otp_length.unwrap_or(6),
            timeout: reply.otp_expires_in.unwrap_or(300),
        })
    }

    async fn confirm_account(&self, account: &BankAccount, code: &str) -> Result<bool, BankError> {
        let token = self.authenticate().await?;
        let body = json!({
            "accountNumber": account.number,
            "otp": code,
        });
        let reply = self.call("/accounts/link/confirm", &token, body).await?;
        Ok(reply.is_success())
    }

    async fn unlink_account(&self, account: &BankAccount) -> Result<(), BankError> {
        let token = self.authenticate().await?;
        let body = json!({ "accountNumber": account.number });
        let reply = self.call("/accounts/unlink", &token, body).await?;

        if reply.is_success() {
            Ok(())
        } else {
            Err(BankError::Rejected(reply.message))
        }
    }
}
