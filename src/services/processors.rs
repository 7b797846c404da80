//! Gateway-specific checkout confirmation.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::banks::{format_amount, PartnerClient};
use crate::config::gateways::{GATEWAY_CBE, GATEWAY_CYBERSOURCE};
use crate::domain::CheckoutTransaction;
use crate::error::AppError;
use crate::secrets::PartnerCredentials;
use crate::validation::validate_phone;

type HmacSha256 = Hmac<Sha256>;

/// What the payer must do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ConfirmOutcome {
    /// Post `fields` to `url` from the payer's browser.
    Redirect {
        url: String,
        fields: BTreeMap<String, String>,
    },
    /// A USSD prompt was pushed to the payer's phone.
    Ussd { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub phone: Option<String>,
    pub locale: Option<String>,
}

#[async_trait]
pub trait CheckoutProcessor: Send + Sync {
    fn gateway_key(&self) -> &str;

    async fn confirm(
        &self,
        tx: &CheckoutTransaction,
        request: &ConfirmRequest,
    ) -> Result<ConfirmOutcome, AppError>;
}

#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn CheckoutProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, processor: Arc<dyn CheckoutProcessor>) -> Self {
        self.processors
            .insert(processor.gateway_key().to_string(), processor);
        self
    }

    pub fn get(&self, gateway_key: &str) -> Option<Arc<dyn CheckoutProcessor>> {
        self.processors.get(gateway_key).cloned()
    }
}

/// Hosted card payment page. Nothing is sent server side; the payer's browser
/// posts the signed form.
pub struct CybersourceProcessor {
    pay_url: String,
    credentials: PartnerCredentials,
}

impl CybersourceProcessor {
    pub fn new(pay_url: impl Into<String>, credentials: PartnerCredentials) -> Self {
        Self {
            pay_url: pay_url.into(),
            credentials,
        }
    }

    fn form(
        &self,
        tx: &CheckoutTransaction,
        locale: &str,
    ) -> Result<BTreeMap<String, String>, AppError> {
        let mut fields = vec![
            ("access_key", self.credentials.require("access_key")?.to_string()),
            ("profile_id", self.credentials.require("profile_id")?.to_string()),
            ("transaction_uuid", tx.id.to_string()),
            ("signed_date_time", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("locale", locale.to_string()),
            ("transaction_type", "sale".to_string()),
            ("reference_number", tx.id.simple().to_string()),
            ("amount", format_amount(&tx.pricing.total())),
            ("currency", "ETB".to_string()),
        ];
        let names: Vec<&str> = fields
            .iter()
            .map(|(name, _)| *name)
            .chain(["signed_field_names", "unsigned_field_names"])
            .collect();
        fields.push(("signed_field_names", names.join(",")));
        fields.push(("unsigned_field_names", String::new()));

        let mut form: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let signature = sign_fields(self.credentials.require("secret_key")?, &form)?;
        form.insert("signature".to_string(), signature);
        Ok(form)
    }
}

#[async_trait]
impl CheckoutProcessor for CybersourceProcessor {
    fn gateway_key(&self) -> &str {
        GATEWAY_CYBERSOURCE
    }

    async fn confirm(
        &self,
        tx: &CheckoutTransaction,
        request: &ConfirmRequest,
    ) -> Result<ConfirmOutcome, AppError> {
        let locale = request.locale.as_deref().unwrap_or("en");
        Ok(ConfirmOutcome::Redirect {
            url: self.pay_url.clone(),
            fields: self.form(tx, locale)?,
        })
    }
}

/// `base64(HMAC-SHA256(secret, "k1=v1,k2=v2,..."))` in `signed_field_names` order.
pub fn sign_fields(secret: &str, form: &BTreeMap<String, String>) -> Result<String, AppError> {
    let names = form
        .get("signed_field_names")
        .ok_or_else(|| AppError::Internal("signed_field_names is missing".to_string()))?;
    let data = names
        .split(',')
        .map(|name| format!("{}={}", name, form.get(name).map(String::as_str).unwrap_or("")))
        .collect::<Vec<_>>()
        .join(",");

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("checkout signing key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Bank USSD push: the partner prompts the payer on their handset and later
/// reports the result through a provider callback.
pub struct UssdProcessor {
    client: PartnerClient,
    credentials: PartnerCredentials,
}

impl UssdProcessor {
    pub fn new(client: PartnerClient, credentials: PartnerCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl CheckoutProcessor for UssdProcessor {
    fn gateway_key(&self) -> &str {
        GATEWAY_CBE
    }

    async fn confirm(
        &self,
        tx: &CheckoutTransaction,
        request: &ConfirmRequest,
    ) -> Result<ConfirmOutcome, AppError> {
        let phone = request.phone.as_deref().unwrap_or(&tx.for_ref);
        validate_phone(phone)?;

        let body = json!({
            "phone": phone,
            "amount": format_amount(&tx.pricing.total()),
            "reference": tx.id.to_string(),
        });
        let response = self
            .client
            .execute(
                self.client
                    .post("/ussd/push")
                    .bearer_auth(self.credentials.require("token")?)
                    .json(&body),
            )
            .await?;

        if !response.is_ok() {
            return Err(AppError::FailedToVerifyTransaction(response.failure_message()));
        }

        tracing::info!(checkout_id = %tx.id, gateway = GATEWAY_CBE, "USSD push sent");
        Ok(ConfirmOutcome::Ussd {
            message: "USSD prompt sent to the payer".to_string(),
        })
    }
}
