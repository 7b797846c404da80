use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::gateways::GatewayCatalog;
use crate::domain::{
    Account, AccountType, CheckoutStatus, CheckoutStatusValue, CheckoutTransaction, Pricing,
    WebhookPayload, WebhookStatus,
};
use crate::error::AppError;
use crate::ports::{AccountRepository, CheckoutRepository, RepositoryError};
use crate::services::processors::{ConfirmOutcome, ConfirmRequest, ProcessorRegistry};
use crate::services::webhook::WebhookDispatcher;
use crate::session::{SessionTokens, TokenPurpose};
use crate::validation::{
    sanitize_string, validate_money_amount, validate_notify_url, validate_required,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(rename = "for")]
    pub for_ref: String,
    pub amount: BigDecimal,
    pub gateway: String,
    /// Seconds; zero disables expiry.
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub details: serde_json::Value,
    pub notify_url: Option<String>,
}

/// Result reported by a USSD or SOAP provider for a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallback {
    pub checkout_id: Uuid,
    pub success: bool,
    pub message: String,
    pub provider_tx_id: Option<String>,
    #[serde(default)]
    pub provider_data: serde_json::Value,
    /// Channel the provider used, e.g. `USSD` or `SOAP`.
    pub channel: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    accounts: Arc<dyn AccountRepository>,
    checkouts: Arc<dyn CheckoutRepository>,
    catalog: Arc<GatewayCatalog>,
    processors: Arc<ProcessorRegistry>,
    tokens: SessionTokens,
    webhooks: WebhookDispatcher,
    fee_percent: BigDecimal,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        checkouts: Arc<dyn CheckoutRepository>,
        catalog: Arc<GatewayCatalog>,
        processors: Arc<ProcessorRegistry>,
        tokens: SessionTokens,
        webhooks: WebhookDispatcher,
        fee_percent: BigDecimal,
    ) -> Self {
        Self {
            accounts,
            checkouts,
            catalog,
            processors,
            tokens,
            webhooks,
            fee_percent,
        }
    }

    /// API-key flow: the merchant is identified by an `Initiate` token.
    pub async fn init_transaction(
        &self,
        initiate_token: &str,
        request: CheckoutRequest,
    ) -> Result<CheckoutTransaction, AppError> {
        let merchant: Uuid = self.tokens.decode(TokenPurpose::Initiate, initiate_token)?;
        self.init_direct_transaction(merchant, request).await
    }

    pub async fn init_direct_transaction(
        &self,
        merchant_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutTransaction, AppError> {
        let for_ref = sanitize_string(&request.for_ref);
        validate_required("for", &for_ref)?;
        validate_money_amount(&request.amount)?;
        if let Some(url) = &request.notify_url {
            validate_notify_url(url)?;
        }
        if request.ttl < 0 {
            return Err(AppError::InvalidRequest("ttl must not be negative".to_string()));
        }

        let gateway = self
            .catalog
            .get(&request.gateway)
            .ok_or_else(|| {
                AppError::InvalidRequest(format!("unknown gateway {}", request.gateway))
            })?;
        if !gateway.can_process {
            return Err(AppError::InvalidRequest(format!(
                "gateway {} cannot process payments",
                gateway.key
            )));
        }

        let to = self.merchant_wallet(merchant_id).await?;
        let now = Utc::now();
        let tx = CheckoutTransaction {
            id: Uuid::new_v4(),
            for_ref,
            to: to.id,
            pricing: Pricing::with_service_fee(request.amount, &self.fee_percent),
            ttl: request.ttl,
            details: request.details,
            gateway,
            status: CheckoutStatus::new(CheckoutStatusValue::Pending, "created"),
            notify_url: request.notify_url,
            created_at: now,
            updated_at: now,
        };
        let tx = self.checkouts.insert(&tx).await?;

        tracing::info!(
            checkout_id = %tx.id,
            merchant_id = %merchant_id,
            gateway = %tx.gateway.key,
            total = %tx.pricing.total(),
            "Checkout created"
        );
        Ok(tx)
    }

    pub async fn confirm_transaction(
        &self,
        checkout_id: Uuid,
        request: ConfirmRequest,
    ) -> Result<ConfirmOutcome, AppError> {
        let tx = self.checkouts.get_by_id(checkout_id).await?;
        if tx.status.value != CheckoutStatusValue::Pending {
            return Err(AppError::InvalidRequest(format!(
                "checkout is {:?}, not pending",
                tx.status.value
            )));
        }

        if tx.is_expired(Utc::now()) {
            let canceled = self
                .apply_status(
                    checkout_id,
                    CheckoutStatus::new(CheckoutStatusValue::Canceled, "checkout expired"),
                )
                .await?;
            self.notify_transaction(&canceled);
            return Err(AppError::InvalidRequest("checkout has expired".to_string()));
        }

        let processor = self.processors.get(&tx.gateway.key).ok_or_else(|| {
            AppError::InvalidRequest(format!("gateway {} has no confirmation step", tx.gateway.key))
        })?;
        let outcome = processor.confirm(&tx, &request).await?;

        // A callback may have settled the checkout while the processor call was in flight.
        match self
            .checkouts
            .transition_status(
                checkout_id,
                CheckoutStatusValue::Pending,
                CheckoutStatus::new(CheckoutStatusValue::Processing, "awaiting payer"),
            )
            .await
        {
            Ok(_) => {
                tracing::info!(
                    checkout_id = %tx.id,
                    gateway = %tx.gateway.key,
                    "Checkout processing"
                );
            }
            Err(RepositoryError::Conflict(reason)) => tracing::info!(
                checkout_id = %tx.id,
                reason = %reason,
                "Checkout moved on during confirmation, status left as is"
            ),
            Err(e) => return Err(e.into()),
        }
        Ok(outcome)
    }

    /// Inbound status change. Forwards the whole checkout to `notify_url`.
    pub async fn update_payment_status(
        &self,
        checkout_id: Uuid,
        status: CheckoutStatus,
    ) -> Result<CheckoutTransaction, AppError> {
        let tx = self.apply_status(checkout_id, status).await?;
        self.notify_transaction(&tx);
        Ok(tx)
    }

    /// Normalizes a provider callback, applies it, and forwards the normalized
    /// payload to `notify_url`.
    pub async fn handle_provider_callback(
        &self,
        callback: ProviderCallback,
    ) -> Result<WebhookPayload, AppError> {
        let (value, status) = if callback.success {
            (CheckoutStatusValue::Success, WebhookStatus::Success)
        } else {
            (CheckoutStatusValue::Declined, WebhookStatus::Failure)
        };

        let tx = self
            .apply_status(
                callback.checkout_id,
                CheckoutStatus::new(value, callback.message.clone()),
            )
            .await?;

        let payload = WebhookPayload {
            reference_id: tx.id.to_string(),
            status,
            message: callback.message,
            provider_tx_id: callback.provider_tx_id,
            provider_data: callback.provider_data,
            timestamp: Utc::now().to_rfc3339(),
            payload_type: callback.channel.to_uppercase(),
        };
        if let Some(url) = &tx.notify_url {
            self.webhooks.enqueue(&payload.reference_id, url, &payload);
        }
        Ok(payload)
    }

    pub async fn get_transaction(
        &self,
        checkout_id: Uuid,
    ) -> Result<CheckoutTransaction, AppError> {
        Ok(self.checkouts.get_by_id(checkout_id).await?)
    }

    async fn apply_status(
        &self,
        checkout_id: Uuid,
        status: CheckoutStatus,
    ) -> Result<CheckoutTransaction, AppError> {
        let tx = self.checkouts.get_by_id(checkout_id).await?;
        if tx.status.value.is_terminal() {
            return Err(AppError::InvalidRequest(format!(
                "checkout is already {:?}",
                tx.status.value
            )));
        }

        tracing::info!(
            checkout_id = %tx.id,
            from = ?tx.status.value,
            to = ?status.value,
            "Checkout status changed"
        );
        Ok(self
            .checkouts
            .transition_status(checkout_id, tx.status.value, status)
            .await?)
    }

    fn notify_transaction(&self, tx: &CheckoutTransaction) {
        if let Some(url) = &tx.notify_url {
            self.webhooks.enqueue(&tx.id.to_string(), url, tx);
        }
    }

    async fn merchant_wallet(&self, merchant_id: Uuid) -> Result<Account, AppError> {
        let existing = self
            .accounts
            .list_by_user(merchant_id)
            .await?
            .into_iter()
            .find(|a| a.default && a.account_type() == AccountType::Stored);

        match existing {
            Some(wallet) => Ok(wallet),
            None => Ok(self
                .accounts
                .insert(&Account::default_wallet(merchant_id))
                .await?),
        }
    }
}
