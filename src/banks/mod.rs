//! Partner bank adapters.
//!
//! Every partner exposes the same contract to the settlement router:
//! `authenticate` exchanges partner credentials for a bearer/session token,
//! `debit` moves money out of a linked account using that token, and
//! `verify_account` decides whether a newly linked account is verified at once
//! or needs an SMS code. Partners differ only in transport and field names.
//! The registry picks an adapter by the bank's SWIFT code.

pub mod airtime;
pub mod basic_login;
pub mod client;
pub mod soap;
pub mod static_token;
pub mod token_login;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{BankPartnerConfig, PartnerProtocol};
use crate::domain::BankAccount;
use crate::secrets::CredentialSource;

pub use airtime::AirtimeClient;
pub use basic_login::BasicLoginAdapter;
pub use client::{PartnerClient, PartnerResponse};
pub use soap::SoapAdapter;
pub use static_token::StaticTokenAdapter;
pub use token_login::TokenLoginAdapter;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    #[error("partner request failed: {0}")]
    Transport(String),
    #[error("partner request timed out")]
    Timeout,
    #[error("partner {0} is temporarily unavailable")]
    CircuitOpen(String),
    #[error("partner rejected the request: {0}")]
    Rejected(String),
    #[error("invalid partner response: {0}")]
    InvalidResponse(String),
    #[error("missing partner credential: {0}")]
    MissingCredential(String),
    #[error("no adapter for SWIFT code {0}")]
    Unsupported(String),
}

/// Result of a debit call. `verified` is true only on HTTP 200 plus the
/// partner's own success code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebitOutcome {
    pub verified: bool,
    pub message: String,
    pub provider_reference: Option<String>,
}

impl DebitOutcome {
    pub fn success(message: impl Into<String>, provider_reference: Option<String>) -> Self {
        Self {
            verified: true,
            message: message.into(),
            provider_reference,
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            verified: false,
            message: message.into(),
            provider_reference: None,
        }
    }
}

/// Outcome of linking a bank account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkVerification {
    Verified,
    /// The partner sent an SMS code of `length` digits, valid `timeout` seconds.
    PendingOtp { length: u8, timeout: u32 },
}

#[async_trait]
pub trait BankAdapter: Send + Sync {
    fn swift_code(&self) -> &str;

    async fn authenticate(&self) -> Result<String, BankError>;

    async fn debit(
        &self,
        token: &str,
        reference: &str,
        amount: &BigDecimal,
        account: &BankAccount,
    ) -> Result<DebitOutcome, BankError>;

    async fn verify_account(&self, account: &BankAccount) -> Result<LinkVerification, BankError>;

    /// Finalizes a pending link. Partners without an SMS step replay `verify_account`.
    async fn confirm_account(&self, account: &BankAccount, _code: &str) -> Result<bool, BankError> {
        Ok(self.verify_account(account).await? == LinkVerification::Verified)
    }

    async fn unlink_account(&self, _account: &BankAccount) -> Result<(), BankError> {
        Ok(())
    }
}

/// Adapters keyed by SWIFT code.
#[derive(Clone, Default)]
pub struct BankAdapterRegistry {
    adapters: HashMap<String, Arc<dyn BankAdapter>>,
}

impl BankAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn BankAdapter>) {
        self.adapters
            .insert(adapter.swift_code().to_uppercase(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn BankAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, swift_code: &str) -> Result<Arc<dyn BankAdapter>, BankError> {
        self.adapters
            .get(&swift_code.to_uppercase())
            .cloned()
            .ok_or_else(|| BankError::Unsupported(swift_code.to_string()))
    }

    pub fn supports(&self, swift_code: &str) -> bool {
        self.adapters.contains_key(&swift_code.to_uppercase())
    }

    /// Builds one adapter per configured partner, credentials resolved by SWIFT code.
    pub async fn from_config(
        partners: &[BankPartnerConfig],
        credentials: &dyn CredentialSource,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for partner in partners {
            let creds = credentials.partner(&partner.swift_code).await?;
            let client = PartnerClient::new(&partner.swift_code, &partner.base_url, timeout);
            let swift = partner.swift_code.clone();

            let adapter: Arc<dyn BankAdapter> = match partner.protocol {
                PartnerProtocol::TokenLogin => {
                    Arc::new(TokenLoginAdapter::new(swift, client, creds))
                }
                PartnerProtocol::StaticToken => {
                    Arc::new(StaticTokenAdapter::new(swift, client, creds))
                }
                PartnerProtocol::BasicLogin => {
                    Arc::new(BasicLoginAdapter::new(swift, client, creds))
                }
                PartnerProtocol::Soap => Arc::new(SoapAdapter::new(swift, client, creds)),
            };
            tracing::info!(
                swift_code = %partner.swift_code,
                protocol = ?partner.protocol,
                "Registered bank adapter"
            );
            registry.register(adapter);
        }
        Ok(registry)
    }
}

/// Two-decimal amount string sent to partners.
pub(crate) fn format_amount(amount: &BigDecimal) -> String {
    amount.with_scale(2).to_string()
}
