use anyhow::{Context, Result};
use std::sync::Arc;

use crate::banks::{AirtimeClient, BankAdapterRegistry, PartnerClient};
use crate::config::gateways::{GatewayCatalog, GATEWAY_CBE, GATEWAY_CYBERSOURCE};
use crate::config::Config;
use crate::ports::Repositories;
use crate::secrets::CredentialSource;
use crate::services::{
    AccountLocks, AccountService, BalanceEngine, ChallengeVerifier, CheckoutService,
    CybersourceProcessor, ProcessorRegistry, SettlementRouter, UssdProcessor, WebhookDispatcher,
};
use crate::session::SessionTokens;
use crate::use_cases::{CreateTransactionInitiate, VerifyTransaction};

pub const AIRTIME_PARTNER: &str = "AIRTIME";

/// Every service, wired from one `Config`.
#[derive(Clone)]
pub struct Platform {
    pub tokens: SessionTokens,
    pub accounts: AccountService,
    pub balance: BalanceEngine,
    pub challenges: ChallengeVerifier,
    pub initiate: Arc<CreateTransactionInitiate>,
    pub verify: Arc<VerifyTransaction>,
    pub checkout: CheckoutService,
    pub catalog: Arc<GatewayCatalog>,
}

impl Platform {
    /// Resolves partner credentials and starts the webhook worker, so it must
    /// run inside a Tokio runtime.
    pub async fn build(
        config: &Config,
        repos: Repositories,
        credentials: &dyn CredentialSource,
    ) -> Result<Self> {
        validate_config(config)?;

        let tokens = SessionTokens::new(&config.session);
        let adapters = Arc::new(
            BankAdapterRegistry::from_config(
                &config.bank_partners,
                credentials,
                config.partner_timeout,
            )
            .await
            .context("Failed to build bank adapters")?,
        );

        let airtime = match &config.airtime_base_url {
            Some(url) => {
                let creds = credentials
                    .partner(AIRTIME_PARTNER)
                    .await
                    .context("Failed to load airtime credentials")?;
                let client = PartnerClient::new(AIRTIME_PARTNER, url, config.partner_timeout);
                Some(Arc::new(AirtimeClient::new(client, creds)))
            }
            None => None,
        };

        let mut processors = ProcessorRegistry::new();
        if let Some(pay_url) = &config.cybersource_pay_url {
            let creds = credentials
                .partner(GATEWAY_CYBERSOURCE)
                .await
                .context("Failed to load card processor credentials")?;
            processors = processors.with(Arc::new(CybersourceProcessor::new(pay_url, creds)));
        }
        if let Some(url) = &config.cbe_ussd_base_url {
            let creds = credentials
                .partner(GATEWAY_CBE)
                .await
                .context("Failed to load USSD partner credentials")?;
            let client = PartnerClient::new(GATEWAY_CBE, url, config.partner_timeout);
            processors = processors.with(Arc::new(UssdProcessor::new(client, creds)));
        }

        let balance = BalanceEngine::new(repos.accounts.clone(), repos.transactions.clone());
        let challenges = ChallengeVerifier::new(
            repos.identities.clone(),
            repos.phone_auths.clone(),
            repos.public_keys.clone(),
        );
        let router = SettlementRouter::new(
            repos.accounts.clone(),
            repos.transactions.clone(),
            adapters.clone(),
            airtime,
        );
        let catalog = Arc::new(GatewayCatalog::standard());
        let locks = AccountLocks::new();

        let platform = Platform {
            accounts: AccountService::new(
                repos.accounts.clone(),
                repos.banks.clone(),
                repos.transactions.clone(),
                adapters,
            ),
            initiate: Arc::new(CreateTransactionInitiate::new(
                repos.accounts.clone(),
                repos.transactions.clone(),
                repos.sessions.clone(),
                balance.clone(),
                locks.clone(),
                tokens.clone(),
                config.challenge_threshold.clone(),
            )),
            verify: Arc::new(VerifyTransaction::new(
                repos.transactions.clone(),
                repos.sessions.clone(),
                tokens.clone(),
                challenges.clone(),
                router,
                locks,
            )),
            checkout: CheckoutService::new(
                repos.accounts.clone(),
                repos.checkouts.clone(),
                catalog.clone(),
                Arc::new(processors),
                tokens.clone(),
                WebhookDispatcher::spawn(&config.webhook),
                config.checkout_fee_percent.clone(),
            ),
            tokens,
            balance,
            challenges,
            catalog,
        };

        tracing::info!(
            bank_partners = config.bank_partners.len(),
            airtime = config.airtime_base_url.is_some(),
            "Platform initialized"
        );
        Ok(platform)
    }
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.session.pre_session_secret.is_empty() {
        anyhow::bail!("PRE_SESSION_SECRET is empty");
    }
    if config.session.initiate_secret.is_empty() {
        anyhow::bail!("INITIATE_SECRET is empty");
    }
    if config.webhook.signing_secret.is_empty() {
        tracing::warn!(
            "WEBHOOK_SIGNING_SECRET is empty; merchant webhooks are signed with an empty key"
        );
    }

    for partner in &config.bank_partners {
        url::Url::parse(&partner.base_url).with_context(|| {
            format!("base URL of bank partner {} is not a valid URL", partner.swift_code)
        })?;
    }
    for (name, value) in [
        ("AIRTIME_BASE_URL", &config.airtime_base_url),
        ("CYBERSOURCE_PAY_URL", &config.cybersource_pay_url),
        ("CBE_USSD_BASE_URL", &config.cbe_ussd_base_url),
    ] {
        if let Some(value) = value {
            url::Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
        }
    }

    Ok(())
}
