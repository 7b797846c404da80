use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

pub mod gateways;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub pre_session_secret: String,
    pub initiate_secret: String,
    pub pre_session_ttl: chrono::Duration,
    pub initiate_ttl: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub signing_secret: String,
    pub max_attempts: u32,
    pub base_backoff: std::time::Duration,
    pub timeout: std::time::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartnerProtocol {
    TokenLogin,
    StaticToken,
    BasicLogin,
    Soap,
}

impl FromStr for PartnerProtocol {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "token_login" => Ok(PartnerProtocol::TokenLogin),
            "static_token" => Ok(PartnerProtocol::StaticToken),
            "basic_login" => Ok(PartnerProtocol::BasicLogin),
            "soap" => Ok(PartnerProtocol::Soap),
            other => anyhow::bail!("unknown partner protocol '{}'", other),
        }
    }
}

/// One partner bank: which adapter shape serves a SWIFT code, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankPartnerConfig {
    pub swift_code: String,
    pub protocol: PartnerProtocol,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub session: SessionConfig,
    pub challenge_threshold: BigDecimal,
    pub checkout_fee_percent: BigDecimal,
    pub partner_timeout: std::time::Duration,
    pub webhook: WebhookConfig,
    pub bank_partners: Vec<BankPartnerConfig>,
    pub airtime_base_url: Option<String>,
    pub cybersource_pay_url: Option<String>,
    pub cbe_ussd_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let partner_timeout_secs: u64 = env_or("PARTNER_TIMEOUT_SECS", "60")
            .parse()
            .context("PARTNER_TIMEOUT_SECS must be an integer")?;

        Ok(Config {
            session: SessionConfig {
                pre_session_secret: env::var("PRE_SESSION_SECRET")
                    .context("PRE_SESSION_SECRET is required")?,
                initiate_secret: env::var("INITIATE_SECRET")
                    .context("INITIATE_SECRET is required")?,
                pre_session_ttl: chrono::Duration::minutes(
                    env_or("PRE_SESSION_TTL_MINUTES", "83").parse()?,
                ),
                initiate_ttl: chrono::Duration::minutes(
                    env_or("INITIATE_TTL_MINUTES", "1440").parse()?,
                ),
            },
            challenge_threshold: BigDecimal::from_str(&env_or("CHALLENGE_THRESHOLD", "3"))
                .context("CHALLENGE_THRESHOLD must be a decimal")?,
            checkout_fee_percent: BigDecimal::from_str(&env_or("CHECKOUT_FEE_PERCENT", "2.75"))
                .context("CHECKOUT_FEE_PERCENT must be a decimal")?,
            partner_timeout: std::time::Duration::from_secs(partner_timeout_secs),
            webhook: WebhookConfig {
                signing_secret: env::var("WEBHOOK_SIGNING_SECRET").unwrap_or_default(),
                max_attempts: env_or("WEBHOOK_MAX_ATTEMPTS", "5").parse()?,
                base_backoff: std::time::Duration::from_millis(
                    env_or("WEBHOOK_BACKOFF_MS", "500").parse()?,
                ),
                timeout: std::time::Duration::from_secs(partner_timeout_secs),
            },
            bank_partners: parse_bank_partners(&env_or("BANK_PARTNERS", ""))?,
            airtime_base_url: env::var("AIRTIME_BASE_URL").ok(),
            cybersource_pay_url: env::var("CYBERSOURCE_PAY_URL").ok(),
            cbe_ussd_base_url: env::var("CBE_USSD_BASE_URL").ok(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `SWIFT=protocol@base_url` entries separated by commas.
pub fn parse_bank_partners(raw: &str) -> anyhow::Result<Vec<BankPartnerConfig>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (swift_code, rest) = entry
                .split_once('=')
                .with_context(|| format!("bank partner entry '{}' is missing '='", entry))?;
            let (protocol, base_url) = rest
                .split_once('@')
                .with_context(|| format!("bank partner entry '{}' is missing '@'", entry))?;
            if swift_code.trim().is_empty() || base_url.trim().is_empty() {
                anyhow::bail!("bank partner entry '{}' is incomplete", entry);
            }

            Ok(BankPartnerConfig {
                swift_code: swift_code.trim().to_uppercase(),
                protocol: protocol.trim().parse()?,
                base_url: base_url.trim().trim_end_matches('/').to_string(),
            })
        })
        .collect()
}
