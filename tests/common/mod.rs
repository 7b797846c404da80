#![allow(dead_code)]

use bigdecimal::BigDecimal;
use chrono::Duration as ChronoDuration;
use socialpay_core::adapters::InMemoryStore;
use socialpay_core::config::{parse_bank_partners, Config, SessionConfig, WebhookConfig};
use socialpay_core::domain::{
    Account, AccountHolder, Bank, BankAccount, Transaction, TransactionDetails,
    VerificationStatus,
};
use socialpay_core::ports::Repositories;
use socialpay_core::secrets::{PartnerCredentials, StaticCredentials};
use socialpay_core::Platform;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const TOKEN_LOGIN_SWIFT: &str = "AWINETAA";
pub const STATIC_TOKEN_SWIFT: &str = "ABYSETAA";
pub const BASIC_LOGIN_SWIFT: &str = "DASHETAA";
pub const SOAP_SWIFT: &str = "CBETETAA";
pub const WEBHOOK_SECRET: &str = "webhook-test-secret";
pub const CARD_PAY_URL: &str = "https://secureacceptance.test/pay";

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub repos: Repositories,
    pub platform: Platform,
}

/// Every partner points at `partner_url` under its own path prefix.
pub fn test_config(partner_url: &str) -> Config {
    let partners = format!(
        "{tl}=token_login@{url}/awash,{st}=static_token@{url}/abyssinia,\
         {bl}=basic_login@{url}/dashen,{soap}=soap@{url}/cbe-core",
        tl = TOKEN_LOGIN_SWIFT,
        st = STATIC_TOKEN_SWIFT,
        bl = BASIC_LOGIN_SWIFT,
        soap = SOAP_SWIFT,
        url = partner_url,
    );

    Config {
        session: SessionConfig {
            pre_session_secret: "pre-session-test-secret".to_string(),
            initiate_secret: "initiate-test-secret".to_string(),
            pre_session_ttl: ChronoDuration::minutes(83),
            initiate_ttl: ChronoDuration::minutes(60),
        },
        challenge_threshold: BigDecimal::from(3),
        checkout_fee_percent: BigDecimal::from_str("2.75").unwrap(),
        partner_timeout: Duration::from_secs(5),
        webhook: WebhookConfig {
            signing_secret: WEBHOOK_SECRET.to_string(),
            max_attempts: 3,
            base_backoff: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        },
        bank_partners: parse_bank_partners(&partners).unwrap(),
        airtime_base_url: Some(format!("{}/airtime", partner_url)),
        cybersource_pay_url: Some(CARD_PAY_URL.to_string()),
        cbe_ussd_base_url: Some(format!("{}/cbe-ussd", partner_url)),
    }
}

pub fn test_credentials() -> StaticCredentials {
    let login = PartnerCredentials::default()
        .with("username", "socialpay")
        .with("password", "s3cret");

    StaticCredentials::new()
        .with_partner(TOKEN_LOGIN_SWIFT, login.clone())
        .with_partner(
            STATIC_TOKEN_SWIFT,
            PartnerCredentials::default().with("token", "static-bearer"),
        )
        .with_partner(BASIC_LOGIN_SWIFT, login.clone())
        .with_partner(SOAP_SWIFT, login)
        .with_partner(
            "AIRTIME",
            PartnerCredentials::default()
                .with("client_id", "airtime-client")
                .with("client_secret", "airtime-secret"),
        )
        .with_partner(
            "CYBERSOURCE",
            PartnerCredentials::default()
                .with("access_key", "ak-test")
                .with("profile_id", "profile-test")
                .with("secret_key", "card-secret"),
        )
        .with_partner("CBE", PartnerCredentials::default().with("token", "ussd-bearer"))
}

pub async fn harness(partner_url: &str) -> Harness {
    harness_with(test_config(partner_url)).await
}

pub async fn harness_with(config: Config) -> Harness {
    let store = InMemoryStore::new();
    let repos = store.repositories();
    let platform = Platform::build(&config, repos.clone(), &test_credentials())
        .await
        .expect("platform builds");

    Harness {
        store,
        repos,
        platform,
    }
}

pub fn bank(swift_code: &str) -> Bank {
    Bank {
        id: Uuid::new_v4(),
        name: format!("Bank {}", swift_code),
        short_name: swift_code[..4].to_string(),
        bin: "231000".to_string(),
        swift_code: swift_code.to_string(),
        logo: None,
    }
}

impl Harness {
    pub async fn wallet(&self, user: Uuid) -> Account {
        self.platform
            .accounts
            .get_user_accounts(user)
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.default)
            .unwrap()
    }

    /// Stores a verified bank account without calling the partner.
    pub async fn linked_bank_account(&self, user: Uuid, swift_code: &str) -> Account {
        let bank = bank(swift_code);
        self.repos.banks.insert(&bank).await.unwrap();
        let account = Account::bank(
            user,
            "Checking".to_string(),
            BankAccount {
                bank,
                number: "1000123456789".to_string(),
                holder: AccountHolder {
                    name: "Abebe Kebede".to_string(),
                    phone: "+251911223344".to_string(),
                },
            },
            VerificationStatus::verified(),
        );
        self.repos.accounts.insert(&account).await.unwrap()
    }

    /// Records a settled incoming transfer so the derived balance grows by `amount`.
    pub async fn fund(&self, account_id: Uuid, amount: u32) {
        let mut tx = Transaction::new(
            Uuid::new_v4(),
            None,
            Some(account_id),
            BigDecimal::from(amount),
            "SEED".to_string(),
            TransactionDetails::Settlement { period: None },
            false,
            None,
            None,
        );
        tx.verified = true;
        self.repos.transactions.insert(&tx).await.unwrap();
    }
}
