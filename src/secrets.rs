use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use async_trait::async_trait;
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use crate::banks::BankError;

/// Credential bundle for one partner, e.g. `username`, `password`, `token`.
#[derive(Clone, Default)]
pub struct PartnerCredentials {
    values: HashMap<String, String>,
}

impl PartnerCredentials {
    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn require(&self, key: &str) -> Result<&str, BankError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| BankError::MissingCredential(key.to_string()))
    }
}

impl std::fmt::Debug for PartnerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("PartnerCredentials").field("keys", &keys).finish()
    }
}

/// Where partner credentials come from. Credentials never live in `Config`.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn partner(&self, name: &str) -> Result<PartnerCredentials>;
}

/// Reads `PARTNER_<NAME>_<KEY>` variables, keys lowercased.
pub struct EnvCredentials;

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn partner(&self, name: &str) -> Result<PartnerCredentials> {
        let prefix = format!("PARTNER_{}_", name.to_uppercase());
        let values: HashMap<String, String> = env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .map(|suffix| (suffix.to_lowercase(), value))
            })
            .collect();

        if values.is_empty() {
            anyhow::bail!("no credentials configured for partner {}", name);
        }
        Ok(PartnerCredentials::from_map(values))
    }
}

/// Static credentials, handy for tests and local runs.
#[derive(Default)]
pub struct StaticCredentials {
    partners: HashMap<String, PartnerCredentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partner(mut self, name: &str, credentials: PartnerCredentials) -> Self {
        self.partners.insert(name.to_uppercase(), credentials);
        self
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn partner(&self, name: &str) -> Result<PartnerCredentials> {
        self.partners
            .get(&name.to_uppercase())
            .cloned()
            .with_context(|| format!("no credentials configured for partner {}", name))
    }
}

pub struct SecretsManager {
    client: VaultClient,
    kv_mount: String,
}

impl SecretsManager {
    pub async fn new() -> Result<Self> {
        let vault_addr =
            env::var("VAULT_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8200".to_string());
        let role_id = env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?;
        let secret_id = env::var("VAULT_SECRET_ID").context("VAULT_SECRET_ID is required")?;
        let auth_mount =
            env::var("VAULT_AUTH_MOUNT").unwrap_or_else(|_| "auth/approle".to_string());
        let kv_mount = env::var("VAULT_KV_MOUNT").unwrap_or_else(|_| "secret".to_string());

        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(&vault_addr)
                .build()
                .context("failed to build Vault client settings")?,
        )
        .context("failed to create Vault client")?;

        let auth = approle::login(&mut client, &auth_mount, &role_id, &secret_id)
            .await
            .context("failed to authenticate to Vault with AppRole")?;
        client.set_token(&auth.client_token);

        Ok(Self { client, kv_mount })
    }
}

#[async_trait]
impl CredentialSource for SecretsManager {
    async fn partner(&self, name: &str) -> Result<PartnerCredentials> {
        let path = format!("partners/{}", name.to_lowercase());
        let secret: HashMap<String, String> = kv2::read(&self.client, &self.kv_mount, &path)
            .await
            .with_context(|| format!("failed to read secret/{} from Vault", path))?;

        Ok(PartnerCredentials::from_map(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credentials_lookup() {
        let source = StaticCredentials::new().with_partner(
            "awinetaa",
            PartnerCredentials::default().with("username", "svc"),
        );

        let creds = source.partner("AWINETAA").await.unwrap();
        assert_eq!(creds.require("username").unwrap(), "svc");
        assert!(matches!(
            creds.require("password"),
            Err(BankError::MissingCredential(_))
        ));
        assert!(source.partner("OTHER").await.is_err());
    }

    #[test]
    fn test_debug_hides_values() {
        let creds = PartnerCredentials::default().with("password", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("password"));
        assert!(!printed.contains("hunter2"));
    }
}
