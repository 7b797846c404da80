//! Persistence ports. The service layer only talks to storage through these
//! traits; row-level consistency (unique ids, atomic balance updates) is the
//! implementation's responsibility.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Account, Bank, CheckoutStatus, CheckoutStatusValue, CheckoutTransaction, PasswordIdentity,
    PhoneAuth, PublicKeyRecord, Transaction, TransactionSession,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn insert(&self, account: &Account) -> RepositoryResult<Account>;
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Account>;
    async fn list_by_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Account>>;
    async fn update(&self, account: &Account) -> RepositoryResult<Account>;
    async fn delete(&self, id: Uuid) -> RepositoryResult<()>;
    /// Atomically adds `amount` to the cached balance of a stored account.
    async fn credit_stored_balance(&self, id: Uuid, amount: &BigDecimal)
        -> RepositoryResult<Account>;
}

#[async_trait]
pub trait BankRepository: Send + Sync {
    async fn insert(&self, bank: &Bank) -> RepositoryResult<Bank>;
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Bank>;
    async fn list(&self) -> RepositoryResult<Vec<Bank>>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;
    async fn list_by_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Transaction>>;
    /// Every transaction whose `from` or `to` is the account.
    async fn list_by_account(&self, account_id: Uuid) -> RepositoryResult<Vec<Transaction>>;
    async fn list_all(&self) -> RepositoryResult<Vec<Transaction>>;
    /// Fails with `Conflict` if the transaction is already verified.
    async fn mark_verified(
        &self,
        id: Uuid,
        provider_reference: Option<String>,
    ) -> RepositoryResult<Transaction>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &TransactionSession) -> RepositoryResult<()>;
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<TransactionSession>;
}

#[async_trait]
pub trait PublicKeyRepository: Send + Sync {
    async fn insert(&self, key: &PublicKeyRecord) -> RepositoryResult<()>;
    async fn find_for_challenge(
        &self,
        user_id: Uuid,
        challenge: &str,
    ) -> RepositoryResult<Vec<PublicKeyRecord>>;
    async fn mark_used(&self, id: Uuid) -> RepositoryResult<()>;
}

#[async_trait]
pub trait PhoneAuthRepository: Send + Sync {
    async fn insert(&self, auth: &PhoneAuth) -> RepositoryResult<()>;
    /// Most recently issued record for the user, used or not.
    async fn latest_for_user(&self, user_id: Uuid) -> RepositoryResult<Option<PhoneAuth>>;
    /// Fails with `Conflict` if the record was already used.
    async fn mark_used(&self, id: Uuid) -> RepositoryResult<()>;
}

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn get_password(&self, user_id: Uuid) -> RepositoryResult<PasswordIdentity>;
    async fn upsert_password(&self, identity: &PasswordIdentity) -> RepositoryResult<()>;
}

#[async_trait]
pub trait CheckoutRepository: Send + Sync {
    async fn insert(&self, tx: &CheckoutTransaction) -> RepositoryResult<CheckoutTransaction>;
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<CheckoutTransaction>;
    async fn update(&self, tx: &CheckoutTransaction) -> RepositoryResult<CheckoutTransaction>;
    /// Sets `status` only while the stored status is still `expected`;
    /// otherwise `Conflict` and nothing is written.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: CheckoutStatusValue,
        status: CheckoutStatus,
    ) -> RepositoryResult<CheckoutTransaction>;
}

/// Handles to every persistence collaborator.
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub banks: Arc<dyn BankRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub public_keys: Arc<dyn PublicKeyRepository>,
    pub phone_auths: Arc<dyn PhoneAuthRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub checkouts: Arc<dyn CheckoutRepository>,
}
