//! In-memory implementation of every persistence port.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Account, AccountDetail, Bank, CheckoutStatus, CheckoutStatusValue, CheckoutTransaction,
    PasswordIdentity, PhoneAuth, PublicKeyRecord, Transaction, TransactionSession,
};
use crate::ports::{
    AccountRepository, BankRepository, CheckoutRepository, IdentityRepository,
    PhoneAuthRepository, PublicKeyRepository, Repositories, RepositoryError, RepositoryResult,
    SessionRepository, TransactionRepository,
};

/// Map-backed store. Each map sits behind its own lock; multi-row updates
/// (balance credit, mark verified) happen under a single write guard.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    banks: RwLock<HashMap<Uuid, Bank>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    sessions: RwLock<HashMap<Uuid, TransactionSession>>,
    public_keys: RwLock<HashMap<Uuid, PublicKeyRecord>>,
    phone_auths: RwLock<HashMap<Uuid, PhoneAuth>>,
    identities: RwLock<HashMap<Uuid, PasswordIdentity>>,
    checkouts: RwLock<HashMap<Uuid, CheckoutTransaction>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            accounts: self.clone(),
            banks: self.clone(),
            transactions: self.clone(),
            sessions: self.clone(),
            public_keys: self.clone(),
            phone_auths: self.clone(),
            identities: self.clone(),
            checkouts: self.clone(),
        }
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn insert(&self, account: &Account) -> RepositoryResult<Account> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(RepositoryError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Account> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("account {}", id)))
    }

    async fn list_by_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(accounts)
    }

    async fn update(&self, account: &Account) -> RepositoryResult<Account> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&account.id) {
            Some(existing) => {
                *existing = account.clone();
                Ok(account.clone())
            }
            None => Err(RepositoryError::NotFound(format!("account {}", account.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        self.accounts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("account {}", id)))
    }

    async fn credit_stored_balance(
        &self,
        id: Uuid,
        amount: &BigDecimal,
    ) -> RepositoryResult<Account> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("account {}", id)))?;

        match &mut account.detail {
            AccountDetail::Stored(stored) => {
                stored.balance = &stored.balance + amount;
                Ok(account.clone())
            }
            AccountDetail::Bank(_) => Err(RepositoryError::Conflict(format!(
                "account {} is not a stored account",
                id
            ))),
        }
    }
}

#[async_trait]
impl BankRepository for InMemoryStore {
    async fn insert(&self, bank: &Bank) -> RepositoryResult<Bank> {
        self.banks.write().await.insert(bank.id, bank.clone());
        Ok(bank.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Bank> {
        self.banks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("bank {}", id)))
    }

    async fn list(&self) -> RepositoryResult<Vec<Bank>> {
        let mut banks: Vec<Bank> = self.banks.read().await.values().cloned().collect();
        banks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(banks)
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.id) {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} already exists",
                tx.id
            )));
        }
        transactions.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.transactions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn list_by_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.initiated_by == user_id)
            .cloned()
            .collect())
    }

    async fn list_by_account(&self, account_id: Uuid) -> RepositoryResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.references_account(account_id))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> RepositoryResult<Vec<Transaction>> {
        Ok(self.transactions.read().await.values().cloned().collect())
    }

    async fn mark_verified(
        &self,
        id: Uuid,
        provider_reference: Option<String>,
    ) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;
        if tx.verified {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} is already verified",
                id
            )));
        }
        tx.verified = true;
        if provider_reference.is_some() {
            tx.provider_reference = provider_reference;
        }
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn insert(&self, session: &TransactionSession) -> RepositoryResult<()> {
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<TransactionSession> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("session {}", id)))
    }
}

#[async_trait]
impl PublicKeyRepository for InMemoryStore {
    async fn insert(&self, key: &PublicKeyRecord) -> RepositoryResult<()> {
        self.public_keys.write().await.insert(key.id, key.clone());
        Ok(())
    }

    async fn find_for_challenge(
        &self,
        user_id: Uuid,
        challenge: &str,
    ) -> RepositoryResult<Vec<PublicKeyRecord>> {
        Ok(self
            .public_keys
            .read()
            .await
            .values()
            .filter(|k| k.user_id == user_id && k.challenge == challenge && !k.used)
            .cloned()
            .collect())
    }

    async fn mark_used(&self, id: Uuid) -> RepositoryResult<()> {
        let mut keys = self.public_keys.write().await;
        let key = keys
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("public key {}", id)))?;
        key.used = true;
        Ok(())
    }
}

#[async_trait]
impl PhoneAuthRepository for InMemoryStore {
    async fn insert(&self, auth: &PhoneAuth) -> RepositoryResult<()> {
        self.phone_auths.write().await.insert(auth.id, auth.clone());
        Ok(())
    }

    async fn latest_for_user(&self, user_id: Uuid) -> RepositoryResult<Option<PhoneAuth>> {
        Ok(self
            .phone_auths
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn mark_used(&self, id: Uuid) -> RepositoryResult<()> {
        let mut auths = self.phone_auths.write().await;
        let auth = auths
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("phone auth {}", id)))?;
        if auth.used {
            return Err(RepositoryError::Conflict("phone auth already used".to_string()));
        }
        auth.used = true;
        Ok(())
    }
}

#[async_trait]
impl IdentityRepository for InMemoryStore {
    async fn get_password(&self, user_id: Uuid) -> RepositoryResult<PasswordIdentity> {
        self.identities
            .read()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("password identity {}", user_id)))
    }

    async fn upsert_password(&self, identity: &PasswordIdentity) -> RepositoryResult<()> {
        self.identities
            .write()
            .await
            .insert(identity.user_id, identity.clone());
        Ok(())
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryStore {
    async fn insert(&self, tx: &CheckoutTransaction) -> RepositoryResult<CheckoutTransaction> {
        self.checkouts.write().await.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<CheckoutTransaction> {
        self.checkouts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("checkout transaction {}", id)))
    }

    async fn update(&self, tx: &CheckoutTransaction) -> RepositoryResult<CheckoutTransaction> {
        let mut checkouts = self.checkouts.write().await;
        match checkouts.get_mut(&tx.id) {
            Some(existing) => {
                *existing = tx.clone();
                Ok(tx.clone())
            }
            None => Err(RepositoryError::NotFound(format!("checkout transaction {}", tx.id))),
        }
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: CheckoutStatusValue,
        status: CheckoutStatus,
    ) -> RepositoryResult<CheckoutTransaction> {
        let mut checkouts = self.checkouts.write().await;
        let existing = checkouts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("checkout transaction {}", id)))?;
        if existing.status.value != expected {
            return Err(RepositoryError::Conflict(format!(
                "checkout {} is {:?}, expected {:?}",
                id, existing.status.value, expected
            )));
        }
        existing.status = status;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }
}
