use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::AppError;
use crate::ports::{AccountRepository, TransactionRepository};

/// Derives balances from the transaction history.
///
/// The derived value and the cached `StoredAccount.balance` column are two
/// separate sources; they are both exposed and never reconciled here.
#[derive(Clone)]
pub struct BalanceEngine {
    accounts: Arc<dyn AccountRepository>,
    transactions: Arc<dyn TransactionRepository>,
}

impl BalanceEngine {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        transactions: Arc<dyn TransactionRepository>,
    ) -> Self {
        Self {
            accounts,
            transactions,
        }
    }

    /// Σ incoming amount − Σ outgoing total amount over every persisted
    /// transaction referencing the account.
    pub async fn check_balance(&self, account_id: Uuid) -> Result<BigDecimal, AppError> {
        let history = self.transactions.list_by_account(account_id).await?;

        let balance = history
            .iter()
            .fold(BigDecimal::from(0), |mut balance, tx| {
                if tx.to == Some(account_id) {
                    balance += &tx.amount;
                }
                if tx.from == Some(account_id) {
                    balance -= tx.total_amount();
                }
                balance
            });

        tracing::debug!(
            account_id = %account_id,
            transactions = history.len(),
            balance = %balance,
            "Derived account balance"
        );
        Ok(balance)
    }

    /// The balance column maintained by replenishment settlement.
    pub async fn cached_balance(&self, account_id: Uuid) -> Result<BigDecimal, AppError> {
        let account = self.accounts.get_by_id(account_id).await?;
        account
            .as_stored()
            .map(|stored| stored.balance.clone())
            .ok_or_else(|| {
                AppError::InvalidRequest(format!("account {} has no stored balance", account_id))
            })
    }
}

/// One async mutex per account id. Holding the guard serializes every
/// balance-check-then-write sequence on that account.
#[derive(Clone, Default)]
pub struct AccountLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, account_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks
                .entry(account_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::{Account, Transaction, TransactionDetails, MEDIUM_SOCIALPAY};
    use std::str::FromStr;
    use std::time::Duration;

    fn transfer(from: Option<Uuid>, to: Option<Uuid>, amount: &str, fee: &str) -> Transaction {
        let mut tx = Transaction::new(
            Uuid::new_v4(),
            from,
            to,
            BigDecimal::from_str(amount).unwrap(),
            MEDIUM_SOCIALPAY.to_string(),
            TransactionDetails::P2p { note: None },
            false,
            None,
            None,
        );
        tx.fee = BigDecimal::from_str(fee).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_check_balance_sums_history() {
        let store = InMemoryStore::new();
        let repos = store.repositories();
        let engine = BalanceEngine::new(repos.accounts.clone(), repos.transactions.clone());
        let account = Uuid::new_v4();
        let other = Uuid::new_v4();

        for tx in [
            transfer(Some(other), Some(account), "50", "0"),
            transfer(Some(other), Some(account), "12.50", "1"),
            transfer(Some(account), Some(other), "20", "0.50"),
            transfer(Some(other), Some(Uuid::new_v4()), "999", "0"),
        ] {
            repos.transactions.insert(&tx).await.unwrap();
        }

        let balance = engine.check_balance(account).await.unwrap();
        assert_eq!(balance, BigDecimal::from_str("42.00").unwrap());
    }

    #[tokio::test]
    async fn test_check_balance_empty_history_is_zero() {
        let store = InMemoryStore::new();
        let repos = store.repositories();
        let engine = BalanceEngine::new(repos.accounts.clone(), repos.transactions.clone());

        assert_eq!(
            engine.check_balance(Uuid::new_v4()).await.unwrap(),
            BigDecimal::from(0)
        );
    }

    #[tokio::test]
    async fn test_cached_balance_is_independent_of_history() {
        let store = InMemoryStore::new();
        let repos = store.repositories();
        let engine = BalanceEngine::new(repos.accounts.clone(), repos.transactions.clone());
        let wallet = Account::default_wallet(Uuid::new_v4());
        repos.accounts.insert(&wallet).await.unwrap();
        repos
            .accounts
            .credit_stored_balance(wallet.id, &BigDecimal::from(7))
            .await
            .unwrap();

        assert_eq!(engine.cached_balance(wallet.id).await.unwrap(), BigDecimal::from(7));
        assert_eq!(engine.check_balance(wallet.id).await.unwrap(), BigDecimal::from(0));
    }

    #[tokio::test]
    async fn test_account_lock_serializes_holders() {
        let locks = AccountLocks::new();
        let account = Uuid::new_v4();
        let guard = locks.lock(account).await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.lock(account).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
    }
}
