use std::sync::Arc;

use crate::banks::{AirtimeClient, BankAdapterRegistry};
use crate::domain::{Account, AccountType, Transaction, TransactionType};
use crate::error::AppError;
use crate::ports::{AccountRepository, TransactionRepository};

/// Executes settlement of a challenge-cleared transaction.
///
/// Failed partner calls are never retried here; the transaction stays
/// unverified and the caller re-submits verification.
#[derive(Clone)]
pub struct SettlementRouter {
    accounts: Arc<dyn AccountRepository>,
    transactions: Arc<dyn TransactionRepository>,
    banks: Arc<BankAdapterRegistry>,
    airtime: Option<Arc<AirtimeClient>>,
}

impl SettlementRouter {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        transactions: Arc<dyn TransactionRepository>,
        banks: Arc<BankAdapterRegistry>,
        airtime: Option<Arc<AirtimeClient>>,
    ) -> Self {
        Self {
            accounts,
            transactions,
            banks,
            airtime,
        }
    }

    /// Settles `tx` and returns it in its verified state.
    pub async fn settle(&self, tx: &Transaction) -> Result<Transaction, AppError> {
        if tx.verified {
            return Err(AppError::InvalidRequest(format!(
                "transaction {} is already verified",
                tx.reference
            )));
        }

        tracing::info!(
            transaction_id = %tx.id,
            transaction_type = ?tx.transaction_type(),
            amount = %tx.amount,
            "Routing settlement"
        );

        match tx.transaction_type() {
            TransactionType::Replenishment => self.settle_replenishment(tx).await,
            TransactionType::P2p | TransactionType::Sale | TransactionType::Settlement => {
                Ok(self.transactions.mark_verified(tx.id, None).await?)
            }
            TransactionType::Bill => self.settle_bill(tx).await,
        }
    }

    async fn settle_replenishment(&self, tx: &Transaction) -> Result<Transaction, AppError> {
        let sender = self.required_account(tx.from, "sender").await?;
        let recipient = self.required_account(tx.to, "recipient").await?;

        let bank_account = match (sender.as_bank(), recipient.account_type()) {
            (Some(bank_account), AccountType::Stored) => bank_account,
            _ => {
                return Err(AppError::InvalidRequest(
                    "replenishment must move money from a bank account into a stored account"
                        .to_string(),
                ))
            }
        };

        let swift_code = &bank_account.bank.swift_code;
        let adapter = self.banks.get(swift_code)?;
        let token = adapter.authenticate().await?;
        let outcome = adapter
            .debit(&token, &tx.reference, &tx.amount, bank_account)
            .await?;

        if !outcome.verified {
            tracing::warn!(
                transaction_id = %tx.id,
                swift_code = %swift_code,
                message = %outcome.message,
                "Partner declined debit"
            );
            return Err(AppError::FailedToVerifyTransaction(outcome.message));
        }

        // The partner has moved the money; local failures below are not compensated.
        let verified = self
            .transactions
            .mark_verified(tx.id, outcome.provider_reference.clone())
            .await
            .map_err(|e| {
                tracing::error!(
                    transaction_id = %tx.id,
                    swift_code = %swift_code,
                    provider_reference = ?outcome.provider_reference,
                    error = %e,
                    "Partner debit succeeded but transaction could not be marked verified"
                );
                AppError::from(e)
            })?;

        self.accounts
            .credit_stored_balance(recipient.id, &tx.amount)
            .await
            .map_err(|e| {
                tracing::error!(
                    transaction_id = %tx.id,
                    account_id = %recipient.id,
                    error = %e,
                    "Transaction verified but stored balance was not credited"
                );
                AppError::from(e)
            })?;

        tracing::info!(
            transaction_id = %tx.id,
            swift_code = %swift_code,
            provider_reference = ?verified.provider_reference,
            "Replenishment settled"
        );
        Ok(verified)
    }

    async fn settle_bill(&self, tx: &Transaction) -> Result<Transaction, AppError> {
        let phone = tx
            .phone
            .as_deref()
            .ok_or_else(|| AppError::InvalidRequest("bill payment requires a phone".to_string()))?;
        let airtime = self
            .airtime
            .as_ref()
            .ok_or_else(|| AppError::Internal("airtime partner is not configured".to_string()))?;

        let token = airtime.access_token().await?;
        if !airtime.topup(&token, phone, &tx.amount, &tx.reference).await? {
            return Err(AppError::FailedToVerifyTransaction(
                "airtime top-up was not accepted".to_string(),
            ));
        }

        let verified = self.transactions.mark_verified(tx.id, None).await?;
        tracing::info!(transaction_id = %tx.id, "Bill settled");
        Ok(verified)
    }

    async fn required_account(
        &self,
        id: Option<uuid::Uuid>,
        role: &str,
    ) -> Result<Account, AppError> {
        let id =
            id.ok_or_else(|| AppError::InvalidRequest(format!("{} account is required", role)))?;
        Ok(self.accounts.get_by_id(id).await?)
    }
}
