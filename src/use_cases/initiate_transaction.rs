//! Create transaction use case.
//! Persists a pending transaction and hands back the pre-session token that
//! resumes it at verification time.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    Account, Transaction, TransactionDetails, TransactionSession, TransactionType, MEDIUM_SOCIALPAY,
};
use crate::error::AppError;
use crate::ports::{AccountRepository, SessionRepository, TransactionRepository};
use crate::services::{AccountLocks, BalanceEngine};
use crate::session::{SessionTokens, TokenPurpose};
use crate::validation::{validate_money_amount, validate_phone, validate_required};

/// Input for the CreateTransactionInitiate use case.
#[derive(Debug, Clone)]
pub struct InitiateInput {
    pub user_id: Uuid,
    pub from: Option<Uuid>,
    pub to: Option<Uuid>,
    pub amount: BigDecimal,
    pub medium: String,
    pub details: TransactionDetails,
    /// Rail-specific token, e.g. a card or bank session reference.
    pub medium_token: Option<String>,
    pub phone: Option<String>,
}

/// Output of the CreateTransactionInitiate use case.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateOutput {
    pub transaction_id: Uuid,
    pub reference: String,
    pub token: String,
    pub has_challenge: bool,
}

pub struct CreateTransactionInitiate {
    accounts: Arc<dyn AccountRepository>,
    transactions: Arc<dyn TransactionRepository>,
    sessions: Arc<dyn SessionRepository>,
    balance: BalanceEngine,
    locks: AccountLocks,
    tokens: SessionTokens,
    challenge_threshold: BigDecimal,
}

impl CreateTransactionInitiate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        transactions: Arc<dyn TransactionRepository>,
        sessions: Arc<dyn SessionRepository>,
        balance: BalanceEngine,
        locks: AccountLocks,
        tokens: SessionTokens,
        challenge_threshold: BigDecimal,
    ) -> Self {
        Self {
            accounts,
            transactions,
            sessions,
            balance,
            locks,
            tokens,
            challenge_threshold,
        }
    }

    pub async fn execute(&self, input: InitiateInput) -> Result<InitiateOutput, AppError> {
        validate_money_amount(&input.amount)?;
        validate_required("medium", &input.medium)?;
        if let Some(phone) = &input.phone {
            validate_phone(phone)?;
        }
        if input.details.transaction_type() == TransactionType::Bill && input.phone.is_none() {
            return Err(AppError::InvalidRequest("bill payment requires a phone".to_string()));
        }

        let sender = self.resolve(input.from).await?;
        self.resolve(input.to).await?;
        if let Some(sender) = &sender {
            if !sender.is_owned_by(input.user_id) {
                return Err(AppError::SenderAccountMismatch);
            }
        }

        let has_challenge = input.amount >= self.challenge_threshold;
        let tx = Transaction::new(
            input.user_id,
            input.from,
            input.to,
            input.amount,
            input.medium,
            input.details,
            has_challenge,
            input.phone,
            input.medium_token,
        );

        // The session goes in first: a session without its transaction cannot
        // be verified, while a transaction without a session would still count
        // against the sender's derived balance.
        let token = self.tokens.issue(TokenPurpose::PreSession, &tx.id)?;
        self.sessions
            .insert(&TransactionSession {
                id: tx.id,
                token: token.clone(),
                created_at: Utc::now(),
            })
            .await?;

        let tx = match &sender {
            Some(sender) => {
                let _guard = self.locks.lock(sender.id).await;
                if tx.medium == MEDIUM_SOCIALPAY {
                    self.ensure_funds(sender.id, &tx).await?;
                }
                self.transactions.insert(&tx).await?
            }
            None => self.transactions.insert(&tx).await?,
        };

        tracing::info!(
            transaction_id = %tx.id,
            reference = %tx.reference,
            transaction_type = ?tx.transaction_type(),
            medium = %tx.medium,
            has_challenge,
            "Transaction initiated"
        );

        Ok(InitiateOutput {
            transaction_id: tx.id,
            reference: tx.reference,
            token,
            has_challenge,
        })
    }

    async fn resolve(&self, id: Option<Uuid>) -> Result<Option<Account>, AppError> {
        match id {
            Some(id) => Ok(Some(self.accounts.get_by_id(id).await?)),
            None => Ok(None),
        }
    }

    async fn ensure_funds(&self, account_id: Uuid, tx: &Transaction) -> Result<(), AppError> {
        let balance = self.balance.check_balance(account_id).await?;
        let required = tx.total_amount();
        if balance < required {
            tracing::warn!(
                account_id = %account_id,
                balance = %balance,
                required = %required,
                "Insufficient funds"
            );
            return Err(AppError::NotEnoughFund {
                balance: balance.to_string(),
                required: required.to_string(),
            });
        }
        Ok(())
    }
}
