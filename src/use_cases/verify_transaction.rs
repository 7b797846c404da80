//! Verify transaction use case.
//! Resumes a pending transaction from its pre-session token, enforces the
//! challenge, then settles it.

use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionChallenge};
use crate::error::AppError;
use crate::ports::{SessionRepository, TransactionRepository};
use crate::services::{AccountLocks, ChallengeVerifier, SettlementRouter};
use crate::session::{SessionTokens, TokenPurpose};

/// Where a transaction is in the verification flow. A failed challenge or
/// settlement leaves it at `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStage {
    Created,
    NoChallenge,
    ChallengeRequired,
    Verified,
    Routed,
}

#[derive(Debug, Clone)]
pub struct VerifyInput {
    pub user_id: Uuid,
    pub token: String,
    pub challenge_type: Option<String>,
    pub proofs: TransactionChallenge,
    /// Settlement is abandoned with `NO_RESPONSE` once this instant passes.
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct VerifyOutput {
    pub transaction: Transaction,
    pub stage: VerificationStage,
}

pub struct VerifyTransaction {
    transactions: Arc<dyn TransactionRepository>,
    sessions: Arc<dyn SessionRepository>,
    tokens: SessionTokens,
    challenges: ChallengeVerifier,
    router: SettlementRouter,
    locks: AccountLocks,
}

impl VerifyTransaction {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        sessions: Arc<dyn SessionRepository>,
        tokens: SessionTokens,
        challenges: ChallengeVerifier,
        router: SettlementRouter,
        locks: AccountLocks,
    ) -> Self {
        Self {
            transactions,
            sessions,
            tokens,
            challenges,
            router,
            locks,
        }
    }

    pub async fn execute(&self, input: VerifyInput) -> Result<VerifyOutput, AppError> {
        let transaction_id: Uuid = self.tokens.decode(TokenPurpose::PreSession, &input.token)?;

        let session = self.sessions.get_by_id(transaction_id).await.map_err(|_| {
            AppError::Unauthorized("no session for this token".to_string())
        })?;
        if session.token != input.token {
            return Err(AppError::Unauthorized("session token was superseded".to_string()));
        }

        let tx = self.transactions.get_by_id(transaction_id).await?;
        if tx.initiated_by != input.user_id {
            return Err(AppError::Unauthorized(
                "transaction was initiated by another user".to_string(),
            ));
        }

        let settled = match input.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.settle_locked(tx, &input))
                .await
                .map_err(|_| {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        "Verification deadline elapsed during settlement"
                    );
                    AppError::NoResponse("verification deadline elapsed".to_string())
                })??,
            None => self.settle_locked(tx, &input).await?,
        };

        tracing::info!(
            transaction_id = %settled.id,
            reference = %settled.reference,
            stage = ?VerificationStage::Routed,
            "Transaction verified"
        );
        Ok(VerifyOutput {
            transaction: settled,
            stage: VerificationStage::Routed,
        })
    }

    /// Holds the sender's lock (the transaction's own id when there is no
    /// sender) from the `verified` re-read until settlement is persisted, so a
    /// replayed token cannot reach the partner twice.
    async fn settle_locked(
        &self,
        tx: Transaction,
        input: &VerifyInput,
    ) -> Result<Transaction, AppError> {
        let _guard = self.locks.lock(tx.from.unwrap_or(tx.id)).await;

        let tx = self.transactions.get_by_id(tx.id).await?;
        if tx.verified {
            return Err(AppError::InvalidRequest(format!(
                "transaction {} is already verified",
                tx.reference
            )));
        }

        let gate = if tx.has_challenge {
            VerificationStage::ChallengeRequired
        } else {
            VerificationStage::NoChallenge
        };
        tracing::debug!(transaction_id = %tx.id, stage = ?gate, "Verification started");

        self.challenges
            .enforce(
                tx.initiated_by,
                tx.has_challenge,
                input.challenge_type.as_deref(),
                &input.proofs,
            )
            .await?;
        tracing::debug!(
            transaction_id = %tx.id,
            stage = ?VerificationStage::Verified,
            "Challenge cleared"
        );

        self.router.settle(&tx).await
    }
}
