//! Transaction domain entity.
//! Framework-agnostic representation of a money movement between accounts.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Medium of the internal wallet rail.
pub const MEDIUM_SOCIALPAY: &str = "SOCIALPAY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Replenishment,
    P2p,
    Sale,
    Settlement,
    Bill,
}

/// Type-specific transaction payload; the variant determines the transaction type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum TransactionDetails {
    Replenishment,
    P2p { note: Option<String> },
    Sale { order_reference: String },
    Settlement { period: Option<String> },
    Bill { biller: String },
}

impl TransactionDetails {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionDetails::Replenishment => TransactionType::Replenishment,
            TransactionDetails::P2p { .. } => TransactionType::P2p,
            TransactionDetails::Sale { .. } => TransactionType::Sale,
            TransactionDetails::Settlement { .. } => TransactionType::Settlement,
            TransactionDetails::Bill { .. } => TransactionType::Bill,
        }
    }
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub from: Option<Uuid>,
    pub to: Option<Uuid>,
    pub medium: String,
    pub verified: bool,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub has_challenge: bool,
    pub reference: String,
    pub details: TransactionDetails,
    pub phone: Option<String>,
    pub initiated_by: Uuid,
    pub medium_token: Option<String>,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        initiated_by: Uuid,
        from: Option<Uuid>,
        to: Option<Uuid>,
        amount: BigDecimal,
        medium: String,
        details: TransactionDetails,
        has_challenge: bool,
        phone: Option<String>,
        medium_token: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            from,
            to,
            medium,
            verified: false,
            amount,
            fee: BigDecimal::from(0),
            has_challenge,
            reference: short_reference(id),
            details,
            phone,
            initiated_by,
            medium_token,
            provider_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.details.transaction_type()
    }

    /// Amount charged to the sender, fees included.
    pub fn total_amount(&self) -> BigDecimal {
        &self.amount + &self.fee
    }

    pub fn references_account(&self, account_id: Uuid) -> bool {
        self.from == Some(account_id) || self.to == Some(account_id)
    }
}

/// External-facing ten character code derived from the transaction id.
fn short_reference(id: Uuid) -> String {
    id.simple().to_string()[..10].to_uppercase()
}

/// Proofs submitted with a verification request. Never persisted as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionChallenge {
    pub signature: Option<String>,
    #[serde(rename = "twoFA")]
    pub two_fa: Option<String>,
    pub challenge: Option<String>,
    pub otp: Option<String>,
}

/// Binds a pending transaction to the bearer token handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSession {
    pub id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
}
