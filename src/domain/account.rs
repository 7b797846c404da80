//! Account domain entities.
//! An account is either the user's stored-value wallet or a linked bank account.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference data for a partner bank. `swift_code` selects the bank adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub id: Uuid,
    pub name: String,
    pub short_name: String,
    pub bin: String,
    pub swift_code: String,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Stored,
    Bank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub balance: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountHolder {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    pub bank: Bank,
    pub number: String,
    pub holder: AccountHolder,
}

/// Type-specific account payload. The variant is the account type, so the two
/// can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "UPPERCASE")]
pub enum AccountDetail {
    Stored(StoredAccount),
    Bank(BankAccount),
}

impl AccountDetail {
    pub fn account_type(&self) -> AccountType {
        match self {
            AccountDetail::Stored(_) => AccountType::Stored,
            AccountDetail::Bank(_) => AccountType::Bank,
        }
    }
}

/// How an account was (or is to be) verified, e.g. an SMS code of a given length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedBy {
    pub method: String,
    pub details: VerificationDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDetails {
    pub length: u8,
    /// Seconds the partner keeps the code valid.
    pub timeout: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationStatus {
    pub verified: bool,
    pub verified_by: Option<VerifiedBy>,
}

impl VerificationStatus {
    pub fn verified() -> Self {
        Self {
            verified: true,
            verified_by: None,
        }
    }

    pub fn pending_sms(length: u8, timeout: u32) -> Self {
        Self {
            verified: false,
            verified_by: Some(VerifiedBy {
                method: "SMS".to_string(),
                details: VerificationDetails { length, timeout },
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub title: String,
    pub default: bool,
    pub verification: VerificationStatus,
    #[serde(flatten)]
    pub detail: AccountDetail,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// The always-present wallet every user gets on first listing.
    pub fn default_wallet(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: "SocialPay Wallet".to_string(),
            default: true,
            verification: VerificationStatus::verified(),
            detail: AccountDetail::Stored(StoredAccount {
                balance: BigDecimal::from(0),
            }),
            user_id,
            created_at: Utc::now(),
        }
    }

    pub fn bank(
        user_id: Uuid,
        title: String,
        bank_account: BankAccount,
        verification: VerificationStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            default: false,
            verification,
            detail: AccountDetail::Bank(bank_account),
            user_id,
            created_at: Utc::now(),
        }
    }

    pub fn account_type(&self) -> AccountType {
        self.detail.account_type()
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn as_bank(&self) -> Option<&BankAccount> {
        match &self.detail {
            AccountDetail::Bank(bank) => Some(bank),
            AccountDetail::Stored(_) => None,
        }
    }

    pub fn as_stored(&self) -> Option<&StoredAccount> {
        match &self.detail {
            AccountDetail::Stored(stored) => Some(stored),
            AccountDetail::Bank(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wallet_is_verified_stored_account() {
        let user = Uuid::new_v4();
        let wallet = Account::default_wallet(user);

        assert_eq!(wallet.account_type(), AccountType::Stored);
        assert!(wallet.default);
        assert!(wallet.verification.verified);
        assert_eq!(wallet.as_stored().map(|s| s.balance.clone()), Some(BigDecimal::from(0)));
        assert!(wallet.as_bank().is_none());
    }

    #[test]
    fn test_account_serializes_type_next_to_detail() {
        let wallet = Account::default_wallet(Uuid::new_v4());
        let json = serde_json::to_value(&wallet).unwrap();

        assert_eq!(json["type"], "STORED");
        assert!(json["detail"]["balance"].is_string());

        let back: Account = serde_json::from_value(json).unwrap();
        assert_eq!(back.account_type(), AccountType::Stored);
    }

    #[test]
    fn test_pending_sms_verification() {
        let status = VerificationStatus::pending_sms(6, 300);
        assert!(!status.verified);
        let by = status.verified_by.unwrap();
        assert_eq!(by.method, "SMS");
        assert_eq!(by.details.length, 6);
    }
}
