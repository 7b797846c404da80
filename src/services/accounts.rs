use std::sync::Arc;
use uuid::Uuid;

use crate::banks::{BankAdapterRegistry, BankError, LinkVerification};
use crate::domain::{Account, AccountHolder, AccountType, BankAccount, VerificationStatus};
use crate::error::AppError;
use crate::ports::{AccountRepository, BankRepository, TransactionRepository};
use crate::validation::{
    sanitize_string, validate_account_number, validate_max_len, validate_phone, validate_required,
    TITLE_MAX_LEN,
};

#[derive(Debug, Clone)]
pub struct NewBankAccount {
    pub bank_id: Uuid,
    pub number: String,
    pub holder_name: String,
    pub holder_phone: String,
    pub title: String,
}

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    banks: Arc<dyn BankRepository>,
    transactions: Arc<dyn TransactionRepository>,
    adapters: Arc<BankAdapterRegistry>,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        banks: Arc<dyn BankRepository>,
        transactions: Arc<dyn TransactionRepository>,
        adapters: Arc<BankAdapterRegistry>,
    ) -> Self {
        Self {
            accounts,
            banks,
            transactions,
            adapters,
        }
    }

    /// All accounts of the user; provisions the default wallet on first listing.
    pub async fn get_user_accounts(&self, user_id: Uuid) -> Result<Vec<Account>, AppError> {
        let mut accounts = self.accounts.list_by_user(user_id).await?;

        let has_wallet = accounts
            .iter()
            .any(|a| a.default && a.account_type() == AccountType::Stored);
        if !has_wallet {
            let wallet = self.accounts.insert(&Account::default_wallet(user_id)).await?;
            tracing::info!(
                user_id = %user_id,
                account_id = %wallet.id,
                "Provisioned default wallet"
            );
            accounts.insert(0, wallet);
        }

        Ok(accounts)
    }

    /// Links a bank account. The partner is consulted before anything is stored,
    /// so a failed partner call leaves no account behind.
    pub async fn create_bank_account(
        &self,
        user_id: Uuid,
        request: NewBankAccount,
    ) -> Result<Account, AppError> {
        let title = sanitize_string(&request.title);
        let holder_name = sanitize_string(&request.holder_name);
        validate_required("title", &title)?;
        validate_max_len("title", &title, TITLE_MAX_LEN)?;
        validate_required("holder_name", &holder_name)?;
        validate_account_number(&request.number)?;
        validate_phone(&request.holder_phone)?;

        let bank = self.banks.get_by_id(request.bank_id).await?;
        let adapter = self.adapters.get(&bank.swift_code)?;

        let bank_account = BankAccount {
            bank,
            number: request.number,
            holder: AccountHolder {
                name: holder_name,
                phone: request.holder_phone,
            },
        };

        let verification = match adapter
            .verify_account(&bank_account)
            .await
            .map_err(link_error)?
        {
            LinkVerification::Verified => VerificationStatus::verified(),
            LinkVerification::PendingOtp { length, timeout } => {
                VerificationStatus::pending_sms(length, timeout)
            }
        };

        let account = self
            .accounts
            .insert(&Account::bank(user_id, title, bank_account, verification))
            .await?;

        tracing::info!(
            user_id = %user_id,
            account_id = %account.id,
            swift_code = %adapter.swift_code(),
            verified = account.verification.verified,
            "Bank account linked"
        );
        Ok(account)
    }

    /// Finalizes a pending link with the code the partner sent by SMS.
    pub async fn verify_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
        code: &str,
    ) -> Result<Account, AppError> {
        let mut account = self.owned_account(user_id, account_id).await?;
        if account.verification.verified {
            return Ok(account);
        }

        let bank_account = account
            .as_bank()
            .ok_or_else(|| {
                AppError::InvalidRequest("only bank accounts need verification".to_string())
            })?;
        let adapter = self.adapters.get(&bank_account.bank.swift_code)?;

        if !adapter
            .confirm_account(bank_account, code)
            .await
            .map_err(link_error)?
        {
            return Err(AppError::FailedToAddAccount(
                "partner rejected the verification code".to_string(),
            ));
        }

        account.verification = VerificationStatus::verified();
        let account = self.accounts.update(&account).await?;
        tracing::info!(account_id = %account.id, "Bank account verified");
        Ok(account)
    }

    pub async fn delete_account(&self, user_id: Uuid, account_id: Uuid) -> Result<(), AppError> {
        let account = self.owned_account(user_id, account_id).await?;

        let bank_account = match account.as_bank() {
            Some(bank_account) => bank_account,
            None => {
                return Err(AppError::InvalidRequest(
                    "the default wallet cannot be deleted".to_string(),
                ))
            }
        };

        let pending = self
            .transactions
            .list_by_account(account_id)
            .await?
            .into_iter()
            .any(|tx| tx.from == Some(account_id) && !tx.verified);
        if pending {
            return Err(AppError::InvalidRequest(
                "account has unsettled outgoing transactions".to_string(),
            ));
        }

        let adapter = self.adapters.get(&bank_account.bank.swift_code)?;
        adapter
            .unlink_account(bank_account)
            .await
            .map_err(link_error)?;

        self.accounts.delete(account_id).await?;
        tracing::info!(account_id = %account_id, "Bank account unlinked");
        Ok(())
    }

    async fn owned_account(&self, user_id: Uuid, account_id: Uuid) -> Result<Account, AppError> {
        let account = self.accounts.get_by_id(account_id).await?;
        if !account.is_owned_by(user_id) {
            return Err(AppError::Unauthorized(
                "account does not belong to the caller".to_string(),
            ));
        }
        Ok(account)
    }
}

fn link_error(err: BankError) -> AppError {
    match err {
        BankError::Rejected(msg) => AppError::FailedToAddAccount(msg),
        other => AppError::from(other),
    }
}
