pub mod account;
pub mod checkout;
pub mod identity;
pub mod transaction;

pub use account::{
    Account, AccountDetail, AccountHolder, AccountType, Bank, BankAccount, StoredAccount,
    VerificationStatus,
};
pub use checkout::{
    CheckoutStatus, CheckoutStatusValue, CheckoutTransaction, Gateway, GatewayType, Pricing,
    WebhookPayload, WebhookStatus,
};
pub use identity::{PasswordIdentity, PhoneAuth, PublicKeyRecord};
pub use transaction::{
    Transaction, TransactionChallenge, TransactionDetails, TransactionSession, TransactionType,
    MEDIUM_SOCIALPAY,
};
