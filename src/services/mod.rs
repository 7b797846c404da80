pub mod accounts;
pub mod balance;
pub mod challenge;
pub mod checkout;
pub mod processors;
pub mod settlement;
pub mod webhook;

pub use accounts::{AccountService, NewBankAccount};
pub use balance::{AccountLocks, BalanceEngine};
pub use challenge::{ChallengeMethod, ChallengeVerifier};
pub use checkout::{CheckoutRequest, CheckoutService, ProviderCallback};
pub use processors::{
    CheckoutProcessor, ConfirmOutcome, ConfirmRequest, CybersourceProcessor, ProcessorRegistry,
    UssdProcessor,
};
pub use settlement::SettlementRouter;
pub use webhook::{WebhookDispatcher, WebhookError, WebhookSender};
