pub mod initiate_transaction;
pub mod verify_transaction;

pub use initiate_transaction::{CreateTransactionInitiate, InitiateInput, InitiateOutput};
pub use verify_transaction::{VerificationStage, VerifyInput, VerifyOutput, VerifyTransaction};
