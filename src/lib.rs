pub mod adapters;
pub mod banks;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod secrets;
pub mod services;
pub mod session;
pub mod startup;
pub mod telemetry;
pub mod use_cases;
pub mod utils;
pub mod validation;

pub use error::AppError;
pub use startup::Platform;
