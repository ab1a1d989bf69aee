// Adapters layer: concrete implementations of the domain ports for external systems.

pub mod bank;
pub mod drive;
pub mod sendgrid;
pub mod storage;

pub use bank::{BankSettings, EndpointOfxProvider, InterBankClient};
pub use drive::{DriveCredentials, GoogleDriveUploader};
pub use sendgrid::{ApiKey, EmailSettings, SendGridMailer};
pub use storage::LocalStorage;
