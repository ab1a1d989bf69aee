pub mod exporter;
pub mod naming;
pub mod ofx;
pub mod pipeline;
pub mod retry;

pub use crate::domain::ports::{BankStatementClient, Mailer, OfxProvider, Storage, Uploader};
pub use crate::utils::error::Result;
