#[cfg(feature = "cli")]
pub mod cli;
pub mod credentials;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use credentials::{CredentialSource, CredentialStore};
pub use toml_config::{OfxStrategy, RunConfig};
