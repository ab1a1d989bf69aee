use crate::domain::model::BankCredentials;
use crate::utils::error::{Result, StatementError};
use crate::utils::validation::{validate_non_empty_string, validate_readable_file};
use std::path::{Path, PathBuf};

/// JSON keys of the bank credential file, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 5] = ["client_id", "client_secret", "cert", "key", "account"];

pub const ENV_CLIENT_ID: &str = "INTER_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "INTER_CLIENT_SECRET";
pub const ENV_CERT_PATH: &str = "INTER_CERT_PATH";
pub const ENV_KEY_PATH: &str = "INTER_KEY_PATH";
pub const ENV_ACCOUNT: &str = "INTER_ACCOUNT";

/// 銀行憑證來源：JSON 檔案或環境變數
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    File(PathBuf),
    Env,
}

pub struct CredentialStore;

impl CredentialStore {
    /// Load and validate credentials. Only checks that the certificate and
    /// key files exist and open; their contents are read later by the TLS
    /// setup.
    pub fn load(source: &CredentialSource) -> Result<BankCredentials> {
        let credentials = match source {
            CredentialSource::File(path) => Self::load_file(path)?,
            CredentialSource::Env => Self::load_with(|name| std::env::var(name).ok())?,
        };
        Self::check_files(&credentials)?;
        tracing::debug!("Loaded bank credentials for account {}", credentials.account_id);
        Ok(credentials)
    }

    fn load_file(path: &Path) -> Result<BankCredentials> {
        validate_readable_file("bank_creds", path)?;
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            StatementError::config(format!(
                "bank credential file {} is not valid JSON: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&value)
    }

    /// 檢查五個必要欄位皆存在且非空
    pub fn from_json(value: &serde_json::Value) -> Result<BankCredentials> {
        let object = value
            .as_object()
            .ok_or_else(|| StatementError::config("bank credentials must be a JSON object"))?;

        let mut fields = Vec::with_capacity(REQUIRED_FIELDS.len());
        for name in REQUIRED_FIELDS {
            let field = object
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    StatementError::config(format!("bank credentials are missing '{}'", name))
                })?;
            validate_non_empty_string(name, field)?;
            fields.push(field.trim().to_string());
        }

        let [client_id, client_secret, cert, key, account]: [String; 5] = fields
            .try_into()
            .map_err(|_| StatementError::config("bank credentials are incomplete"))?;

        Ok(BankCredentials {
            client_id,
            client_secret,
            certificate_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
            account_id: account,
        })
    }

    /// Build credentials from a variable lookup (the process environment in
    /// production).
    pub fn load_with<F>(lookup: F) -> Result<BankCredentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| -> Result<String> {
            let value = lookup(name).unwrap_or_default();
            validate_non_empty_string(name, &value)?;
            Ok(value.trim().to_string())
        };

        Ok(BankCredentials {
            client_id: get(ENV_CLIENT_ID)?,
            client_secret: get(ENV_CLIENT_SECRET)?,
            certificate_path: PathBuf::from(get(ENV_CERT_PATH)?),
            key_path: PathBuf::from(get(ENV_KEY_PATH)?),
            account_id: get(ENV_ACCOUNT)?,
        })
    }

    fn check_files(credentials: &BankCredentials) -> Result<()> {
        validate_readable_file("cert", &credentials.certificate_path)?;
        validate_readable_file("key", &credentials.key_path)
    }
}
