use crate::adapters::bank::BankSettings;
use crate::adapters::drive::DEFAULT_UPLOAD_URL;
use crate::adapters::sendgrid::EmailSettings;
use crate::core::ofx::OfxSettings;
use crate::core::retry::RetryPolicy;
use crate::utils::error::{Result, StatementError};
use crate::utils::validation::{validate_email, validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 執行設定（全部可省略，省略時使用預設值）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub bank: BankSection,
    #[serde(default)]
    pub ofx: OfxSection,
    #[serde(default)]
    pub drive: DriveSection,
    #[serde(default)]
    pub email: EmailSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankSection {
    pub base_url: Option<String>,
    pub token_path: Option<String>,
    pub export_path: Option<String>,
    pub transactions_path: Option<String>,
    pub ofx_export_path: Option<String>,
    pub scope: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_span_days: Option<i64>,
    pub retry_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfxStrategy {
    /// Build OFX locally from the transaction listing.
    #[default]
    Synthesize,
    /// Ask the bank's OFX export endpoint.
    Endpoint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfxSection {
    pub strategy: Option<OfxStrategy>,
    pub bank_id: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveSection {
    pub upload_url: Option<String>,
    pub token_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailSection {
    pub base_url: Option<String>,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl RunConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            StatementError::config(format!(
                "cannot read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content)
            .map_err(|e| StatementError::config(format!("TOML parsing error: {}", e)))
    }

    /// 替換環境變數 (例如 ${SENDGRID_FROM})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| StatementError::config(format!("env pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn bank_settings(&self) -> BankSettings {
        let defaults = BankSettings::default();
        let bank = &self.bank;
        BankSettings {
            base_url: bank.base_url.clone().unwrap_or(defaults.base_url),
            token_path: bank.token_path.clone().unwrap_or(defaults.token_path),
            export_path: bank.export_path.clone().unwrap_or(defaults.export_path),
            transactions_path: bank
                .transactions_path
                .clone()
                .unwrap_or(defaults.transactions_path),
            ofx_export_path: bank
                .ofx_export_path
                .clone()
                .unwrap_or(defaults.ofx_export_path),
            scope: bank.scope.clone().unwrap_or(defaults.scope),
            timeout: bank
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_span_days: bank.max_span_days.unwrap_or(defaults.max_span_days),
        }
    }

    /// 預設不重試（一次嘗試）
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.bank.retry_attempts.unwrap_or(1),
            Duration::from_millis(self.bank.retry_base_delay_ms.unwrap_or(500)),
        )
    }

    pub fn ofx_strategy(&self) -> OfxStrategy {
        self.ofx.strategy.unwrap_or_default()
    }

    pub fn ofx_settings(&self) -> OfxSettings {
        let defaults = OfxSettings::default();
        OfxSettings {
            bank_id: self.ofx.bank_id.clone().unwrap_or(defaults.bank_id),
            currency: self.ofx.currency.clone().unwrap_or(defaults.currency),
        }
    }

    pub fn drive_upload_url(&self) -> &str {
        self.drive.upload_url.as_deref().unwrap_or(DEFAULT_UPLOAD_URL)
    }

    pub fn email_settings(&self) -> EmailSettings {
        let defaults = EmailSettings::default();
        let email = &self.email;
        EmailSettings {
            base_url: email.base_url.clone().unwrap_or(defaults.base_url),
            from: email.from.clone().unwrap_or(defaults.from),
            subject: email.subject.clone().unwrap_or(defaults.subject),
            html_body: email.body.clone().unwrap_or(defaults.html_body),
        }
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        let bank = self.bank_settings();
        validate_url("bank.base_url", &bank.base_url)?;
        validate_range("bank.max_span_days", bank.max_span_days, 1, 366)?;
        validate_range("bank.timeout_seconds", bank.timeout.as_secs(), 1, 600)?;
        validate_range("bank.retry_attempts", self.retry_policy().max_attempts, 1, 10)?;

        validate_url("drive.upload_url", self.drive_upload_url())?;
        if let Some(token_url) = &self.drive.token_url {
            validate_url("drive.token_url", token_url)?;
        }

        let email = self.email_settings();
        validate_url("email.base_url", &email.base_url)?;
        validate_email("email.from", &email.from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();

        let bank = config.bank_settings();
        assert_eq!(bank.base_url, "https://cdpj.partners.bancointer.com.br");
        assert_eq!(bank.max_span_days, 90);
        assert_eq!(bank.timeout, Duration::from_secs(30));
        assert_eq!(config.ofx_strategy(), OfxStrategy::Synthesize);
        assert_eq!(config.retry_policy().max_attempts, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[bank]
base_url = "https://sandbox.example.com"
max_span_days = 31
timeout_seconds = 10
retry_attempts = 3
retry_base_delay_ms = 250

[ofx]
strategy = "endpoint"
bank_id = "0077"

[email]
from = "statements@example.com"
subject = "Statement {start} to {end}"
"#;

        let config = RunConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.bank_settings().max_span_days, 31);
        assert_eq!(config.ofx_strategy(), OfxStrategy::Endpoint);
        assert_eq!(config.ofx_settings().bank_id, "0077");
        assert_eq!(config.ofx_settings().currency, "BRL");
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::new(3, Duration::from_millis(250))
        );
        assert_eq!(config.email_settings().from, "statements@example.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("STATEMENT_ETL_TEST_FROM", "ops@example.com");

        let config = RunConfig::from_toml_str(
            r#"
[email]
from = "${STATEMENT_ETL_TEST_FROM}"
"#,
        )
        .unwrap();
        assert_eq!(config.email_settings().from, "ops@example.com");

        std::env::remove_var("STATEMENT_ETL_TEST_FROM");
    }

    #[test]
    fn test_config_validation() {
        let config = RunConfig::from_toml_str(
            r#"
[bank]
base_url = "invalid-url"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = RunConfig::from_toml_str("[bank]\nmax_span_days = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(RunConfig::from_toml_str("[extract]\nmax_records = 1\n").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[ofx]\ncurrency = \"USD\"\n")
            .unwrap();

        let config = RunConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.ofx_settings().currency, "USD");
    }
}
