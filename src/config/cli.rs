use crate::config::credentials::CredentialSource;
use crate::core::pipeline::RunRequest;
use crate::domain::model::{DateRange, Recipients};
use crate::utils::error::{Result, StatementError};
use crate::utils::validation::{validate_non_empty_string, validate_path, Validate};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "statement-etl")]
#[command(about = "Export a bank statement as PDF and OFX, upload it and email it")]
pub struct CliConfig {
    /// First day of the statement (YYYY-MM-DD)
    #[arg(long, visible_alias = "de")]
    pub start: String,

    /// Last day of the statement, inclusive (YYYY-MM-DD)
    #[arg(long, visible_alias = "ate")]
    pub end: String,

    #[arg(long, default_value = "./output")]
    pub output_dir: PathBuf,

    /// Bank credential JSON file; falls back to INTER_* environment variables
    #[arg(long)]
    pub bank_creds: Option<PathBuf>,

    /// Google Drive OAuth credential JSON file
    #[arg(long, env = "DRIVE_CREDENTIALS")]
    pub drive_creds: Option<PathBuf>,

    /// Google Drive folder id receiving both files
    #[arg(long, env = "DRIVE_FOLDER_ID")]
    pub drive_folder: Option<String>,

    #[arg(long, env = "SENDGRID_API_KEY", hide_env_values = true)]
    pub sendgrid_key: Option<String>,

    /// Comma separated list of recipients
    #[arg(long)]
    pub recipients: Option<String>,

    /// Optional TOML file with endpoint and message overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Skip the Google Drive upload")]
    pub skip_upload: bool,

    #[arg(long, help = "Skip sending the email")]
    pub skip_email: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(long, help = "Log per-step timings and memory usage")]
    pub monitor: bool,
}

impl CliConfig {
    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(&self.start, &self.end)
    }

    /// `None` when email is skipped.
    pub fn recipients(&self) -> Result<Option<Recipients>> {
        if self.skip_email {
            return Ok(None);
        }
        let list = self
            .recipients
            .as_deref()
            .ok_or_else(|| StatementError::config("'recipients' is required unless --skip-email"))?;
        Recipients::parse_list(list).map(Some)
    }

    pub fn credential_source(&self) -> CredentialSource {
        match &self.bank_creds {
            Some(path) => CredentialSource::File(path.clone()),
            None => CredentialSource::Env,
        }
    }

    pub fn run_request(&self) -> Result<RunRequest> {
        Ok(RunRequest {
            credentials: self.credential_source(),
            range: self.date_range()?,
            destination: self.drive_folder.clone().unwrap_or_default(),
            recipients: self.recipients()?,
        })
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        self.date_range()?;
        self.recipients()?;
        validate_path("output_dir", &self.output_dir.to_string_lossy())?;

        if !self.skip_upload {
            if self.drive_creds.is_none() {
                return Err(StatementError::config(
                    "'drive_creds' is required unless --skip-upload",
                ));
            }
            validate_non_empty_string("drive_folder", self.drive_folder.as_deref().unwrap_or(""))?;
        }

        if !self.skip_email {
            validate_non_empty_string("sendgrid_key", self.sendgrid_key.as_deref().unwrap_or(""))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorKind;

    fn parse(args: &[&str]) -> CliConfig {
        let mut argv = vec!["statement-etl"];
        argv.extend_from_slice(args);
        CliConfig::try_parse_from(argv).unwrap()
    }

    fn full_args() -> Vec<&'static str> {
        vec![
            "--de",
            "2024-01-01",
            "--ate",
            "2024-01-31",
            "--drive-creds",
            "drive.json",
            "--drive-folder",
            "folder-1",
            "--sendgrid-key",
            "SG.key",
            "--recipients",
            "a@example.com,b@example.com",
        ]
    }

    #[test]
    fn test_aliases_and_defaults() {
        let config = parse(&full_args());

        assert_eq!(config.start, "2024-01-01");
        assert_eq!(config.end, "2024-01-31");
        assert_eq!(config.output_dir, PathBuf::from("./output"));
        assert_eq!(config.credential_source(), CredentialSource::Env);
        assert!(config.validate().is_ok());

        let request = config.run_request().unwrap();
        assert_eq!(request.destination, "folder-1");
        assert_eq!(request.recipients.unwrap().len(), 2);
    }

    #[test]
    fn test_bank_creds_file_source() {
        let mut args = full_args();
        args.extend_from_slice(&["--bank-creds", "bank.json"]);
        let config = parse(&args);
        assert_eq!(
            config.credential_source(),
            CredentialSource::File(PathBuf::from("bank.json"))
        );
    }

    #[test]
    fn test_inverted_dates_fail_validation() {
        let mut args = full_args();
        args[1] = "2024-02-01";
        let err = parse(&args).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_bad_recipient_is_config_error() {
        let mut args = full_args();
        let last = args.len() - 1;
        args[last] = "a@example.com,not-an-address";
        let err = parse(&args).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_skip_flags_relax_requirements() {
        let config = parse(&[
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--skip-upload",
            "--skip-email",
        ]);
        assert!(config.validate().is_ok());
        assert!(config.run_request().unwrap().recipients.is_none());
    }
}
