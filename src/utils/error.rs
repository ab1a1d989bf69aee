use crate::domain::model::Stage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatementError {
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Required file for '{field}' not found or unreadable: {path}")]
    FileNotFound { field: String, path: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationError { message: String },

    #[error("Bank API returned HTTP {status}: {body}")]
    BankApiError { status: u16, body: String },

    #[error("Decoding error: {message}")]
    DecodingError { message: String },

    #[error("Upload failed: {message}")]
    UploadError { message: String },

    #[error("Email delivery failed: {message}")]
    EmailError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bank could not be reached or the response body could not be read.
    #[error("Bank API unreachable: {0}")]
    BankUnreachable(#[source] reqwest::Error),

    #[error("{stage} step failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<StatementError>,
    },
}

pub type Result<T> = std::result::Result<T, StatementError>;

/// 錯誤種類，對應管道中可觀察到的失敗類型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    FileNotFound,
    Validation,
    Authentication,
    BankApi,
    Decoding,
    Upload,
    Email,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    Delivery,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl StatementError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn decoding(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthenticationError {
            message: message.into(),
        }
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::UploadError {
            message: message.into(),
        }
    }

    pub fn email(message: impl Into<String>) -> Self {
        Self::EmailError {
            message: message.into(),
        }
    }

    /// 以步驟名稱包裝錯誤；已包裝的錯誤不會再包一次
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::StageFailed { .. } => self,
            other => Self::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through stage wrappers.
    pub fn root(&self) -> &StatementError {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StageFailed { source, .. } => source.kind(),
            Self::ConfigurationError { .. } => ErrorKind::Configuration,
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::ValidationError { .. } => ErrorKind::Validation,
            Self::AuthenticationError { .. } => ErrorKind::Authentication,
            Self::BankApiError { .. } | Self::BankUnreachable(_) => ErrorKind::BankApi,
            Self::DecodingError { .. } => ErrorKind::Decoding,
            Self::UploadError { .. } => ErrorKind::Upload,
            Self::EmailError { .. } => ErrorKind::Email,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Transient failures a scheduler may simply re-run.
    pub fn is_transient(&self) -> bool {
        match self.root() {
            Self::BankApiError { status, .. } => *status >= 500,
            Self::BankUnreachable(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::Configuration | ErrorKind::FileNotFound => ErrorCategory::Configuration,
            ErrorKind::Authentication | ErrorKind::BankApi => ErrorCategory::Network,
            ErrorKind::Validation | ErrorKind::Decoding => ErrorCategory::Data,
            ErrorKind::Upload | ErrorKind::Email => ErrorCategory::Delivery,
            ErrorKind::Io => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        if self.is_transient() {
            return ErrorSeverity::Medium;
        }
        match self.category() {
            ErrorCategory::System => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 程序結束碼：任何失敗都是非零
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration | ErrorKind::FileNotFound => 2,
            ErrorKind::Validation => 3,
            ErrorKind::Authentication => 4,
            ErrorKind::BankApi => 5,
            ErrorKind::Decoding => 6,
            ErrorKind::Upload => 7,
            ErrorKind::Email => 8,
            ErrorKind::Io => 9,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Configuration => {
                "Check the command line flags and that the credential source has every required field"
            }
            ErrorKind::FileNotFound => {
                "Make sure the certificate and key paths in the credential file exist and are readable"
            }
            ErrorKind::Validation => {
                "Check the date range (start <= end, within the bank's maximum span) and the bank output"
            }
            ErrorKind::Authentication => {
                "Verify client_id/client_secret and that the certificate pair is registered with the bank"
            }
            ErrorKind::BankApi => {
                "Inspect the bank response body; check connectivity and re-run later if the bank is unavailable"
            }
            ErrorKind::Decoding => "The bank response was malformed; inspect the raw export payload",
            ErrorKind::Upload => "Check the Drive credentials and the destination folder id",
            ErrorKind::Email => "Check the SendGrid API key, sender identity and recipient list",
            ErrorKind::Io => "Check that the output directory is writable",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::StageFailed { stage, source } => {
                format!("[{:?}] {} step failed: {}", self.kind(), stage, source.root())
            }
            other => format!("[{:?}] {}", self.kind(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_keeps_root_kind() {
        let err = StatementError::upload("HTTP 403").at_stage(Stage::Uploading);
        assert_eq!(err.kind(), ErrorKind::Upload);
        assert!(err.to_string().starts_with("Uploading step failed"));

        // 不重複包裝
        let rewrapped = err.at_stage(Stage::Emailing);
        assert!(rewrapped.to_string().starts_with("Uploading"));
    }

    #[test]
    fn test_exit_codes_are_non_zero() {
        let errors = vec![
            StatementError::config("x"),
            StatementError::validation("x"),
            StatementError::auth("x"),
            StatementError::BankApiError {
                status: 500,
                body: String::new(),
            },
            StatementError::decoding("x"),
            StatementError::upload("x"),
            StatementError::email("x"),
        ];
        for err in errors {
            assert!(err.exit_code() > 0, "{err} should exit non-zero");
        }
    }

    #[test]
    fn test_transient_bank_errors() {
        let server_error = StatementError::BankApiError {
            status: 503,
            body: "unavailable".into(),
        };
        assert!(server_error.is_transient());
        assert_eq!(server_error.severity(), ErrorSeverity::Medium);

        let client_error = StatementError::BankApiError {
            status: 400,
            body: "bad".into(),
        };
        assert!(!client_error.is_transient());
        assert_eq!(client_error.category(), ErrorCategory::Network);
    }

    #[test]
    fn test_user_friendly_message_names_kind_and_stage() {
        let err = StatementError::decoding("pdf field missing").at_stage(Stage::Exporting);
        let msg = err.user_friendly_message();
        assert!(msg.contains("Decoding"));
        assert!(msg.contains("Exporting"));
        assert!(msg.contains("pdf field missing"));
    }
}
