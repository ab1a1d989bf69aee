use crate::utils::error::{Result, StatementError};
use regex::Regex;
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: &str, reason: impl AsRef<str>) -> StatementError {
    StatementError::config(format!(
        "invalid value for '{}' ({}): {}",
        field_name,
        value,
        reason.as_ref()
    ))
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

/// 檢查檔案存在且可讀取（只開啟，不讀內容）
pub fn validate_readable_file(field_name: &str, path: &Path) -> Result<()> {
    let not_found = || StatementError::FileNotFound {
        field: field_name.to_string(),
        path: path.display().to_string(),
    };

    if !path.is_file() {
        return Err(not_found());
    }
    std::fs::File::open(path).map_err(|_| not_found())?;
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StatementError::config(format!(
            "'{}' is missing or empty",
            field_name
        )));
    }
    Ok(())
}

pub fn validate_email(field_name: &str, value: &str) -> Result<()> {
    // local@domain.tld，不允許空白
    let re = Regex::new(r"^[^\s@,;<>]+@[^\s@,;<>]+\.[A-Za-z]{2,}$")
        .map_err(|e| StatementError::config(format!("email pattern: {}", e)))?;

    if !re.is_match(value) {
        return Err(invalid(field_name, value, "not a valid email address"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorKind;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("bank.base_url", "https://example.com").is_ok());
        assert!(validate_url("bank.base_url", "http://127.0.0.1:8080").is_ok());
        assert!(validate_url("bank.base_url", "").is_err());
        assert!(validate_url("bank.base_url", "invalid-url").is_err());
        assert!(validate_url("bank.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("recipients", "finance@example.com").is_ok());
        assert!(validate_email("recipients", "a.b+c@sub.example.com.br").is_ok());
        assert!(validate_email("recipients", "missing-at.example.com").is_err());
        assert!(validate_email("recipients", "two@@example.com").is_err());
        assert!(validate_email("recipients", "space @example.com").is_err());
        assert!(validate_email("recipients", "nodot@example").is_err());
    }

    #[test]
    fn test_validate_readable_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(validate_readable_file("cert", file.path()).is_ok());

        let err = validate_readable_file("cert", Path::new("/definitely/not/here.pem")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        // 目錄不算檔案
        let dir = tempfile::TempDir::new().unwrap();
        assert!(validate_readable_file("key", dir.path()).is_err());
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("client_id", "abc").is_ok());
        let err = validate_non_empty_string("client_secret", "   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("bank.max_span_days", 90, 1, 366).is_ok());
        assert!(validate_range("bank.max_span_days", 0, 1, 366).is_err());
    }
}
