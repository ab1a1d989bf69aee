use crate::utils::error::{ErrorKind, Result, StatementError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 對帳單日期區間（含頭尾），建立後不可變
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(StatementError::validation(format!(
                "start date {} is after end date {}",
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            )));
        }
        Ok(Self { start, end })
    }

    /// 從 `YYYY-MM-DD` 字串建立
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date("start", start)?, parse_date("end", end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, both ends included.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn ensure_max_span(&self, max_days: i64) -> Result<()> {
        if self.span_days() > max_days {
            return Err(StatementError::validation(format!(
                "date range {} covers {} days, the bank allows at most {}",
                self,
                self.span_days(),
                max_days
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        StatementError::validation(format!(
            "{} date '{}' is not a valid YYYY-MM-DD date: {}",
            field, value, e
        ))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatementFormat {
    Pdf,
    Ofx,
}

impl StatementFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Ofx => "ofx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Ofx => "application/x-ofx",
        }
    }
}

impl fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "PDF"),
            Self::Ofx => write!(f, "OFX"),
        }
    }
}

/// A generated output file. Bytes are never empty and the filename is always
/// `<start>-<end>.<ext>` for the range it was produced for.
#[derive(Clone, PartialEq, Eq)]
pub struct StatementArtifact {
    format: StatementFormat,
    bytes: Vec<u8>,
    filename: String,
}

impl StatementArtifact {
    pub fn new(format: StatementFormat, bytes: Vec<u8>, range: &DateRange) -> Result<Self> {
        let filename = crate::core::naming::name(range, format);
        if bytes.is_empty() {
            return Err(StatementError::validation(format!(
                "{} artifact '{}' has no content",
                format, filename
            )));
        }
        Ok(Self {
            format,
            bytes,
            filename,
        })
    }

    pub fn format(&self) -> StatementFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for StatementArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementArtifact")
            .field("format", &self.format)
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// 銀行匯出端點的原始回應，解碼前視為不透明信封
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct StatementExportResponse(serde_json::Value);

impl StatementExportResponse {
    pub const PDF_FIELD: &'static str = "pdf";
    pub const OFX_FIELD: &'static str = "ofx";

    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn pdf_base64(&self) -> Option<&serde_json::Value> {
        self.field(Self::PDF_FIELD)
    }

    /// Native OFX payload, when the bank ships one alongside the PDF.
    pub fn ofx_base64(&self) -> Option<&str> {
        self.field(Self::OFX_FIELD)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Short-lived opaque bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BankCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(rename = "cert")]
    pub certificate_path: PathBuf,
    #[serde(rename = "key")]
    pub key_path: PathBuf,
    #[serde(rename = "account")]
    pub account_id: String,
}

impl fmt::Debug for BankCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("certificate_path", &self.certificate_path)
            .field("key_path", &self.key_path)
            .field("account_id", &self.account_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        crate::utils::validation::validate_email("recipients", trimmed)?;
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 非空且格式正確的收件者清單
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients(Vec<EmailAddress>);

impl Recipients {
    pub fn new(addresses: Vec<EmailAddress>) -> Result<Self> {
        if addresses.is_empty() {
            return Err(StatementError::config("at least one recipient is required"));
        }
        Ok(Self(addresses))
    }

    /// Parse a comma separated list, ignoring blank entries.
    pub fn parse_list(list: &str) -> Result<Self> {
        let addresses = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(EmailAddress::parse)
            .collect::<Result<Vec<_>>>()?;
        Self::new(addresses)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmailAddress> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Recipients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(EmailAddress::as_str).collect();
        f.write_str(&joined.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionDirection {
    #[serde(rename = "C")]
    Credit,
    #[serde(rename = "D")]
    Debit,
}

/// 銀行交易明細的單一項目
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Transaction {
    #[serde(rename = "dataEntrada")]
    pub date: NaiveDate,
    #[serde(rename = "tipoOperacao")]
    pub direction: TransactionDirection,
    #[serde(rename = "tipoTransacao", default)]
    pub kind: String,
    #[serde(rename = "valor", deserialize_with = "amount_from_str_or_number")]
    pub amount: String,
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(rename = "descricao", default)]
    pub description: String,
}

fn amount_from_str_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected amount as string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Authenticating,
    Fetching,
    Exporting,
    Uploading,
    Emailing,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [
        Stage::Authenticating,
        Stage::Fetching,
        Stage::Exporting,
        Stage::Uploading,
        Stage::Emailing,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authenticating => "Authenticating",
            Self::Fetching => "Fetching",
            Self::Exporting => "Exporting",
            Self::Uploading => "Uploading",
            Self::Emailing => "Emailing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// 單次執行的狀態機
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Authenticating,
    Fetching,
    Exporting,
    Uploading,
    Emailing,
    Done,
    Failed(FailureReason),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed(reason) => Some(reason.kind),
            _ => None,
        }
    }
}

impl From<Stage> for RunState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Authenticating => Self::Authenticating,
            Stage::Fetching => Self::Fetching,
            Stage::Exporting => Self::Exporting,
            Stage::Uploading => Self::Uploading,
            Stage::Emailing => Self::Emailing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmailStatus {
    Sent,
    Skipped,
    Failed,
}

/// What remains of an artifact after its bytes were handed off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub format: StatementFormat,
    pub filename: String,
    pub path: PathBuf,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub artifacts: Vec<ArtifactRecord>,
    pub uploaded_locations: Vec<String>,
    pub email_status: Option<EmailStatus>,
}
