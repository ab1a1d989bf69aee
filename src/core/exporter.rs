use crate::core::ofx;
use crate::domain::model::{
    AccessToken, DateRange, StatementArtifact, StatementExportResponse, StatementFormat,
};
use crate::domain::ports::OfxProvider;
use crate::utils::error::{Result, StatementError};
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Decode a Base64 JSON field into bytes. Absent, non-string, invalid or
/// empty payloads are all decoding failures.
pub fn decode_base64_field(value: Option<&serde_json::Value>, field: &str) -> Result<Vec<u8>> {
    let encoded = value
        .ok_or_else(|| StatementError::decoding(format!("response has no '{}' field", field)))?
        .as_str()
        .ok_or_else(|| StatementError::decoding(format!("'{}' field is not a string", field)))?;

    // 銀行可能以換行分段
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        StatementError::decoding(format!("'{}' field is not valid Base64: {}", field, e))
    })?;

    if bytes.is_empty() {
        return Err(StatementError::decoding(format!(
            "'{}' field decodes to zero bytes",
            field
        )));
    }
    Ok(bytes)
}

pub fn validate_pdf(bytes: &[u8]) -> Result<()> {
    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err(StatementError::validation(
            "PDF payload does not start with the %PDF- signature",
        ));
    }
    Ok(())
}

pub fn validate_ofx(bytes: &[u8]) -> Result<()> {
    if !ofx::has_ofx_header(bytes) {
        return Err(StatementError::validation(
            "OFX payload has no recognizable OFX header",
        ));
    }
    Ok(())
}

/// 將銀行回應轉成已驗證的 PDF 與 OFX 產出物
pub struct StatementExporter {
    ofx_provider: Box<dyn OfxProvider>,
}

impl StatementExporter {
    pub fn new(ofx_provider: Box<dyn OfxProvider>) -> Self {
        Self { ofx_provider }
    }

    pub fn export_pdf(
        &self,
        response: &StatementExportResponse,
        range: &DateRange,
    ) -> Result<StatementArtifact> {
        let bytes = decode_base64_field(response.pdf_base64(), StatementExportResponse::PDF_FIELD)?;
        validate_pdf(&bytes)?;
        tracing::debug!("Decoded PDF statement ({} bytes)", bytes.len());
        StatementArtifact::new(StatementFormat::Pdf, bytes, range)
    }

    /// Use the native OFX payload when the export carries one, otherwise ask
    /// the configured provider.
    pub async fn export_ofx(
        &self,
        response: &StatementExportResponse,
        range: &DateRange,
        account_id: &str,
        token: &AccessToken,
    ) -> Result<StatementArtifact> {
        let bytes = match response.ofx_base64() {
            Some(_) => {
                tracing::debug!("Export response carries a native OFX payload");
                decode_base64_field(
                    response.field(StatementExportResponse::OFX_FIELD),
                    StatementExportResponse::OFX_FIELD,
                )?
            }
            None => self.ofx_provider.provide(range, account_id, token).await?,
        };

        if bytes.is_empty() {
            return Err(StatementError::decoding("OFX provider returned zero bytes"));
        }
        validate_ofx(&bytes)?;
        tracing::debug!("Prepared OFX statement ({} bytes)", bytes.len());
        StatementArtifact::new(StatementFormat::Ofx, bytes, range)
    }
}
