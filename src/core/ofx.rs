//! OFX helpers: header sanity check and local synthesis of an OFX 1.0.2
//! (SGML) bank statement from transaction line items.

use crate::domain::model::{AccessToken, DateRange, Transaction, TransactionDirection};
use crate::domain::ports::{OfxProvider, TransactionSource};
use crate::utils::error::{Result, StatementError};
use async_trait::async_trait;
use regex::Regex;
use std::fmt::Write as _;

const HEADER_SCAN_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfxSettings {
    pub bank_id: String,
    pub currency: String,
}

impl Default for OfxSettings {
    fn default() -> Self {
        // 077 = Banco Inter
        Self {
            bank_id: "077".to_string(),
            currency: "BRL".to_string(),
        }
    }
}

/// True when the bytes open with an SGML `OFXHEADER:` block or carry an
/// XML `<?OFX ...?>` processing instruction near the top.
pub fn has_ofx_header(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HEADER_SCAN_BYTES)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();

    text.starts_with("OFXHEADER:") || text.contains("<?OFX")
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn amount_pattern() -> Result<Regex> {
    Regex::new(r"^-?\d+(\.\d{1,2})?$")
        .map_err(|e| StatementError::decoding(format!("amount pattern: {}", e)))
}

/// 金額正規化：借方為負數，保留兩位小數
fn signed_amount(tx: &Transaction, pattern: &Regex) -> Result<String> {
    let raw = tx.amount.trim();
    if !pattern.is_match(raw) {
        return Err(StatementError::decoding(format!(
            "transaction on {} has a malformed amount '{}'",
            tx.date, tx.amount
        )));
    }

    let magnitude = raw.trim_start_matches('-');
    let (units, cents) = match magnitude.split_once('.') {
        Some((units, cents)) => (units, format!("{:0<2}", cents)),
        None => (magnitude, "00".to_string()),
    };

    let sign = match tx.direction {
        TransactionDirection::Debit => "-",
        TransactionDirection::Credit => "",
    };
    Ok(format!("{}{}.{}", sign, units, cents))
}

/// Render a deterministic OFX document for the range; the same inputs always
/// produce the same bytes.
pub fn render_statement(
    range: &DateRange,
    account_id: &str,
    settings: &OfxSettings,
    transactions: &[Transaction],
) -> Result<String> {
    let amount_pattern = amount_pattern()?;
    let start = range.start().format("%Y%m%d");
    let end = range.end().format("%Y%m%d");

    let mut out = String::new();
    out.push_str("OFXHEADER:100\nDATA:OFXSGML\nVERSION:102\nSECURITY:NONE\n");
    out.push_str("ENCODING:USASCII\nCHARSET:1252\nCOMPRESSION:NONE\n");
    out.push_str("OLDFILEUID:NONE\nNEWFILEUID:NONE\n\n");

    out.push_str("<OFX>\n<SIGNONMSGSRSV1>\n<SONRS>\n");
    out.push_str("<STATUS>\n<CODE>0\n<SEVERITY>INFO\n</STATUS>\n");
    let _ = writeln!(out, "<DTSERVER>{}", end);
    out.push_str("<LANGUAGE>POR\n</SONRS>\n</SIGNONMSGSRSV1>\n");

    out.push_str("<BANKMSGSRSV1>\n<STMTTRNRS>\n<TRNUID>1\n");
    out.push_str("<STATUS>\n<CODE>0\n<SEVERITY>INFO\n</STATUS>\n");
    out.push_str("<STMTRS>\n");
    let _ = writeln!(out, "<CURDEF>{}", escape(&settings.currency));
    out.push_str("<BANKACCTFROM>\n");
    let _ = writeln!(out, "<BANKID>{}", escape(&settings.bank_id));
    let _ = writeln!(out, "<ACCTID>{}", escape(account_id));
    out.push_str("<ACCTTYPE>CHECKING\n</BANKACCTFROM>\n");

    out.push_str("<BANKTRANLIST>\n");
    let _ = writeln!(out, "<DTSTART>{}", start);
    let _ = writeln!(out, "<DTEND>{}", end);

    for (index, tx) in transactions.iter().enumerate() {
        let trntype = match tx.direction {
            TransactionDirection::Credit => "CREDIT",
            TransactionDirection::Debit => "DEBIT",
        };
        let posted = tx.date.format("%Y%m%d");
        let name = if tx.title.trim().is_empty() {
            tx.kind.as_str()
        } else {
            tx.title.as_str()
        };

        out.push_str("<STMTTRN>\n");
        let _ = writeln!(out, "<TRNTYPE>{}", trntype);
        let _ = writeln!(out, "<DTPOSTED>{}", posted);
        let _ = writeln!(out, "<TRNAMT>{}", signed_amount(tx, &amount_pattern)?);
        let _ = writeln!(out, "<FITID>{}{:05}", posted, index + 1);
        let _ = writeln!(out, "<NAME>{}", escape(&truncate(name.trim(), 32)));
        if !tx.description.trim().is_empty() {
            let _ = writeln!(out, "<MEMO>{}", escape(&truncate(tx.description.trim(), 255)));
        }
        out.push_str("</STMTTRN>\n");
    }

    out.push_str("</BANKTRANLIST>\n</STMTRS>\n</STMTTRNRS>\n</BANKMSGSRSV1>\n</OFX>\n");
    Ok(out)
}

/// 從交易明細本地合成 OFX
pub struct SynthesizedOfxProvider<S: TransactionSource> {
    source: S,
    settings: OfxSettings,
}

impl<S: TransactionSource> SynthesizedOfxProvider<S> {
    pub fn new(source: S, settings: OfxSettings) -> Self {
        Self { source, settings }
    }
}

#[async_trait]
impl<S: TransactionSource> OfxProvider for SynthesizedOfxProvider<S> {
    async fn provide(
        &self,
        range: &DateRange,
        account_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<u8>> {
        let transactions = self
            .source
            .fetch_transactions(token, range, account_id)
            .await?;
        tracing::debug!(
            "Synthesizing OFX from {} transactions for {}",
            transactions.len(),
            range
        );
        let document = render_statement(range, account_id, &self.settings, &transactions)?;
        Ok(document.into_bytes())
    }
}
