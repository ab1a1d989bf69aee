use crate::core::exporter::decode_base64_field;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{
    AccessToken, BankCredentials, DateRange, StatementExportResponse, Transaction, DATE_FORMAT,
};
use crate::domain::ports::{
    BankStatementClient, OfxProvider, TransactionSource, DEFAULT_MAX_SPAN_DAYS,
};
use crate::utils::error::{Result, StatementError};
use async_trait::async_trait;
use reqwest::{Client, Identity, Response};
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://cdpj.partners.bancointer.com.br";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const ACCOUNT_HEADER: &str = "x-conta-corrente";

#[derive(Debug, Clone)]
pub struct BankSettings {
    pub base_url: String,
    pub token_path: String,
    pub export_path: String,
    pub transactions_path: String,
    pub ofx_export_path: String,
    pub scope: String,
    pub timeout: Duration,
    pub max_span_days: i64,
}

impl Default for BankSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_path: "/oauth/v2/token".to_string(),
            export_path: "/banking/v2/extrato/exportar".to_string(),
            transactions_path: "/banking/v2/extrato".to_string(),
            ofx_export_path: "/banking/v2/extrato/exportar/ofx".to_string(),
            scope: "extrato.read".to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_span_days: DEFAULT_MAX_SPAN_DAYS,
        }
    }
}

impl BankSettings {
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    #[serde(rename = "transacoes", default)]
    transactions: Vec<Transaction>,
}

/// Banco Inter 對帳單 API 客戶端
///
/// The mutual-TLS HTTP client is built from the certificate/key pair on the
/// first `authenticate` call and shared by every clone afterwards, so the OFX
/// provider can reuse the same connection settings.
#[derive(Clone)]
pub struct InterBankClient {
    settings: Arc<BankSettings>,
    http: Arc<OnceLock<Client>>,
}

impl InterBankClient {
    pub fn new(settings: BankSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            http: Arc::new(OnceLock::new()),
        }
    }

    /// Use a prepared HTTP client instead of building one from the
    /// certificate pair (TLS terminated elsewhere, or tests).
    pub fn with_http_client(settings: BankSettings, client: Client) -> Self {
        let http = OnceLock::new();
        let _ = http.set(client);
        Self {
            settings: Arc::new(settings),
            http: Arc::new(http),
        }
    }

    pub fn settings(&self) -> &BankSettings {
        &self.settings
    }

    async fn build_tls_client(&self, credentials: &BankCredentials) -> Result<Client> {
        let mut pem = read_pem("cert", &credentials.certificate_path).await?;
        pem.push(b'\n');
        pem.extend(read_pem("key", &credentials.key_path).await?);

        let identity = Identity::from_pem(&pem).map_err(|e| {
            StatementError::config(format!("certificate/key pair could not be loaded: {}", e))
        })?;

        Client::builder()
            .identity(identity)
            .timeout(self.settings.timeout)
            .user_agent(format!("statement-etl/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StatementError::config(format!("bank HTTP client could not be built: {}", e)))
    }

    async fn http_for(&self, credentials: &BankCredentials) -> Result<&Client> {
        if self.http.get().is_none() {
            let client = self.build_tls_client(credentials).await?;
            let _ = self.http.set(client);
        }
        self.http()
    }

    fn http(&self) -> Result<&Client> {
        self.http
            .get()
            .ok_or_else(|| StatementError::auth("bank client used before authenticate"))
    }

    async fn get_statement_endpoint(
        &self,
        path: &str,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<Response> {
        let url = self.settings.url(path);
        tracing::debug!("Requesting {} for {}", url, range);

        let start = range.start().format(DATE_FORMAT).to_string();
        let end = range.end().format(DATE_FORMAT).to_string();
        let response = self
            .http()?
            .get(&url)
            .bearer_auth(token.secret())
            .header(ACCOUNT_HEADER, account_id)
            .query(&[("dataInicio", start.as_str()), ("dataFim", end.as_str())])
            .send()
            .await
            .map_err(StatementError::BankUnreachable)?;

        tracing::debug!("Bank response status: {}", response.status());
        ensure_success(response).await
    }

    /// Second export call for the OFX rendition.
    pub async fn fetch_ofx_export(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<Vec<u8>> {
        let response = self
            .get_statement_endpoint(&self.settings.ofx_export_path, token, range, account_id)
            .await?;

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);

        if is_json {
            let envelope: serde_json::Value = response
                .json()
                .await
                .map_err(|e| StatementError::decoding(format!("OFX export body: {}", e)))?;
            decode_base64_field(
                envelope.get(StatementExportResponse::OFX_FIELD),
                StatementExportResponse::OFX_FIELD,
            )
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(StatementError::BankUnreachable)?;
            Ok(bytes.to_vec())
        }
    }
}

async fn read_pem(field: &str, path: &std::path::Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|_| StatementError::FileNotFound {
            field: field.to_string(),
            path: path.display().to_string(),
        })
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StatementError::BankApiError {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl BankStatementClient for InterBankClient {
    fn max_span_days(&self) -> i64 {
        self.settings.max_span_days
    }

    async fn authenticate(&self, credentials: &BankCredentials) -> Result<AccessToken> {
        let client = self.http_for(credentials).await?;
        let url = self.settings.url(&self.settings.token_path);
        tracing::debug!("Requesting access token from {}", url);

        let form = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("scope", self.settings.scope.as_str()),
            ("grant_type", "client_credentials"),
        ];
        let response = client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| StatementError::auth(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        tracing::debug!("Token endpoint status: {}", status);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatementError::auth(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StatementError::auth(format!("malformed token response: {}", e)))?;

        match token.access_token {
            Some(token) if !token.trim().is_empty() => Ok(AccessToken::new(token)),
            _ => Err(StatementError::auth("token response has no access_token")),
        }
    }

    async fn request_export(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<StatementExportResponse> {
        let response = self
            .get_statement_endpoint(&self.settings.export_path, token, range, account_id)
            .await?;

        response
            .json::<StatementExportResponse>()
            .await
            .map_err(|e| StatementError::decoding(format!("export response is not JSON: {}", e)))
    }
}

#[async_trait]
impl TransactionSource for InterBankClient {
    async fn fetch_transactions(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<Vec<Transaction>> {
        let response = self
            .get_statement_endpoint(&self.settings.transactions_path, token, range, account_id)
            .await?;

        let body: TransactionsResponse = response.json().await.map_err(|e| {
            StatementError::decoding(format!("transaction listing is malformed: {}", e))
        })?;
        Ok(body.transactions)
    }
}

/// OFX 由銀行第二個匯出端點提供
pub struct EndpointOfxProvider {
    client: InterBankClient,
    retry: RetryPolicy,
}

impl EndpointOfxProvider {
    /// Single attempt; see [`with_retry`](Self::with_retry).
    pub fn new(client: InterBankClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::new(1, Duration::ZERO),
        }
    }

    /// Retry transient OFX export failures with the same policy as the
    /// statement export.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl OfxProvider for EndpointOfxProvider {
    async fn provide(
        &self,
        range: &DateRange,
        account_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<u8>> {
        let client = &self.client;
        self.retry
            .run("OFX export", || client.fetch_ofx_export(token, range, account_id))
            .await
    }
}
