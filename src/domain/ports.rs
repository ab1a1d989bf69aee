use crate::domain::model::{
    AccessToken, BankCredentials, DateRange, Recipients, StatementArtifact,
    StatementExportResponse, Transaction,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Default upper bound, in days, for a single statement export.
pub const DEFAULT_MAX_SPAN_DAYS: i64 = 90;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        name: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<std::path::PathBuf>> + Send;
}

/// 銀行對帳單 API 的傳輸層介面；測試以 stub 取代 mTLS 連線
#[async_trait]
pub trait BankStatementClient: Send + Sync {
    fn max_span_days(&self) -> i64 {
        DEFAULT_MAX_SPAN_DAYS
    }

    async fn authenticate(&self, credentials: &BankCredentials) -> Result<AccessToken>;

    /// Fetch the statement export, rejecting ranges wider than
    /// [`max_span_days`](Self::max_span_days) before touching the network.
    async fn fetch_export(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<StatementExportResponse> {
        range.ensure_max_span(self.max_span_days())?;
        self.request_export(token, range, account_id).await
    }

    /// Raw export call. Callers go through [`fetch_export`](Self::fetch_export).
    async fn request_export(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<StatementExportResponse>;
}

#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch_transactions(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<Vec<Transaction>>;
}

/// 取得 OFX 內容的策略：第二次 API 呼叫或本地合成
#[async_trait]
pub trait OfxProvider: Send + Sync {
    async fn provide(
        &self,
        range: &DateRange,
        account_id: &str,
        token: &AccessToken,
    ) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload one artifact and return the URI it can be reached at.
    async fn upload(&self, artifact: &StatementArtifact, destination: &str) -> Result<String>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipients: &Recipients, artifacts: &[StatementArtifact]) -> Result<()>;
}
