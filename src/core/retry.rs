use crate::domain::model::{
    AccessToken, BankCredentials, DateRange, StatementExportResponse, Transaction,
};
use crate::domain::ports::{BankStatementClient, TransactionSource};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// 指數退避：base, 2*base, 4*base...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "⚠️ {} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation,
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wraps a bank client and retries transient export failures (5xx and
/// connection errors). Authentication is passed through untouched.
pub struct RetryingBankClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingBankClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: BankStatementClient> BankStatementClient for RetryingBankClient<C> {
    fn max_span_days(&self) -> i64 {
        self.inner.max_span_days()
    }

    async fn authenticate(&self, credentials: &BankCredentials) -> Result<AccessToken> {
        self.inner.authenticate(credentials).await
    }

    async fn request_export(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<StatementExportResponse> {
        let inner = &self.inner;
        self.policy
            .run("statement export", || inner.request_export(token, range, account_id))
            .await
    }
}

#[async_trait]
impl<C: TransactionSource> TransactionSource for RetryingBankClient<C> {
    async fn fetch_transactions(
        &self,
        token: &AccessToken,
        range: &DateRange,
        account_id: &str,
    ) -> Result<Vec<Transaction>> {
        let inner = &self.inner;
        self.policy
            .run("transaction listing", || {
                inner.fetch_transactions(token, range, account_id)
            })
            .await
    }
}
