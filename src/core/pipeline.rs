use crate::config::credentials::{CredentialSource, CredentialStore};
use crate::core::exporter::StatementExporter;
use crate::domain::model::{
    AccessToken, ArtifactRecord, BankCredentials, DateRange, EmailStatus, FailureReason,
    Recipients, RunResult, RunState, Stage, StatementArtifact, StatementExportResponse,
};
use crate::domain::ports::{BankStatementClient, Mailer, Storage, Uploader};
use crate::utils::error::{Result, StatementError};
use crate::utils::monitor::RunMonitor;

/// Inputs of a single run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub credentials: CredentialSource,
    pub range: DateRange,
    /// Storage target identifier handed to the uploader (Drive folder id).
    pub destination: String,
    pub recipients: Option<Recipients>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    pub result: RunResult,
    pub error: Option<StatementError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn into_result(self) -> Result<RunResult> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }
}

/// 對帳單管道：依序執行 認證 → 取得 → 匯出 → 上傳 → 寄信
///
/// One instance drives exactly one run. Any failure aborts the remaining
/// steps; files already written stay on disk.
pub struct StatementPipeline<C: BankStatementClient, S: Storage> {
    client: C,
    storage: S,
    exporter: StatementExporter,
    uploader: Option<Box<dyn Uploader>>,
    mailer: Option<Box<dyn Mailer>>,
    state: RunState,
    transitions: Vec<RunState>,
    monitor: RunMonitor,
}

impl<C: BankStatementClient, S: Storage> StatementPipeline<C, S> {
    pub fn new(client: C, storage: S, exporter: StatementExporter) -> Self {
        Self {
            client,
            storage,
            exporter,
            uploader: None,
            mailer: None,
            state: RunState::Idle,
            transitions: vec![RunState::Idle],
            monitor: RunMonitor::default(),
        }
    }

    /// Without an uploader the Uploading step is a logged no-op.
    pub fn with_uploader(mut self, uploader: Box<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Without a mailer the Emailing step is a logged no-op.
    pub fn with_mailer(mut self, mailer: Box<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = RunMonitor::new(enabled);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Every state the run passed through, starting at `Idle`.
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("State {:?} -> {:?}", self.state, next);
        self.state = next.clone();
        self.transitions.push(next);
    }

    fn enter(&mut self, stage: Stage) {
        tracing::info!("▶️ {}", stage);
        self.monitor.stage_started(stage);
        self.transition(RunState::from(stage));
    }

    fn current_stage(&self) -> Stage {
        match self.state {
            RunState::Fetching => Stage::Fetching,
            RunState::Exporting => Stage::Exporting,
            RunState::Uploading => Stage::Uploading,
            RunState::Emailing => Stage::Emailing,
            _ => Stage::Authenticating,
        }
    }

    pub async fn run(&mut self, request: RunRequest) -> RunOutcome {
        let mut result = RunResult::default();

        if self.state != RunState::Idle {
            return RunOutcome {
                state: self.state.clone(),
                result,
                error: Some(StatementError::config(
                    "a pipeline instance can only run once",
                )),
            };
        }

        tracing::info!("🚀 Starting statement run for {}", request.range);

        match self.execute(&request, &mut result).await {
            Ok(()) => {
                self.monitor.log_final_stats();
                self.transition(RunState::Done);
                tracing::info!(
                    "✅ Run completed: {} artifacts, {} uploads",
                    result.artifacts.len(),
                    result.uploaded_locations.len()
                );
                RunOutcome {
                    state: self.state.clone(),
                    result,
                    error: None,
                }
            }
            Err(e) => {
                self.monitor.log_final_stats();
                let stage = self.current_stage();
                let error = e.at_stage(stage);
                tracing::error!(
                    "❌ Run failed during {}: {} (Category: {:?}, Severity: {:?})",
                    stage,
                    error.root(),
                    error.category(),
                    error.severity()
                );
                self.transition(RunState::Failed(FailureReason {
                    stage,
                    kind: error.kind(),
                    message: error.root().to_string(),
                }));
                RunOutcome {
                    state: self.state.clone(),
                    result,
                    error: Some(error),
                }
            }
        }
    }

    async fn execute(&mut self, request: &RunRequest, result: &mut RunResult) -> Result<()> {
        // 認證
        self.enter(Stage::Authenticating);
        let credentials = CredentialStore::load(&request.credentials)?;
        let token = self.client.authenticate(&credentials).await?;
        tracing::info!("🔐 Authenticated against the bank API");

        // 取得匯出
        self.enter(Stage::Fetching);
        let (response, token) = self.fetch(&credentials, token, &request.range).await?;

        // 匯出 PDF 與 OFX，各自驗證後立即寫檔
        self.enter(Stage::Exporting);
        let pdf = self.exporter.export_pdf(&response, &request.range)?;
        result.artifacts.push(self.persist(&pdf).await?);

        let ofx = self
            .exporter
            .export_ofx(&response, &request.range, &credentials.account_id, &token)
            .await?;
        result.artifacts.push(self.persist(&ofx).await?);
        drop(response);
        let artifacts = vec![pdf, ofx];

        // 上傳
        self.enter(Stage::Uploading);
        match &self.uploader {
            Some(uploader) => {
                for artifact in &artifacts {
                    let location = uploader.upload(artifact, &request.destination).await?;
                    tracing::info!("☁️ Uploaded {} to {}", artifact.filename(), location);
                    result.uploaded_locations.push(location);
                }
            }
            None => tracing::info!("⏭️ Upload disabled, skipping"),
        }

        // 寄信
        self.enter(Stage::Emailing);
        match &self.mailer {
            Some(mailer) => {
                let recipients = request.recipients.as_ref().ok_or_else(|| {
                    StatementError::config("email is enabled but no recipients were given")
                })?;
                if let Err(e) = mailer.send(recipients, &artifacts).await {
                    result.email_status = Some(EmailStatus::Failed);
                    return Err(e);
                }
                tracing::info!("📧 Email sent to {}", recipients);
                result.email_status = Some(EmailStatus::Sent);
            }
            None => {
                tracing::info!("⏭️ Email disabled, skipping");
                result.email_status = Some(EmailStatus::Skipped);
            }
        }

        Ok(())
    }

    /// Fetch the export; a 401 means the token expired early, so
    /// re-authenticate once and try again.
    async fn fetch(
        &self,
        credentials: &BankCredentials,
        token: AccessToken,
        range: &DateRange,
    ) -> Result<(StatementExportResponse, AccessToken)> {
        match self
            .client
            .fetch_export(&token, range, &credentials.account_id)
            .await
        {
            Ok(response) => Ok((response, token)),
            Err(e) if is_unauthorized(&e) => {
                tracing::warn!("⚠️ Bank rejected the access token, re-authenticating");
                let token = self.client.authenticate(credentials).await?;
                let response = self
                    .client
                    .fetch_export(&token, range, &credentials.account_id)
                    .await?;
                Ok((response, token))
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(&self, artifact: &StatementArtifact) -> Result<ArtifactRecord> {
        let path = self
            .storage
            .write_file(artifact.filename(), artifact.bytes())
            .await?;
        Ok(ArtifactRecord {
            format: artifact.format(),
            filename: artifact.filename().to_string(),
            path,
            size: artifact.len(),
        })
    }
}

fn is_unauthorized(error: &StatementError) -> bool {
    matches!(error.root(), StatementError::BankApiError { status: 401, .. })
}
