use clap::Parser;
use statement_etl::adapters::{
    ApiKey, DriveCredentials, EndpointOfxProvider, GoogleDriveUploader, InterBankClient,
    LocalStorage, SendGridMailer,
};
use statement_etl::config::{CliConfig, OfxStrategy, RunConfig};
use statement_etl::core::exporter::StatementExporter;
use statement_etl::core::ofx::SynthesizedOfxProvider;
use statement_etl::core::pipeline::StatementPipeline;
use statement_etl::core::retry::RetryingBankClient;
use statement_etl::domain::model::RunResult;
use statement_etl::domain::ports::OfxProvider;
use statement_etl::utils::error::{Result, StatementError};
use statement_etl::utils::{logger, validation::Validate};

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose, config.json_logs);
    tracing::info!("Starting statement-etl");

    match run(config).await {
        Ok(result) => print_summary(&result),
        Err(e) => {
            tracing::error!(
                "❌ Statement run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ [{:?}] {}", e.kind(), e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(config: CliConfig) -> Result<RunResult> {
    // 驗證配置
    config.validate()?;
    let settings = match &config.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    settings.validate()?;
    let request = config.run_request()?;

    if config.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let bank = InterBankClient::new(settings.bank_settings());
    let retry = settings.retry_policy();
    let ofx_provider: Box<dyn OfxProvider> = match settings.ofx_strategy() {
        OfxStrategy::Synthesize => Box::new(SynthesizedOfxProvider::new(
            RetryingBankClient::new(bank.clone(), retry),
            settings.ofx_settings(),
        )),
        OfxStrategy::Endpoint => {
            Box::new(EndpointOfxProvider::new(bank.clone()).with_retry(retry))
        }
    };

    let http = reqwest::Client::builder()
        .timeout(settings.bank_settings().timeout)
        .build()
        .map_err(|e| StatementError::config(format!("HTTP client could not be built: {}", e)))?;

    let mut pipeline = StatementPipeline::new(
        RetryingBankClient::new(bank, retry),
        LocalStorage::new(config.output_dir.clone()),
        StatementExporter::new(ofx_provider),
    )
    .with_monitoring(config.monitor);

    if !config.skip_upload {
        let path = config
            .drive_creds
            .as_ref()
            .ok_or_else(|| StatementError::config("'drive_creds' is missing"))?;
        let mut credentials = DriveCredentials::from_file(path)?;
        if let Some(token_url) = &settings.drive.token_url {
            credentials.token_uri = token_url.clone();
        }
        pipeline = pipeline.with_uploader(Box::new(GoogleDriveUploader::with_upload_url(
            http.clone(),
            credentials,
            settings.drive_upload_url(),
        )));
    }

    if !config.skip_email {
        let key = config
            .sendgrid_key
            .as_deref()
            .ok_or_else(|| StatementError::config("'sendgrid_key' is missing"))?;
        pipeline = pipeline.with_mailer(Box::new(SendGridMailer::new(
            http,
            ApiKey::new(key),
            settings.email_settings(),
            &request.range,
        )));
    }

    pipeline.run(request).await.into_result()
}

fn print_summary(result: &RunResult) {
    tracing::info!("✅ Statement run completed successfully!");
    println!("✅ Statement run completed successfully!");
    for artifact in &result.artifacts {
        println!("📁 {} ({} bytes)", artifact.path.display(), artifact.size);
    }
    for location in &result.uploaded_locations {
        println!("☁️ {}", location);
    }
    if let Some(status) = result.email_status {
        println!("📧 Email: {:?}", status);
    }
}
