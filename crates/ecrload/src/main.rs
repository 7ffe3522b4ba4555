//! ECR transaction file load job

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use ecrload_common::logging::{init_logging, LogConfig, LogLevel};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use ecrload::config::{error_file_name, Config};
use ecrload::decrypt::PgpDecryptor;
use ecrload::loader::StagingLoader;
use ecrload::notify::SmtpNotifier;
use ecrload::transfer::FtpTransfer;
use ecrload::{LoadPipeline, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "ecrload")]
#[command(author, version, about = "ECR employee transaction file loader")]
struct Cli {
    /// Load the full extract and reconcile retired employees
    #[arg(long)]
    full: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    let config = Config::load()?;
    info!(full_load = cli.full, "Starting ECR load job");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.connect_timeout())
        .connect(&config.database.url)
        .await?;

    let retry = config.remote.retry_policy();
    let error_file = error_file_name(&config.smtp.environment_label, Utc::now());

    let transfer = FtpTransfer::new(config.remote.clone());
    let decryptor = PgpDecryptor::new();
    let store = StagingLoader::new(
        pool,
        transfer.clone(),
        retry,
        config.remote.upload_dir.clone(),
        error_file.clone(),
    );
    let notifier = SmtpNotifier::new(config.smtp.clone());

    let run_config = RunConfig {
        download_dir: config.remote.download_dir.clone(),
        download_file: config.remote.download_file.clone(),
        full_download_file: config.remote.full_download_file.clone(),
        private_key_path: config.pgp.private_key_path.clone(),
        passphrase: config.pgp.passphrase.clone(),
        retry,
        error_file_name: error_file,
    };

    let pipeline = LoadPipeline::new(transfer, decryptor, store, notifier, run_config);
    let outcome = pipeline.run(cli.full).await?;

    info!("{}", outcome.summary());
    Ok(())
}
