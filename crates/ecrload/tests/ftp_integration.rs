//! Integration tests for the remote FTP transfer client
//!
//! These tests connect to the FTP site named by the ECR_FTP_* variables and
//! are marked with #[ignore] to avoid running in CI. Run them explicitly:
//!
//! ```bash
//! ECR_FTP_HOST=ftp.example.gov ECR_FTP_USERNAME=ecr ECR_FTP_PASSWORD=... \
//!     cargo test --test ftp_integration -- --ignored --nocapture
//! ```
//!
//! The roundtrip test writes a small scratch file into the upload
//! directory; nothing under the download directory is touched.

use anyhow::Result;
use chrono::{DateTime, Utc};
use ecrload::config::RemoteSiteConfig;
use ecrload::transfer::{FtpTransfer, RemoteFile, RemoteTransfer};
use tracing::info;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ecrload=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn live_config() -> RemoteSiteConfig {
    dotenvy::dotenv().ok();
    RemoteSiteConfig::from_env()
}

#[tokio::test]
#[ignore] // Only run when explicitly requested: cargo test -- --ignored
async fn absent_file_downloads_as_the_missing_sentinel() -> Result<()> {
    init_tracing();
    let config = live_config();
    let transfer = FtpTransfer::new(config.clone());

    let file = transfer
        .download(&config.download_dir, "ecrload_it_no_such_file_20990101.pgp")
        .await?;

    assert_eq!(file, RemoteFile::missing());
    Ok(())
}

#[tokio::test]
#[ignore] // Only run when explicitly requested: cargo test -- --ignored
async fn upload_then_download_roundtrip() -> Result<()> {
    init_tracing();
    let config = live_config();
    let transfer = FtpTransfer::new(config.clone());

    let name = "ecrload_it_roundtrip.txt";
    let body = format!("ecrload integration test {}\n", Utc::now());

    info!("Uploading {} to {}", name, config.upload_dir);
    transfer
        .upload(&config.upload_dir, name, body.clone().into_bytes())
        .await?;

    let file = transfer.download(&config.upload_dir, name).await?;

    assert_eq!(file.data, body.into_bytes());
    assert!(file.modified > DateTime::<Utc>::UNIX_EPOCH);
    Ok(())
}
