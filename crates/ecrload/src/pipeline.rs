//! End-to-end load run
//!
//! Wires the transfer, decryption, staging, and notification seams into a
//! single scheduled run: download, freshness gate, decrypt, parse, load,
//! and report. The scheduler guarantees one run at a time; nothing here
//! locks against a concurrent instance.

use std::path::PathBuf;

use tracing::{error, info};

use crate::decrypt::Decryptor;
use crate::error::{DecryptionError, PipelineError};
use crate::loader::StagingStore;
use crate::models::RunOutcome;
use crate::notify::{Notification, Notifier};
use crate::parser::TransactionParser;
use crate::transfer::RemoteTransfer;
use ecrload_common::RetryPolicy;

/// Per-run settings resolved before the pipeline starts
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Remote directory the transaction file is published to
    pub download_dir: String,
    /// Incremental transaction file name
    pub download_file: String,
    /// Full-extract file name used when reconciling
    pub full_download_file: String,
    /// Local path of the armored private key
    pub private_key_path: PathBuf,
    /// Passphrase protecting the private key
    pub passphrase: String,
    /// Retry policy for the download
    pub retry: RetryPolicy,
    /// Name the error report is uploaded under
    pub error_file_name: String,
}

/// Scheduled ECR load pipeline
pub struct LoadPipeline<T, D, S, N> {
    transfer: T,
    decryptor: D,
    store: S,
    notifier: N,
    config: RunConfig,
}

impl<T, D, S, N> LoadPipeline<T, D, S, N>
where
    T: RemoteTransfer,
    D: Decryptor,
    S: StagingStore,
    N: Notifier,
{
    pub fn new(transfer: T, decryptor: D, store: S, notifier: N, config: RunConfig) -> Self {
        Self {
            transfer,
            decryptor,
            store,
            notifier,
            config,
        }
    }

    /// Execute one run
    ///
    /// Any failure inside the run is reported by email and folded into
    /// [`RunOutcome::Failed`]; the returned `Err` is reserved for a failure
    /// report that itself could not be sent.
    pub async fn run(&self, full_load: bool) -> Result<RunOutcome, PipelineError> {
        match self.run_inner(full_load).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Load run failed");
                self.notifier.notify(&Notification::run_failed(&e)).await?;
                Ok(RunOutcome::Failed {
                    error: e.to_string(),
                })
            },
        }
    }

    async fn run_inner(&self, full_load: bool) -> Result<RunOutcome, PipelineError> {
        let file_name = if full_load {
            &self.config.full_download_file
        } else {
            &self.config.download_file
        };

        info!(
            file = %file_name,
            dir = %self.config.download_dir,
            full_load,
            "Starting ECR load run"
        );

        let remote_file = self
            .config
            .retry
            .run("Download", || {
                self.transfer.download(&self.config.download_dir, file_name)
            })
            .await?;

        let last_load = self.store.last_load_timestamp().await?;
        info!(
            remote_modified = %remote_file.modified,
            last_load = %last_load,
            "Checking transaction file freshness"
        );

        // Incremental runs only process a file that is strictly newer than
        // the last load; full loads always proceed.
        if remote_file.modified <= last_load && !full_load {
            info!("No new transaction file; skipping load");
            self.notifier
                .notify(&Notification::MissingFile {
                    file_name: file_name.clone(),
                })
                .await?;
            return Ok(RunOutcome::NoNewFile);
        }

        let private_key = tokio::fs::read(&self.config.private_key_path)
            .await
            .map_err(DecryptionError::Key)?;
        let plaintext = self
            .decryptor
            .decrypt(&remote_file.data, &private_key, &self.config.passphrase)
            .await?;
        let text = String::from_utf8_lossy(&plaintext);

        let records = TransactionParser::new().parse(&text);
        info!(records = records.len(), "Parsed transaction file");

        let report = self.store.load_run(&records, full_load).await?;

        if report.error_count > 0 {
            self.notifier
                .notify(&Notification::LoadErrors {
                    error_count: report.error_count,
                    error_file: self.config.error_file_name.clone(),
                })
                .await?;
        }

        Ok(RunOutcome::Loaded {
            records: report.rows_loaded,
            error_count: report.error_count,
            error_file: (report.error_count > 0).then(|| self.config.error_file_name.clone()),
        })
    }
}
