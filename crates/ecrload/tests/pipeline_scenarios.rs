//! End-to-end pipeline scenarios against in-memory seams
//!
//! Exercises one load run per test through fake transfer, decryption,
//! staging and notification implementations, pinning the notification
//! contract: at most one email per run, and none on a clean load.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ecrload::decrypt::Decryptor;
use ecrload::loader::StagingStore;
use ecrload::notify::{Notification, Notifier};
use ecrload::transfer::{RemoteFile, RemoteTransfer};
use ecrload::{
    DecryptionError, LoadPipeline, LoadReport, NotifyError, PipelineError, RunConfig, RunOutcome,
    TransactionRecord, TransferError, ValidationProcedureError,
};
use ecrload_common::RetryPolicy;

const PLAINTEXT: &str = "A01|100234|Smith|Jane\nA02|100235|Jones|Robert\nA03|100236|Lee|Ana\n";

/// Remote site with one file; fails the first `failures` downloads
struct FakeTransfer {
    file: RemoteFile,
    failures: u32,
    attempts: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeTransfer {
    fn serving(data: &str, modified: DateTime<Utc>) -> Self {
        Self {
            file: RemoteFile {
                data: data.as_bytes().to_vec(),
                modified,
            },
            failures: 0,
            attempts: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn missing() -> Self {
        Self {
            file: RemoteFile::missing(),
            failures: 0,
            attempts: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_failures(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }
}

#[async_trait]
impl RemoteTransfer for FakeTransfer {
    async fn download(&self, _dir: &str, file: &str) -> Result<RemoteFile, TransferError> {
        self.requests.lock().unwrap().push(file.to_string());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(TransferError::Io(std::io::Error::other("connection reset")));
        }
        Ok(self.file.clone())
    }

    async fn upload(&self, _dir: &str, _file: &str, _data: Vec<u8>) -> Result<(), TransferError> {
        Ok(())
    }
}

/// Pass-through decryptor; an empty payload fails like real decryption
struct FakeDecryptor {
    calls: Arc<AtomicU32>,
}

impl FakeDecryptor {
    fn new() -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl Decryptor for FakeDecryptor {
    async fn decrypt(
        &self,
        cipher: &[u8],
        _private_key: &[u8],
        _passphrase: &str,
    ) -> Result<Vec<u8>, DecryptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cipher.is_empty() {
            return Err(DecryptionError::NoContent);
        }
        Ok(cipher.to_vec())
    }
}

/// Staging store with a scripted marker, error count and validation verdict
struct FakeStore {
    last_load: DateTime<Utc>,
    error_count: usize,
    validation_failure: Option<String>,
    loads: Arc<Mutex<Vec<(usize, bool)>>>,
}

impl FakeStore {
    fn with_last_load(last_load: DateTime<Utc>) -> Self {
        Self {
            last_load,
            error_count: 0,
            validation_failure: None,
            loads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_error_count(mut self, error_count: usize) -> Self {
        self.error_count = error_count;
        self
    }

    fn with_validation_failure(mut self, message: &str) -> Self {
        self.validation_failure = Some(message.to_string());
        self
    }
}

#[async_trait]
impl StagingStore for FakeStore {
    async fn last_load_timestamp(&self) -> Result<DateTime<Utc>, PipelineError> {
        Ok(self.last_load)
    }

    async fn load_run(
        &self,
        records: &[TransactionRecord],
        full_load: bool,
    ) -> Result<LoadReport, PipelineError> {
        self.loads.lock().unwrap().push((records.len(), full_load));
        if let Some(message) = &self.validation_failure {
            return Err(ValidationProcedureError::new(message.clone()).into());
        }
        Ok(LoadReport {
            rows_loaded: records.len(),
            error_count: self.error_count,
        })
    }
}

/// Captures every notification instead of sending it
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Refuses every notification
struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Address(
            "not-an-address".parse::<lettre::Address>().unwrap_err(),
        ))
    }
}

fn test_run_config(private_key_path: PathBuf) -> RunConfig {
    RunConfig {
        download_dir: "/outbound".to_string(),
        download_file: "ECR_Transactions.pgp".to_string(),
        full_download_file: "ECR_Transactions_Full.pgp".to_string(),
        private_key_path,
        passphrase: "hunter2".to_string(),
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        error_file_name: "ECR_Upload_Errors20250825_07.csv".to_string(),
    }
}

fn write_key_file(dir: &tempfile::TempDir) -> Result<PathBuf> {
    let path = dir.path().join("ecr_private.asc");
    std::fs::write(&path, "not a real key")?;
    Ok(path)
}

fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(hours)
}

#[tokio::test]
async fn clean_load_sends_no_notification() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, Utc::now());
    let store = FakeStore::with_last_load(hours_ago(24));
    let notifier = RecordingNotifier::new();
    let (loads, sent) = (store.loads.clone(), notifier.sent.clone());

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(false).await?;

    assert_eq!(
        outcome,
        RunOutcome::Loaded {
            records: 3,
            error_count: 0,
            error_file: None,
        }
    );
    assert!(outcome.is_success());
    assert_eq!(*loads.lock().unwrap(), vec![(3, false)]);
    assert!(sent.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn rejected_rows_send_one_error_notification() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, Utc::now());
    let store = FakeStore::with_last_load(hours_ago(24)).with_error_count(2);
    let notifier = RecordingNotifier::new();
    let sent = notifier.sent.clone();

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(false).await?;

    assert_eq!(
        outcome,
        RunOutcome::Loaded {
            records: 3,
            error_count: 2,
            error_file: Some("ECR_Upload_Errors20250825_07.csv".to_string()),
        }
    );
    assert_eq!(
        *sent.lock().unwrap(),
        vec![Notification::LoadErrors {
            error_count: 2,
            error_file: "ECR_Upload_Errors20250825_07.csv".to_string(),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn missing_remote_file_skips_load_and_notifies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::missing();
    let decryptor = FakeDecryptor::new();
    let store = FakeStore::with_last_load(hours_ago(24));
    let notifier = RecordingNotifier::new();
    let (calls, loads, sent) = (
        decryptor.calls.clone(),
        store.loads.clone(),
        notifier.sent.clone(),
    );

    let pipeline = LoadPipeline::new(
        transfer,
        decryptor,
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(false).await?;

    assert_eq!(outcome, RunOutcome::NoNewFile);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(loads.lock().unwrap().is_empty());
    assert_eq!(
        *sent.lock().unwrap(),
        vec![Notification::MissingFile {
            file_name: "ECR_Transactions.pgp".to_string(),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn remote_file_older_than_last_load_is_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, hours_ago(30));
    let store = FakeStore::with_last_load(hours_ago(1));
    let notifier = RecordingNotifier::new();
    let (loads, sent) = (store.loads.clone(), notifier.sent.clone());

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(false).await?;

    assert_eq!(outcome, RunOutcome::NoNewFile);
    assert!(loads.lock().unwrap().is_empty());
    assert_eq!(sent.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn full_load_processes_stale_file_and_reconciles() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, hours_ago(30));
    let store = FakeStore::with_last_load(hours_ago(1));
    let notifier = RecordingNotifier::new();
    let (requests, loads, sent) = (
        transfer.requests.clone(),
        store.loads.clone(),
        notifier.sent.clone(),
    );

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(true).await?;

    assert!(outcome.is_success());
    assert_eq!(
        *requests.lock().unwrap(),
        vec!["ECR_Transactions_Full.pgp".to_string()]
    );
    assert_eq!(*loads.lock().unwrap(), vec![(3, true)]);
    assert!(sent.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn full_load_with_missing_file_reports_a_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::missing();
    let store = FakeStore::with_last_load(hours_ago(1));
    let notifier = RecordingNotifier::new();
    let (loads, sent) = (store.loads.clone(), notifier.sent.clone());

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(true).await?;

    // A full load skips the freshness gate, so the empty payload surfaces
    // as a decryption failure rather than a missing-file notice.
    assert!(matches!(outcome, RunOutcome::Failed { .. }));
    assert!(loads.lock().unwrap().is_empty());
    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], Notification::RunFailed { .. }));
    Ok(())
}

#[tokio::test]
async fn validation_failure_sends_exception_notification() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, Utc::now());
    let store = FakeStore::with_last_load(hours_ago(24))
        .with_validation_failure("FAILED: lookup table EMPLOYEE_GENDER is empty");
    let notifier = RecordingNotifier::new();
    let sent = notifier.sent.clone();

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(false).await?;

    match outcome {
        RunOutcome::Failed { error } => {
            assert!(error.contains("EMPLOYEE_GENDER"), "unexpected error: {error}");
        },
        other => panic!("expected a failed outcome, got {other:?}"),
    }

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Notification::RunFailed { message, .. } => {
            assert!(message.contains("Validation procedure failed"));
        },
        other => panic!("expected a failure notification, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn download_retries_transient_failures() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, Utc::now()).with_failures(2);
    let store = FakeStore::with_last_load(hours_ago(24));
    let notifier = RecordingNotifier::new();
    let (attempts, sent) = (transfer.attempts.clone(), notifier.sent.clone());

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(false).await?;

    assert!(outcome.is_success());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(sent.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn download_failure_exhausts_retries_then_notifies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, Utc::now()).with_failures(u32::MAX);
    let store = FakeStore::with_last_load(hours_ago(24));
    let notifier = RecordingNotifier::new();
    let (attempts, loads, sent) = (
        transfer.attempts.clone(),
        store.loads.clone(),
        notifier.sent.clone(),
    );

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(write_key_file(&dir)?),
    );
    let outcome = pipeline.run(false).await?;

    assert!(matches!(outcome, RunOutcome::Failed { .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(loads.lock().unwrap().is_empty());
    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].includes_operators());
    Ok(())
}

#[tokio::test]
async fn unreadable_key_file_becomes_failure_notification() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transfer = FakeTransfer::serving(PLAINTEXT, Utc::now());
    let store = FakeStore::with_last_load(hours_ago(24));
    let notifier = RecordingNotifier::new();
    let sent = notifier.sent.clone();

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        notifier,
        test_run_config(dir.path().join("no-such-key.asc")),
    );
    let outcome = pipeline.run(false).await?;

    match outcome {
        RunOutcome::Failed { error } => {
            assert!(error.contains("private key"), "unexpected error: {error}");
        },
        other => panic!("expected a failed outcome, got {other:?}"),
    }
    assert_eq!(sent.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn failure_notification_failure_escapes_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = FakeTransfer::serving(PLAINTEXT, Utc::now()).with_failures(u32::MAX);
    let store = FakeStore::with_last_load(hours_ago(24));

    let pipeline = LoadPipeline::new(
        transfer,
        FakeDecryptor::new(),
        store,
        FailingNotifier,
        test_run_config(write_key_file(&dir).unwrap()),
    );

    assert!(pipeline.run(false).await.is_err());
}
