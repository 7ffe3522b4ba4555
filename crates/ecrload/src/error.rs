//! Error types for the ECR load pipeline
//!
//! Each component fails with its own narrow type; the orchestrator
//! aggregates them into [`PipelineError`], the single type its outcome
//! dispatch matches over. Every run-level error ends up in the exception
//! notification rather than on stderr.

use thiserror::Error;

/// Remote transfer failures (session, credentials, data connection)
#[derive(Error, Debug)]
pub enum TransferError {
    /// FTP protocol or connection failure
    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    /// Reading or writing transfer buffers failed
    #[error("Transfer I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking transfer task was cancelled or panicked
    #[error("Transfer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Decryption failures (key material, passphrase, ciphertext)
#[derive(Error, Debug)]
pub enum DecryptionError {
    /// OpenPGP parsing or decryption failure
    #[error("OpenPGP error: {0}")]
    Pgp(#[from] pgp::errors::Error),

    /// Reading the private key file failed
    #[error("Failed to read private key: {0}")]
    Key(#[source] std::io::Error),

    /// The decrypted message carried no literal data
    #[error("Decrypted message contains no data")]
    NoContent,

    /// The blocking decryption task was cancelled or panicked
    #[error("Decryption task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The validating stored procedure reported failure
///
/// Any return value other than the success sentinel aborts the run; the
/// database's message is carried verbatim into the failure notification.
#[derive(Error, Debug)]
#[error("Validation procedure failed: {message}")]
pub struct ValidationProcedureError {
    /// Text returned by the procedure
    pub message: String,
}

impl ValidationProcedureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Notification failures (message composition or SMTP transport)
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Invalid sender or recipient address
    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// Message composition failed
    #[error("Failed to compose email: {0}")]
    Message(#[from] lettre::error::Error),

    /// SMTP transport failure
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The blocking send task was cancelled or panicked
    #[error("Email send task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Run-level error: everything a pipeline run can fail with
///
/// The variants keep the component taxonomy visible where the orchestrator
/// converts a failed run into the exception notification.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Remote transfer failed after exhausting its retries
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Payload decryption failed
    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    /// The validating stored procedure rejected the load
    #[error(transparent)]
    Validation(#[from] ValidationProcedureError),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Sending a notification failed
    #[error(transparent)]
    Notify(#[from] NotifyError),
}
