//! ECR transaction file load pipeline
//!
//! A scheduled batch job: fetch the PGP-encrypted employee transaction file
//! from the remote transfer site, decrypt and parse it, replace the staging
//! table's contents, run database-side validation, and report rejected rows
//! back to the site. Operators are emailed when rows are rejected, when no
//! new file is available, and when a run fails; clean loads stay silent.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod decrypt;
pub mod error;
pub mod loader;
pub mod models;
pub mod notify;
pub mod parser;
pub mod pipeline;
pub mod transfer;

// Re-export commonly used types
pub use error::{
    DecryptionError, NotifyError, PipelineError, TransferError, ValidationProcedureError,
};
pub use models::{LoadReport, RunOutcome, TransactionRecord};
pub use pipeline::{LoadPipeline, RunConfig};
