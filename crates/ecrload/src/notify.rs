//! Operator email notifications
//!
//! A run sends at most one notification: validation errors, a missing
//! transaction file, or the failure report. Clean loads stay silent. The
//! data-team address receives everything; the operator address is added
//! for the two content conditions.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::{NotifyError, PipelineError};

const SUBJECT_LOAD_ERRORS: &str = "ECR Input Transaction Errors";
const SUBJECT_MISSING_FILE: &str = "ECR New Transaction File Missing";
const SUBJECT_RUN_FAILED: &str = "ECR Data Load Exception";

/// One operator notification
///
/// The three conditions are mutually exclusive within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Validation rejected rows and the error report was uploaded
    LoadErrors {
        error_count: usize,
        error_file: String,
    },

    /// The freshness gate found no new transaction file
    MissingFile { file_name: String },

    /// The run aborted with an unhandled failure
    RunFailed { message: String, detail: String },
}

impl Notification {
    /// Build the failure notification from a run-level error
    pub fn run_failed(error: &PipelineError) -> Self {
        Self::RunFailed {
            message: error.to_string(),
            detail: error_chain(error),
        }
    }

    /// Subject line, with the environment label appended outside production
    pub fn subject(&self, environment_label: &str) -> String {
        let base = match self {
            Notification::LoadErrors { .. } => SUBJECT_LOAD_ERRORS,
            Notification::MissingFile { .. } => SUBJECT_MISSING_FILE,
            Notification::RunFailed { .. } => SUBJECT_RUN_FAILED,
        };

        let label = environment_label.trim();
        if label.is_empty() {
            base.to_string()
        } else {
            format!("{} {}", base, label)
        }
    }

    /// HTML body
    pub fn body(&self) -> String {
        match self {
            Notification::LoadErrors {
                error_count,
                error_file,
            } => format!(
                "{} invalid transaction(s) found in the latest ECR file.<br><br>\
                 See {} at the remote transfer site for details.",
                error_count, error_file
            ),
            Notification::MissingFile { file_name } => {
                format!("No new {} file found.", file_name)
            },
            Notification::RunFailed { message, detail } => {
                format!("{}<br><br>{}", message, detail)
            },
        }
    }

    /// Whether the operator address is copied in
    ///
    /// Failure reports go to the data team only.
    pub fn includes_operators(&self) -> bool {
        !matches!(self, Notification::RunFailed { .. })
    }
}

/// Join an error's source chain for the failure body
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join("<br>")
}

/// Notification delivery seam
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// SMTP-backed notifier
///
/// Sends through a plain internal relay: no TLS, no authentication. The
/// synchronous transport runs on a blocking task.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_sync(config: &SmtpConfig, notification: &Notification) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(config.from_address.parse::<Mailbox>()?)
            .to(config.admin_address.parse::<Mailbox>()?);

        if notification.includes_operators() {
            builder = builder.to(config.operator_address.parse::<Mailbox>()?);
        }

        let message = builder
            .subject(notification.subject(&config.environment_label))
            .header(ContentType::TEXT_HTML)
            .body(notification.body())?;

        let transport = SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port)
            .build();

        transport.send(&message)?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let subject = notification.subject(&self.config.environment_label);
        info!(subject = %subject, "Sending notification email");

        let config = self.config.clone();
        let notification = notification.clone();

        tokio::task::spawn_blocking(move || Self::send_sync(&config, &notification)).await?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ValidationProcedureError;

    #[test]
    fn subjects_carry_the_environment_label() {
        let notification = Notification::MissingFile {
            file_name: "ECR_Transactions.pgp".to_string(),
        };

        assert_eq!(notification.subject(""), "ECR New Transaction File Missing");
        assert_eq!(notification.subject("   "), "ECR New Transaction File Missing");
        assert_eq!(
            notification.subject("(TEST)"),
            "ECR New Transaction File Missing (TEST)"
        );
    }

    #[test]
    fn load_errors_body_names_count_and_report() {
        let notification = Notification::LoadErrors {
            error_count: 3,
            error_file: "ECR_Upload_Errors20250825_07.csv".to_string(),
        };

        let body = notification.body();
        assert!(body.contains("3 invalid transaction(s)"));
        assert!(body.contains("ECR_Upload_Errors20250825_07.csv"));
        assert_eq!(
            notification.subject("").as_str(),
            "ECR Input Transaction Errors"
        );
    }

    #[test]
    fn missing_file_body_names_the_expected_file() {
        let notification = Notification::MissingFile {
            file_name: "ECR_Transactions.pgp".to_string(),
        };

        assert_eq!(notification.body(), "No new ECR_Transactions.pgp file found.");
    }

    #[test]
    fn run_failed_carries_the_error_chain() {
        let error = PipelineError::from(ValidationProcedureError::new(
            "Lookup table EMPLOYEE_GENDER is empty",
        ));
        let notification = Notification::run_failed(&error);

        assert_eq!(notification.subject(""), "ECR Data Load Exception");
        assert!(notification
            .body()
            .contains("Lookup table EMPLOYEE_GENDER is empty"));
        assert!(!notification.includes_operators());
    }

    #[test]
    fn content_conditions_copy_operators() {
        let errors = Notification::LoadErrors {
            error_count: 1,
            error_file: "e.csv".to_string(),
        };
        let missing = Notification::MissingFile {
            file_name: "f.pgp".to_string(),
        };

        assert!(errors.includes_operators());
        assert!(missing.includes_operators());
    }
}
