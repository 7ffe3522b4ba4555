//! Data shapes for the ECR transaction load

use chrono::{DateTime, Utc};

/// Number of delimited input fields a full transaction row carries
pub const FIELD_COUNT: usize = 27;

/// One employee transaction row, as staged for validation
///
/// Every input field is kept as optional raw text: the file is staged
/// verbatim and the database-side validation procedure is the arbiter of
/// what is acceptable. `None` means the field was absent from the row;
/// present-but-empty fields stay as empty strings. `created_date` is
/// stamped at parse time and doubles as the load marker consulted by the
/// freshness gate on the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub transaction_code: Option<String>,
    pub ueid: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub name_suffix: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub phone_number: Option<String>,
    pub extension: Option<String>,
    pub ethnicity: Option<String>,
    pub agency_code: Option<String>,
    pub class_code: Option<String>,
    pub class_type: Option<String>,
    pub bargaining_designation: Option<String>,
    pub bargaining_unit: Option<String>,
    pub appointment_date: Option<String>,
    pub safety_code: Option<String>,
    pub tenure: Option<String>,
    pub timebase: Option<String>,
    pub reporting_unit: Option<String>,
    pub serial: Option<String>,
    pub created_date: DateTime<Utc>,
}

impl TransactionRecord {
    /// Build a record from positional fields
    ///
    /// Fields map in file order. Missing trailing fields become `None`
    /// (staged as SQL NULL); surplus fields beyond [`FIELD_COUNT`] are
    /// dropped. Row width is deliberately not validated here.
    pub fn from_fields(fields: Vec<String>, created_date: DateTime<Utc>) -> Self {
        let mut fields = fields.into_iter();
        let mut next = || fields.next();

        Self {
            transaction_code: next(),
            ueid: next(),
            last_name: next(),
            first_name: next(),
            middle_name: next(),
            name_suffix: next(),
            date_of_birth: next(),
            gender: next(),
            address_line1: next(),
            address_line2: next(),
            city: next(),
            state: next(),
            zipcode: next(),
            phone_number: next(),
            extension: next(),
            ethnicity: next(),
            agency_code: next(),
            class_code: next(),
            class_type: next(),
            bargaining_designation: next(),
            bargaining_unit: next(),
            appointment_date: next(),
            safety_code: next(),
            tenure: next(),
            timebase: next(),
            reporting_unit: next(),
            serial: next(),
            created_date,
        }
    }
}

/// Outcome of one staging load sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows bulk-inserted into the staging table
    pub rows_loaded: usize,

    /// Rows the validation procedure flagged as invalid
    pub error_count: usize,
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The file was downloaded, decrypted, staged and validated
    Loaded {
        /// Records staged from the file
        records: usize,
        /// Rows the validation procedure rejected
        error_count: usize,
        /// Name of the uploaded error report, when any rows were rejected
        error_file: Option<String>,
    },

    /// The freshness gate found nothing newer than the last load
    NoNewFile,

    /// The run aborted; operators were notified with the failure
    Failed { error: String },
}

impl RunOutcome {
    /// Whether the run staged new data
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Loaded { .. })
    }

    /// One-line summary for the run log
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Loaded {
                records,
                error_count: 0,
                ..
            } => format!("Loaded {} records with no validation errors", records),
            RunOutcome::Loaded {
                records,
                error_count,
                error_file,
            } => format!(
                "Loaded {} records, {} rejected by validation (report: {})",
                records,
                error_count,
                error_file.as_deref().unwrap_or("none")
            ),
            RunOutcome::NoNewFile => "No new transaction file to load".to_string(),
            RunOutcome::Failed { error } => format!("Run failed: {}", error),
        }
    }
}
