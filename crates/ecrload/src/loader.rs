//! Staging-table load and validation
//!
//! One load run owns a single pooled connection for the whole sequence:
//! truncate, bulk insert, validation procedure, optional reconciliation,
//! error harvest. The staging table never holds more than the current
//! run's rows, and its `created_date` column is the marker the next run's
//! freshness gate reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ecrload_common::retry::RetryPolicy;
use sqlx::{PgConnection, PgPool, QueryBuilder, Row};
use tracing::{info, warn};

use crate::error::{PipelineError, ValidationProcedureError};
use crate::models::{LoadReport, TransactionRecord};
use crate::transfer::RemoteTransfer;

/// Rows per bulk INSERT statement (Postgres caps binds per statement)
const INSERT_CHUNK_SIZE: usize = 1000;

/// Success sentinel returned by the validation procedure
///
/// The return value is right-trimmed before comparison; the column is
/// CHAR-padded on some deployments.
const VALIDATION_SUCCESS: &str = "COMPLETED";

/// Statement timeout while the validation procedure runs (seconds)
const VALIDATION_TIMEOUT_SECS: u64 = 1200;

/// Validating procedure: resolves lookups and flags invalid rows
const VALIDATION_PROCEDURE: &str = "load_employee_info";

/// Full-load reconciliation: retires employees absent from the extract
const RECONCILE_PROCEDURE: &str = "retire_missing_employees";

/// Invalid-row projection for the error report, in report column order
///
/// Resolved-id columns are cast to text so the report shows the raw lookup
/// results; the header strips the cast wrapper back off.
const ERROR_REPORT_COLUMNS: &[&str] = &[
    "transaction_code",
    "ueid",
    "gender",
    "city",
    "state",
    "zipcode",
    "ethnicity",
    "agency_code",
    "class_code",
    "class_type",
    "bargaining_unit",
    "appointment_date",
    "safety_code",
    "tenure",
    "timebase",
    "CAST(tenure_timebase_id AS VARCHAR(11))",
    "CAST(gender_id AS VARCHAR(11))",
    "CAST(name_suffix_id AS VARCHAR(11))",
    "CAST(timebase_id AS VARCHAR(11))",
    "CAST(tenure_id AS VARCHAR(11))",
    "CAST(classification_id AS VARCHAR(11))",
    "CAST(collective_bargaining_identification_id AS VARCHAR(11))",
    "CAST(facility_id AS VARCHAR(11))",
    "CAST(safety_code_id AS VARCHAR(11))",
    "CAST(ethnicity_id AS VARCHAR(11))",
    "CAST(class_type_id AS VARCHAR(11))",
    "error_msg",
];

/// Staging-side operations the orchestrator depends on
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Timestamp of the most recent load; Unix epoch when the table is empty
    async fn last_load_timestamp(&self) -> Result<DateTime<Utc>, PipelineError>;

    /// Run the full staging sequence for one parsed file
    async fn load_run(
        &self,
        records: &[TransactionRecord],
        full_load: bool,
    ) -> Result<LoadReport, PipelineError>;
}

/// Postgres staging loader
///
/// Also owns the error-report upload leg: the report goes back to the
/// remote site only when validation rejected at least one row.
pub struct StagingLoader<R> {
    pool: PgPool,
    transfer: R,
    retry: RetryPolicy,
    upload_dir: String,
    error_file_name: String,
}

impl<R> StagingLoader<R> {
    pub fn new(
        pool: PgPool,
        transfer: R,
        retry: RetryPolicy,
        upload_dir: impl Into<String>,
        error_file_name: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            transfer,
            retry,
            upload_dir: upload_dir.into(),
            error_file_name: error_file_name.into(),
        }
    }
}

impl<R: RemoteTransfer> StagingLoader<R> {
    async fn insert_records(
        conn: &mut PgConnection,
        records: &[TransactionRecord],
    ) -> Result<(), sqlx::Error> {
        for chunk in records.chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder = QueryBuilder::new(
                "INSERT INTO ecr_transaction_file (transaction_code, ueid, last_name, \
                 first_name, middle_name, name_suffix, date_of_birth, gender, address_line1, \
                 address_line2, city, state, zipcode, phone_number, extension, ethnicity, \
                 agency_code, class_code, class_type, bargaining_designation, bargaining_unit, \
                 appointment_date, safety_code, tenure, timebase, reporting_unit, serial, \
                 created_date) ",
            );

            query_builder.push_values(chunk.iter(), |mut b, record| {
                b.push_bind(&record.transaction_code)
                    .push_bind(&record.ueid)
                    .push_bind(&record.last_name)
                    .push_bind(&record.first_name)
                    .push_bind(&record.middle_name)
                    .push_bind(&record.name_suffix)
                    .push_bind(&record.date_of_birth)
                    .push_bind(&record.gender)
                    .push_bind(&record.address_line1)
                    .push_bind(&record.address_line2)
                    .push_bind(&record.city)
                    .push_bind(&record.state)
                    .push_bind(&record.zipcode)
                    .push_bind(&record.phone_number)
                    .push_bind(&record.extension)
                    .push_bind(&record.ethnicity)
                    .push_bind(&record.agency_code)
                    .push_bind(&record.class_code)
                    .push_bind(&record.class_type)
                    .push_bind(&record.bargaining_designation)
                    .push_bind(&record.bargaining_unit)
                    .push_bind(&record.appointment_date)
                    .push_bind(&record.safety_code)
                    .push_bind(&record.tenure)
                    .push_bind(&record.timebase)
                    .push_bind(&record.reporting_unit)
                    .push_bind(&record.serial)
                    .push_bind(record.created_date);
            });

            query_builder.build().execute(&mut *conn).await?;
        }

        Ok(())
    }

    /// Run the validation procedure and check its sentinel
    async fn validate_staged_rows(conn: &mut PgConnection) -> Result<(), PipelineError> {
        sqlx::query(&format!(
            "SET statement_timeout = '{}s'",
            VALIDATION_TIMEOUT_SECS
        ))
        .execute(&mut *conn)
        .await?;

        let status: String = sqlx::query_scalar(&format!("SELECT {}()", VALIDATION_PROCEDURE))
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query("RESET statement_timeout")
            .execute(&mut *conn)
            .await?;

        let status = status.trim_end();
        if status != VALIDATION_SUCCESS {
            return Err(ValidationProcedureError::new(status).into());
        }

        Ok(())
    }

    async fn fetch_invalid_rows(
        conn: &mut PgConnection,
    ) -> Result<Vec<Vec<Option<String>>>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM ecr_transaction_file WHERE invalid_record = 1",
            ERROR_REPORT_COLUMNS.join(", ")
        );

        let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;

        let mut invalid = Vec::with_capacity(rows.len());
        for row in rows {
            let mut fields = Vec::with_capacity(ERROR_REPORT_COLUMNS.len());
            for index in 0..ERROR_REPORT_COLUMNS.len() {
                fields.push(row.try_get::<Option<String>, _>(index)?);
            }
            invalid.push(fields);
        }

        Ok(invalid)
    }
}

#[async_trait]
impl<R: RemoteTransfer> StagingStore for StagingLoader<R> {
    async fn last_load_timestamp(&self) -> Result<DateTime<Utc>, PipelineError> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT max(created_date) FROM ecr_transaction_file")
                .fetch_one(&self.pool)
                .await?;

        Ok(latest.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }

    async fn load_run(
        &self,
        records: &[TransactionRecord],
        full_load: bool,
    ) -> Result<LoadReport, PipelineError> {
        let mut conn = self.pool.acquire().await?;

        info!("Truncating staging table");
        sqlx::query("TRUNCATE TABLE ecr_transaction_file")
            .execute(&mut *conn)
            .await?;

        info!("Bulk inserting {} transaction rows", records.len());
        Self::insert_records(&mut conn, records).await?;

        info!(procedure = VALIDATION_PROCEDURE, "Running validation procedure");
        Self::validate_staged_rows(&mut conn).await?;

        if full_load {
            info!(procedure = RECONCILE_PROCEDURE, "Full load: reconciling retired employees");
            sqlx::query(&format!("CALL {}()", RECONCILE_PROCEDURE))
                .execute(&mut *conn)
                .await?;
        }

        let invalid_rows = Self::fetch_invalid_rows(&mut conn).await?;
        let error_count = invalid_rows.len();

        if error_count > 0 {
            warn!(
                error_count,
                file = %self.error_file_name,
                "Validation rejected rows; uploading error report"
            );
            let report = build_error_report(&invalid_rows);
            self.retry
                .run("Error report upload", || {
                    self.transfer.upload(
                        &self.upload_dir,
                        &self.error_file_name,
                        report.clone().into_bytes(),
                    )
                })
                .await?;
        }

        Ok(LoadReport {
            rows_loaded: records.len(),
            error_count,
        })
    }
}

/// Render the error report: a header line plus one line per rejected row
///
/// Fields are comma-joined; NULLs render as empty fields. The report is
/// plain UTF-8 text.
fn build_error_report(rows: &[Vec<Option<String>>]) -> String {
    let header: Vec<&str> = ERROR_REPORT_COLUMNS.iter().map(|c| header_name(c)).collect();

    let mut report = header.join(",");
    report.push('\n');

    for row in rows {
        let line: Vec<&str> = row.iter().map(|f| f.as_deref().unwrap_or("")).collect();
        report.push_str(&line.join(","));
        report.push('\n');
    }

    report
}

/// Report header name for a projection expression
///
/// `CAST(col AS VARCHAR(11))` renders as `col`; plain columns pass through.
fn header_name(expr: &str) -> &str {
    expr.strip_prefix("CAST(")
        .and_then(|rest| rest.strip_suffix(" AS VARCHAR(11))"))
        .unwrap_or(expr)
}
