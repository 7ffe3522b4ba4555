//! Delimited transaction-file parsing
//!
//! The decrypted payload is pipe-delimited text, one transaction per line.
//! Pipes inside double-quoted segments are literal field content; the
//! enclosing quotes are not. Parsing never rejects a line: rows with too few
//! or too many fields are staged as-is and judged by the database-side
//! validation procedure.

use chrono::Utc;
use tracing::debug;

use crate::models::TransactionRecord;

/// Field delimiter in the transaction file
const DELIMITER: char = '|';

/// Parser for the pipe-delimited employee transaction format
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionParser;

impl TransactionParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the decrypted file into staging records
    ///
    /// Empty lines are skipped; every other line yields exactly one record,
    /// in source order. A whitespace-only line is staged as a one-field row
    /// and judged by the validation procedure like any other. All records
    /// from one call share a single parse-time `created_date`.
    pub fn parse(&self, text: &str) -> Vec<TransactionRecord> {
        let stamp = Utc::now();

        let records: Vec<TransactionRecord> = text
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| TransactionRecord::from_fields(split_delimited(line), stamp))
            .collect();

        debug!("Parsed {} transaction records", records.len());
        records
    }
}

/// Split one line on unquoted delimiters
///
/// A double quote toggles quoted mode; delimiters inside a quoted segment
/// are literal. Quote characters themselves are not emitted into field
/// values: `a|"b|c"|d` splits into `a`, `b|c`, `d`.
fn split_delimited(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            DELIMITER if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);

    fields
}
