//! I/O error types for yarrow-io.

use std::path::PathBuf;

/// Errors from reading CSV datasets.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the file contains zero data rows.
    #[error("empty dataset file: {path}")]
    EmptyFile {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a row has a different number of columns than the first.
    #[error("inconsistent column count in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentColumnCount {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index.
        row_index: usize,
        /// Expected number of columns (from the first row).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a feature cell is NaN, infinite, or unparseable.
    #[error("non-finite value in {path}: row {row_index}, column {col_index}, raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index.
        row_index: usize,
        /// Zero-based column index.
        col_index: usize,
        /// The raw cell text that failed to parse.
        raw: String,
    },

    /// Returned when the label column is not a non-negative integer.
    #[error("invalid label in {path}: row {row_index}, raw value \"{raw}\"")]
    InvalidLabel {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index.
        row_index: usize,
        /// The raw cell text that failed to parse.
        raw: String,
    },

    /// Returned when the rows cannot form a dataset (single-column file).
    #[error("{path} has {cols} columns, need at least one feature and a label")]
    TooFewColumns {
        /// Path to the CSV file.
        path: PathBuf,
        /// The number of columns found.
        cols: usize,
    },
}
