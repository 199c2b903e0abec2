//! CSV dataset reader with full input validation.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use yarrow_rf::{Label, MatrixDataset};

use crate::IoError;

/// Reads a classification dataset from a headerless numeric CSV file.
///
/// Expected format:
/// - No header row, no quoting, no escapes
/// - Comma-separated numeric fields, every row with the same field count
/// - The last column is the integer class label; all other columns are
///   double-precision features
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyFile`] | Zero data rows |
/// | [`IoError::TooFewColumns`] | Fewer than two columns |
/// | [`IoError::InconsistentColumnCount`] | Row length differs from the first row |
/// | [`IoError::NonFiniteValue`] | Feature cell is NaN, Inf, or unparseable |
/// | [`IoError::InvalidLabel`] | Label cell is not a non-negative integer |
pub struct CsvDatasetReader {
    path: PathBuf,
}

impl CsvDatasetReader {
    /// Create a new reader for the given CSV file path.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file, returning a [`MatrixDataset`].
    ///
    /// # Errors
    ///
    /// See the struct-level table.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<MatrixDataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) lets rows of varying length through so our own
        // InconsistentColumnCount check fires instead of a low-level
        // CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut labels: Vec<Label> = Vec::new();
        let mut expected_cols = 0usize;

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            if row_index == 0 {
                expected_cols = record.len();
                debug!(expected_cols, "read first CSV row");
                if expected_cols < 2 {
                    return Err(IoError::TooFewColumns {
                        path: self.path.clone(),
                        cols: expected_cols,
                    });
                }
            } else if record.len() != expected_cols {
                return Err(IoError::InconsistentColumnCount {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let mut features = Vec::with_capacity(expected_cols - 1);
            for col_index in 0..expected_cols - 1 {
                let raw = record.get(col_index).unwrap_or("");
                let value: f64 = raw.parse().map_err(|_| IoError::NonFiniteValue {
                    path: self.path.clone(),
                    row_index,
                    col_index,
                    raw: raw.to_string(),
                })?;
                if !value.is_finite() {
                    return Err(IoError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index,
                        col_index,
                        raw: raw.to_string(),
                    });
                }
                features.push(value);
            }

            let raw_label = record.get(expected_cols - 1).unwrap_or("");
            let label: Label = raw_label.parse().map_err(|_| IoError::InvalidLabel {
                path: self.path.clone(),
                row_index,
                raw: raw_label.to_string(),
            })?;

            rows.push(features);
            labels.push(label);
        }

        if rows.is_empty() {
            return Err(IoError::EmptyFile {
                path: self.path.clone(),
            });
        }

        let num_samples = rows.len();
        let dataset = MatrixDataset::from_rows(&rows, labels).map_err(|_| IoError::EmptyFile {
            path: self.path.clone(),
        })?;

        info!(
            n_samples = num_samples,
            n_features = expected_cols - 1,
            "dataset loaded"
        );
        Ok(dataset)
    }
}
