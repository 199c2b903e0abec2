//! CSV dataset loading for yarrow-rf.
//!
//! Reads headerless numeric CSV files (last column is the integer class
//! label) into a [`yarrow_rf::MatrixDataset`], with full validation of
//! shapes, values, and labels.

mod error;
mod reader;

pub use error::IoError;
pub use reader::CsvDatasetReader;
