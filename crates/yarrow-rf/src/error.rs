/// Errors from Random Forest operations.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// Returned when a sample id, feature id, or class label is out of range.
    #[error("{what} {index} out of range (limit {limit})")]
    InvalidIndex {
        /// What kind of index was out of range ("sample id", "feature id", ...).
        what: &'static str,
        /// The offending index.
        index: usize,
        /// One past the largest valid index.
        limit: usize,
    },

    /// Returned when `num_trees` is zero.
    #[error("num_trees must be at least 1, got {num_trees}")]
    InvalidTreeCount {
        /// The invalid tree count provided.
        num_trees: usize,
    },

    /// Returned when `num_split_features` is zero or exceeds the feature count.
    #[error("num_split_features must be in [1, {num_features}], got {num_split_features}")]
    InvalidSplitFeatures {
        /// The invalid per-node feature count provided.
        num_split_features: usize,
        /// The number of features in the dataset.
        num_features: usize,
    },

    /// Returned when `min_score` is negative or not finite.
    #[error("min_score must be a non-negative finite value, got {min_score}")]
    InvalidMinScore {
        /// The invalid minimum score provided.
        min_score: f64,
    },

    /// Returned when the dataset has zero samples.
    #[error("dataset has zero samples")]
    EmptyDataset,

    /// Returned when a sample or column has an unexpected length.
    #[error("entry {sample_index} has length {got}, expected {expected}")]
    FeatureCountMismatch {
        /// The expected length.
        expected: usize,
        /// The actual length.
        got: usize,
        /// The zero-based index of the offending row or column.
        sample_index: usize,
    },

    /// Returned when the label vector length differs from the sample count.
    #[error("got {got} labels for {expected} samples")]
    LabelCountMismatch {
        /// The number of samples.
        expected: usize,
        /// The number of labels provided.
        got: usize,
    },

    /// Returned when the dataset has fewer than two classes.
    #[error("dataset has {num_classes} classes, need at least 2")]
    TooFewClasses {
        /// The number of classes found in the dataset.
        num_classes: usize,
    },

    /// Returned when an underlying stream read or write fails.
    #[error("model stream I/O failed")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Returned on a malformed model token stream.
    #[error("parse error near token {token_index} \"{token}\": {reason}")]
    Parse {
        /// One-based index of the offending token in the stream.
        token_index: usize,
        /// The offending token text (empty when the stream was truncated).
        token: String,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// Returned when a loaded model violates a structural invariant
    /// during prediction.
    #[error("inconsistent model: {reason}")]
    InconsistentModel {
        /// Which invariant was violated.
        reason: &'static str,
    },

    /// Returned when prediction or evaluation is attempted on a
    /// deserialized model that has not been rebound to a dataset.
    #[error("no dataset bound; call set_dataset after loading a model")]
    DatasetNotBound,

    /// Returned when an out-of-bag sample has no ground-truth label.
    #[error("sample {id} has no label but was used for out-of-bag evaluation")]
    UnknownLabel {
        /// The offending sample id.
        id: u32,
    },
}
