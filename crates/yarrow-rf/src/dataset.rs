//! Read-only dataset façade consumed by training, evaluation, and prediction.
//!
//! The forest never owns its data. Training borrows a [`Dataset`], and the
//! same dataset (or a [`PermutedFeatureDataset`] view over it) is borrowed
//! again for out-of-bag evaluation and variable importance.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::RfError;

/// Dense sample identifier, unique within one dataset.
pub type Id = u32;

/// Zero-based class label.
pub type Label = u32;

/// Scalar feature value.
pub type Ftval = f64;

/// Ordered list of sample ids.
pub type IdArray = Vec<Id>;

/// A read-only view over samples, labels, and features.
///
/// `num_classes` is the maximum training label plus one. Implementations
/// store features column-major so that [`Dataset::feature`] can hand out a
/// borrowed slice without copying.
pub trait Dataset: Sync {
    /// Return the number of samples.
    fn num_samples(&self) -> usize;

    /// Return the number of features.
    fn num_features(&self) -> usize;

    /// Return the number of classes.
    fn num_classes(&self) -> usize;

    /// Return all sample ids in order, `0..num_samples`.
    fn ids(&self) -> IdArray {
        (0..self.num_samples() as Id).collect()
    }

    /// Gather the labels of `ids`, in `ids` order.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidIndex`] if any id is out of range.
    fn labels(&self, ids: &[Id]) -> Result<Vec<Label>, RfError>;

    /// Return a view over one feature column.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidIndex`] if `ftid` is out of range.
    fn feature(&self, ftid: usize) -> Result<FeatureView<'_>, RfError>;

    /// Return a view over one sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidIndex`] if `id` is out of range.
    fn sample(&self, id: Id) -> Result<SampleView<'_>, RfError>;

    /// Point lookup: the value of feature `ftid` for sample `id`.
    ///
    /// # Panics
    ///
    /// May panic if `ftid` or `id` is out of range; use [`Dataset::feature`]
    /// or [`Dataset::sample`] for checked access.
    fn value(&self, ftid: usize, id: Id) -> Ftval;
}

/// Borrowed view over a single feature column.
#[derive(Debug, Clone, Copy)]
pub struct FeatureView<'a> {
    values: &'a [Ftval],
}

impl<'a> FeatureView<'a> {
    pub(crate) fn new(values: &'a [Ftval]) -> Self {
        Self { values }
    }

    /// The feature value of sample `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[must_use]
    pub fn value(&self, id: Id) -> Ftval {
        self.values[id as usize]
    }

    /// Gather the feature values of `ids`, in `ids` order.
    ///
    /// # Panics
    ///
    /// Panics if any id is out of range.
    #[must_use]
    pub fn gather(&self, ids: &[Id]) -> Vec<Ftval> {
        ids.iter().map(|&id| self.values[id as usize]).collect()
    }

    /// Return the number of samples covered by this view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Return `true` when the view covers zero samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single observation presented to the trees.
///
/// Prediction routes on [`Sample::value`]; the label is optional because
/// prediction-time inputs may be unlabelled.
pub trait Sample {
    /// Return the number of features.
    fn num_features(&self) -> usize;

    /// Return the value of feature `ftid`.
    fn value(&self, ftid: usize) -> Ftval;

    /// Return the ground-truth label, if known.
    fn label(&self) -> Option<Label>;
}

/// A sample borrowed from a [`Dataset`].
#[derive(Clone, Copy)]
pub struct SampleView<'a> {
    data: &'a dyn Dataset,
    id: Id,
    label: Option<Label>,
}

impl<'a> SampleView<'a> {
    pub(crate) fn new(data: &'a dyn Dataset, id: Id, label: Option<Label>) -> Self {
        Self { data, id, label }
    }

    /// Return the id of this sample in its dataset.
    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }
}

impl Sample for SampleView<'_> {
    fn num_features(&self) -> usize {
        self.data.num_features()
    }

    fn value(&self, ftid: usize) -> Ftval {
        self.data.value(ftid, self.id)
    }

    fn label(&self) -> Option<Label> {
        self.label
    }
}

/// A sample backed by a plain slice of feature values, for inputs that
/// are not part of any dataset.
#[derive(Debug, Clone, Copy)]
pub struct SliceSample<'a> {
    values: &'a [Ftval],
    label: Option<Label>,
}

impl<'a> SliceSample<'a> {
    /// Create an unlabelled sample over `values`.
    #[must_use]
    pub fn new(values: &'a [Ftval]) -> Self {
        Self {
            values,
            label: None,
        }
    }

    /// Create a labelled sample over `values`.
    #[must_use]
    pub fn with_label(values: &'a [Ftval], label: Label) -> Self {
        Self {
            values,
            label: Some(label),
        }
    }
}

impl Sample for SliceSample<'_> {
    fn num_features(&self) -> usize {
        self.values.len()
    }

    fn value(&self, ftid: usize) -> Ftval {
        self.values[ftid]
    }

    fn label(&self) -> Option<Label> {
        self.label
    }
}

/// An owned, fully labelled dataset stored column-major.
#[derive(Debug, Clone)]
pub struct MatrixDataset {
    /// Feature columns, `columns[ftid][id]`.
    columns: Vec<Vec<Ftval>>,
    labels: Vec<Label>,
    num_classes: usize,
}

impl MatrixDataset {
    /// Build a dataset from row-major samples and their labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | `rows` is empty or has zero columns |
    /// | [`RfError::FeatureCountMismatch`] | rows have inconsistent lengths |
    /// | [`RfError::LabelCountMismatch`] | `labels.len() != rows.len()` |
    pub fn from_rows(rows: &[Vec<Ftval>], labels: Vec<Label>) -> Result<Self, RfError> {
        if rows.is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let num_features = rows[0].len();
        if num_features == 0 {
            return Err(RfError::EmptyDataset);
        }
        for (sample_index, row) in rows.iter().enumerate() {
            if row.len() != num_features {
                return Err(RfError::FeatureCountMismatch {
                    expected: num_features,
                    got: row.len(),
                    sample_index,
                });
            }
        }

        let columns: Vec<Vec<Ftval>> = (0..num_features)
            .map(|ftid| rows.iter().map(|row| row[ftid]).collect())
            .collect();
        Self::from_columns(columns, labels)
    }

    /// Build a dataset from column-major feature vectors and labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | zero columns or zero samples |
    /// | [`RfError::FeatureCountMismatch`] | columns have inconsistent lengths |
    /// | [`RfError::LabelCountMismatch`] | `labels.len()` differs from the sample count |
    pub fn from_columns(columns: Vec<Vec<Ftval>>, labels: Vec<Label>) -> Result<Self, RfError> {
        if columns.is_empty() || columns[0].is_empty() {
            return Err(RfError::EmptyDataset);
        }
        let num_samples = columns[0].len();
        for (ftid, column) in columns.iter().enumerate() {
            if column.len() != num_samples {
                return Err(RfError::FeatureCountMismatch {
                    expected: num_samples,
                    got: column.len(),
                    sample_index: ftid,
                });
            }
        }
        if labels.len() != num_samples {
            return Err(RfError::LabelCountMismatch {
                expected: num_samples,
                got: labels.len(),
            });
        }

        let num_classes = labels.iter().max().map_or(0, |&max| max as usize + 1);
        Ok(Self {
            columns,
            labels,
            num_classes,
        })
    }
}

impl Dataset for MatrixDataset {
    fn num_samples(&self) -> usize {
        self.labels.len()
    }

    fn num_features(&self) -> usize {
        self.columns.len()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn labels(&self, ids: &[Id]) -> Result<Vec<Label>, RfError> {
        ids.iter()
            .map(|&id| {
                self.labels
                    .get(id as usize)
                    .copied()
                    .ok_or(RfError::InvalidIndex {
                        what: "sample id",
                        index: id as usize,
                        limit: self.labels.len(),
                    })
            })
            .collect()
    }

    fn feature(&self, ftid: usize) -> Result<FeatureView<'_>, RfError> {
        self.columns
            .get(ftid)
            .map(|column| FeatureView::new(column))
            .ok_or(RfError::InvalidIndex {
                what: "feature id",
                index: ftid,
                limit: self.columns.len(),
            })
    }

    fn sample(&self, id: Id) -> Result<SampleView<'_>, RfError> {
        let label = self
            .labels
            .get(id as usize)
            .copied()
            .ok_or(RfError::InvalidIndex {
                what: "sample id",
                index: id as usize,
                limit: self.labels.len(),
            })?;
        Ok(SampleView::new(self, id, Some(label)))
    }

    fn value(&self, ftid: usize, id: Id) -> Ftval {
        self.columns[ftid][id as usize]
    }
}

/// A thin view over another dataset with one feature's values reassigned
/// by a uniform random permutation.
///
/// Labels and every other feature delegate to the underlying dataset.
/// Used by variable importance: the drop in correct-class probability mass
/// under the permuted view measures how much the feature matters.
pub struct PermutedFeatureDataset<'a> {
    data: &'a dyn Dataset,
    ftid: usize,
    permuted: Vec<Ftval>,
}

impl<'a> PermutedFeatureDataset<'a> {
    /// Build the permuted view, drawing the permutation from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidIndex`] if `ftid` is out of range.
    pub fn new(data: &'a dyn Dataset, ftid: usize, rng: &mut impl Rng) -> Result<Self, RfError> {
        let ids = data.ids();
        let mut permuted = data.feature(ftid)?.gather(&ids);
        permuted.shuffle(rng);
        Ok(Self {
            data,
            ftid,
            permuted,
        })
    }

    /// Return the id of the permuted feature.
    #[must_use]
    pub fn permuted_feature(&self) -> usize {
        self.ftid
    }
}

impl Dataset for PermutedFeatureDataset<'_> {
    fn num_samples(&self) -> usize {
        self.data.num_samples()
    }

    fn num_features(&self) -> usize {
        self.data.num_features()
    }

    fn num_classes(&self) -> usize {
        self.data.num_classes()
    }

    fn labels(&self, ids: &[Id]) -> Result<Vec<Label>, RfError> {
        self.data.labels(ids)
    }

    fn feature(&self, ftid: usize) -> Result<FeatureView<'_>, RfError> {
        if ftid == self.ftid {
            Ok(FeatureView::new(&self.permuted))
        } else {
            self.data.feature(ftid)
        }
    }

    fn sample(&self, id: Id) -> Result<SampleView<'_>, RfError> {
        let label = self.data.sample(id)?.label();
        Ok(SampleView::new(self, id, label))
    }

    fn value(&self, ftid: usize, id: Id) -> Ftval {
        if ftid == self.ftid {
            self.permuted[id as usize]
        } else {
            self.data.value(ftid, id)
        }
    }
}
