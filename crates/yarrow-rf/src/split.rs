//! Information-gain split search.
//!
//! [`MaxInfoGainSingleSplit`] scans one feature over one sample subset and
//! finds the threshold maximizing information gain. [`MaxInfoGainSplit`]
//! draws a random feature subset, runs the single-feature search on each,
//! and keeps the best. Both retain their intermediate arrays (sort
//! permutation, per-position gains) for inspection and for the model file.

use std::collections::HashSet;
use std::io;

use rand::Rng;

use crate::config::RfParameters;
use crate::dataset::{Dataset, Ftval, Id, IdArray, Label, Sample};
use crate::error::RfError;
use crate::serialize::TextWriter;

/// Minimum difference between two feature values for a split boundary
/// to be considered real.
pub(crate) const EPSILON: f64 = 1e-15;

/// Two floats closer than [`EPSILON`] count as equal.
pub(crate) fn fequals(x: f64, y: f64) -> bool {
    (x - y).abs() < EPSILON
}

/// Shannon entropy (base 2) of a class-count vector summing to `total`.
///
/// Uses the convention `0 * log 0 = 0`; a pure or empty vector has
/// entropy zero.
pub(crate) fn entropy(counts: &[f64], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    let mut h = 0.0;
    for &count in counts {
        if count > 0.0 {
            let p = count / n;
            h -= p * p.log2();
        }
    }
    h
}

/// True when at most one class bucket is populated.
pub(crate) fn is_pure(counts: &[f64]) -> bool {
    counts.iter().filter(|&&c| c > 0.0).count() == 1
}

/// Capability interface for a node's split handler.
///
/// The only implementation today maximizes information gain; the model
/// codec dispatches on a record-type tag, so alternative selectors can be
/// added without touching the node or tree code.
pub trait SplitSelector: std::fmt::Debug + Send + Sync {
    /// True when a worthwhile split was found and the node must branch.
    fn split_required(&self) -> bool;

    /// The score of the best tested split, zero when nothing qualified.
    fn score(&self) -> f64;

    /// Feature id of the chosen split, if any.
    fn best_feature(&self) -> Option<Id>;

    /// Threshold of the chosen split, if any.
    fn split_value(&self) -> Option<Ftval>;

    /// Partition the node's sample ids into (left, right).
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InconsistentModel`] when no split was chosen.
    fn split_samples(&self) -> Result<(IdArray, IdArray), RfError>;

    /// Decide the branch for a sample: `false` is left, `true` is right.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InconsistentModel`] when no split was chosen, or
    /// [`RfError::InvalidIndex`] when the sample is too short to route.
    fn route(&self, sample: &dyn Sample) -> Result<bool, RfError>;

    /// Serialize this selector as a tagged record.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying writer.
    fn write(&self, w: &mut TextWriter<'_>) -> io::Result<()>;
}

/// The best binary split of a single feature over one sample subset.
///
/// The split value is the midpoint of the feature values on either side
/// of the chosen position in sorted order.
#[derive(Debug, Clone)]
pub struct MaxInfoGainSingleSplit {
    /// Sample ids of the node, in the caller's order.
    pub(crate) ids: IdArray,
    /// The feature tested.
    pub(crate) ftid: Id,
    /// Permutation of `0..ids.len()` sorting the feature values ascending.
    pub(crate) perm: Vec<u32>,
    /// Parent class counts, summing to `ids.len()`.
    pub(crate) counts: Vec<f64>,
    /// Information gain at every split position; position 0 is defined as 0.
    pub(crate) ig: Vec<f64>,
    /// Position of the maximum gain, 0 when no valid boundary exists.
    pub(crate) splitpos: usize,
    /// Threshold at `splitpos`, NaN when no valid boundary exists.
    pub(crate) splitval: Ftval,
}

impl MaxInfoGainSingleSplit {
    /// Search `fts` (the feature values of `ids`, in `ids` order) for the
    /// split position with the maximum information gain.
    ///
    /// `counts` are the parent class counts and must sum to `ids.len()`.
    /// The sort permutation is computed with a random-pivot quicksort
    /// drawing from `rng`; ties are ordered arbitrarily.
    pub(crate) fn search<R: Rng>(
        fts: &[Ftval],
        ftid: Id,
        labels: &[Label],
        ids: &[Id],
        counts: Vec<f64>,
        rng: &mut R,
    ) -> Self {
        debug_assert!(!ids.is_empty());
        debug_assert_eq!(fts.len(), labels.len());
        debug_assert_eq!(fts.len(), ids.len());

        let perm = sort_permutation(fts, rng);
        let mut split = Self {
            ids: ids.to_vec(),
            ftid,
            perm,
            counts,
            ig: vec![0.0; ids.len()],
            splitpos: 0,
            splitval: Ftval::NAN,
        };
        split.info_gain(fts, labels);
        split
    }

    /// Gain at every position `i`: parent entropy minus the weighted
    /// entropy of `sorted[..i]` and `sorted[i..]`. One sample moves from
    /// the right partition to the left per step, so each position costs
    /// only two bucket updates.
    fn info_gain(&mut self, fts: &[Ftval], labels: &[Label]) {
        let n = self.ids.len();
        let ht = entropy(&self.counts, n);

        let mut counts_left = vec![0.0; self.counts.len()];
        let mut counts_right = self.counts.clone();

        for i in 1..n {
            let moved = labels[self.perm[i - 1] as usize] as usize;
            counts_left[moved] += 1.0;
            counts_right[moved] -= 1.0;

            let h = (i as f64 * entropy(&counts_left, i)
                + (n - i) as f64 * entropy(&counts_right, n - i))
                / n as f64;

            // A boundary between equal feature values cannot be tested at
            // prediction time, so its gain is forced to zero.
            let prev = fts[self.perm[i - 1] as usize];
            let next = fts[self.perm[i] as usize];
            if fequals(prev, next) {
                self.ig[i] = 0.0;
            } else {
                self.ig[i] = ht - h;
                if self.ig[i] > self.ig[self.splitpos] {
                    self.splitpos = i;
                    self.splitval = (prev + next) / 2.0;
                }
            }
        }
    }

    /// The information gain of the chosen position (zero when none).
    #[must_use]
    pub fn best_gain(&self) -> f64 {
        self.ig[self.splitpos]
    }

    /// The threshold of the chosen position, NaN when none.
    #[must_use]
    pub fn split_value(&self) -> Ftval {
        self.splitval
    }

    /// The chosen split position in sorted order.
    #[must_use]
    pub fn split_position(&self) -> usize {
        self.splitpos
    }

    /// The feature this split was searched on.
    #[must_use]
    pub fn feature_id(&self) -> Id {
        self.ftid
    }

    /// The parent class counts (unnormalized).
    #[must_use]
    pub fn class_counts(&self) -> &[f64] {
        &self.counts
    }

    /// The full per-position gain array.
    #[must_use]
    pub fn info_gain_array(&self) -> &[f64] {
        &self.ig
    }

    /// The permutation sorting the feature values ascending.
    #[must_use]
    pub fn permutation(&self) -> &[u32] {
        &self.perm
    }

    /// Split the node's ids at the chosen position, preserving
    /// sorted-by-feature order within each side.
    #[must_use]
    pub fn split_samples(&self) -> (IdArray, IdArray) {
        let left = self.perm[..self.splitpos]
            .iter()
            .map(|&p| self.ids[p as usize])
            .collect();
        let right = self.perm[self.splitpos..]
            .iter()
            .map(|&p| self.ids[p as usize])
            .collect();
        (left, right)
    }

    /// Used by the model loader, which bypasses the search.
    pub(crate) fn from_raw(
        ids: IdArray,
        ftid: Id,
        perm: Vec<u32>,
        counts: Vec<f64>,
        ig: Vec<f64>,
        splitpos: usize,
        splitval: Ftval,
    ) -> Self {
        Self {
            ids,
            ftid,
            perm,
            counts,
            ig,
            splitpos,
            splitval,
        }
    }
}

/// Permutation of `0..fts.len()` sorting `fts` ascending, computed with an
/// in-place quicksort whose pivot is drawn uniformly from `rng`.
fn sort_permutation<R: Rng>(fts: &[Ftval], rng: &mut R) -> Vec<u32> {
    let mut perm: Vec<u32> = (0..fts.len() as u32).collect();
    qsort(fts, &mut perm, 0, fts.len(), rng);
    perm
}

/// Sort `perm[s..t]` by feature value.
fn qsort<R: Rng>(fts: &[Ftval], perm: &mut [u32], s: usize, t: usize, rng: &mut R) {
    if t - s > 1 {
        let q = qpart(fts, perm, s, t, rng);
        qsort(fts, perm, s, q, rng);
        qsort(fts, perm, q + 1, t, rng);
    }
}

/// Partition `perm[s..t]` around a randomly chosen pivot; returns the
/// pivot's final position.
fn qpart<R: Rng>(fts: &[Ftval], perm: &mut [u32], s: usize, t: usize, rng: &mut R) -> usize {
    let r = rng.gen_range(s..t);
    perm.swap(r, t - 1);
    let pivot = fts[perm[t - 1] as usize];

    let mut i = s;
    for j in s..t - 1 {
        if fts[perm[j] as usize] <= pivot {
            perm.swap(i, j);
            i += 1;
        }
    }
    perm.swap(i, t - 1);
    i
}

/// Split selector testing several randomly chosen features for the binary
/// split with the maximum information gain.
///
/// A pure node tests nothing. Otherwise `num_split_features` distinct
/// features are drawn without replacement and searched one by one; the
/// split is worthwhile only when the best gain strictly exceeds
/// `min_score`.
#[derive(Debug)]
pub struct MaxInfoGainSplit {
    /// Parent class counts, summing to the node's sample count.
    pub(crate) counts: Vec<f64>,
    /// Whether a worthwhile split was found.
    pub(crate) got_split: bool,
    /// Index of the best tested split in `splits`.
    pub(crate) best: Option<usize>,
    /// All tested single-feature splits.
    pub(crate) splits: Vec<MaxInfoGainSingleSplit>,
}

impl MaxInfoGainSplit {
    /// Search for the best split of `ids`, drawing feature choices and
    /// sort pivots from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidIndex`] if the dataset rejects a feature
    /// lookup.
    pub(crate) fn search<R: Rng>(
        params: &RfParameters,
        data: &dyn Dataset,
        labels: &[Label],
        ids: &[Id],
        counts: Vec<f64>,
        rng: &mut R,
    ) -> Result<Self, RfError> {
        debug_assert!(!ids.is_empty());
        debug_assert_eq!(labels.len(), ids.len());
        debug_assert_eq!(counts.iter().sum::<f64>() as usize, ids.len());

        let mut selector = Self {
            counts,
            got_split: false,
            best: None,
            splits: Vec::new(),
        };
        if !is_pure(&selector.counts) {
            selector.test_features(params, data, labels, ids, rng)?;
        }
        Ok(selector)
    }

    fn test_features<R: Rng>(
        &mut self,
        params: &RfParameters,
        data: &dyn Dataset,
        labels: &[Label],
        ids: &[Id],
        rng: &mut R,
    ) -> Result<(), RfError> {
        self.splits.reserve(params.num_split_features);

        let mut best_gain = 0.0;
        let mut selected: HashSet<usize> = HashSet::new();

        for i in 0..params.num_split_features {
            // Resample on collision so each feature is tested at most once.
            let ftid = loop {
                let r = rng.gen_range(0..data.num_features());
                if selected.insert(r) {
                    break r;
                }
            };

            let fts = data.feature(ftid)?.gather(ids);
            let split = MaxInfoGainSingleSplit::search(
                &fts,
                ftid as Id,
                labels,
                ids,
                self.counts.clone(),
                rng,
            );

            let gain = split.best_gain();
            self.splits.push(split);
            if gain > best_gain {
                best_gain = gain;
                self.best = Some(i);
            }
        }

        self.got_split = best_gain > params.min_score;
        Ok(())
    }

    /// The best tested single-feature split, if any tested split had a
    /// positive gain.
    #[must_use]
    pub fn best_split(&self) -> Option<&MaxInfoGainSingleSplit> {
        self.best.map(|i| &self.splits[i])
    }

    /// All tested single-feature splits.
    #[must_use]
    pub fn tested_splits(&self) -> &[MaxInfoGainSingleSplit] {
        &self.splits
    }

    /// Used by the model loader, which bypasses the search.
    pub(crate) fn from_raw(
        counts: Vec<f64>,
        got_split: bool,
        best: Option<usize>,
        splits: Vec<MaxInfoGainSingleSplit>,
    ) -> Self {
        Self {
            counts,
            got_split,
            best,
            splits,
        }
    }
}

impl SplitSelector for MaxInfoGainSplit {
    fn split_required(&self) -> bool {
        self.got_split
    }

    fn score(&self) -> f64 {
        self.best_split().map_or(0.0, MaxInfoGainSingleSplit::best_gain)
    }

    fn best_feature(&self) -> Option<Id> {
        self.best_split().map(MaxInfoGainSingleSplit::feature_id)
    }

    fn split_value(&self) -> Option<Ftval> {
        self.best_split().map(MaxInfoGainSingleSplit::split_value)
    }

    fn split_samples(&self) -> Result<(IdArray, IdArray), RfError> {
        let split = self.best_split().ok_or(RfError::InconsistentModel {
            reason: "splitting a node without a chosen split",
        })?;
        Ok(split.split_samples())
    }

    fn route(&self, sample: &dyn Sample) -> Result<bool, RfError> {
        let split = self.best_split().ok_or(RfError::InconsistentModel {
            reason: "routing through a node without a chosen split",
        })?;
        let ftid = split.feature_id() as usize;
        if ftid >= sample.num_features() {
            return Err(RfError::InvalidIndex {
                what: "feature id",
                index: ftid,
                limit: sample.num_features(),
            });
        }
        Ok(sample.value(ftid) >= split.split_value())
    }

    fn write(&self, w: &mut TextWriter<'_>) -> io::Result<()> {
        self.write_record(w)
    }
}
