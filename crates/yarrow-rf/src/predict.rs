//! Forest-level prediction.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::dataset::{Ftval, Label, Sample, SliceSample};
use crate::error::RfError;
use crate::forest::Forest;
use crate::numeric::{class_of_max_prob, normalize};

impl Forest<'_> {
    /// Predict the aggregated class distribution for a sample.
    ///
    /// Sums the per-tree leaf distributions componentwise and normalizes
    /// the result to sum to one.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::DatasetNotBound`] on an unbound forest and
    /// [`RfError::InconsistentModel`] on a malformed node graph.
    pub fn predict(&self, sample: &dyn Sample) -> Result<Vec<f64>, RfError> {
        Ok(self.predict_full(sample)?.0)
    }

    /// Predict a sample and also return each tree's own distribution.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::predict`].
    pub fn predict_full(
        &self,
        sample: &dyn Sample,
    ) -> Result<(Vec<f64>, Vec<Vec<f64>>), RfError> {
        let data = self.dataset()?;

        let mut dist = vec![0.0; data.num_classes()];
        let mut tree_dists = Vec::with_capacity(self.num_trees());
        for tree in self.trees() {
            let tree_dist = tree.root().predict(sample)?;
            for (total, p) in dist.iter_mut().zip(&tree_dist) {
                *total += p;
            }
            tree_dists.push(tree_dist);
        }

        normalize(&mut dist, None);
        Ok((dist, tree_dists))
    }

    /// Predict hard class labels for a batch of row-major samples.
    ///
    /// Trees and forest are immutable during prediction, so the rows are
    /// scored in parallel.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::predict`].
    pub fn predict_batch(&self, rows: &[Vec<Ftval>]) -> Result<Vec<Label>, RfError> {
        rows.into_par_iter()
            .map(|row| {
                let dist = self.predict(&SliceSample::new(row))?;
                Ok(class_of_max_prob(&dist))
            })
            .collect()
    }
}
