//! Out-of-bag evaluation for trees and forests.

use crate::confusion::ConfusionMatrix;
use crate::dataset::{Dataset, Sample};
use crate::error::RfError;
use crate::forest::Forest;
use crate::numeric::normalize;
use crate::tree::Tree;

impl Tree<'_> {
    /// Predict every out-of-bag sample of this tree against `data` and
    /// record the results into `cm`.
    ///
    /// `data` is passed explicitly so the same OOB set can be evaluated
    /// against a permuted view of the training data.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::InvalidIndex`] | an OOB id is rejected by `data` |
    /// | [`RfError::UnknownLabel`] | an OOB sample has no ground-truth label |
    /// | [`RfError::InconsistentModel`] | the node graph is malformed |
    pub fn oob_predict(
        &self,
        cm: &mut ConfusionMatrix,
        data: &dyn Dataset,
    ) -> Result<(), RfError> {
        debug_assert_eq!(data.num_classes(), cm.num_classes());

        for &id in self.oob() {
            let sample = data.sample(id)?;
            let dist = self.root().predict(&sample)?;
            let label = sample.label().ok_or(RfError::UnknownLabel { id })?;
            cm.record(label, &dist);
        }
        Ok(())
    }

    /// Per-class OOB error rates and the overall class-weighted rate.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::DatasetNotBound`] on a loaded tree that has not
    /// been rebound, plus the [`Tree::oob_predict`] errors.
    pub fn oob_errors(&self) -> Result<(Vec<f64>, f64), RfError> {
        let data = self.dataset()?;
        let mut cm = ConfusionMatrix::new(data.num_classes());
        self.oob_predict(&mut cm, data)?;
        Ok(cm.class_error_rates())
    }
}

impl Forest<'_> {
    /// Per-class OOB error rates averaged over trees, and each tree's own
    /// per-class rates.
    ///
    /// Each tree is evaluated on its own OOB confusion matrix; the forest
    /// figure is the arithmetic mean across trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::DatasetNotBound`] on an unbound forest, plus the
    /// [`Tree::oob_errors`] errors.
    pub fn oob_errors(&self) -> Result<(Vec<f64>, Vec<Vec<f64>>), RfError> {
        let data = self.dataset()?;

        let mut err = vec![0.0; data.num_classes()];
        let mut tree_errs = Vec::with_capacity(self.num_trees());
        for tree in self.trees() {
            let (per_class, _overall) = tree.oob_errors()?;
            for (total, e) in err.iter_mut().zip(&per_class) {
                *total += e;
            }
            tree_errs.push(per_class);
        }

        normalize(&mut err, Some(self.num_trees() as f64));
        Ok((err, tree_errs))
    }
}
