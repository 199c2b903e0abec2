//! Permutation-based variable importance.
//!
//! The importance of a feature is the drop in correct-class probability
//! mass over a tree's out-of-bag samples when that feature's values are
//! replaced by a random permutation of themselves. An irrelevant feature
//! drops nothing; an informative one drops a lot.

use rand::Rng;
use tracing::debug;

use crate::confusion::ConfusionMatrix;
use crate::dataset::{Dataset, Label, PermutedFeatureDataset};
use crate::error::RfError;
use crate::forest::Forest;
use crate::numeric::normalize;
use crate::tree::Tree;

impl Tree<'_> {
    /// Importance of the feature permuted in `permuted`, measured on this
    /// tree's OOB set.
    ///
    /// Computes `(Σ_c score(c,c) − Σ_c score(c,c)_permuted) / total` over
    /// the two OOB confusion matrices. A tree with an empty OOB set
    /// reports zero.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::DatasetNotBound`] on an unbound tree, plus the
    /// [`Tree::oob_predict`] errors.
    pub fn var_imp(&self, permuted: &dyn Dataset) -> Result<f64, RfError> {
        let data = self.dataset()?;
        debug_assert_eq!(data.num_classes(), permuted.num_classes());
        let num_classes = data.num_classes();

        let mut pcm = ConfusionMatrix::new(num_classes);
        self.oob_predict(&mut pcm, permuted)?;

        let mut cm = ConfusionMatrix::new(num_classes);
        self.oob_predict(&mut cm, data)?;

        debug_assert_eq!(cm.total(), pcm.total());
        if cm.total() == 0 {
            return Ok(0.0);
        }

        let mut imp = 0.0;
        for c in 0..num_classes as Label {
            imp += cm.score(c, c) - pcm.score(c, c);
        }
        Ok(imp / f64::from(cm.total()))
    }
}

impl Forest<'_> {
    /// Per-feature importances averaged over trees, and each tree's own
    /// per-feature importances.
    ///
    /// One permuted view is built per feature (drawing the permutation
    /// from `rng`) and shared across all trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::DatasetNotBound`] on an unbound forest, plus the
    /// [`Tree::var_imp`] errors.
    pub fn var_imp<R: Rng>(&self, rng: &mut R) -> Result<(Vec<f64>, Vec<Vec<f64>>), RfError> {
        let data = self.dataset()?;
        let num_features = data.num_features();

        let mut imp = vec![0.0; num_features];
        let mut tree_imps = vec![vec![0.0; num_features]; self.num_trees()];

        for ftid in 0..num_features {
            let permuted = PermutedFeatureDataset::new(data, ftid, rng)?;
            for (i, tree) in self.trees().iter().enumerate() {
                let drop = tree.var_imp(&permuted)?;
                tree_imps[i][ftid] = drop;
                imp[ftid] += drop;
            }
            debug!(feature = ftid, "scored permuted feature");
        }

        normalize(&mut imp, Some(self.num_trees() as f64));
        Ok((imp, tree_imps))
    }
}
