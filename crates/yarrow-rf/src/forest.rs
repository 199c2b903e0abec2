//! Random Forest training.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::config::{RfParameters, resolve_seed};
use crate::dataset::Dataset;
use crate::error::RfError;
use crate::tree::Tree;

/// A forest of bagged decision trees sharing one borrowed dataset.
pub struct Forest<'a> {
    pub(crate) data: Option<&'a dyn Dataset>,
    pub(crate) params: RfParameters,
    pub(crate) trees: Vec<Tree<'a>>,
}

/// Train a forest with the given seed (zero means wall-clock seeding).
///
/// Trees are grown sequentially off a single `ChaCha8Rng` stream, so a
/// fixed nonzero seed reproduces bags, tree structure, and predictions
/// bit for bit.
///
/// # Errors
///
/// Propagates [`RfParameters::validate`] failures and dataset lookup
/// errors.
pub fn train<'a>(
    data: &'a dyn Dataset,
    params: RfParameters,
    seed: u64,
) -> Result<Forest<'a>, RfError> {
    let mut rng = ChaCha8Rng::seed_from_u64(resolve_seed(seed));
    Forest::grow(data, params, &mut rng)
}

impl<'a> Forest<'a> {
    /// Train a forest drawing all randomness from `rng`.
    ///
    /// # Errors
    ///
    /// Propagates [`RfParameters::validate`] failures and dataset lookup
    /// errors.
    #[instrument(skip_all, fields(num_trees = params.num_trees(), n_samples = data.num_samples()))]
    pub fn grow<R: Rng>(
        data: &'a dyn Dataset,
        params: RfParameters,
        rng: &mut R,
    ) -> Result<Self, RfError> {
        params.validate(data)?;
        info!(
            num_features = data.num_features(),
            num_classes = data.num_classes(),
            "training random forest"
        );

        let mut trees = Vec::with_capacity(params.num_trees());
        for i in 0..params.num_trees() {
            debug!(tree = i, "building tree");
            trees.push(Tree::grow(data, params.clone(), rng)?);
        }

        info!(num_trees = trees.len(), "random forest trained");
        Ok(Self {
            data: Some(data),
            params,
            trees,
        })
    }

    /// Rebind the dataset on the forest and every tree, needed after
    /// loading a persisted model.
    pub fn set_dataset(&mut self, data: &'a dyn Dataset) {
        self.data = Some(data);
        for tree in &mut self.trees {
            tree.set_dataset(data);
        }
    }

    /// The bound dataset.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::DatasetNotBound`] for a loaded forest that has
    /// not been rebound.
    pub(crate) fn dataset(&self) -> Result<&'a dyn Dataset, RfError> {
        self.data.ok_or(RfError::DatasetNotBound)
    }

    /// Return the number of trees.
    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// The trees, in training order.
    #[must_use]
    pub fn trees(&self) -> &[Tree<'a>] {
        &self.trees
    }

    /// One tree by index.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidIndex`] when `n` is out of range.
    pub fn tree(&self, n: usize) -> Result<&Tree<'a>, RfError> {
        self.trees.get(n).ok_or(RfError::InvalidIndex {
            what: "tree index",
            index: n,
            limit: self.trees.len(),
        })
    }

    /// The training parameters.
    #[must_use]
    pub fn params(&self) -> &RfParameters {
        &self.params
    }

    /// Used by the model loader.
    pub(crate) fn from_raw(params: RfParameters, trees: Vec<Tree<'a>>) -> Self {
        Self {
            data: None,
            params,
            trees,
        }
    }
}

impl std::fmt::Debug for Forest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forest")
            .field("bound", &self.data.is_some())
            .field("num_trees", &self.trees.len())
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{Forest, train};
    use crate::config::RfParameters;
    use crate::dataset::Dataset;
    use crate::testutil::three_class_data;

    #[test]
    fn forest_has_requested_tree_count() {
        let data = three_class_data(15, 4);
        let params = RfParameters::new(7)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);
        let forest = train(&data, params, 25).unwrap();
        assert_eq!(forest.num_trees(), 7);
        assert!(forest.tree(6).is_ok());
        assert!(forest.tree(7).is_err());
    }

    #[test]
    fn trees_see_different_bags() {
        let data = three_class_data(15, 4);
        let params = RfParameters::new(2)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);
        let forest = train(&data, params, 25).unwrap();
        assert_ne!(forest.tree(0).unwrap().bag(), forest.tree(1).unwrap().bag());
    }

    #[test]
    fn same_seed_reproduces_the_forest() {
        let data = three_class_data(15, 4);
        let params = RfParameters::new(3)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);

        let f1 = train(&data, params.clone(), 25).unwrap();
        let f2 = train(&data, params, 25).unwrap();

        for n in 0..3 {
            assert_eq!(f1.tree(n).unwrap().bag(), f2.tree(n).unwrap().bag());
            assert_eq!(f1.tree(n).unwrap().oob(), f2.tree(n).unwrap().oob());
        }
        for id in data.ids() {
            let sample = data.sample(id).unwrap();
            assert_eq!(
                f1.predict(&sample).unwrap(),
                f2.predict(&sample).unwrap()
            );
        }
    }

    #[test]
    fn grow_with_external_rng_matches_train() {
        let data = three_class_data(10, 9);
        let params = RfParameters::new(2)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);

        let via_train = train(&data, params.clone(), 77).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(77);
        let via_grow = Forest::grow(&data, params, &mut rng).unwrap();

        assert_eq!(
            via_train.tree(0).unwrap().bag(),
            via_grow.tree(0).unwrap().bag()
        );
    }

    #[test]
    fn zero_tree_forest_rejected() {
        assert!(RfParameters::new(0).is_err());
    }
}
