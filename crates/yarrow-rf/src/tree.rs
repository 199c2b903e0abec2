//! A single bagged decision tree.

use rand::Rng;
use tracing::debug;

use crate::config::RfParameters;
use crate::dataset::{Dataset, Id, IdArray, Sample};
use crate::error::RfError;
use crate::node::Node;

/// One tree of the forest, trained on a bootstrap sample of the dataset.
///
/// The tree borrows its dataset; after deserialization the borrow is
/// absent and must be restored with [`Tree::set_dataset`] before any
/// out-of-bag evaluation.
pub struct Tree<'a> {
    pub(crate) data: Option<&'a dyn Dataset>,
    pub(crate) params: RfParameters,
    /// All dataset ids at training time.
    pub(crate) ids: IdArray,
    /// The bootstrap multiset: `ids.len()` draws with replacement.
    pub(crate) bag: IdArray,
    /// Ids never drawn into the bag.
    pub(crate) oob: IdArray,
    pub(crate) root: Node,
}

impl<'a> Tree<'a> {
    /// Train a tree on a fresh bootstrap sample drawn from `rng`.
    ///
    /// # Errors
    ///
    /// Propagates [`RfParameters::validate`] failures and dataset lookup
    /// errors.
    pub fn grow<R: Rng>(
        data: &'a dyn Dataset,
        params: RfParameters,
        rng: &mut R,
    ) -> Result<Self, RfError> {
        params.validate(data)?;

        let ids = data.ids();
        let (bag, oob) = random_bag_oob(&ids, rng);
        debug!(
            n = ids.len(),
            oob = oob.len(),
            "drew bootstrap sample"
        );

        let root = Node::grow(&params, data, &bag, 0, rng)?;
        Ok(Self {
            data: Some(data),
            params,
            ids,
            bag,
            oob,
            root,
        })
    }

    /// Rebind the dataset, needed after loading a persisted tree.
    pub fn set_dataset(&mut self, data: &'a dyn Dataset) {
        self.data = Some(data);
    }

    /// The bound dataset.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::DatasetNotBound`] for a loaded tree that has not
    /// been rebound.
    pub(crate) fn dataset(&self) -> Result<&'a dyn Dataset, RfError> {
        self.data.ok_or(RfError::DatasetNotBound)
    }

    /// Predict the class distribution for a sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InconsistentModel`] if the node graph is
    /// malformed.
    pub fn predict(&self, sample: &dyn Sample) -> Result<Vec<f64>, RfError> {
        self.root.predict(sample)
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The full id list captured at training time.
    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// The bootstrap multiset this tree was trained on.
    #[must_use]
    pub fn bag(&self) -> &[Id] {
        &self.bag
    }

    /// The out-of-bag ids of this tree.
    #[must_use]
    pub fn oob(&self) -> &[Id] {
        &self.oob
    }

    /// The training parameters.
    #[must_use]
    pub fn params(&self) -> &RfParameters {
        &self.params
    }

    /// Used by the model loader.
    pub(crate) fn from_raw(
        params: RfParameters,
        ids: IdArray,
        bag: IdArray,
        oob: IdArray,
        root: Node,
    ) -> Self {
        Self {
            data: None,
            params,
            ids,
            bag,
            oob,
            root,
        }
    }
}

impl std::fmt::Debug for Tree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("bound", &self.data.is_some())
            .field("n", &self.ids.len())
            .field("oob", &self.oob.len())
            .finish_non_exhaustive()
    }
}

/// Draw `ids.len()` ids uniformly with replacement; the out-of-bag set is
/// every id never drawn, in id order.
fn random_bag_oob<R: Rng>(ids: &[Id], rng: &mut R) -> (IdArray, IdArray) {
    let mut selected = vec![false; ids.len()];
    let mut bag = Vec::with_capacity(ids.len());

    for _ in 0..ids.len() {
        let r = rng.gen_range(0..ids.len());
        bag.push(ids[r]);
        selected[r] = true;
    }

    let oob = ids
        .iter()
        .zip(&selected)
        .filter(|&(_, &sel)| !sel)
        .map(|(&id, _)| id)
        .collect();
    (bag, oob)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{Tree, random_bag_oob};
    use crate::config::RfParameters;
    use crate::dataset::{Dataset, MatrixDataset};

    fn three_class_data(n_per_class: usize, seed: u64) -> MatrixDataset {
        use rand::Rng;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3u32 {
            for _ in 0..n_per_class {
                rows.push(vec![
                    class as f64 * 3.0 + rng.r#gen::<f64>(),
                    rng.r#gen::<f64>(),
                ]);
                labels.push(class);
            }
        }
        MatrixDataset::from_rows(&rows, labels).unwrap()
    }

    #[test]
    fn bag_and_oob_are_complements() {
        let ids: Vec<u32> = (0..100).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let (bag, oob) = random_bag_oob(&ids, &mut rng);

        assert_eq!(bag.len(), ids.len());
        let bagged: HashSet<u32> = bag.iter().copied().collect();
        let oob_set: HashSet<u32> = oob.iter().copied().collect();
        assert!(bagged.is_disjoint(&oob_set));

        let mut union: Vec<u32> = bagged.union(&oob_set).copied().collect();
        union.sort_unstable();
        assert_eq!(union, ids);
    }

    #[test]
    fn grown_tree_predicts_training_classes() {
        let data = three_class_data(20, 1);
        let params = RfParameters::new(1)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);
        let mut rng = ChaCha8Rng::seed_from_u64(25);
        let tree = Tree::grow(&data, params, &mut rng).unwrap();

        // In-bag samples are classified perfectly by a fully grown tree.
        let bag_set: HashSet<u32> = tree.bag().iter().copied().collect();
        for &id in &bag_set {
            let sample = data.sample(id).unwrap();
            let dist = tree.predict(&sample).unwrap();
            let predicted = dist
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(c, _)| c as u32)
                .unwrap();
            assert_eq!(predicted, data.labels(&[id]).unwrap()[0]);
        }
    }

    #[test]
    fn same_seed_same_bag_and_structure() {
        let data = three_class_data(20, 2);
        let params = RfParameters::new(1)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);

        let mut rng1 = ChaCha8Rng::seed_from_u64(25);
        let mut rng2 = ChaCha8Rng::seed_from_u64(25);
        let tree1 = Tree::grow(&data, params.clone(), &mut rng1).unwrap();
        let tree2 = Tree::grow(&data, params, &mut rng2).unwrap();

        assert_eq!(tree1.bag(), tree2.bag());
        assert_eq!(tree1.oob(), tree2.oob());
        for id in data.ids() {
            let sample = data.sample(id).unwrap();
            assert_eq!(
                tree1.predict(&sample).unwrap(),
                tree2.predict(&sample).unwrap()
            );
        }
    }

    #[test]
    fn invalid_params_rejected_before_training() {
        let data = three_class_data(5, 3);
        let params = RfParameters::new(1).unwrap().with_num_split_features(10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(Tree::grow(&data, params, &mut rng).is_err());
    }
}
