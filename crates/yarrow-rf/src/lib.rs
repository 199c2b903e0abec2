//! Random Forest classification: train, evaluate, persist, predict.
//!
//! Provides a hand-rolled Random Forest classifier built from
//! information-gain decision trees, with out-of-bag error estimation,
//! permutation-based variable importance, and a self-describing text
//! format for persisting trained forests.
//!
//! Training is single-threaded over one explicit RNG stream, so a fixed
//! seed reproduces bags, tree structure, and predictions bit for bit;
//! batch prediction parallelizes over samples with rayon.

mod config;
mod confusion;
mod dataset;
mod deserialize;
mod error;
mod forest;
mod importance;
mod node;
mod numeric;
mod oob;
mod predict;
mod serialize;
mod split;
mod tree;

pub use config::{RfParameters, resolve_seed};
pub use confusion::ConfusionMatrix;
pub use dataset::{
    Dataset, FeatureView, Ftval, Id, IdArray, Label, MatrixDataset, PermutedFeatureDataset,
    Sample, SampleView, SliceSample,
};
pub use error::RfError;
pub use forest::{Forest, train};
pub use node::Node;
pub use numeric::class_of_max_prob;
pub use serialize::TextWriter;
pub use split::{MaxInfoGainSingleSplit, MaxInfoGainSplit, SplitSelector};
pub use tree::Tree;

#[cfg(test)]
pub(crate) mod testutil {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use crate::dataset::MatrixDataset;

    /// Three-class dataset over three features: feature 0 separates the
    /// classes, features 1 and 2 are uniform noise.
    pub(crate) fn three_class_data(n_per_class: usize, seed: u64) -> MatrixDataset {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for class in 0..3u32 {
            for _ in 0..n_per_class {
                rows.push(vec![
                    f64::from(class) * 3.0 + rng.r#gen::<f64>(),
                    rng.r#gen::<f64>(),
                    rng.r#gen::<f64>(),
                ]);
                labels.push(class);
            }
        }
        MatrixDataset::from_rows(&rows, labels).unwrap()
    }
}
