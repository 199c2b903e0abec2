//! Recursive decision-tree node with owned children.

use std::fmt;

use rand::Rng;
use tracing::trace;

use crate::config::RfParameters;
use crate::dataset::{Dataset, IdArray, Sample};
use crate::error::RfError;
use crate::numeric::{count_labels, normalize};
use crate::split::{MaxInfoGainSplit, SplitSelector};

/// A node in a decision tree.
///
/// Either a leaf (no children, no worthwhile split) or a branch (both
/// children present). Children are owned; there are no parent links and
/// no sharing between trees.
pub struct Node {
    /// Class counts of the samples that reached this node.
    pub(crate) counts: Vec<f64>,
    /// Number of samples that reached this node.
    pub(crate) n: usize,
    /// Depth of this node; the root is at depth 0.
    pub(crate) depth: usize,
    /// The split handler, kept on leaves too so rejected split searches
    /// stay inspectable.
    pub(crate) split: Box<dyn SplitSelector>,
    pub(crate) left: Option<Box<Node>>,
    pub(crate) right: Option<Box<Node>>,
}

impl Node {
    /// Grow a node over `ids`, recursing while a worthwhile split exists.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidIndex`] if `ids` or a drawn feature id is
    /// rejected by the dataset.
    pub(crate) fn grow<R: Rng>(
        params: &RfParameters,
        data: &dyn Dataset,
        ids: &IdArray,
        depth: usize,
        rng: &mut R,
    ) -> Result<Self, RfError> {
        let labels = data.labels(ids)?;
        let counts = count_labels(&labels, data.num_classes());
        trace!(depth, n = ids.len(), "growing node");

        let split = MaxInfoGainSplit::search(params, data, &labels, ids, counts.clone(), rng)?;

        let (left, right) = if split.split_required() {
            let (left_ids, right_ids) = split.split_samples()?;
            trace!(
                depth,
                feature = split.best_feature(),
                left = left_ids.len(),
                right = right_ids.len(),
                "node split"
            );
            let left = Node::grow(params, data, &left_ids, depth + 1, rng)?;
            let right = Node::grow(params, data, &right_ids, depth + 1, rng)?;
            (Some(Box::new(left)), Some(Box::new(right)))
        } else {
            (None, None)
        };

        Ok(Self {
            counts,
            n: ids.len(),
            depth,
            split: Box::new(split),
            left,
            right,
        })
    }

    /// Class frequencies at this node, normalized to sum to one when
    /// `norm` is set.
    #[must_use]
    pub fn class_distribution(&self, norm: bool) -> Vec<f64> {
        let mut dist = self.counts.clone();
        if norm {
            normalize(&mut dist, None);
        }
        dist
    }

    /// Predict the class distribution for a sample by descending to a leaf.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InconsistentModel`] when the node graph violates
    /// the leaf/branch invariants (possible only with a hand-edited model
    /// file).
    pub fn predict(&self, sample: &dyn Sample) -> Result<Vec<f64>, RfError> {
        if self.is_leaf() {
            if self.split.split_required() {
                return Err(RfError::InconsistentModel {
                    reason: "leaf node carries a worthwhile split",
                });
            }
            return Ok(self.class_distribution(true));
        }

        if !self.split.split_required() {
            return Err(RfError::InconsistentModel {
                reason: "branch node without a worthwhile split",
            });
        }
        let child = if self.split.route(sample)? {
            &self.right
        } else {
            &self.left
        };
        child
            .as_deref()
            .ok_or(RfError::InconsistentModel {
                reason: "branch node missing a child",
            })?
            .predict(sample)
    }

    /// True when this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// The left child, if any.
    #[must_use]
    pub fn left(&self) -> Option<&Node> {
        self.left.as_deref()
    }

    /// The right child, if any.
    #[must_use]
    pub fn right(&self) -> Option<&Node> {
        self.right.as_deref()
    }

    /// The split handler of this node.
    #[must_use]
    pub fn split(&self) -> &dyn SplitSelector {
        self.split.as_ref()
    }

    /// Number of samples that reached this node.
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.n
    }

    /// Depth of this node (root = 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Used by the model loader.
    pub(crate) fn from_raw(
        counts: Vec<f64>,
        n: usize,
        depth: usize,
        split: Box<dyn SplitSelector>,
        left: Option<Box<Node>>,
        right: Option<Box<Node>>,
    ) -> Self {
        Self {
            counts,
            n,
            depth,
            split,
            left,
            right,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("counts", &self.counts)
            .field("n", &self.n)
            .field("depth", &self.depth)
            .field("leaf", &self.is_leaf())
            .finish_non_exhaustive()
    }
}

/// Multi-line rendering of the subtree, indented by depth: per-node raw
/// and normalized class counts, plus feature/threshold/score on branches.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(values: &[f64]) -> String {
            values
                .iter()
                .map(|v| format!("{v:.4}"))
                .collect::<Vec<_>>()
                .join(",")
        }

        fn render(node: &Node, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
            let pad = "  ".repeat(indent);
            writeln!(f, "{pad}counts: {}", join(&node.class_distribution(false)))?;
            writeln!(f, "{pad}normalized: {}", join(&node.class_distribution(true)))?;

            if let (Some(left), Some(right)) = (node.left(), node.right()) {
                if let (Some(ftid), Some(value)) =
                    (node.split.best_feature(), node.split.split_value())
                {
                    writeln!(
                        f,
                        "{pad}feature: {ftid} split: {value} IG: {}",
                        node.split.score()
                    )?;
                }
                writeln!(f, "{pad}Left")?;
                render(left, f, indent + 1)?;
                writeln!(f, "{pad}Right")?;
                render(right, f, indent + 1)?;
            }
            Ok(())
        }

        render(self, f, 0)
    }
}
