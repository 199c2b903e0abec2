//! Confusion matrix tracking both hard counts and accumulated
//! prediction scores.

use std::fmt;

use crate::dataset::Label;
use crate::numeric::argmax;

/// A confusion matrix for multi-class classification.
///
/// Entry `(true, predicted)` counts samples; a parallel real-valued score
/// matrix accumulates whole predicted distributions into the true row, so
/// row diagonals measure the probability mass assigned to the correct
/// class. Both matrices are stored flat, row-major.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<u32>,
    scores: Vec<f64>,
    n: u32,
}

impl ConfusionMatrix {
    /// Create an empty matrix for `num_classes` labels.
    #[must_use]
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
            scores: vec![0.0; num_classes * num_classes],
            n: 0,
        }
    }

    /// Record one prediction: the predicted label is the argmax of
    /// `dist`, and the full distribution is accumulated into the score
    /// row of the true label.
    pub fn record(&mut self, true_label: Label, dist: &[f64]) {
        debug_assert_eq!(dist.len(), self.num_classes);
        let predicted = argmax(dist);
        debug_assert!(dist[predicted] > 0.0);

        let idx = self.index(true_label as usize, predicted);
        self.counts[idx] += 1;
        for (q, &p) in dist.iter().enumerate() {
            let idx = self.index(true_label as usize, q);
            self.scores[idx] += p;
        }
        self.n += 1;
    }

    /// The count of samples with the given true and predicted labels.
    #[must_use]
    pub fn count(&self, true_label: Label, predicted: Label) -> u32 {
        self.counts[self.index(true_label as usize, predicted as usize)]
    }

    /// The accumulated probability mass at (true, predicted).
    #[must_use]
    pub fn score(&self, true_label: Label, predicted: Label) -> f64 {
        self.scores[self.index(true_label as usize, predicted as usize)]
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.n
    }

    /// Return the number of classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Per-class error rates and the overall class-weighted error rate.
    ///
    /// The error of class `t` is one minus the fraction of its samples
    /// predicted correctly; a class with no recorded samples reports zero.
    #[must_use]
    pub fn class_error_rates(&self) -> (Vec<f64>, f64) {
        let mut errors = vec![0.0; self.num_classes];
        let mut correct = 0.0;

        for t in 0..self.num_classes {
            let row_total: u32 = (0..self.num_classes)
                .map(|p| self.counts[self.index(t, p)])
                .sum();
            let diag = f64::from(self.counts[self.index(t, t)]);
            if row_total > 0 {
                errors[t] = (f64::from(row_total) - diag) / f64::from(row_total);
            }
            correct += diag;
        }

        let overall = if self.n > 0 {
            (f64::from(self.n) - correct) / f64::from(self.n)
        } else {
            0.0
        };
        (errors, overall)
    }

    fn index(&self, true_label: usize, predicted: usize) -> usize {
        debug_assert!(true_label < self.num_classes && predicted < self.num_classes);
        true_label * self.num_classes + predicted
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for p in 0..self.num_classes {
            write!(f, " pred_{p:>3}")?;
        }
        writeln!(f)?;

        for t in 0..self.num_classes {
            write!(f, "true_{t:>3}")?;
            for p in 0..self.num_classes {
                write!(f, " {:>7}", self.counts[self.index(t, p)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
