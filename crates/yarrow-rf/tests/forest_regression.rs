//! End-to-end regression tests for yarrow-rf.
//!
//! These pin down the observable contract of the forest: seeded
//! reproducibility, bag/OOB bookkeeping, exact persistence round trips,
//! and the sign of permutation importance on a known dataset.

use std::io::{Seek, SeekFrom, Write};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use yarrow_rf::{
    Dataset, Forest, MatrixDataset, RfParameters, SliceSample, class_of_max_prob, train,
};

// ---------------------------------------------------------------------------
// Helpers: deterministic synthetic datasets
// ---------------------------------------------------------------------------

/// A 150x4 dataset with three balanced classes, iris-like in shape.
///
/// Features 0 and 2 track the class with small noise; features 1 and 3
/// are noisier echoes.
fn iris_like(seed: u64) -> MatrixDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(150);
    let mut labels = Vec::with_capacity(150);
    for class in 0..3u32 {
        for _ in 0..50 {
            let c = f64::from(class);
            rows.push(vec![
                c * 2.0 + rng.r#gen::<f64>() * 0.8,
                c * 0.5 + rng.r#gen::<f64>() * 1.5,
                c * 1.5 + rng.r#gen::<f64>() * 0.6,
                rng.r#gen::<f64>() * 2.0,
            ]);
            labels.push(class);
        }
    }
    MatrixDataset::from_rows(&rows, labels).unwrap()
}

/// Feature 0 is the label plus small noise; the rest are pure noise.
fn label_leak_data(num_features: usize, seed: u64) -> MatrixDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for i in 0..90 {
        let class = (i % 3) as u32;
        let mut row = vec![f64::from(class) + rng.r#gen::<f64>() * 0.2];
        for _ in 1..num_features {
            row.push(rng.r#gen::<f64>() * 3.0);
        }
        rows.push(row);
        labels.push(class);
    }
    MatrixDataset::from_rows(&rows, labels).unwrap()
}

fn single_tree_params() -> RfParameters {
    RfParameters::new(1)
        .unwrap()
        .with_num_split_features(2)
        .with_min_score(1e-6)
}

// ---------------------------------------------------------------------------
// Seeded reproducibility
// ---------------------------------------------------------------------------

/// Two runs with seed 25 must produce bit-identical bags, tree structure,
/// and predictions on a 150x4 three-class dataset.
#[test]
fn seed_25_reproduces_single_tree_run() {
    let data = iris_like(42);

    let first = train(&data, single_tree_params(), 25).unwrap();
    let second = train(&data, single_tree_params(), 25).unwrap();

    let t1 = first.tree(0).unwrap();
    let t2 = second.tree(0).unwrap();
    assert_eq!(t1.bag(), t2.bag());
    assert_eq!(t1.oob(), t2.oob());

    // Identical structure shows up as identical serialized bytes.
    let mut out1 = Vec::new();
    let mut out2 = Vec::new();
    first.save(&mut out1).unwrap();
    second.save(&mut out2).unwrap();
    assert_eq!(out1, out2);

    for id in data.ids() {
        let sample = data.sample(id).unwrap();
        let p1 = first.predict(&sample).unwrap();
        let p2 = second.predict(&sample).unwrap();
        assert_eq!(
            p1.iter().map(|p| p.to_bits()).collect::<Vec<_>>(),
            p2.iter().map(|p| p.to_bits()).collect::<Vec<_>>()
        );
    }
}

#[test]
fn different_seeds_differ() {
    let data = iris_like(42);
    let first = train(&data, single_tree_params(), 25).unwrap();
    let second = train(&data, single_tree_params(), 26).unwrap();
    assert_ne!(first.tree(0).unwrap().bag(), second.tree(0).unwrap().bag());
}

// ---------------------------------------------------------------------------
// Bag / OOB bookkeeping
// ---------------------------------------------------------------------------

#[test]
fn bag_and_oob_partition_the_id_space() {
    let data = iris_like(7);
    let params = RfParameters::new(10)
        .unwrap()
        .with_num_split_features(2)
        .with_min_score(1e-6);
    let forest = train(&data, params, 3).unwrap();

    for tree in forest.trees() {
        assert_eq!(tree.bag().len(), data.num_samples());

        let mut seen = vec![false; data.num_samples()];
        for &id in tree.bag() {
            seen[id as usize] = true;
        }
        for &id in tree.oob() {
            assert!(!seen[id as usize], "OOB id {id} also in bag");
            seen[id as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "bag and OOB must cover all ids");
    }
}

// ---------------------------------------------------------------------------
// Prediction contract
// ---------------------------------------------------------------------------

#[test]
fn forest_distributions_sum_to_one() {
    let data = iris_like(9);
    let params = RfParameters::new(15)
        .unwrap()
        .with_num_split_features(2)
        .with_min_score(1e-6);
    let forest = train(&data, params, 4).unwrap();

    for id in data.ids() {
        let dist = forest.predict(&data.sample(id).unwrap()).unwrap();
        assert_eq!(dist.len(), 3);
        let sum: f64 = dist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}

#[test]
fn forest_classifies_held_out_points() {
    let data = iris_like(11);
    let params = RfParameters::new(30)
        .unwrap()
        .with_num_split_features(2)
        .with_min_score(1e-6);
    let forest = train(&data, params, 8).unwrap();

    // Class centers, away from the training noise.
    let low = [0.4, 0.7, 0.3, 1.0];
    let mid = [2.4, 1.2, 1.8, 1.0];
    let high = [4.4, 1.7, 3.3, 1.0];
    assert_eq!(
        class_of_max_prob(&forest.predict(&SliceSample::new(&low)).unwrap()),
        0
    );
    assert_eq!(
        class_of_max_prob(&forest.predict(&SliceSample::new(&mid)).unwrap()),
        1
    );
    assert_eq!(
        class_of_max_prob(&forest.predict(&SliceSample::new(&high)).unwrap()),
        2
    );
}

// ---------------------------------------------------------------------------
// Persistence round trip
// ---------------------------------------------------------------------------

/// Save to a real file, reload, rebind, and compare every probability
/// vector bit for bit.
#[test]
fn file_round_trip_is_bit_exact() {
    let data = iris_like(42);
    let forest = train(&data, single_tree_params(), 25).unwrap();

    let mut file = tempfile::tempfile().unwrap();
    forest.save(&mut file).unwrap();
    file.flush().unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let loaded = Forest::load(&mut file, &data).unwrap();

    for id in data.ids() {
        let sample = data.sample(id).unwrap();
        let before = forest.predict(&sample).unwrap();
        let after = loaded.predict(&sample).unwrap();
        assert_eq!(
            before.iter().map(|p| p.to_bits()).collect::<Vec<_>>(),
            after.iter().map(|p| p.to_bits()).collect::<Vec<_>>(),
            "sample {id}"
        );
    }
}

#[test]
fn round_trip_preserves_oob_errors() {
    let data = iris_like(13);
    let params = RfParameters::new(5)
        .unwrap()
        .with_num_split_features(2)
        .with_min_score(1e-6);
    let forest = train(&data, params, 17).unwrap();

    let mut buf = Vec::new();
    forest.save(&mut buf).unwrap();
    let loaded = Forest::load(&mut buf.as_slice(), &data).unwrap();

    let (before, _) = forest.oob_errors().unwrap();
    let (after, _) = loaded.oob_errors().unwrap();
    assert_eq!(before, after);
}

// ---------------------------------------------------------------------------
// Permutation importance
// ---------------------------------------------------------------------------

/// With feature 0 leaking the label, it must dominate the importance
/// ranking for at least 90% of seeds.
#[test]
fn label_leak_feature_dominates_importance() {
    let seeds: Vec<u64> = (1..=10).collect();
    let mut wins = 0;

    for &seed in &seeds {
        let data = label_leak_data(4, seed);
        let params = RfParameters::new(10)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let forest = Forest::grow(&data, params, &mut rng).unwrap();
        let (imp, _) = forest.var_imp(&mut rng).unwrap();

        if (1..imp.len()).all(|f| imp[0] > imp[f]) {
            wins += 1;
        }
    }

    assert!(wins >= 9, "feature 0 won only {wins}/10 seeds");
}

/// Averaged over seeds, the importance of pure-noise features stays
/// near zero.
#[test]
fn noise_feature_importance_averages_to_zero() {
    let mut total = 0.0;
    let runs = 8;

    for seed in 1..=runs {
        let data = label_leak_data(3, seed);
        let params = RfParameters::new(8)
            .unwrap()
            .with_num_split_features(2)
            .with_min_score(1e-6);

        let mut rng = ChaCha8Rng::seed_from_u64(seed * 101);
        let forest = Forest::grow(&data, params, &mut rng).unwrap();
        let (imp, _) = forest.var_imp(&mut rng).unwrap();
        total += imp[2];
    }

    let mean = total / runs as f64;
    assert!(mean.abs() < 0.05, "noise importance mean {mean} too large");
}
