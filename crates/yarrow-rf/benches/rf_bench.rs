//! Criterion benchmarks for yarrow-rf: training, batch prediction, and
//! the model codec.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use yarrow_rf::{Forest, MatrixDataset, RfParameters, train};

fn make_classification(
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    seed: u64,
) -> MatrixDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = (i % n_classes) as u32;
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f < 3 { f64::from(class) * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        rows.push(row);
        labels.push(class);
    }
    MatrixDataset::from_rows(&rows, labels).unwrap()
}

fn bench_train(c: &mut Criterion) {
    let data = make_classification(500, 20, 5, 42);
    let params = RfParameters::new(20)
        .unwrap()
        .with_num_split_features(5)
        .with_min_score(1e-6);

    c.bench_function("train_500x20_5class_20trees", |b| {
        b.iter(|| train(&data, params.clone(), 42).unwrap());
    });
}

fn bench_predict_batch(c: &mut Criterion) {
    let data = make_classification(500, 20, 5, 42);
    let params = RfParameters::new(20)
        .unwrap()
        .with_num_split_features(5)
        .with_min_score(1e-6);
    let forest = train(&data, params, 42).unwrap();

    let rows: Vec<Vec<f64>> = (0..500)
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(i);
            (0..20).map(|_| rng.r#gen::<f64>() * 3.0).collect()
        })
        .collect();

    c.bench_function("predict_batch_500x20_20trees", |b| {
        b.iter(|| forest.predict_batch(&rows).unwrap());
    });
}

fn bench_model_round_trip(c: &mut Criterion) {
    let data = make_classification(200, 10, 3, 42);
    let params = RfParameters::new(10)
        .unwrap()
        .with_num_split_features(3)
        .with_min_score(1e-6);
    let forest = train(&data, params, 42).unwrap();

    c.bench_function("model_save_load_200x10_10trees", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            forest.save(&mut buf).unwrap();
            Forest::load(&mut buf.as_slice(), &data).unwrap()
        });
    });
}

criterion_group!(benches, bench_train, bench_predict_batch, bench_model_round_trip);
criterion_main!(benches);
