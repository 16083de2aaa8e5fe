//! Throughput of the layer kernels and of one training batch
//!
//! Run with: cargo bench --bench layer_benchmarks

use cnn_evolution_core::neural::{
    Activation, ConvolutionLayer, MaxPoolLayer, NetworkBuilder, SgdSettings, Shape,
};
use cnn_evolution_core::LabeledImage;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn batch(size: usize, shape: Shape, rng: &mut StdRng) -> Vec<Array3<f64>> {
    (0..size)
        .map(|_| Array3::from_shape_fn(shape.dims(), |_| rng.gen_range(-1.0..1.0)))
        .collect()
}

/// Convolution forward and forward+backward at growing filter counts
fn bench_convolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("convolution");
    let mut rng = StdRng::seed_from_u64(0);
    let input = Shape::new(4, 28, 28);
    let inputs = batch(16, input, &mut rng);

    for filters in [4, 16, 32].iter() {
        let layer = ConvolutionLayer::new(
            input,
            *filters,
            3,
            1,
            1,
            Activation::ReLU,
            SgdSettings::default(),
            &mut rng,
        )
        .unwrap();
        let grads = batch(16, layer.output_shape(), &mut rng);

        group.bench_with_input(BenchmarkId::new("forward", filters), filters, |b, _| {
            let mut layer = layer.clone();
            b.iter(|| black_box(layer.forward_batch(&inputs).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("forward_backward", filters), filters, |b, _| {
            let mut layer = layer.clone();
            b.iter(|| {
                layer.forward_batch(&inputs).unwrap();
                black_box(layer.backward_batch(&grads).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_max_pool(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let input = Shape::new(16, 28, 28);
    let inputs = batch(16, input, &mut rng);
    let mut layer = MaxPoolLayer::new(input, 2, 2).unwrap();

    c.bench_function("max_pool_forward", |b| {
        b.iter(|| black_box(layer.forward_batch(&inputs).unwrap()));
    });
}

/// One softmax cross-entropy step on a 28x28 digit-sized network
fn bench_train_batch(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let mut network = NetworkBuilder::new(28, 28, 10, SgdSettings::default())
        .add_convolution(8, 3, 1, 1, Activation::ReLU, &mut rng)
        .unwrap()
        .add_max_pool(2, 2)
        .unwrap()
        .add_convolution(16, 3, 1, 0, Activation::LeakyReLU, &mut rng)
        .unwrap()
        .add_fully_connected(64, Activation::ReLU, &mut rng)
        .unwrap()
        .add_output_layer(&mut rng)
        .unwrap()
        .build()
        .unwrap();

    let images: Vec<LabeledImage> = (0..32)
        .map(|i| {
            let pixels = Array2::from_shape_fn((28, 28), |_| rng.gen_range(0.0..1.0));
            LabeledImage::new(pixels, i % 10)
        })
        .collect();
    let refs: Vec<&LabeledImage> = images.iter().collect();

    c.bench_function("network_train_batch_32", |b| {
        b.iter(|| black_box(network.train_batch(&refs).unwrap()));
    });
}

criterion_group!(benches, bench_convolution, bench_max_pool, bench_train_batch);
criterion_main!(benches);
