use cnn_evolution_core::config::NetworkConfig;
use cnn_evolution_core::genetics::{build_network, Chromosome};
use cnn_evolution_core::neural::{
    cross_entropy, softmax, softmax_cross_entropy_gradient, Activation, NetworkBuilder,
    NeuralNetwork, SgdSettings,
};
use cnn_evolution_core::LabeledImage;
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_images(count: usize, rows: usize, cols: usize, seed: u64) -> Vec<LabeledImage> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let pixels = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0.0..1.0));
            LabeledImage::new(pixels, i)
        })
        .collect()
}

fn loss_at(network: &mut NeuralNetwork, input: &Array3<f64>, label: usize) -> f64 {
    let logits = network.forward(vec![input.clone()]).unwrap();
    cross_entropy(&softmax(&logits[0]), label)
}

#[test]
fn zero_image_gives_uniform_probabilities() {
    let chromosome: Chromosome = "CONVOLUTION (4 filters 3x3, stride=1, valid padding + ReLU) → MAX_POOL (2x2, stride=2) → FC output"
        .parse()
        .unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let mut network = build_network(&chromosome, &NetworkConfig::default(), &mut rng).unwrap();

    let probabilities = network.guess_probabilities(&vec![0.0; 28 * 28]).unwrap();
    assert_eq!(probabilities.len(), 10);
    for p in probabilities {
        assert!((p - 0.1).abs() < 1e-12);
    }
}

#[test]
fn input_gradient_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(7);
    // zero learning rate keeps the parameters fixed across passes
    let network = NetworkBuilder::new(7, 7, 3, SgdSettings::new(0.0, 0.0))
        .add_convolution(3, 3, 1, 1, Activation::Sigmoid, &mut rng)
        .unwrap()
        .add_max_pool(2, 2)
        .unwrap()
        .add_fully_connected(5, Activation::Sigmoid, &mut rng)
        .unwrap()
        .add_output_layer(&mut rng)
        .unwrap()
        .build()
        .unwrap();

    let input = Array3::from_shape_fn((1, 7, 7), |(_, r, c)| ((r * 7 + c) as f64 * 0.37).sin());
    let label = 2;

    let mut analytic = network.clone();
    let logits = analytic.forward(vec![input.clone()]).unwrap();
    let grad = softmax_cross_entropy_gradient(&softmax(&logits[0]), label);
    let input_grad = analytic.backward(vec![grad]).unwrap().remove(0);

    let h = 1e-5;
    for (idx, &g) in input_grad.indexed_iter() {
        let mut up = input.clone();
        up[idx] += h;
        let mut down = input.clone();
        down[idx] -= h;
        let numeric = (loss_at(&mut network.clone(), &up, label)
            - loss_at(&mut network.clone(), &down, label))
            / (2.0 * h);
        assert!(
            (numeric - g).abs() < 1e-6,
            "at {idx:?}: numeric {numeric}, analytic {g}"
        );
    }
}

#[test]
fn testing_twice_gives_the_same_accuracy() {
    let images = random_images(6, 8, 8, 3)
        .into_iter()
        .map(|image| LabeledImage::new(image.pixels().clone(), image.label() % 3))
        .collect::<Vec<_>>();
    let mut rng = StdRng::seed_from_u64(5);
    let mut network = NetworkBuilder::new(8, 8, 3, SgdSettings::default())
        .add_convolution(2, 3, 1, 0, Activation::ReLU, &mut rng)
        .unwrap()
        .add_output_layer(&mut rng)
        .unwrap()
        .build()
        .unwrap();

    let first = network.test(&images).unwrap();
    let second = network.test(&images).unwrap();
    assert_eq!(first, second);
    assert_eq!(network.test_batch(&images, 4).unwrap(), first);
}

#[test]
fn seeded_epoch_is_reproducible() {
    let images = random_images(8, 8, 8, 11)
        .into_iter()
        .map(|image| LabeledImage::new(image.pixels().clone(), image.label() % 4))
        .collect::<Vec<_>>();

    let train = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut network = NetworkBuilder::new(8, 8, 4, SgdSettings::new(0.05, 1e-4))
            .add_convolution(3, 3, 1, 1, Activation::LeakyReLU, &mut rng)
            .unwrap()
            .add_max_pool(2, 2)
            .unwrap()
            .add_output_layer(&mut rng)
            .unwrap()
            .build()
            .unwrap();
        let stats = network.train_epoch(&images, 3, &mut rng).unwrap();
        let probabilities = network
            .guess_probabilities(images[0].pixels().as_slice().unwrap())
            .unwrap();
        (stats.mean_loss, probabilities)
    };

    assert_eq!(train(21), train(21));
}

#[test]
fn network_memorizes_five_samples() {
    let images = random_images(5, 8, 8, 42);
    let mut rng = StdRng::seed_from_u64(1);
    let mut network = NetworkBuilder::new(8, 8, 5, SgdSettings::new(0.05, 0.0))
        .add_convolution(4, 3, 1, 1, Activation::LeakyReLU, &mut rng)
        .unwrap()
        .add_fully_connected(32, Activation::LeakyReLU, &mut rng)
        .unwrap()
        .add_output_layer(&mut rng)
        .unwrap()
        .build()
        .unwrap();

    let mut accuracy = 0.0;
    for _ in 0..500 {
        network.train_epoch(&images, 1, &mut rng).unwrap();
        accuracy = network.test(&images).unwrap();
        if accuracy == 1.0 {
            break;
        }
    }
    assert_eq!(accuracy, 1.0);
}
