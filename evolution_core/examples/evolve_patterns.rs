//! Architecture search on the synthetic stroke-pattern dataset.
//!
//! Run with: cargo run --release --example evolve_patterns [config.toml]
//!
//! Without a config file a small search over 16x16 images is used. Every
//! generation is appended to `logs/evolution.jsonl`; the winning network is
//! retrained and saved to `checkpoints/best_network.bin`.

use anyhow::{Context, Result};
use cnn_evolution_core::data::{generate_pattern_dataset, shuffle, split_validation, PatternClass};
use cnn_evolution_core::genetics::{build_network, GeneticAlgorithm};
use cnn_evolution_core::{
    init_tracing, Checkpointable, EngineConfig, EpochTrainer, JsonlResultsLog,
    PatternDatasetConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn load_config() -> Result<EngineConfig> {
    match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from_file(&path)
            .with_context(|| format!("failed to load config from {path}")),
        None => {
            let mut config = EngineConfig::default();
            config.network.input_rows = 16;
            config.network.input_cols = 16;
            config.network.output_classes = PatternClass::num_classes();
            config.training.epochs = 2;
            config.training.batch_size = 8;
            config.evolution.population_size = 10;
            config.evolution.generations = 3;
            config.search_space.filters = vec![4, 8, 16];
            config.search_space.fc_sizes = vec![32, 64];
            Ok(config)
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let config = load_config()?;

    let mut images = generate_pattern_dataset(&PatternDatasetConfig {
        size: config.network.input_rows,
        samples_per_class: 30,
        noise_level: 0.1,
        seed: config.training.seed,
    });
    shuffle(&mut images, config.training.seed);
    let (train, test) = split_validation(&images, 0.2);
    let (search_train, validation) =
        split_validation(&train, config.evolution.validation_fraction);

    println!("Pattern architecture search");
    println!("===========================");
    println!(
        "  {} training / {} validation / {} test images",
        search_train.len(),
        validation.len(),
        test.len()
    );
    println!(
        "  population {} x {} generations\n",
        config.evolution.population_size, config.evolution.generations
    );

    let mut journal = JsonlResultsLog::in_log_dir().context("failed to open run journal")?;
    let mut search = GeneticAlgorithm::new(config.clone());
    let champion = search
        .run(&search_train, &validation, &mut journal)?
        .context("no generation was evaluated")?;

    println!("Best architecture (fitness {:.3}):", champion.fitness());
    println!("  {}\n", champion.chromosome());

    let mut rng = StdRng::seed_from_u64(config.training.seed);
    let mut network = build_network(champion.chromosome(), &config.network, &mut rng)?;
    let report = EpochTrainer::new(config.training.clone()).train(&mut network, &train, &test, &mut rng)?;
    println!("{network}\n");
    for metrics in &report.epoch_metrics {
        println!(
            "  epoch {:>2}: loss {:.4}, test accuracy {:.2}%",
            metrics.epoch,
            metrics.train_loss,
            metrics.val_accuracy * 100.0
        );
    }

    for stats in network.class_accuracy(&test)? {
        println!(
            "  {:?}: {}/{}",
            PatternClass::all()[stats.class],
            stats.correct,
            stats.total
        );
    }

    network.save_checkpoint("checkpoints/best_network.bin")?;
    println!("\nSaved checkpoints/best_network.bin");
    Ok(())
}
