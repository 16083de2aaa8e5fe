//! Generational architecture search with elitism and a shared fitness cache.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cache::{CacheEntry, Evaluation, FitnessCache};
use super::chromosome::Chromosome;
use super::operators::{build_network, crossover, mutate};
use crate::config::{EngineConfig, EvolutionConfig};
use crate::data::LabeledImage;
use crate::error::NetworkResult;
use crate::logging::{timestamp_ms, GenerationRecord, ResultsSink};
use crate::training::EpochTrainer;

/// Fitness of an individual that has not been scored.
pub const UNEVALUATED: f32 = f32::MAX;

/// Collisions tolerated before the second crossover parent is drawn from
/// outside the elite.
const PARENT_COLLISION_LIMIT: usize = 10;

/// Classification error in percent plus one point per `divisor` parameters.
pub fn fitness(accuracy: f32, parameters: usize, divisor: f32) -> f32 {
    (100.0 - accuracy * 100.0) + parameters as f32 / divisor
}

/// A chromosome and its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    chromosome: Chromosome,
    fitness: f32,
    evaluation: Option<Evaluation>,
}

impl Individual {
    pub fn new(chromosome: Chromosome) -> Self {
        Self {
            chromosome,
            fitness: UNEVALUATED,
            evaluation: None,
        }
    }

    pub fn chromosome(&self) -> &Chromosome {
        &self.chromosome
    }

    /// Lower is better; [`UNEVALUATED`] until scored.
    pub fn fitness(&self) -> f32 {
        self.fitness
    }

    pub fn evaluation(&self) -> Option<Evaluation> {
        self.evaluation
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluation.is_some()
    }

    fn assign(&mut self, evaluation: Evaluation) {
        self.fitness = evaluation.fitness;
        self.evaluation = Some(evaluation);
    }

    fn replace(&mut self, chromosome: Chromosome) {
        *self = Self::new(chromosome);
    }
}

/// How each generation is divided. The four parts sum to the population
/// size; immigrants take whatever the other three leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationQuotas {
    pub elite: usize,
    pub crossover: usize,
    pub mutants: usize,
    pub immigrants: usize,
}

impl PopulationQuotas {
    pub fn from_config(config: &EvolutionConfig) -> Self {
        let size = config.population_size.max(1);
        let share = |fraction: f64| (size as f64 * fraction).round() as usize;

        let elite = share(config.elite_fraction).max(1).min(size);
        let crossover = share(config.crossover_fraction).min(size - elite);
        let mutants = share(config.mutant_fraction).min(size - elite - crossover);

        Self {
            elite,
            crossover,
            mutants,
            immigrants: size - elite - crossover - mutants,
        }
    }

    pub fn total(&self) -> usize {
        self.elite + self.crossover + self.mutants + self.immigrants
    }
}

/// What one call to [`GeneticAlgorithm::evolve`] produced.
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub generation: usize,
    /// Best individual of the evaluated generation
    pub best: Individual,
    pub evaluated: usize,
    pub elapsed_ms: u128,
}

/// Trains `chromosome` on `train` and scores it on `validation`.
pub fn evaluate_chromosome<R: Rng + ?Sized>(
    chromosome: &Chromosome,
    config: &EngineConfig,
    train: &[LabeledImage],
    validation: &[LabeledImage],
    rng: &mut R,
) -> NetworkResult<Evaluation> {
    let mut network = build_network(chromosome, &config.network, rng)?;
    let report =
        EpochTrainer::new(config.training.clone()).train(&mut network, train, validation, rng)?;
    let parameters = network.parameter_count();

    Ok(Evaluation {
        fitness: fitness(
            report.final_val_accuracy,
            parameters,
            config.evolution.parameter_penalty_divisor,
        ),
        validation_accuracy: report.final_val_accuracy,
        parameters,
    })
}

/// Evolves a population of architectures.
///
/// Every generation runs four phases:
///
/// 1. Unscored chromosomes already in the cache are regenerated
/// 2. The rest are trained and scored in parallel
/// 3. The population is sorted by ascending fitness
/// 4. Elites, crossover children, mutants and immigrants form the next generation
///
/// Randomness is seeded from `training.seed`. Each individual's training run
/// gets its own generator derived from the seed, the generation and its
/// position, so results do not depend on thread scheduling.
pub struct GeneticAlgorithm {
    config: EngineConfig,
    quotas: PopulationQuotas,
    cache: Arc<FitnessCache>,
    population: Vec<Individual>,
    generation: usize,
    rng: StdRng,
}

impl GeneticAlgorithm {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_cache(config, Arc::new(FitnessCache::new()))
    }

    /// Search that shares `cache` with its caller.
    pub fn with_cache(config: EngineConfig, cache: Arc<FitnessCache>) -> Self {
        Self {
            quotas: PopulationQuotas::from_config(&config.evolution),
            rng: StdRng::seed_from_u64(config.training.seed),
            config,
            cache,
            population: Vec::new(),
            generation: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn quotas(&self) -> PopulationQuotas {
        self.quotas
    }

    pub fn cache(&self) -> &Arc<FitnessCache> {
        &self.cache
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Generations evolved so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Lowest-fitness scored individual of the current population.
    pub fn best(&self) -> Option<&Individual> {
        self.population
            .iter()
            .filter(|individual| individual.is_evaluated())
            .min_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }

    /// Replaces the population with random chromosomes.
    pub fn initial_population(&mut self) {
        let size = self.quotas.total();
        let mut population = Vec::with_capacity(size);
        for _ in 0..size {
            population.push(Individual::new(self.random_chromosome()));
        }
        self.population = population;
    }

    fn random_chromosome(&mut self) -> Chromosome {
        Chromosome::random(
            &self.config.search_space,
            self.config.network.input_rows,
            self.config.network.input_cols,
            &mut self.rng,
        )
    }

    /// Runs one generation; see the type docs for the phases.
    ///
    /// # Arguments
    ///
    /// * `train` - Images every candidate is trained on
    /// * `validation` - Images that score the fitness
    pub fn evolve(
        &mut self,
        train: &[LabeledImage],
        validation: &[LabeledImage],
    ) -> NetworkResult<GenerationSummary> {
        if self.population.is_empty() {
            self.initial_population();
        }
        let start = Instant::now();
        let generation = self.generation;

        let owned = self.claim_population();
        let evaluated = owned.iter().filter(|&&owned| owned).count();

        let seed = self.config.training.seed;
        let config = &self.config;
        let cache = self.cache.as_ref();
        self.population
            .par_iter_mut()
            .zip(owned.par_iter())
            .enumerate()
            .filter(|(_, (_, owned))| **owned)
            .try_for_each(|(index, (individual, _))| {
                let mut rng = StdRng::seed_from_u64(individual_seed(seed, generation, index));
                evaluate_individual(individual, config, cache, train, validation, &mut rng)
            })?;

        // duplicates pick up the score their twin produced
        for individual in self.population.iter_mut().filter(|i| !i.is_evaluated()) {
            if let Some(CacheEntry::Evaluated(evaluation)) =
                self.cache.get(&individual.chromosome.key())
            {
                individual.assign(evaluation);
            }
        }

        self.population.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
        let best = self.population[0].clone();

        info!(
            generation,
            evaluated,
            best_fitness = best.fitness,
            cached = self.cache.len(),
            best = %best.chromosome,
            "generation evaluated"
        );

        self.population = self.next_generation();
        self.generation += 1;

        Ok(GenerationSummary {
            generation,
            best,
            evaluated,
            elapsed_ms: start.elapsed().as_millis(),
        })
    }

    /// Claims each unscored chromosome in the cache, regenerating those
    /// another individual already owns.
    ///
    /// # Returns
    ///
    /// Per individual, whether it must be evaluated this generation
    fn claim_population(&mut self) -> Vec<bool> {
        let attempts = self.config.evolution.max_regeneration_attempts.max(1);
        let mut owned = Vec::with_capacity(self.population.len());

        for index in 0..self.population.len() {
            if self.population[index].is_evaluated() {
                owned.push(false);
                continue;
            }
            let mut claimed = false;
            for attempt in 0..attempts {
                if attempt > 0 {
                    let fresh = self.random_chromosome();
                    self.population[index].replace(fresh);
                }
                if self.cache.claim(&self.population[index].chromosome.key()) {
                    claimed = true;
                    break;
                }
            }
            owned.push(claimed);
        }
        owned
    }

    fn next_generation(&mut self) -> Vec<Individual> {
        let size = self.population.len();
        let elite = self.quotas.elite.min(size);
        let mut next: Vec<Individual> = self.population[..elite].to_vec();

        for _ in 0..self.quotas.crossover {
            let (first, second) = self.pick_parents(elite, size);
            let child = crossover(
                &self.population[first].chromosome,
                &self.population[second].chromosome,
                &mut self.rng,
            );
            next.push(Individual::new(child));
        }

        for _ in 0..self.quotas.mutants {
            let base = self.rng.gen_range(0..size);
            let child = mutate(
                &self.population[base].chromosome,
                &self.config.search_space,
                &mut self.rng,
            );
            next.push(Individual::new(child));
        }

        while next.len() < size {
            let immigrant = self.random_chromosome();
            next.push(Individual::new(immigrant));
        }
        next.truncate(size);
        next
    }

    /// Two distinct elite indices. After repeated collisions the second
    /// parent comes from the rest of the population.
    fn pick_parents(&mut self, elite: usize, size: usize) -> (usize, usize) {
        let first = self.rng.gen_range(0..elite);
        let mut second = self.rng.gen_range(0..elite);
        let mut collisions = 0;
        while second == first {
            collisions += 1;
            if collisions > PARENT_COLLISION_LIMIT {
                if elite < size {
                    second = self.rng.gen_range(elite..size);
                }
                break;
            }
            second = self.rng.gen_range(0..elite);
        }
        (first, second)
    }

    /// Runs `evolution.generations` generations, reporting each to `sink`.
    ///
    /// The best individual of every generation is rebuilt and trained for
    /// one epoch on `train` to report its training accuracy.
    ///
    /// # Returns
    ///
    /// The best individual seen over the whole run, if any generation ran
    pub fn run<S: ResultsSink + ?Sized>(
        &mut self,
        train: &[LabeledImage],
        validation: &[LabeledImage],
        sink: &mut S,
    ) -> NetworkResult<Option<Individual>> {
        let mut champion: Option<Individual> = None;

        for _ in 0..self.config.evolution.generations {
            let summary = self.evolve(train, validation)?;
            let train_accuracy = self.training_accuracy(&summary, train)?;
            let evaluation = summary.best.evaluation;

            let record = GenerationRecord {
                generation: summary.generation,
                best_fitness: summary.best.fitness,
                validation_accuracy: evaluation.map_or(0.0, |e| e.validation_accuracy),
                train_accuracy,
                parameters: evaluation.map_or(0, |e| e.parameters),
                training_time_ms: summary.elapsed_ms,
                chromosome: summary.best.chromosome.to_string(),
                timestamp_ms: timestamp_ms(),
            };
            if let Err(err) = sink.record(&record) {
                warn!(%err, generation = summary.generation, "failed to record generation");
            }

            if champion
                .as_ref()
                .map_or(true, |c| summary.best.fitness < c.fitness)
            {
                champion = Some(summary.best);
            }
        }

        Ok(champion)
    }

    fn training_accuracy(
        &self,
        summary: &GenerationSummary,
        train: &[LabeledImage],
    ) -> NetworkResult<f32> {
        if !summary.best.is_evaluated() {
            return Ok(0.0);
        }
        let mut rng = StdRng::seed_from_u64(individual_seed(
            self.config.training.seed,
            summary.generation,
            usize::MAX,
        ));
        let mut network = build_network(&summary.best.chromosome, &self.config.network, &mut rng)?;
        network.train_epoch(train, self.config.training.batch_size, &mut rng)?;
        network.test_batch(train, self.config.training.batch_size)
    }
}

fn individual_seed(seed: u64, generation: usize, index: usize) -> u64 {
    seed ^ (generation as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Scores `individual`, regenerating it while its architecture cannot be
/// built. Gives up after `max_regeneration_attempts` and leaves it
/// unevaluated.
fn evaluate_individual(
    individual: &mut Individual,
    config: &EngineConfig,
    cache: &FitnessCache,
    train: &[LabeledImage],
    validation: &[LabeledImage],
    rng: &mut StdRng,
) -> NetworkResult<()> {
    let attempts = config.evolution.max_regeneration_attempts.max(1);

    for attempt in 0..attempts {
        let key = individual.chromosome.key();
        match evaluate_chromosome(&individual.chromosome, config, train, validation, rng) {
            Ok(evaluation) => {
                cache.record(&key, evaluation);
                individual.assign(evaluation);
                return Ok(());
            }
            Err(err) if err.is_invalid_architecture() => {
                debug!(attempt, %err, "regenerating invalid architecture");
                cache.mark_invalid(&key);
                match claim_random(config, cache, attempts, rng) {
                    Some(chromosome) => individual.replace(chromosome),
                    None => break,
                }
            }
            Err(err) => return Err(err),
        }
    }

    warn!(
        attempts,
        chromosome = %individual.chromosome,
        "no buildable architecture found, keeping worst fitness"
    );
    Ok(())
}

/// Random chromosome not yet in the cache, claimed for the caller.
fn claim_random(
    config: &EngineConfig,
    cache: &FitnessCache,
    attempts: usize,
    rng: &mut StdRng,
) -> Option<Chromosome> {
    (0..attempts).find_map(|_| {
        let chromosome = Chromosome::random(
            &config.search_space,
            config.network.input_rows,
            config.network.input_cols,
            rng,
        );
        cache.claim(&chromosome.key()).then_some(chromosome)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchSpace;
    use crate::data::{generate_pattern_dataset, split_validation, PatternDatasetConfig};
    use crate::logging::MemoryResultsLog;
    use crate::neural::Activation;

    fn small_config(population_size: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.network.input_rows = 10;
        config.network.input_cols = 10;
        config.network.output_classes = 6;
        config.network.learning_rate = 0.05;
        config.training.epochs = 1;
        config.training.batch_size = 4;
        config.training.seed = 17;
        config.evolution.population_size = population_size;
        config.evolution.generations = 2;
        config.search_space = SearchSpace {
            filters: vec![2, 4],
            kernel_sizes: vec![3],
            conv_strides: vec![1],
            pool_windows: vec![2],
            pool_strides: vec![2],
            fc_sizes: vec![8, 16],
            activations: vec![Activation::ReLU, Activation::LeakyReLU],
            min_conv_blocks: 1,
            max_conv_blocks: 2,
            max_fc_layers: 2,
            max_pool_layers: 1,
            min_pool_input: 6,
            min_conv_output: 3,
        };
        config
    }

    fn dataset() -> (Vec<LabeledImage>, Vec<LabeledImage>) {
        let images = generate_pattern_dataset(&PatternDatasetConfig {
            size: 10,
            samples_per_class: 3,
            noise_level: 0.05,
            seed: 4,
        });
        let (train, validation) = split_validation(&images, 0.25);
        (train, validation)
    }

    #[test]
    fn test_fitness_formula() {
        assert_eq!(fitness(1.0, 0, 100_000.0), 0.0);
        assert!((fitness(0.9, 50_000, 100_000.0) - 10.5).abs() < 1e-4);
    }

    #[test]
    fn test_quotas_fill_population() {
        let config = EvolutionConfig {
            population_size: 40,
            ..EvolutionConfig::default()
        };
        let quotas = PopulationQuotas::from_config(&config);
        assert_eq!(
            quotas,
            PopulationQuotas {
                elite: 4,
                crossover: 20,
                mutants: 12,
                immigrants: 4
            }
        );

        let tiny = EvolutionConfig {
            population_size: 3,
            ..EvolutionConfig::default()
        };
        let quotas = PopulationQuotas::from_config(&tiny);
        assert_eq!(quotas.elite, 1);
        assert_eq!(quotas.total(), 3);
    }

    #[test]
    fn test_pick_parents_are_distinct() {
        let mut ga = GeneticAlgorithm::new(small_config(10));
        for _ in 0..200 {
            let (a, b) = ga.pick_parents(3, 10);
            assert!(a < 3);
            assert_ne!(a, b);
        }
        // a single elite forces the second parent out of the elite
        for _ in 0..20 {
            let (a, b) = ga.pick_parents(1, 10);
            assert_eq!(a, 0);
            assert!(b >= 1);
        }
    }

    #[test]
    fn test_evolve_keeps_size_and_elites() {
        let (train, validation) = dataset();
        let mut ga = GeneticAlgorithm::new(small_config(6));

        let first = ga.evolve(&train, &validation).unwrap();
        assert_eq!(ga.population().len(), 6);
        assert!(first.best.is_evaluated());
        assert_eq!(first.evaluated, 6);

        let elite = ga.population()[0].clone();
        assert_eq!(elite.chromosome(), first.best.chromosome());
        assert_eq!(elite.fitness(), first.best.fitness());

        let second = ga.evolve(&train, &validation).unwrap();
        assert_eq!(ga.population().len(), 6);
        assert!(second.best.fitness() <= first.best.fitness());
        assert_eq!(ga.generation(), 2);
    }

    #[test]
    fn test_cache_prevents_retraining() {
        let (train, validation) = dataset();
        let mut ga = GeneticAlgorithm::new(small_config(6));
        ga.evolve(&train, &validation).unwrap();
        let cached = ga.cache().len();
        assert!(cached >= 6);

        for individual in ga.population() {
            if individual.is_evaluated() {
                assert!(matches!(
                    ga.cache().get(&individual.chromosome().key()),
                    Some(CacheEntry::Evaluated(_))
                ));
            }
        }
    }

    #[test]
    fn test_unbuildable_and_duplicate_chromosomes_are_regenerated() {
        let (train, validation) = dataset();
        let mut ga = GeneticAlgorithm::new(small_config(4));

        let unbuildable: Chromosome =
            "FC(8,ReLU) → CONVOLUTION (2 filters 3x3, stride=1, valid padding + ReLU) → FC output"
                .parse()
                .unwrap();
        let repeated: Chromosome = "CONVOLUTION (2 filters 3x3, stride=1, valid padding + ReLU) → FC output"
            .parse()
            .unwrap();
        ga.population = vec![
            Individual::new(unbuildable.clone()),
            Individual::new(repeated.clone()),
            Individual::new(repeated.clone()),
            Individual::new(repeated.clone()),
        ];

        let summary = ga.evolve(&train, &validation).unwrap();
        assert_eq!(summary.evaluated, 4);
        assert!(summary.best.is_evaluated());

        let cache = ga.cache();
        assert_eq!(cache.get(&unbuildable.key()), Some(CacheEntry::Invalid));
        assert!(matches!(
            cache.get(&repeated.key()),
            Some(CacheEntry::Evaluated(_))
        ));
        // the unbuildable slot got a replacement and two copies were redrawn
        assert_eq!(cache.len(), 5);

        assert!(ga
            .population()
            .iter()
            .filter(|individual| individual.is_evaluated())
            .all(|individual| individual.chromosome() != &unbuildable));
    }

    #[test]
    fn test_run_reports_every_generation() {
        let (train, validation) = dataset();
        let mut ga = GeneticAlgorithm::new(small_config(5));
        let mut log = MemoryResultsLog::default();

        let champion = ga.run(&train, &validation, &mut log).unwrap().unwrap();
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[0].generation, 0);
        assert_eq!(log.records[1].generation, 1);
        for record in &log.records {
            assert!(record.best_fitness >= champion.fitness());
            assert!((0.0..=1.0).contains(&record.train_accuracy));
            assert!(record.chromosome.ends_with("FC output"));
        }
    }
}
