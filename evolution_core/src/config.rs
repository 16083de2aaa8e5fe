//! Engine configuration management via TOML files.
//!
//! Every section is optional; missing keys fall back to the defaults used for
//! 28x28 ten-class digit images.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::neural::Activation;

/// Full configuration for training and architecture search.
///
/// # Examples
///
/// ```
/// use cnn_evolution_core::EngineConfig;
///
/// let config = EngineConfig::from_str("[evolution]\npopulation_size = 12").unwrap();
/// assert_eq!(config.evolution.population_size, 12);
/// assert_eq!(config.network.input_rows, 28);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineConfig {
    pub network: NetworkConfig,
    pub training: TrainingConfig,
    pub evolution: EvolutionConfig,
    pub search_space: SearchSpace,
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawEngineConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;

        Ok(Self {
            network: NetworkConfig::try_from(&raw.network)?,
            training: TrainingConfig::try_from(&raw.training)?,
            evolution: EvolutionConfig::try_from(&raw.evolution)?,
            search_space: SearchSpace::try_from(&raw.search_space)?,
        })
    }
}

/// Input geometry and optimizer settings shared by every built network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkConfig {
    pub input_rows: usize,
    pub input_cols: usize,
    pub output_classes: usize,
    pub learning_rate: f64,
    /// L2 weight decay
    pub l2_lambda: f64,
}

impl NetworkConfig {
    fn try_from(raw: &RawNetwork) -> Result<Self, ConfigError> {
        if raw.input_rows == 0 || raw.input_cols == 0 {
            return Err(ConfigError::Parse(
                "network input dimensions must be non-zero".into(),
            ));
        }
        if raw.output_classes < 2 {
            return Err(ConfigError::Parse(
                "network.output_classes must be at least 2".into(),
            ));
        }
        if !raw.learning_rate.is_finite() || raw.learning_rate <= 0.0 {
            return Err(ConfigError::Parse(
                "network.learning_rate must be positive".into(),
            ));
        }
        if !raw.l2_lambda.is_finite() || raw.l2_lambda < 0.0 {
            return Err(ConfigError::Parse(
                "network.l2_lambda must be non-negative".into(),
            ));
        }

        Ok(Self {
            input_rows: raw.input_rows,
            input_cols: raw.input_cols,
            output_classes: raw.output_classes,
            learning_rate: raw.learning_rate,
            l2_lambda: raw.l2_lambda,
        })
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            input_rows: default_input_size(),
            input_cols: default_input_size(),
            output_classes: default_output_classes(),
            learning_rate: default_learning_rate(),
            l2_lambda: default_l2_lambda(),
        }
    }
}

/// Per-candidate training schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
}

impl TrainingConfig {
    fn try_from(raw: &RawTraining) -> Result<Self, ConfigError> {
        if raw.epochs == 0 {
            return Err(ConfigError::Parse("training.epochs must be non-zero".into()));
        }
        if raw.batch_size == 0 {
            return Err(ConfigError::Parse(
                "training.batch_size must be non-zero".into(),
            ));
        }

        Ok(Self {
            epochs: raw.epochs,
            batch_size: raw.batch_size,
            seed: raw.seed,
        })
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            seed: default_seed(),
        }
    }
}

/// Population layout and fitness settings of the genetic search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: usize,
    pub elite_fraction: f64,
    pub crossover_fraction: f64,
    pub mutant_fraction: f64,
    /// Parameters per fitness point of size penalty
    pub parameter_penalty_divisor: f32,
    /// Regenerations tried for an invalid architecture before giving up
    pub max_regeneration_attempts: usize,
    /// Leading share of the training images held out for fitness scoring
    pub validation_fraction: f64,
}

impl EvolutionConfig {
    fn try_from(raw: &RawEvolution) -> Result<Self, ConfigError> {
        if raw.population_size < 2 {
            return Err(ConfigError::Parse(
                "evolution.population_size must be at least 2".into(),
            ));
        }
        for (name, value) in [
            ("elite_fraction", raw.elite_fraction),
            ("crossover_fraction", raw.crossover_fraction),
            ("mutant_fraction", raw.mutant_fraction),
            ("validation_fraction", raw.validation_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Parse(format!(
                    "evolution.{name} must lie in [0, 1]"
                )));
            }
        }
        if raw.elite_fraction + raw.crossover_fraction + raw.mutant_fraction > 1.0 + 1e-9 {
            return Err(ConfigError::Parse(
                "evolution elite, crossover and mutant fractions exceed the population".into(),
            ));
        }
        if !raw.parameter_penalty_divisor.is_finite() || raw.parameter_penalty_divisor <= 0.0 {
            return Err(ConfigError::Parse(
                "evolution.parameter_penalty_divisor must be positive".into(),
            ));
        }

        Ok(Self {
            population_size: raw.population_size,
            generations: raw.generations,
            elite_fraction: raw.elite_fraction,
            crossover_fraction: raw.crossover_fraction,
            mutant_fraction: raw.mutant_fraction,
            parameter_penalty_divisor: raw.parameter_penalty_divisor,
            max_regeneration_attempts: raw.max_regeneration_attempts.max(1),
            validation_fraction: raw.validation_fraction,
        })
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            generations: default_generations(),
            elite_fraction: default_elite_fraction(),
            crossover_fraction: default_crossover_fraction(),
            mutant_fraction: default_mutant_fraction(),
            parameter_penalty_divisor: default_penalty_divisor(),
            max_regeneration_attempts: default_max_regeneration_attempts(),
            validation_fraction: default_validation_fraction(),
        }
    }
}

/// Values random architectures are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSpace {
    /// Filter counts, ascending
    pub filters: Vec<usize>,
    pub kernel_sizes: Vec<usize>,
    pub conv_strides: Vec<usize>,
    pub pool_windows: Vec<usize>,
    pub pool_strides: Vec<usize>,
    pub fc_sizes: Vec<usize>,
    pub activations: Vec<Activation>,
    pub min_conv_blocks: usize,
    pub max_conv_blocks: usize,
    /// Fully-connected layers including the output layer
    pub max_fc_layers: usize,
    pub max_pool_layers: usize,
    /// Smallest spatial size a pooling gene may follow
    pub min_pool_input: usize,
    /// Smallest spatial size a convolution gene may produce
    pub min_conv_output: usize,
}

impl SearchSpace {
    fn try_from(raw: &RawSearchSpace) -> Result<Self, ConfigError> {
        for (name, values) in [
            ("filters", &raw.filters),
            ("kernel_sizes", &raw.kernel_sizes),
            ("conv_strides", &raw.conv_strides),
            ("pool_windows", &raw.pool_windows),
            ("pool_strides", &raw.pool_strides),
            ("fc_sizes", &raw.fc_sizes),
        ] {
            if values.is_empty() || values.contains(&0) {
                return Err(ConfigError::Parse(format!(
                    "search_space.{name} must be a non-empty list of positive integers"
                )));
            }
        }

        let activations = raw
            .activations
            .iter()
            .map(|name| {
                name.parse::<Activation>()
                    .map_err(|err| ConfigError::Parse(format!("search_space.activations: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if activations.is_empty() {
            return Err(ConfigError::Parse(
                "search_space.activations must not be empty".into(),
            ));
        }

        if raw.min_conv_blocks == 0 || raw.min_conv_blocks > raw.max_conv_blocks {
            return Err(ConfigError::Parse(
                "search_space requires 1 <= min_conv_blocks <= max_conv_blocks".into(),
            ));
        }
        if raw.max_fc_layers == 0 {
            return Err(ConfigError::Parse(
                "search_space.max_fc_layers must count the output layer".into(),
            ));
        }

        let mut filters = raw.filters.clone();
        filters.sort_unstable();
        filters.dedup();

        Ok(Self {
            filters,
            kernel_sizes: raw.kernel_sizes.clone(),
            conv_strides: raw.conv_strides.clone(),
            pool_windows: raw.pool_windows.clone(),
            pool_strides: raw.pool_strides.clone(),
            fc_sizes: raw.fc_sizes.clone(),
            activations,
            min_conv_blocks: raw.min_conv_blocks,
            max_conv_blocks: raw.max_conv_blocks,
            max_fc_layers: raw.max_fc_layers,
            max_pool_layers: raw.max_pool_layers,
            min_pool_input: raw.min_pool_input,
            min_conv_output: raw.min_conv_output.max(1),
        })
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            kernel_sizes: default_kernel_sizes(),
            conv_strides: default_conv_strides(),
            pool_windows: default_pool_windows(),
            pool_strides: default_pool_strides(),
            fc_sizes: default_fc_sizes(),
            activations: vec![Activation::ReLU, Activation::LeakyReLU, Activation::Sigmoid],
            min_conv_blocks: default_min_conv_blocks(),
            max_conv_blocks: default_max_conv_blocks(),
            max_fc_layers: default_max_fc_layers(),
            max_pool_layers: default_max_pool_layers(),
            min_pool_input: default_min_pool_input(),
            min_conv_output: default_min_conv_output(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawEngineConfig {
    #[serde(default)]
    network: RawNetwork,
    #[serde(default)]
    training: RawTraining,
    #[serde(default)]
    evolution: RawEvolution,
    #[serde(default)]
    search_space: RawSearchSpace,
}

#[derive(Debug, Deserialize)]
struct RawNetwork {
    #[serde(default = "default_input_size")]
    input_rows: usize,
    #[serde(default = "default_input_size")]
    input_cols: usize,
    #[serde(default = "default_output_classes")]
    output_classes: usize,
    #[serde(default = "default_learning_rate")]
    learning_rate: f64,
    #[serde(default = "default_l2_lambda")]
    l2_lambda: f64,
}

impl Default for RawNetwork {
    fn default() -> Self {
        Self {
            input_rows: default_input_size(),
            input_cols: default_input_size(),
            output_classes: default_output_classes(),
            learning_rate: default_learning_rate(),
            l2_lambda: default_l2_lambda(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTraining {
    #[serde(default = "default_epochs")]
    epochs: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_seed")]
    seed: u64,
}

impl Default for RawTraining {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvolution {
    #[serde(default = "default_population_size")]
    population_size: usize,
    #[serde(default = "default_generations")]
    generations: usize,
    #[serde(default = "default_elite_fraction")]
    elite_fraction: f64,
    #[serde(default = "default_crossover_fraction")]
    crossover_fraction: f64,
    #[serde(default = "default_mutant_fraction")]
    mutant_fraction: f64,
    #[serde(default = "default_penalty_divisor")]
    parameter_penalty_divisor: f32,
    #[serde(default = "default_max_regeneration_attempts")]
    max_regeneration_attempts: usize,
    #[serde(default = "default_validation_fraction")]
    validation_fraction: f64,
}

impl Default for RawEvolution {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            generations: default_generations(),
            elite_fraction: default_elite_fraction(),
            crossover_fraction: default_crossover_fraction(),
            mutant_fraction: default_mutant_fraction(),
            parameter_penalty_divisor: default_penalty_divisor(),
            max_regeneration_attempts: default_max_regeneration_attempts(),
            validation_fraction: default_validation_fraction(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSearchSpace {
    #[serde(default = "default_filters")]
    filters: Vec<usize>,
    #[serde(default = "default_kernel_sizes")]
    kernel_sizes: Vec<usize>,
    #[serde(default = "default_conv_strides")]
    conv_strides: Vec<usize>,
    #[serde(default = "default_pool_windows")]
    pool_windows: Vec<usize>,
    #[serde(default = "default_pool_strides")]
    pool_strides: Vec<usize>,
    #[serde(default = "default_fc_sizes")]
    fc_sizes: Vec<usize>,
    #[serde(default = "default_activation_names")]
    activations: Vec<String>,
    #[serde(default = "default_min_conv_blocks")]
    min_conv_blocks: usize,
    #[serde(default = "default_max_conv_blocks")]
    max_conv_blocks: usize,
    #[serde(default = "default_max_fc_layers")]
    max_fc_layers: usize,
    #[serde(default = "default_max_pool_layers")]
    max_pool_layers: usize,
    #[serde(default = "default_min_pool_input")]
    min_pool_input: usize,
    #[serde(default = "default_min_conv_output")]
    min_conv_output: usize,
}

impl Default for RawSearchSpace {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            kernel_sizes: default_kernel_sizes(),
            conv_strides: default_conv_strides(),
            pool_windows: default_pool_windows(),
            pool_strides: default_pool_strides(),
            fc_sizes: default_fc_sizes(),
            activations: default_activation_names(),
            min_conv_blocks: default_min_conv_blocks(),
            max_conv_blocks: default_max_conv_blocks(),
            max_fc_layers: default_max_fc_layers(),
            max_pool_layers: default_max_pool_layers(),
            min_pool_input: default_min_pool_input(),
            min_conv_output: default_min_conv_output(),
        }
    }
}

fn default_input_size() -> usize {
    28
}

fn default_output_classes() -> usize {
    10
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_l2_lambda() -> f64 {
    1e-4
}

fn default_epochs() -> usize {
    5
}

fn default_batch_size() -> usize {
    32
}

fn default_seed() -> u64 {
    123
}

fn default_population_size() -> usize {
    40
}

fn default_generations() -> usize {
    5
}

fn default_elite_fraction() -> f64 {
    0.1
}

fn default_crossover_fraction() -> f64 {
    0.5
}

fn default_mutant_fraction() -> f64 {
    0.3
}

fn default_penalty_divisor() -> f32 {
    100_000.0
}

fn default_max_regeneration_attempts() -> usize {
    50
}

fn default_validation_fraction() -> f64 {
    0.1
}

fn default_filters() -> Vec<usize> {
    vec![4, 8, 16, 32, 64]
}

fn default_kernel_sizes() -> Vec<usize> {
    vec![3, 5, 7]
}

fn default_conv_strides() -> Vec<usize> {
    vec![1, 2]
}

fn default_pool_windows() -> Vec<usize> {
    vec![2, 3]
}

fn default_pool_strides() -> Vec<usize> {
    vec![1, 2]
}

fn default_fc_sizes() -> Vec<usize> {
    vec![64, 128, 256, 512]
}

fn default_activation_names() -> Vec<String> {
    vec!["relu".into(), "leakyrelu".into(), "sigmoid".into()]
}

fn default_min_conv_blocks() -> usize {
    1
}

fn default_max_conv_blocks() -> usize {
    3
}

fn default_max_fc_layers() -> usize {
    3
}

fn default_max_pool_layers() -> usize {
    3
}

fn default_min_pool_input() -> usize {
    6
}

fn default_min_conv_output() -> usize {
    3
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults_when_sections_missing() {
        let config = EngineConfig::from_str("").unwrap();
        assert_eq!(config.network, NetworkConfig::default());
        assert_eq!(config.training.seed, 123);
        assert_eq!(config.evolution.population_size, 40);
        assert_eq!(config.evolution.parameter_penalty_divisor, 100_000.0);
        assert_eq!(config.search_space, SearchSpace::default());
    }

    #[test]
    fn engine_config_parses_custom_values() {
        let toml = r#"
[network]
input_rows = 12
input_cols = 12
output_classes = 6
learning_rate = 0.05

[training]
epochs = 2
batch_size = 4

[evolution]
population_size = 10
elite_fraction = 0.2

[search_space]
filters = [16, 4, 8]
activations = ["ReLU", "sigmoid"]
max_conv_blocks = 2
"#;
        let config = EngineConfig::from_str(toml).unwrap();
        assert_eq!(config.network.input_rows, 12);
        assert_eq!(config.network.output_classes, 6);
        assert_eq!(config.network.learning_rate, 0.05);
        assert_eq!(config.network.l2_lambda, 1e-4);
        assert_eq!(config.training.epochs, 2);
        assert_eq!(config.training.batch_size, 4);
        assert_eq!(config.evolution.population_size, 10);
        assert_eq!(config.evolution.elite_fraction, 0.2);
        assert_eq!(config.evolution.crossover_fraction, 0.5);
        assert_eq!(config.search_space.filters, vec![4, 8, 16]);
        assert_eq!(
            config.search_space.activations,
            vec![Activation::ReLU, Activation::Sigmoid]
        );
        assert_eq!(config.search_space.max_conv_blocks, 2);
    }

    #[test]
    fn engine_config_rejects_unknown_activation() {
        let err = EngineConfig::from_str("[search_space]\nactivations = [\"tanh\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(msg) if msg.contains("tanh")));
    }

    #[test]
    fn engine_config_rejects_oversubscribed_population() {
        let toml = "[evolution]\nelite_fraction = 0.5\ncrossover_fraction = 0.5\nmutant_fraction = 0.3";
        assert!(EngineConfig::from_str(toml).is_err());
    }

    #[test]
    fn engine_config_rejects_zero_batch() {
        assert!(EngineConfig::from_str("[training]\nbatch_size = 0").is_err());
    }

    #[test]
    fn engine_config_loads_from_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("engine_config_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[training]\nepochs = 9\n").unwrap();

        let config = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.training.epochs, 9);

        assert!(matches!(
            EngineConfig::load_from_file(&path),
            Err(ConfigError::Io(_))
        ));
    }
}
