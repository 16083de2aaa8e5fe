//! Multi-epoch training driver with per-epoch validation.

use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrainingConfig;
use crate::data::LabeledImage;
use crate::error::NetworkResult;
use crate::neural::NeuralNetwork;

/// Training metrics for a single epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_accuracy: f32,
    pub elapsed_ms: u128,
}

/// Complete training result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epoch_metrics: Vec<EpochMetrics>,
    /// Validation accuracy after the last epoch
    pub final_val_accuracy: f32,
    pub total_elapsed_ms: u128,
}

/// Runs `epochs` rounds of shuffle, train and validate.
#[derive(Debug, Clone)]
pub struct EpochTrainer {
    config: TrainingConfig,
}

impl EpochTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `network` in place.
    ///
    /// # Arguments
    ///
    /// * `network` - Network to train
    /// * `train` - Training images
    /// * `validation` - Images scored after every epoch
    /// * `rng` - Drives the per-epoch shuffle
    ///
    /// # Returns
    ///
    /// Per-epoch metrics; `final_val_accuracy` is the last epoch's score.
    pub fn train<R: Rng + ?Sized>(
        &self,
        network: &mut NeuralNetwork,
        train: &[LabeledImage],
        validation: &[LabeledImage],
        rng: &mut R,
    ) -> NetworkResult<TrainingReport> {
        let start_time = Instant::now();
        let mut epoch_metrics = Vec::with_capacity(self.config.epochs);

        for epoch in 1..=self.config.epochs {
            let epoch_start = Instant::now();
            let stats = network.train_epoch(train, self.config.batch_size, rng)?;
            let val_accuracy = network.test_batch(validation, self.config.batch_size)?;

            debug!(
                epoch,
                train_loss = stats.mean_loss,
                val_accuracy,
                "epoch finished"
            );

            epoch_metrics.push(EpochMetrics {
                epoch,
                train_loss: stats.mean_loss,
                val_accuracy,
                elapsed_ms: epoch_start.elapsed().as_millis(),
            });
        }

        let final_val_accuracy = epoch_metrics.last().map(|m| m.val_accuracy).unwrap_or(0.0);

        Ok(TrainingReport {
            epoch_metrics,
            final_val_accuracy,
            total_elapsed_ms: start_time.elapsed().as_millis(),
        })
    }
}
