//! Learning Rate Scheduler Module
//!
//! Reduce-on-plateau schedule: the learning rate is multiplied by `factor`
//! once the monitored metric has failed to improve for more than `patience`
//! consecutive epochs. Improvement is measured relative to the best value
//! seen so far.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::{Result, TscError};

/// Mode for plateau detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateauMode {
    /// Metric should decrease (e.g., loss)
    Min,
    /// Metric should increase (e.g., accuracy)
    Max,
}

/// Constants of the plateau schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateauConfig {
    pub mode: PlateauMode,

    /// Multiplier applied on every reduction
    pub factor: f64,

    /// Bad epochs tolerated before reducing
    pub patience: usize,

    /// Lower bound of the learning rate
    pub min_lr: f64,

    /// Relative improvement required to reset the patience counter
    pub threshold: f64,

    /// Reductions smaller than this are skipped
    pub eps: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            mode: PlateauMode::Min,
            factor: 0.5,
            patience: 50,
            min_lr: 5e-5,
            threshold: 1e-4,
            eps: 1e-8,
        }
    }
}

impl PlateauConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.factor > 0.0 && self.factor < 1.0) {
            return Err(TscError::Config(format!(
                "plateau factor must be in (0, 1), got {}",
                self.factor
            )));
        }

        if self.min_lr < 0.0 || self.threshold < 0.0 || self.eps < 0.0 {
            return Err(TscError::Config(
                "plateau min_lr, threshold and eps must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a scheduler starting at `initial_lr`
    pub fn init(&self, initial_lr: f64) -> ReduceOnPlateau {
        ReduceOnPlateau::new(self.clone(), initial_lr)
    }
}

/// Reduce-on-plateau learning rate state
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    config: PlateauConfig,
    best_metric: f64,
    bad_epochs: usize,
    current_lr: f64,
    num_reductions: usize,
}

impl ReduceOnPlateau {
    pub fn new(config: PlateauConfig, initial_lr: f64) -> Self {
        let best_metric = match config.mode {
            PlateauMode::Min => f64::INFINITY,
            PlateauMode::Max => f64::NEG_INFINITY,
        };

        Self {
            config,
            best_metric,
            bad_epochs: 0,
            current_lr: initial_lr,
            num_reductions: 0,
        }
    }

    fn is_improvement(&self, metric: f64) -> bool {
        match self.config.mode {
            PlateauMode::Min => metric < self.best_metric * (1.0 - self.config.threshold),
            PlateauMode::Max => metric > self.best_metric * (1.0 + self.config.threshold),
        }
    }

    /// Update the scheduler with a new metric value and return the new learning rate
    pub fn step(&mut self, metric: f64) -> f64 {
        if self.is_improvement(metric) {
            self.best_metric = metric;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.config.patience {
            let new_lr = (self.current_lr * self.config.factor).max(self.config.min_lr);
            if self.current_lr - new_lr > self.config.eps {
                info!(
                    "Reducing learning rate from {:.4e} to {:.4e}",
                    self.current_lr, new_lr
                );
                self.current_lr = new_lr;
                self.num_reductions += 1;
            }
            self.bad_epochs = 0;
        }

        self.current_lr
    }

    /// Get the current learning rate
    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    /// Best metric seen so far
    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }

    /// How many times the learning rate has been lowered
    pub fn num_reductions(&self) -> usize {
        self.num_reductions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(patience: usize) -> PlateauConfig {
        PlateauConfig {
            patience,
            ..Default::default()
        }
    }

    #[test]
    fn test_reduces_after_patience_is_exceeded() {
        let mut state = config(2).init(0.1);

        assert_eq!(state.step(1.0), 0.1);
        // Three bad epochs: the third exceeds patience 2
        assert_eq!(state.step(1.0), 0.1);
        assert_eq!(state.step(1.0), 0.1);
        assert_eq!(state.step(1.0), 0.05);
        assert_eq!(state.num_reductions(), 1);

        // Counter was reset
        assert_eq!(state.step(1.0), 0.05);
        assert_eq!(state.step(1.0), 0.05);
        assert_eq!(state.step(1.0), 0.025);
    }

    #[test]
    fn test_relative_threshold() {
        let mut state = config(0).init(0.1);
        state.step(1.0);

        // Not a big enough improvement
        assert_eq!(state.step(0.99995), 0.05);
        assert_eq!(state.best_metric(), 1.0);

        let mut state = config(0).init(0.1);
        state.step(1.0);
        assert_eq!(state.step(0.9), 0.1);
        assert_eq!(state.best_metric(), 0.9);
    }

    #[test]
    fn test_min_lr_floor() {
        let mut state = config(0).init(1e-4);
        state.step(1.0);

        assert_eq!(state.step(1.0), 5e-5);
        // Already at the floor: no further reduction
        assert_eq!(state.step(1.0), 5e-5);
        assert_eq!(state.step(1.0), 5e-5);
        assert_eq!(state.num_reductions(), 1);
    }

    #[test]
    fn test_tiny_reductions_are_skipped() {
        let mut state = PlateauConfig {
            patience: 0,
            min_lr: 0.0,
            ..Default::default()
        }
        .init(1e-8);
        state.step(1.0);

        assert_eq!(state.step(2.0), 1e-8);
        assert_eq!(state.num_reductions(), 0);
    }

    #[test]
    fn test_max_mode() {
        let mut state = PlateauConfig {
            mode: PlateauMode::Max,
            patience: 1,
            ..Default::default()
        }
        .init(0.01);

        state.step(0.5);
        assert_eq!(state.step(0.6), 0.01);
        assert_eq!(state.step(0.6), 0.01);
        assert_eq!(state.step(0.55), 0.005);
    }

    #[test]
    fn test_validate() {
        assert!(PlateauConfig::default().validate().is_ok());

        let bad = PlateauConfig {
            factor: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
