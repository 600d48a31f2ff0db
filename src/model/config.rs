//! Experiment Configuration Module
//!
//! Defines the configuration of one training run: which dataset and model,
//! the optimization hyperparameters of both training phases and where the
//! artifacts are written.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ModelKind;
use crate::dataset::{dataset_name, UEA_DATASETS};
use crate::training::scheduler::PlateauConfig;
use crate::utils::error::{Result, TscError};

/// Configuration of a two-phase experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Index into the list of archive datasets
    pub dataset_id: usize,

    /// Dataset name overriding `dataset_id`
    pub dataset: Option<String>,

    /// Root directory of the archive
    pub data_dir: PathBuf,

    /// Directory receiving checkpoints, configs and result CSVs
    pub out_dir: PathBuf,

    /// Architecture name (case-insensitive)
    pub model_name: String,

    /// Learning rate of the cross-entropy phase
    pub lr: f64,

    /// Learning rate of the center-loss phase
    pub lr_restart: f64,

    /// L2 weight decay applied by Adam
    pub weight_decay: f64,

    /// Mini-batch size
    pub batch_size: usize,

    /// Last epoch (exclusive) of the cross-entropy phase
    pub train_from_scratch_max_epoch: usize,

    /// Last epoch (exclusive) of the center-loss phase
    pub max_epoch: usize,

    /// Weight of the center loss in the phase-2 objective
    pub center_loss_weight: f64,

    /// Repetition index, part of every artifact name
    pub repeat: usize,

    /// Seed for weight initialization and batch shuffling
    pub seed: u64,

    /// Start phase 2 from the best phase-1 checkpoint instead of the last weights
    pub reload_best: bool,

    /// Learning-rate schedule shared by both phases
    pub plateau: PlateauConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset_id: 0,
            dataset: None,
            data_dir: PathBuf::from("data/Multivariate_ts"),
            out_dir: PathBuf::from("output"),
            model_name: "os_cnn".to_string(),
            lr: 1e-3,
            lr_restart: 1e-4,
            weight_decay: 0.0,
            batch_size: 16,
            train_from_scratch_max_epoch: 1500,
            max_epoch: 2000,
            center_loss_weight: 0.01,
            repeat: 0,
            seed: 42,
            reload_best: false,
            plateau: PlateauConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Parsed architecture
    pub fn model_kind(&self) -> ModelKind {
        ModelKind::parse(&self.model_name)
    }

    /// Name of the dataset this run uses
    pub fn dataset_name(&self) -> Result<String> {
        match &self.dataset {
            Some(name) => Ok(name.clone()),
            None => dataset_name(self.dataset_id).map(str::to_string).ok_or_else(|| {
                TscError::Config(format!(
                    "dataset_id {} is out of range (0..{})",
                    self.dataset_id,
                    UEA_DATASETS.len()
                ))
            }),
        }
    }

    /// Stem shared by every artifact of this run
    pub fn basename(&self, dataset_name: &str) -> String {
        format!(
            "{}_{}_{}_{}",
            self.model_name.to_lowercase(),
            self.dataset_id,
            dataset_name,
            self.repeat
        )
    }

    /// Whether the center-loss phase runs at all
    pub fn has_center_loss_phase(&self) -> bool {
        self.max_epoch > self.train_from_scratch_max_epoch
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(TscError::Config(format!("{} must be positive, got {}", name, value)))
            }
        };

        positive("lr", self.lr)?;
        positive("lr_restart", self.lr_restart)?;

        if self.weight_decay < 0.0 {
            return Err(TscError::Config("weight_decay must not be negative".to_string()));
        }

        if self.center_loss_weight < 0.0 {
            return Err(TscError::Config(
                "center_loss_weight must not be negative".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(TscError::Config("batch_size must be greater than 0".to_string()));
        }

        if self.train_from_scratch_max_epoch == 0 && self.max_epoch == 0 {
            return Err(TscError::Config("at least one epoch is required".to_string()));
        }

        if self.dataset.is_none() && self.dataset_id >= UEA_DATASETS.len() {
            return Err(TscError::Config(format!(
                "dataset_id must be below {}",
                UEA_DATASETS.len()
            )));
        }

        self.plateau.validate()
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields take their default value.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TscError::PathNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::report::write_config_json;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.model_kind(), ModelKind::OsCnn);
        assert_eq!(config.dataset_name().unwrap(), "ArticularyWordRecognition");
        assert!(config.has_center_loss_phase());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_basename_lowercases_model() {
        let config = ExperimentConfig {
            model_name: "MLSTM_FCN".to_string(),
            dataset_id: 2,
            repeat: 3,
            ..Default::default()
        };
        assert_eq!(config.basename("BasicMotions"), "mlstm_fcn_2_BasicMotions_3");
    }

    #[test]
    fn test_dataset_override() {
        let config = ExperimentConfig {
            dataset: Some("Synthetic".to_string()),
            dataset_id: 999,
            ..Default::default()
        };
        assert_eq!(config.dataset_name().unwrap(), "Synthetic");
        assert!(config.validate().is_ok());

        let out_of_range = ExperimentConfig {
            dataset_id: 999,
            ..Default::default()
        };
        assert!(out_of_range.dataset_name().is_err());
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad_lr = ExperimentConfig {
            lr: 0.0,
            ..Default::default()
        };
        assert!(bad_lr.validate().is_err());

        let bad_batch = ExperimentConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(bad_batch.validate().is_err());

        let negative_weight = ExperimentConfig {
            center_loss_weight: -1.0,
            ..Default::default()
        };
        assert!(negative_weight.validate().is_err());
    }

    #[test]
    fn test_run_config_dump_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = ExperimentConfig {
            model_name: "fcn".to_string(),
            max_epoch: 10,
            train_from_scratch_max_epoch: 5,
            ..Default::default()
        };
        write_config_json(&path, &config).unwrap();
        assert_eq!(ExperimentConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "model_name": "resnet", "lr": 0.01 }"#).unwrap();

        let config = ExperimentConfig::load(&path).unwrap();
        assert_eq!(config.model_kind(), ModelKind::ResNet);
        assert_eq!(config.lr, 0.01);
        assert_eq!(config.batch_size, 16);
    }
}
