//! Two-phase experiment driver
//!
//! 1. Train the backbone with cross-entropy, checkpointing whenever the
//!    training loss improves.
//! 2. Fine-tune it with cross-entropy plus the weighted center loss,
//!    optimizing the class centroids jointly with the model.
//!
//! Both phases step a reduce-on-plateau schedule on the training loss and
//! evaluate on the TEST split after every epoch. The run ends with a results
//! CSV and a JSON dump of its configuration.

use std::path::{Path, PathBuf};

use burn::{
    module::{AutodiffModule, Module},
    optim::{decay::WeightDecayConfig, AdamConfig},
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::center_loss::{CenterLoss, CenterLossConfig};
use super::report::{write_config_json, write_results_csv, ResultRow};
use super::supervised::{
    evaluate, train_epoch, train_epoch_with_center_loss, BatchLoader, CenterLossOptimizers,
    EpochMetrics,
};
use crate::dataset::{effective_batch_size, read_uea, LabelEncoder, Split, TimeSeriesDataset};
use crate::model::config::ExperimentConfig;
use crate::model::{InputShape, ModelKind, ModelVisitor, TimeSeriesClassifier};
use crate::utils::error::{Result, TscError};
use crate::utils::logging::EpochTimer;

/// Checkpoint of the best cross-entropy epoch
pub const BEST_MODEL_SUFFIX: &str = "best_model";
/// Checkpoint of the best center-loss epoch
pub const BEST_CL_MODEL_SUFFIX: &str = "best_cl_model";
/// Centroids saved alongside [`BEST_CL_MODEL_SUFFIX`]
pub const BEST_CL_CENTERS_SUFFIX: &str = "best_cl_centers";

/// Output directory layout of a run
#[derive(Debug, Clone)]
pub struct ExperimentPaths {
    pub root: PathBuf,
    pub checkpoints: PathBuf,
    pub config: PathBuf,
    pub csv: PathBuf,
}

impl ExperimentPaths {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            root: out_dir.to_path_buf(),
            checkpoints: out_dir.join("checkpoints"),
            config: out_dir.join("config"),
            csv: out_dir.join("csv"),
        }
    }

    /// Create every directory of the layout
    pub fn create(&self) -> Result<()> {
        for dir in [&self.root, &self.checkpoints, &self.config, &self.csv] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Checkpoint path without the recorder's extension
    pub fn checkpoint(&self, basename: &str, suffix: &str) -> PathBuf {
        self.checkpoints.join(format!("{}_{}", basename, suffix))
    }

    pub fn results_csv(&self, basename: &str) -> PathBuf {
        self.csv.join(format!("{}.csv", basename))
    }

    pub fn config_json(&self, basename: &str) -> PathBuf {
        self.config.join(format!("{}_train_config.json", basename))
    }
}

/// Both splits of a dataset, ready for training
#[derive(Debug, Clone)]
pub struct ExperimentData {
    pub dataset_name: String,
    pub encoder: LabelEncoder,
    pub train: BatchLoader,
    pub test: BatchLoader,
    pub shape: InputShape,
}

/// Read both splits, encode labels with the TRAIN classes and pick the batch size
pub fn load_experiment_data(config: &ExperimentConfig) -> Result<ExperimentData> {
    let dataset_name = config.dataset_name()?;
    let mut train = read_uea(&config.data_dir, &dataset_name, Split::Train)?;
    let mut test = read_uea(&config.data_dir, &dataset_name, Split::Test)?;

    if train.is_empty() {
        return Err(TscError::Dataset(format!(
            "the TRAIN split of {} is empty",
            dataset_name
        )));
    }
    if train.num_channels != test.num_channels && !test.is_empty() {
        return Err(TscError::Dataset(format!(
            "TRAIN has {} channels but TEST has {}",
            train.num_channels, test.num_channels
        )));
    }

    let series_length = train.series_length.max(test.series_length);
    train.pad_to(series_length);
    test.pad_to(series_length);
    test.num_channels = train.num_channels;

    let encoder = LabelEncoder::fit(&train.labels());
    if encoder.num_classes() < 2 {
        return Err(TscError::Dataset(format!(
            "{} has {} class(es) in its TRAIN split, at least 2 are required",
            dataset_name,
            encoder.num_classes()
        )));
    }

    let batch_size = effective_batch_size(config.batch_size, series_length);
    if batch_size != config.batch_size {
        info!(
            "Series length {} exceeds the long-series threshold, using batch size {}",
            series_length, batch_size
        );
    }

    let shape = InputShape {
        num_channels: train.num_channels,
        series_length,
        num_classes: encoder.num_classes(),
    };
    info!(
        "Train shape {:?}, test shape {:?}, {} classes",
        train.shape(),
        test.shape(),
        shape.num_classes
    );

    let train = BatchLoader::new(TimeSeriesDataset::from_split(&train, &encoder)?, batch_size);
    let test = BatchLoader::new(TimeSeriesDataset::from_split(&test, &encoder)?, batch_size);

    Ok(ExperimentData {
        dataset_name,
        encoder,
        train,
        test,
        shape,
    })
}

/// Best epoch of a phase and the TEST metrics observed at that epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Global epoch of the last checkpoint, `None` when nothing was saved
    pub best_epoch: Option<usize>,
    pub train_loss: f64,
    pub test_loss: f64,
    pub test_accuracy: f64,
}

impl Default for PhaseResult {
    fn default() -> Self {
        Self {
            best_epoch: None,
            train_loss: f64::INFINITY,
            test_loss: 0.0,
            test_accuracy: 0.0,
        }
    }
}

impl PhaseResult {
    /// Whether `train_loss` strictly beats the best loss so far
    pub fn improves(&self, train_loss: f64) -> bool {
        train_loss < self.train_loss
    }

    /// Record the epoch if its training loss improves; returns whether it did
    ///
    /// Callers write a checkpoint exactly when this returns `true`.
    pub fn update(&mut self, epoch: usize, train_loss: f64, test: EpochMetrics) -> bool {
        if !self.improves(train_loss) {
            return false;
        }
        self.best_epoch = Some(epoch);
        self.train_loss = train_loss;
        self.test_loss = test.loss;
        self.test_accuracy = test.accuracy;
        true
    }

    pub fn has_checkpoint(&self) -> bool {
        self.best_epoch.is_some()
    }
}

/// Whether phase 2 may checkpoint at global `epoch`
///
/// Only the second half of the phase `[start, max)` is eligible.
pub fn center_loss_checkpoint_allowed(epoch: usize, start: usize, max: usize) -> bool {
    let half = max.saturating_sub(start) as f64 * 0.5;
    epoch as f64 > start as f64 + half
}

/// Outcome of [`run_experiment`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub basename: String,
    pub dataset_name: String,
    pub model: ModelKind,
    pub num_classes: usize,
    pub embedding_dim: usize,
    pub batch_size: usize,
    pub scratch: PhaseResult,
    pub center_loss: Option<PhaseResult>,
}

impl ExperimentSummary {
    /// Phase-2 result when it checkpointed, otherwise the phase-1 result
    pub fn reported(&self) -> &PhaseResult {
        match &self.center_loss {
            Some(result) if result.has_checkpoint() => result,
            _ => &self.scratch,
        }
    }

    pub fn result_row(&self, model_name: &str) -> ResultRow {
        let reported = self.reported();
        ResultRow {
            model: model_name.to_lowercase(),
            train_loss: if reported.has_checkpoint() {
                reported.train_loss
            } else {
                0.0
            },
            test_loss: reported.test_loss,
            test_acc: reported.test_accuracy,
        }
    }
}

fn adam(weight_decay: f64) -> AdamConfig {
    let decay = (weight_decay > 0.0).then(|| WeightDecayConfig::new(weight_decay as f32));
    AdamConfig::new().with_weight_decay(decay)
}

fn epoch_progress(epochs: usize, phase: &str) -> ProgressBar {
    let progress = ProgressBar::new(epochs as u64);
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "[{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} epochs {{msg}}",
            phase
        ))
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress
}

/// Run both training phases and write the reports
pub fn run_experiment<B: AutodiffBackend>(
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<ExperimentSummary> {
    config.validate()?;

    let data = load_experiment_data(config)?;
    let basename = config.basename(&data.dataset_name);
    let paths = ExperimentPaths::new(&config.out_dir);
    paths.create()?;
    info!(
        "Processing dataset {}:{}, results go to {:?}",
        config.dataset_id, data.dataset_name, paths.root
    );

    B::seed(config.seed);

    let kind = config.model_kind();
    let runner = ExperimentRunner::<B> {
        config,
        data: &data,
        paths: &paths,
        basename: &basename,
        device,
    };
    let summary = kind.build::<B, _>(&data.shape, device, runner)??;

    let row = summary.result_row(&config.model_name);
    write_results_csv(&paths.results_csv(&basename), &row)?;
    write_config_json(&paths.config_json(&basename), config)?;
    info!("Wrote {:?}", paths.results_csv(&basename));

    Ok(summary)
}

struct ExperimentRunner<'a, B: AutodiffBackend> {
    config: &'a ExperimentConfig,
    data: &'a ExperimentData,
    paths: &'a ExperimentPaths,
    basename: &'a str,
    device: &'a B::Device,
}

impl<B: AutodiffBackend> ModelVisitor<B> for ExperimentRunner<'_, B> {
    type Output = Result<ExperimentSummary>;

    fn visit<M>(self, model: M) -> Self::Output
    where
        M: AutodiffModule<B> + TimeSeriesClassifier<B> + 'static,
        M::InnerModule: TimeSeriesClassifier<B::InnerBackend>,
    {
        let embedding_dim = model.embedding_dim();
        info!(
            "Model {} with {} parameters, embedding dim {}",
            self.config.model_kind(),
            model.num_params(),
            embedding_dim
        );

        let center_loss = CenterLossConfig::new(self.data.shape.num_classes, embedding_dim)
            .init::<B>(self.device);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let (model, scratch) = self.scratch_phase(model, &mut rng)?;
        info!(
            "In the first {} epochs, the best training loss: {:.6}, the test loss: {:.6}, the test accuracy: {:.6}",
            self.config.train_from_scratch_max_epoch,
            scratch.train_loss,
            scratch.test_loss,
            scratch.test_accuracy
        );

        let center_result = if self.config.has_center_loss_phase() {
            let model = if self.config.reload_best && scratch.has_checkpoint() {
                let path = self.paths.checkpoint(self.basename, BEST_MODEL_SUFFIX);
                info!("Reloading {:?} for the center-loss phase", path);
                model.load_file(path, &CompactRecorder::new(), self.device)?
            } else {
                model
            };

            let result = self.center_loss_phase(model, center_loss, &mut rng)?;
            if result.has_checkpoint() {
                info!(
                    "With center loss, the best training loss: {:.6}, the test loss: {:.6}, the test accuracy: {:.6}",
                    result.train_loss, result.test_loss, result.test_accuracy
                );
            } else {
                warn!("The center-loss phase saved no checkpoint, reporting the first phase");
            }
            Some(result)
        } else {
            info!("max_epoch does not exceed train_from_scratch_max_epoch, skipping the center-loss phase");
            None
        };

        Ok(ExperimentSummary {
            basename: self.basename.to_string(),
            dataset_name: self.data.dataset_name.clone(),
            model: self.config.model_kind(),
            num_classes: self.data.shape.num_classes,
            embedding_dim,
            batch_size: self.data.train.batch_size(),
            scratch,
            center_loss: center_result,
        })
    }
}

impl<B: AutodiffBackend> ExperimentRunner<'_, B> {
    fn scratch_phase<M>(&self, mut model: M, rng: &mut ChaCha8Rng) -> Result<(M, PhaseResult)>
    where
        M: AutodiffModule<B> + TimeSeriesClassifier<B>,
        M::InnerModule: TimeSeriesClassifier<B::InnerBackend>,
    {
        let epochs = self.config.train_from_scratch_max_epoch;
        let mut optimizer = adam(self.config.weight_decay).init();
        let mut scheduler = self.config.plateau.init(self.config.lr);
        let checkpoint = self.paths.checkpoint(self.basename, BEST_MODEL_SUFFIX);

        let progress = epoch_progress(epochs, "cross-entropy");
        let mut timer = EpochTimer::new("cross-entropy", epochs);
        let mut result = PhaseResult::default();

        for epoch in 0..epochs {
            timer.start_epoch();
            let lr = scheduler.get_lr();

            let (next, train) = train_epoch(model, &mut optimizer, &self.data.train, lr, rng, self.device);
            model = next;
            let test = evaluate::<B::InnerBackend, _>(&model.valid(), &self.data.test, self.device);
            scheduler.step(train.loss);

            progress.suspend(|| {
                info!(
                    "epoch [{:4}/{:4}], test loss: {:.6}, test acc {:.6}, train loss: {:.6}, train acc: {:.6}, lr: {:.2e}, time: {:.2} s",
                    epoch + 1,
                    epochs,
                    test.loss,
                    test.accuracy,
                    train.loss,
                    train.accuracy,
                    lr,
                    timer.epoch_secs()
                )
            });

            if result.update(epoch, train.loss, test) {
                model.clone().save_file(&checkpoint, &CompactRecorder::new())?;
            }

            progress.set_message(format!("loss {:.4}", train.loss));
            progress.inc(1);
        }

        progress.finish_and_clear();
        timer.finish();
        Ok((model, result))
    }

    fn center_loss_phase<M>(
        &self,
        mut model: M,
        mut center_loss: CenterLoss<B>,
        rng: &mut ChaCha8Rng,
    ) -> Result<PhaseResult>
    where
        M: AutodiffModule<B> + TimeSeriesClassifier<B>,
        M::InnerModule: TimeSeriesClassifier<B::InnerBackend>,
    {
        let start = self.config.train_from_scratch_max_epoch;
        let max = self.config.max_epoch;
        let weight = self.config.center_loss_weight;

        let mut optimizers = CenterLossOptimizers {
            model: adam(self.config.weight_decay).init(),
            centers: adam(self.config.weight_decay).init(),
        };
        let mut scheduler = self.config.plateau.init(self.config.lr_restart);
        let model_checkpoint = self.paths.checkpoint(self.basename, BEST_CL_MODEL_SUFFIX);
        let centers_checkpoint = self.paths.checkpoint(self.basename, BEST_CL_CENTERS_SUFFIX);

        let progress = epoch_progress(max - start, "center-loss");
        let mut timer = EpochTimer::new("center-loss", max - start);
        let mut result = PhaseResult::default();

        for epoch in start..max {
            timer.start_epoch();
            let lr = scheduler.get_lr();

            let (next_model, next_centers, train) = train_epoch_with_center_loss(
                model,
                center_loss,
                &mut optimizers,
                &self.data.train,
                lr,
                weight,
                rng,
                self.device,
            );
            model = next_model;
            center_loss = next_centers;

            let test = evaluate::<B::InnerBackend, _>(&model.valid(), &self.data.test, self.device);
            scheduler.step(train.ce_loss);

            progress.suspend(|| {
                info!(
                    "epoch [{:4}/{:4}], test loss: {:.6}, test acc {:.6}, train ce loss: {:.6}, train center loss: {:.6}, train acc: {:.6}, lr: {:.2e}, time: {:.2} s",
                    epoch + 1,
                    max,
                    test.loss,
                    test.accuracy,
                    train.ce_loss,
                    train.center_loss,
                    train.accuracy,
                    lr,
                    timer.epoch_secs()
                )
            });

            if center_loss_checkpoint_allowed(epoch, start, max)
                && result.update(epoch, train.ce_loss, test)
            {
                model.clone().save_file(&model_checkpoint, &CompactRecorder::new())?;
                center_loss
                    .clone()
                    .save_file(&centers_checkpoint, &CompactRecorder::new())?;
            }

            progress.set_message(format!("ce {:.4}", train.ce_loss));
            progress.inc(1);
        }

        progress.finish_and_clear();
        timer.finish();
        Ok(result)
    }
}

/// Load a checkpoint into a freshly built model and evaluate it on TEST
pub fn evaluate_checkpoint<B: AutodiffBackend>(
    config: &ExperimentConfig,
    checkpoint: &Path,
    device: &B::Device,
) -> Result<EpochMetrics> {
    let data = load_experiment_data(config)?;
    let evaluator = CheckpointEvaluator::<B> {
        checkpoint,
        test: &data.test,
        device,
    };
    config
        .model_kind()
        .build::<B, _>(&data.shape, device, evaluator)?
}

struct CheckpointEvaluator<'a, B: AutodiffBackend> {
    checkpoint: &'a Path,
    test: &'a BatchLoader,
    device: &'a B::Device,
}

impl<B: AutodiffBackend> ModelVisitor<B> for CheckpointEvaluator<'_, B> {
    type Output = Result<EpochMetrics>;

    fn visit<M>(self, model: M) -> Self::Output
    where
        M: AutodiffModule<B> + TimeSeriesClassifier<B> + 'static,
        M::InnerModule: TimeSeriesClassifier<B::InnerBackend>,
    {
        let model = model.load_file(self.checkpoint, &CompactRecorder::new(), self.device)?;
        Ok(evaluate::<B::InnerBackend, _>(&model.valid(), self.test, self.device))
    }
}
