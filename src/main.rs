//! Time-series center-loss CLI
//!
//! Entry point for training the time-series classifiers in two phases,
//! evaluating saved checkpoints and inspecting archive datasets.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use ts_centerloss::backend::{backend_name, default_device, TrainingBackend};
use ts_centerloss::dataset::{read_uea, Split, UEA_DATASETS};
use ts_centerloss::model::ModelKind;
use ts_centerloss::training::{evaluate_checkpoint, run_experiment, ExperimentSummary};
use ts_centerloss::utils::format_duration;
use ts_centerloss::utils::logging::{init_logging, LogConfig};
use ts_centerloss::ExperimentConfig;

/// Multivariate time-series classification with center loss
///
/// Trains FCN, ResNet, InceptionTime, OS-CNN or RNN-FCN style networks with
/// cross-entropy, then fine-tunes them with an added center loss.
#[derive(Parser, Debug)]
#[command(name = "ts_centerloss")]
#[command(version)]
#[command(about = "Time-series classification with center loss, built on Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model from scratch, then fine-tune it with center loss
    Train {
        #[command(flatten)]
        experiment: ExperimentArgs,
    },

    /// Evaluate a saved checkpoint on the TEST split
    Evaluate {
        #[command(flatten)]
        experiment: ExperimentArgs,

        /// Path to the `.mpk` checkpoint
        #[arg(long)]
        checkpoint: PathBuf,
    },

    /// List the indexed archive datasets
    Datasets,

    /// Show shape and class distribution of a dataset
    Stats {
        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Root directory of the archive
        #[arg(long, default_value = "data/Multivariate_ts")]
        data_dir: PathBuf,
    },
}

/// Experiment flags; every flag overrides the `--config` file or the defaults
#[derive(Args, Debug, Default)]
struct ExperimentArgs {
    /// JSON configuration used as the base
    #[arg(long)]
    config: Option<PathBuf>,

    /// Index into the dataset list
    #[arg(long)]
    dataset_id: Option<usize>,

    /// Dataset name, overrides --dataset-id
    #[arg(long)]
    dataset: Option<String>,

    /// Root directory of the archive
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output directory for checkpoints and reports
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Architecture (fcn, resnet, inceptiontime, os_cnn, lstm_fcn, mlstm_fcn, ...)
    #[arg(short, long)]
    model: Option<String>,

    /// Learning rate of the cross-entropy phase
    #[arg(long)]
    lr: Option<f64>,

    /// Learning rate of the center-loss phase
    #[arg(long)]
    lr_restart: Option<f64>,

    /// L2 weight decay
    #[arg(long)]
    weight_decay: Option<f64>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Last epoch of the cross-entropy phase
    #[arg(long)]
    train_from_scratch_max_epoch: Option<usize>,

    /// Last epoch of the center-loss phase
    #[arg(long)]
    max_epoch: Option<usize>,

    /// Weight of the center loss
    #[arg(long)]
    center_loss_weight: Option<f64>,

    /// Repetition index
    #[arg(long)]
    repeat: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Start the center-loss phase from the best cross-entropy checkpoint
    #[arg(long, default_value = "false")]
    reload_best: bool,
}

impl ExperimentArgs {
    fn into_config(self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)?,
            None => ExperimentConfig::default(),
        };

        if let Some(id) = self.dataset_id {
            config.dataset_id = id;
        }
        if let Some(name) = self.dataset {
            config.dataset = Some(name);
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(dir) = self.out_dir {
            config.out_dir = dir;
        }
        if let Some(model) = self.model {
            config.model_name = model;
        }
        if let Some(lr) = self.lr {
            config.lr = lr;
        }
        if let Some(lr) = self.lr_restart {
            config.lr_restart = lr;
        }
        if let Some(decay) = self.weight_decay {
            config.weight_decay = decay;
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(epochs) = self.train_from_scratch_max_epoch {
            config.train_from_scratch_max_epoch = epochs;
        }
        if let Some(epochs) = self.max_epoch {
            config.max_epoch = epochs;
        }
        if let Some(weight) = self.center_loss_weight {
            config.center_loss_weight = weight;
        }
        if let Some(repeat) = self.repeat {
            config.repeat = repeat;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.reload_best {
            config.reload_best = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train { experiment } => cmd_train(experiment.into_config()?)?,
        Commands::Evaluate {
            experiment,
            checkpoint,
        } => cmd_evaluate(experiment.into_config()?, &checkpoint)?,
        Commands::Datasets => cmd_datasets(),
        Commands::Stats { dataset, data_dir } => cmd_stats(&dataset, &data_dir)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------------------+
 |   Time-Series Classification with Center Loss                |
 |   FCN / ResNet / InceptionTime / OS-CNN / RNN-FCN on Burn    |
 +--------------------------------------------------------------+
  "#
        .green()
    );
}

fn cmd_train(config: ExperimentConfig) -> Result<()> {
    let dataset = config.dataset_name()?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Dataset:          {} (id {})", dataset, config.dataset_id);
    println!("  Model:            {}", config.model_kind());
    println!("  Backend:          {}", backend_name());
    println!(
        "  Epochs:           {} cross-entropy, {} total",
        config.train_from_scratch_max_epoch, config.max_epoch
    );
    println!(
        "  Learning rates:   {} then {}",
        config.lr, config.lr_restart
    );
    println!("  Batch size:       {}", config.batch_size);
    println!("  Center loss:      weight {}", config.center_loss_weight);
    println!("  Output:           {:?}", config.out_dir);
    println!();

    let start = std::time::Instant::now();
    let summary = run_experiment::<TrainingBackend>(&config, &default_device())?;
    info!("Experiment finished in {}", format_duration(start.elapsed().as_secs_f64()));

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ExperimentSummary) {
    println!();
    println!("{}", "Results:".green().bold());
    println!("  Run:              {}", summary.basename);
    println!(
        "  Shape:            {} classes, embedding dim {}, batch size {}",
        summary.num_classes, summary.embedding_dim, summary.batch_size
    );

    let scratch = &summary.scratch;
    println!(
        "  Cross-entropy:    best epoch {:?}, train loss {:.5}, test loss {:.5}, test acc {:.5}",
        scratch.best_epoch, scratch.train_loss, scratch.test_loss, scratch.test_accuracy
    );

    match &summary.center_loss {
        Some(phase) if phase.has_checkpoint() => println!(
            "  Center loss:      best epoch {:?}, train loss {:.5}, test loss {:.5}, test acc {:.5}",
            phase.best_epoch, phase.train_loss, phase.test_loss, phase.test_accuracy
        ),
        Some(_) => println!(
            "  Center loss:      {}",
            "no checkpoint in the second half, reporting cross-entropy results".yellow()
        ),
        None => println!("  Center loss:      {}", "skipped".yellow()),
    }
}

fn cmd_evaluate(config: ExperimentConfig, checkpoint: &Path) -> Result<()> {
    if !checkpoint.exists() {
        bail!("Checkpoint not found: {:?}", checkpoint);
    }

    println!("{}", "Evaluation Configuration:".cyan().bold());
    println!("  Dataset:    {}", config.dataset_name()?);
    println!("  Model:      {}", config.model_kind());
    println!("  Checkpoint: {:?}", checkpoint);
    println!();

    let metrics = evaluate_checkpoint::<TrainingBackend>(&config, checkpoint, &default_device())?;

    println!("{}", "Test Results:".green().bold());
    println!("  Loss:     {:.5}", metrics.loss);
    println!("  Accuracy: {:.2}%", metrics.accuracy * 100.0);
    Ok(())
}

fn cmd_datasets() {
    println!("{}", "Indexed Datasets:".cyan().bold());
    for (id, name) in UEA_DATASETS.iter().enumerate() {
        println!("  {:>3}  {}", id, name);
    }
    println!();
    println!("{}", "Models:".cyan().bold());
    for kind in ModelKind::ALL {
        println!("  {}", kind);
    }
}

fn cmd_stats(dataset: &str, data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        println!("{} Data directory not found: {:?}", "Error:".red(), data_dir);
        return Ok(());
    }

    for split in [Split::Train, Split::Test] {
        let raw = read_uea(data_dir, dataset, split)?;
        let stats = raw.stats();

        println!("{} {}", dataset.cyan().bold(), split.suffix().cyan().bold());
        println!("  Samples:  {}", stats.num_samples);
        println!("  Channels: {}", stats.num_channels);
        println!("  Length:   {}", stats.series_length);
        println!("  Classes:");
        for (label, count) in &stats.class_counts {
            let pct = 100.0 * *count as f64 / stats.num_samples.max(1) as f64;
            println!("    {:30} {:>5} ({:>5.1}%)", label, count, pct);
        }
        println!();
    }

    Ok(())
}
