//! im2latex-train - fit a model on rendered formulas and report test scores
//!
//! Expects `train/`, `val/` and `test/` directories under `--data-dir`, each
//! holding `images.npy` and `formulas.npy`.

use anyhow::{Context, Result};
use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use clap::Parser;
use std::path::{Path, PathBuf};

use im2latex_trainer::data::{ImageFormulaDataset, ImageFormulaLoader};
use im2latex_trainer::models::{BaselineConfig, BaselineModel};
use im2latex_trainer::tracking::JsonSummaryTracker;
use im2latex_trainer::utils::{count_parameters, select_device};
use im2latex_trainer::{Trainer, TrainerConfig, Vocabulary};

#[derive(Parser, Debug)]
#[command(name = "im2latex-train")]
#[command(about = "Train and evaluate an image-to-LaTeX model", version)]
struct Args {
    /// Directory with train/, val/ and test/ splits
    #[arg(long = "data-dir")]
    data_dir: PathBuf,

    /// JSON array of vocabulary tokens
    #[arg(long)]
    vocab: PathBuf,

    /// JSON file with trainer hyperparameters (kebab-case keys)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of epochs
    #[arg(long = "max-epochs")]
    max_epochs: Option<usize>,

    /// Epochs without improvement before stopping (-1 disables)
    #[arg(long, allow_negative_numbers = true)]
    patience: Option<i64>,

    /// Learning rate without the scheduler
    #[arg(long)]
    lr: Option<f64>,

    /// Peak one-cycle learning rate; must be positive with --use-scheduler
    #[arg(long = "max-lr", allow_negative_numbers = true)]
    max_lr: Option<f64>,

    /// Keep the weights with the best validation loss and test with them
    #[arg(long = "save-best-model")]
    save_best_model: bool,

    /// Use the one-cycle learning rate schedule
    #[arg(long = "use-scheduler")]
    use_scheduler: bool,

    /// Where to write best.safetensors
    #[arg(long = "checkpoint-dir")]
    checkpoint_dir: Option<PathBuf>,

    /// Resume from a checkpoint written by a previous run
    #[arg(long = "resume-from")]
    resume_from: Option<PathBuf>,

    /// Write run summary values (epoch, bleu, edit_distance) to this JSON file
    #[arg(long = "summary-file")]
    summary_file: Option<PathBuf>,

    #[arg(long = "batch-size", default_value_t = 32)]
    batch_size: usize,

    #[arg(long = "hidden-size", default_value_t = 256)]
    hidden_size: usize,

    /// Positions produced at prediction time (defaults to the training formula length)
    #[arg(long = "max-output-len")]
    max_output_len: Option<usize>,

    #[arg(long, default_value_t = 0.1)]
    dropout: f32,

    /// Stay on the CPU even if CUDA is available
    #[arg(long)]
    cpu: bool,
}

impl Args {
    /// Config file (or defaults) with command line overrides applied
    fn trainer_config(&self) -> Result<TrainerConfig> {
        let mut config = match &self.config {
            Some(path) => TrainerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => TrainerConfig::default(),
        };

        if let Some(max_epochs) = self.max_epochs {
            config.max_epochs = max_epochs;
        }
        if let Some(patience) = self.patience {
            config.patience = patience;
        }
        if let Some(lr) = self.lr {
            config.lr = lr;
        }
        if let Some(max_lr) = self.max_lr {
            config.max_lr = max_lr;
        }
        if self.save_best_model {
            config.save_best_model = true;
        }
        if self.use_scheduler {
            config.use_scheduler = true;
        }
        if self.checkpoint_dir.is_some() {
            config.checkpoint_dir = self.checkpoint_dir.clone();
        }

        // A negative max-lr asks for a range test, which only the library API can supply
        if config.use_scheduler && config.max_lr < 0.0 {
            anyhow::bail!(
                "--max-lr must be positive with --use-scheduler (got {}); no learning rate range test is available from the command line",
                config.max_lr
            );
        }

        config.validate()?;
        Ok(config)
    }
}

/// Fail early when a split was built for a different vocabulary
fn check_vocab_size(split: &str, dataset: &ImageFormulaDataset, vocab_size: usize) -> Result<()> {
    if let Some(metadata) = dataset.metadata() {
        if metadata.vocab_size != vocab_size {
            anyhow::bail!(
                "{} split was built for {} tokens but the vocabulary has {}",
                split,
                metadata.vocab_size,
                vocab_size
            );
        }
        if !metadata.description.is_empty() {
            log::info!("  - {}: {}", split, metadata.description);
        }
    }
    Ok(())
}

fn load_split(data_dir: &Path, split: &str) -> Result<ImageFormulaDataset> {
    let dir = data_dir.join(split);
    let dataset = ImageFormulaDataset::from_directory(&dir)
        .with_context(|| format!("Failed to load {} split from {:?}", split, dir))?;
    log::info!("  - {}: {} examples", split, dataset.len());
    Ok(dataset)
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.trainer_config()?;

    let device = select_device(args.cpu)?;
    log::info!("Using device: {:?}", device);

    let vocab = Vocabulary::from_json_file(&args.vocab)
        .with_context(|| format!("Failed to load vocabulary {:?}", args.vocab))?;
    log::info!("Vocabulary size: {}", vocab.len());

    log::info!("Loading data from {:?}", args.data_dir);
    let train = load_split(&args.data_dir, "train")?;
    let val = load_split(&args.data_dir, "val")?;
    let test = load_split(&args.data_dir, "test")?;
    for (split, dataset) in [("train", &train), ("val", &val), ("test", &test)] {
        check_vocab_size(split, dataset, vocab.len())?;
    }

    let (image_height, image_width) = train.image_size();
    let model_config = BaselineConfig {
        image_height,
        image_width,
        hidden_size: args.hidden_size,
        vocab_size: vocab.len(),
        max_output_len: args.max_output_len.unwrap_or(train.seq_len()),
        dropout: args.dropout,
    };
    log::info!("Model configuration: {:#?}", model_config);

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = BaselineModel::new(model_config, vb)?;
    log::info!("Parameters: {}", count_parameters(&varmap));

    let mut trainer = Trainer::new(model, varmap, Box::new(vocab), config, device)?;
    if let Some(path) = &args.summary_file {
        trainer = trainer.with_tracker(Box::new(JsonSummaryTracker::new(path)));
    }
    log::info!("Trainer configuration: {}", trainer.config_summary());

    if let Some(path) = &args.resume_from {
        trainer
            .resume_from(path)
            .with_context(|| format!("Failed to resume from {:?}", path))?;
    }

    let mut train_loader = ImageFormulaLoader::new(train, args.batch_size, true);
    let mut val_loader = ImageFormulaLoader::new(val, args.batch_size, false);
    let mut test_loader = ImageFormulaLoader::new(test, args.batch_size, false);

    let report = trainer.fit(&mut train_loader, &mut val_loader)?;
    log::info!(
        "Ran {} epochs (last epoch {}), best val loss {:.3}",
        report.epochs_run,
        report.last_epoch,
        report.best_val_loss
    );

    trainer.test(&mut test_loader)?;

    Ok(())
}
