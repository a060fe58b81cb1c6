//! im2latex-trainer - training and evaluation harness for image-to-LaTeX models
//!
//! Drives supervised training of a sequence-generation model that transcribes
//! formula images into LaTeX token sequences, on top of candle.
//!
//! # Overview
//!
//! The harness owns the epoch loop and nothing else of substance:
//! - **fit**: train/val phases per epoch, Adam + optional one-cycle schedule
//! - **early stopping**: patience on validation loss, best-weight snapshots
//! - **test**: greedy predictions scored with corpus BLEU and edit distance
//!
//! The model, tokenizer, data loaders and experiment tracker are collaborators
//! plugged in through traits.
//!
//! # Example
//!
//! ```ignore
//! use im2latex_trainer::{Trainer, TrainerConfig};
//!
//! let mut trainer = Trainer::new(model, varmap, Box::new(vocab), config, device)?;
//! let report = trainer.fit(&mut train_loader, &mut val_loader)?;
//! let scores = trainer.test(&mut test_loader)?;
//! ```

pub mod config;
pub mod data;
pub mod metrics;
pub mod models;
pub mod tokenizer;
pub mod tracking;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use config::TrainerConfig;
pub use models::Seq2SeqModel;
pub use tokenizer::{Detokenizer, Vocabulary};
pub use training::{EvalReport, FitReport, Trainer};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Safetensors error: {0}")]
    Safetensors(#[from] safetensors::SafeTensorError),
}

pub type Result<T> = std::result::Result<T, TrainerError>;
