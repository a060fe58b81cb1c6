/// Hyperparameters for the training harness
///
/// Keys are kebab-case so that the same names work in JSON config files,
/// on the command line and in the reproducibility summary.
use std::path::{Path, PathBuf};

/// Default number of epochs
pub const MAX_EPOCHS: usize = 100;
/// Default patience (in epochs)
pub const PATIENCE: i64 = 10;
/// Default learning rate
pub const LR: f64 = 1e-4;
/// Default peak learning rate of the one-cycle schedule
pub const MAX_LR: f64 = 1e-2;

/// Configuration for [`crate::Trainer`]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TrainerConfig {
    /// Maximum number of epochs to run
    pub max_epochs: usize,

    /// Non-improving epochs tolerated before stopping. `-1` disables early stopping.
    pub patience: i64,

    /// Learning rate used when the scheduler is disabled
    pub lr: f64,

    /// Peak learning rate of the one-cycle schedule.
    /// Negative runs the learning rate range test. Ignored without the scheduler.
    pub max_lr: f64,

    /// Snapshot the weights whenever validation loss strictly improves
    pub save_best_model: bool,

    /// Use the one-cycle learning rate scheduler
    pub use_scheduler: bool,

    /// Directory for `best.safetensors`; only written when `save_best_model` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs: MAX_EPOCHS,
            patience: PATIENCE,
            lr: LR,
            max_lr: MAX_LR,
            save_best_model: false,
            use_scheduler: false,
            checkpoint_dir: None,
        }
    }
}

impl TrainerConfig {
    /// Load configuration from a JSON file; missing keys fall back to defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_epochs == 0 {
            return Err(crate::TrainerError::Config(
                "max-epochs must be > 0".to_string(),
            ));
        }

        if self.patience != -1 && self.patience < 1 {
            return Err(crate::TrainerError::Config(format!(
                "patience must be -1 (disabled) or >= 1, got {}",
                self.patience
            )));
        }

        if !self.lr.is_finite() || self.lr <= 0.0 {
            return Err(crate::TrainerError::Config(format!(
                "lr must be a positive finite number, got {}",
                self.lr
            )));
        }

        if !self.max_lr.is_finite() || self.max_lr == 0.0 {
            return Err(crate::TrainerError::Config(format!(
                "max-lr must be finite and non-zero, got {}",
                self.max_lr
            )));
        }

        Ok(())
    }

    /// Whether early stopping is active
    pub fn early_stopping_enabled(&self) -> bool {
        self.patience > 0
    }

    /// Settings worth recording for reproducibility
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "max-epochs": self.max_epochs,
            "patience": self.patience,
            "lr": self.lr,
            "max-lr": self.max_lr,
            "use-scheduler": self.use_scheduler,
            "save-best-model": self.save_best_model,
        })
    }
}
