/// Training infrastructure: loss, scheduling, early stopping, checkpoints and the loop itself
pub mod checkpoint;
pub mod early_stopping;
pub mod loss;
pub mod lr_finder;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointMetadata, CHECKPOINT_FILENAME};
pub use early_stopping::{EarlyStopping, Verdict};
pub use loss::{Criterion, SequenceCrossEntropy};
pub use lr_finder::LrRangeTest;
pub use scheduler::{OneCycleConfig, OneCycleScheduler};
pub use trainer::{EpochRecord, EvalReport, FitReport, Trainer};
