/// Training and evaluation loop for image-to-LaTeX models
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use super::checkpoint::{self, Checkpoint, CheckpointMetadata, CHECKPOINT_FILENAME};
use super::early_stopping::{EarlyStopping, Verdict};
use super::loss::{Criterion, SequenceCrossEntropy};
use super::lr_finder::LrRangeTest;
use super::scheduler::{OneCycleConfig, OneCycleScheduler};
use crate::data::BatchDataLoader;
use crate::metrics;
use crate::models::Seq2SeqModel;
use crate::tokenizer::Detokenizer;
use crate::tracking::ExperimentTracker;
use crate::utils::time_elapsed;
use crate::TrainerConfig;

/// Losses and timing of one epoch
#[derive(Debug, Clone, serde::Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    /// Learning rate at the end of the epoch
    pub lr: f64,
    /// Adam `beta1` at the end of the epoch
    pub momentum: f64,
    pub elapsed_secs: f64,
}

/// Outcome of [`Trainer::fit`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct FitReport {
    /// Number of epochs run by this call
    pub epochs_run: usize,
    /// Number of the last epoch completed
    pub last_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub history: Vec<EpochRecord>,
}

/// Outcome of [`Trainer::test`], scores scaled to [0, 100]
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct EvalReport {
    pub bleu: f64,
    pub edit_distance: f64,
    pub num_examples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Train,
    Val,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => write!(f, "train"),
            Phase::Val => write!(f, "val"),
        }
    }
}

const ADAM_BETA1: f64 = 0.9;

const PROGRESS_TEMPLATE: &str = "{prefix:>5} [{bar:30}] {pos}/{len} {msg}";

fn scalar(loss: &Tensor) -> candle_core::Result<f64> {
    loss.to_dtype(DType::F64)?.to_scalar::<f64>()
}

/// Move the optimizer to the schedule's current learning rate and momentum
fn apply_schedule(optimizer: &mut AdamW, scheduler: &OneCycleScheduler) {
    let mut params = optimizer.params().clone();
    params.lr = scheduler.get_lr();
    params.beta1 = scheduler.get_momentum();
    optimizer.set_params(params);
}

/// Transient bar for one pass over a loader, cleared when the pass ends
fn phase_progress(phase: Phase, len: usize) -> ProgressBar {
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let bar = ProgressBar::new(len as u64);
    bar.set_style(style);
    bar.set_prefix(phase.to_string());
    bar
}

/// Trainer for [`Seq2SeqModel`]s
pub struct Trainer<M: Seq2SeqModel> {
    model: M,
    varmap: VarMap,
    tokenizer: Box<dyn Detokenizer>,
    criterion: Box<dyn Criterion>,
    config: TrainerConfig,
    device: Device,
    optimizer: Option<AdamW>,
    scheduler: Option<OneCycleScheduler>,
    early_stopping: EarlyStopping,
    start_epoch: usize,
    checkpoint: Option<HashMap<String, Tensor>>,
    tracker: Option<Box<dyn ExperimentTracker>>,
    lr_finder: Option<Box<dyn LrRangeTest<M>>>,
}

impl<M: Seq2SeqModel> Trainer<M> {
    /// Create new trainer
    ///
    /// `varmap` must hold the model's parameters. The default criterion is
    /// cross entropy ignoring the tokenizer's padding index.
    pub fn new(
        model: M,
        varmap: VarMap,
        tokenizer: Box<dyn Detokenizer>,
        config: TrainerConfig,
        device: Device,
    ) -> crate::Result<Self> {
        config.validate()?;

        let criterion = Box::new(SequenceCrossEntropy::new(tokenizer.pad_index()));
        let early_stopping = EarlyStopping::from_patience(config.patience);

        Ok(Self {
            model,
            varmap,
            tokenizer,
            criterion,
            config,
            device,
            optimizer: None,
            scheduler: None,
            early_stopping,
            start_epoch: 1,
            checkpoint: None,
            tracker: None,
            lr_finder: None,
        })
    }

    pub fn with_tracker(mut self, tracker: Box<dyn ExperimentTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_lr_finder(mut self, lr_finder: Box<dyn LrRangeTest<M>>) -> Self {
        self.lr_finder = Some(lr_finder);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Settings worth recording for reproducibility
    pub fn config_summary(&self) -> serde_json::Value {
        self.config.summary()
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn best_val_loss(&self) -> f64 {
        self.early_stopping.best_loss()
    }

    pub fn no_improve_count(&self) -> usize {
        self.early_stopping.no_improve_count()
    }

    /// Weights captured at the best validation loss, if any
    pub fn best_checkpoint(&self) -> Option<&HashMap<String, Tensor>> {
        self.checkpoint.as_ref()
    }

    /// Learning rate the optimizer will use for its next step
    pub fn current_lr(&self) -> f64 {
        match &self.optimizer {
            Some(optimizer) => optimizer.learning_rate(),
            None => self.config.lr,
        }
    }

    /// Adam `beta1` the optimizer will use for its next step
    pub fn current_momentum(&self) -> f64 {
        match &self.optimizer {
            Some(optimizer) => optimizer.params().beta1,
            None => ADAM_BETA1,
        }
    }

    /// Restore weights and progress from a checkpoint file
    ///
    /// Training resumes at the epoch after the saved one, with the saved
    /// validation loss as the best so far.
    pub fn resume_from<P: AsRef<Path>>(&mut self, path: P) -> crate::Result<CheckpointMetadata> {
        let saved = Checkpoint::load(path.as_ref(), &self.device)?;
        checkpoint::restore(&self.varmap, &saved.tensors)?;

        self.start_epoch = saved.metadata.epoch + 1;
        self.early_stopping =
            EarlyStopping::from_patience(self.config.patience).with_best_loss(saved.metadata.val_loss);
        if self.config.save_best_model {
            self.checkpoint = Some(saved.tensors);
        }

        log::info!(
            "Resumed from {:?}: epoch {}, val loss {:.3}",
            path.as_ref(),
            saved.metadata.epoch,
            saved.metadata.val_loss
        );
        Ok(saved.metadata)
    }

    /// Build the optimizer and, when enabled, the one-cycle schedule
    fn configure_optimizers(&mut self, train_loader: &mut dyn BatchDataLoader) -> crate::Result<()> {
        let params = ParamsAdamW {
            lr: self.config.lr,
            beta1: ADAM_BETA1,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
        };
        let mut optimizer = AdamW::new(self.varmap.all_vars(), params)?;

        self.scheduler = None;
        if self.config.use_scheduler {
            if self.config.max_lr < 0.0 {
                log::info!("Running learning rate range test...");
                let finder = self.lr_finder.as_mut().ok_or_else(|| {
                    crate::TrainerError::Config(
                        "max-lr is negative but no learning rate range test is configured".to_string(),
                    )
                })?;
                let suggestion = finder.suggest_lr(
                    &self.model,
                    &self.varmap,
                    self.criterion.as_ref(),
                    train_loader,
                    &self.device,
                )?;
                train_loader.reset();

                self.config.max_lr = match suggestion {
                    Some(lr) if lr.is_finite() && lr > 0.0 => lr,
                    other => {
                        return Err(crate::TrainerError::Training(format!(
                            "learning rate range test gave no usable suggestion: {:?}",
                            other
                        )))
                    }
                };
                log::info!("Suggested max learning rate: {:.3e}", self.config.max_lr);
            }

            let scheduler = OneCycleScheduler::new(OneCycleConfig::new(
                self.config.max_lr,
                self.config.max_epochs,
                train_loader.num_batches(),
            ))?;
            apply_schedule(&mut optimizer, &scheduler);
            self.scheduler = Some(scheduler);
        }

        self.optimizer = Some(optimizer);
        Ok(())
    }

    /// Forward, backward and parameter update on one batch; returns the loss
    pub fn training_step(&mut self, images: &Tensor, targets: &Tensor) -> crate::Result<f64> {
        let optimizer = self.optimizer.as_mut().ok_or_else(|| {
            crate::TrainerError::Training("optimizer is not configured; call fit first".to_string())
        })?;

        let logits = self.model.forward_t(images, targets, true)?;
        let loss = self.criterion.loss(&logits, targets)?;

        optimizer.backward_step(&loss)?;

        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.step();
            apply_schedule(optimizer, scheduler);
        }

        Ok(scalar(&loss)?)
    }

    /// Loss on one batch in evaluation mode; no parameter update
    pub fn validation_step(&self, images: &Tensor, targets: &Tensor) -> crate::Result<f64> {
        let logits = self.model.forward_t(images, targets, false)?;
        let loss = self.criterion.loss(&logits, targets)?;
        Ok(scalar(&loss)?)
    }

    /// Average loss over one pass of the loader
    fn run_phase(&mut self, phase: Phase, loader: &mut dyn BatchDataLoader) -> crate::Result<f64> {
        loader.reset();
        let progress = phase_progress(phase, loader.num_batches());

        let mut total_loss = 0.0;
        let mut num_batches = 0usize;
        while let Some((images, targets)) = loader.next_batch(&self.device)? {
            let loss = match phase {
                Phase::Train => self.training_step(&images, &targets)?,
                Phase::Val => self.validation_step(&images, &targets)?,
            };
            total_loss += loss;
            num_batches += 1;

            progress.inc(1);
            progress.set_message(format!("{}_loss={:.3}", phase, loss));
            log::debug!("{} batch {}: {}_loss={:.4}", phase, num_batches, phase, loss);
        }
        progress.finish_and_clear();

        if num_batches == 0 {
            return Err(crate::TrainerError::Training(format!(
                "{} loader produced no batches",
                phase
            )));
        }

        Ok(total_loss / num_batches as f64)
    }

    /// Snapshot the weights (and write them to disk when a directory is set)
    fn save_checkpoint(&mut self, epoch: usize, val_loss: f64) -> crate::Result<()> {
        if !self.config.save_best_model {
            return Ok(());
        }

        let tensors = checkpoint::snapshot(&self.varmap)?;

        if let Some(dir) = &self.config.checkpoint_dir {
            let path = dir.join(CHECKPOINT_FILENAME);
            let metadata = CheckpointMetadata {
                epoch,
                lr: self.current_lr(),
                val_loss,
                config: Some(self.config.summary()),
            };
            Checkpoint::new(tensors.clone(), metadata).save(&path)?;
            log::info!("Saved best checkpoint to {:?}", path);
        }

        self.checkpoint = Some(tensors);
        Ok(())
    }

    /// Train until `max_epochs` or until validation loss stops improving
    pub fn fit<T, V>(&mut self, train_loader: &mut T, val_loader: &mut V) -> crate::Result<FitReport>
    where
        T: BatchDataLoader,
        V: BatchDataLoader,
    {
        if train_loader.num_batches() == 0 {
            return Err(crate::TrainerError::Training(
                "training loader is empty".to_string(),
            ));
        }

        self.configure_optimizers(train_loader)?;

        log::info!(
            "Training for up to {} epochs ({} batches per epoch), starting at epoch {}",
            self.config.max_epochs,
            train_loader.num_batches(),
            self.start_epoch
        );
        if self.config.early_stopping_enabled() {
            log::info!("Early stopping after {} epochs without improvement", self.config.patience);
        } else {
            log::info!("Early stopping disabled");
        }

        // For display purpose
        let width = self.config.max_epochs.to_string().len();

        let mut history = Vec::new();
        let mut stopped_early = false;
        let mut last_epoch = self.start_epoch.saturating_sub(1);

        for epoch in self.start_epoch..=self.config.max_epochs {
            let start_time = Instant::now();

            let train_loss = self.run_phase(Phase::Train, train_loader)?;
            let val_loss = self.run_phase(Phase::Val, val_loader)?;

            let elapsed = start_time.elapsed();
            let (mins, secs) = time_elapsed(elapsed);

            log::info!(
                "Epoch {:>width$}/{} | Train loss: {:.3} | Val loss: {:.3} | Time: {}m {}s",
                epoch,
                self.config.max_epochs,
                train_loss,
                val_loss,
                mins,
                secs,
                width = width
            );

            last_epoch = epoch;
            history.push(EpochRecord {
                epoch,
                train_loss,
                val_loss,
                lr: self.current_lr(),
                momentum: self.current_momentum(),
                elapsed_secs: elapsed.as_secs_f64(),
            });

            match self.early_stopping.observe(val_loss) {
                Verdict::Improved => self.save_checkpoint(epoch, val_loss)?,
                Verdict::Stalled => {}
                Verdict::Stop => {
                    log::info!(
                        "Training is terminated because validation loss has stopped decreasing for {} epochs.",
                        self.config.patience
                    );
                    stopped_early = true;
                    break;
                }
            }
        }

        if let Some(tracker) = self.tracker.as_mut() {
            tracker.set_summary("epoch", last_epoch.min(self.config.max_epochs) as f64)?;
        }

        Ok(FitReport {
            epochs_run: history.len(),
            last_epoch,
            best_val_loss: self.early_stopping.best_loss(),
            stopped_early,
            history,
        })
    }

    /// Score greedy predictions against the targets with BLEU and edit distance
    ///
    /// With `save_best_model` the best snapshot is restored first.
    pub fn test<L: BatchDataLoader>(&mut self, test_loader: &mut L) -> crate::Result<EvalReport> {
        if self.config.save_best_model {
            let best = self.checkpoint.as_ref().ok_or_else(|| {
                crate::TrainerError::Training(
                    "save-best-model is set but no best checkpoint was captured".to_string(),
                )
            })?;
            checkpoint::restore(&self.varmap, best)?;
        }

        let mut references: Vec<Vec<String>> = Vec::new();
        let mut hypotheses: Vec<Vec<String>> = Vec::new();

        test_loader.reset();
        while let Some((images, targets)) = test_loader.next_batch(&self.device)? {
            let preds = self.model.predict(&images)?;

            let targets = targets.to_dtype(DType::U32)?.to_vec2::<u32>()?;
            let preds = preds.to_dtype(DType::U32)?.to_vec2::<u32>()?;
            references.extend(self.tokenizer.unindex(&targets, true));
            hypotheses.extend(self.tokenizer.unindex(&preds, true));
        }

        if references.is_empty() {
            return Err(crate::TrainerError::Training(
                "test loader produced no examples".to_string(),
            ));
        }

        let bleu = metrics::bleu_score(&references, &hypotheses)? * 100.0;
        let edit_distance = metrics::edit_distance(&references, &hypotheses)? * 100.0;

        println!(
            "Evaluation Results:\n\
             ====================\n\
             BLEU: {:.3}\n\
             Edit Distance: {:.3}\n\
             ====================\n",
            bleu, edit_distance
        );

        if let Some(tracker) = self.tracker.as_mut() {
            tracker.set_summary("bleu", bleu)?;
            tracker.set_summary("edit_distance", edit_distance)?;
        }

        Ok(EvalReport {
            bleu,
            edit_distance,
            num_examples: references.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryLoader;
    use crate::tokenizer::Vocabulary;
    use crate::tracking::JsonSummaryTracker;
    use candle_core::{Result, D};
    use candle_nn::{Init, VarBuilder};
    use std::collections::BTreeMap;

    const SEQ_LEN: usize = 4;
    const VOCAB: [&str; 8] = ["<PAD>", "<SOS>", "<EOS>", "<UNK>", "a", "b", "c", "d"];

    /// One learnable logit row per output position, ignoring the image
    struct TableModel {
        table: Tensor,
    }

    impl TableModel {
        fn new(vb: VarBuilder) -> Result<Self> {
            let table = vb.get_with_hints((SEQ_LEN, VOCAB.len()), "table", Init::Const(0.0))?;
            Ok(Self { table })
        }
    }

    impl Seq2SeqModel for TableModel {
        fn forward_t(&self, images: &Tensor, targets: &Tensor, _train: bool) -> Result<Tensor> {
            let batch_size = images.dim(0)?;
            let seq_len = targets.dim(1)?;
            self.table
                .narrow(0, 0, seq_len)?
                .unsqueeze(0)?
                .broadcast_as((batch_size, seq_len, VOCAB.len()))
        }

        fn predict(&self, images: &Tensor) -> Result<Tensor> {
            let batch_size = images.dim(0)?;
            self.table
                .argmax(D::Minus1)?
                .unsqueeze(0)?
                .broadcast_as((batch_size, SEQ_LEN))?
                .contiguous()
        }
    }

    struct FixedSuggestion(Option<f64>);

    impl LrRangeTest<TableModel> for FixedSuggestion {
        fn suggest_lr(
            &mut self,
            _model: &TableModel,
            _varmap: &VarMap,
            _criterion: &dyn Criterion,
            loader: &mut dyn BatchDataLoader,
            device: &Device,
        ) -> crate::Result<Option<f64>> {
            // Consume a batch; the trainer must reset the loader afterwards
            let _ = loader.next_batch(device)?;
            Ok(self.0)
        }
    }

    fn loader(row: [u32; SEQ_LEN], batches: usize) -> Result<InMemoryLoader> {
        let device = Device::Cpu;
        let mut out = Vec::new();
        for _ in 0..batches {
            let images = Tensor::zeros((2, 1, 2, 2), DType::F32, &device)?;
            let targets = Tensor::new(&[row, row], &device)?;
            out.push((images, targets));
        }
        Ok(InMemoryLoader::new(out))
    }

    /// Targets the model is trained on
    fn seen() -> Result<InMemoryLoader> {
        loader([4, 5, 6, 7], 1)
    }

    /// Targets that disagree with `seen` at every position
    fn unseen() -> Result<InMemoryLoader> {
        loader([5, 6, 7, 4], 1)
    }

    fn trainer(config: TrainerConfig) -> crate::Result<Trainer<TableModel>> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = TableModel::new(vb)?;
        let vocab = Vocabulary::new(VOCAB.iter().map(|t| t.to_string()).collect());
        Trainer::new(model, varmap, Box::new(vocab), config, device)
    }

    fn config(max_epochs: usize, patience: i64) -> TrainerConfig {
        TrainerConfig {
            max_epochs,
            patience,
            lr: 0.1,
            ..Default::default()
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("im2latex_trainer_{}_{}", std::process::id(), name))
    }

    fn table_diff(trainer: &Trainer<TableModel>, other: &Tensor) -> Result<f32> {
        (&trainer.model().table - other)?
            .abs()?
            .sum_all()?
            .to_scalar::<f32>()
    }

    #[test]
    fn test_fit_reduces_loss() -> crate::Result<()> {
        let mut trainer = trainer(config(5, -1))?;
        let report = trainer.fit(&mut seen()?, &mut seen()?)?;

        assert_eq!(report.epochs_run, 5);
        assert_eq!(report.last_epoch, 5);
        assert!(!report.stopped_early);

        for pair in report.history.windows(2) {
            assert!(pair[1].val_loss < pair[0].val_loss);
        }
        let last = report.history.last().unwrap();
        assert!(last.train_loss < (VOCAB.len() as f64).ln());
        assert_eq!(report.best_val_loss, last.val_loss);
        assert_eq!(trainer.no_improve_count(), 0);
        Ok(())
    }

    #[test]
    fn test_early_stopping_after_patience() -> crate::Result<()> {
        let mut trainer = trainer(config(20, 2))?;
        let report = trainer.fit(&mut seen()?, &mut unseen()?)?;

        // Epoch 1 improves on infinity, epochs 2 and 3 do not
        assert!(report.stopped_early);
        assert_eq!(report.epochs_run, 3);
        assert_eq!(report.last_epoch, 3);
        assert_eq!(report.best_val_loss, report.history[0].val_loss);
        assert_eq!(trainer.no_improve_count(), 2);
        Ok(())
    }

    #[test]
    fn test_no_checkpoint_without_save_best() -> crate::Result<()> {
        let dir = temp_path("no_save");
        let mut trainer = trainer(TrainerConfig {
            checkpoint_dir: Some(dir.clone()),
            ..config(3, -1)
        })?;
        trainer.fit(&mut seen()?, &mut seen()?)?;

        assert!(trainer.best_checkpoint().is_none());
        assert!(!dir.join(CHECKPOINT_FILENAME).exists());
        Ok(())
    }

    #[test]
    fn test_best_weights_restored_for_testing() -> crate::Result<()> {
        let dir = temp_path("best");
        let summary_path = temp_path("summary.json");
        let mut trainer = trainer(TrainerConfig {
            save_best_model: true,
            checkpoint_dir: Some(dir.clone()),
            ..config(20, 2)
        })?
        .with_tracker(Box::new(JsonSummaryTracker::new(&summary_path)));

        let report = trainer.fit(&mut seen()?, &mut unseen()?)?;
        assert_eq!(report.epochs_run, 3);

        // Snapshot comes from epoch 1; two more steps moved the weights since
        let best = trainer.best_checkpoint().unwrap()["table"].clone();
        assert!(table_diff(&trainer, &best)? > 0.0);

        let saved = Checkpoint::load(dir.join(CHECKPOINT_FILENAME), &Device::Cpu)?;
        assert_eq!(saved.metadata.epoch, 1);
        assert!((saved.metadata.val_loss - report.history[0].val_loss).abs() < 1e-12);

        let scores = trainer.test(&mut seen()?)?;
        assert_eq!(table_diff(&trainer, &best)?, 0.0);
        assert_eq!(scores.num_examples, 2);

        let summary: BTreeMap<String, f64> =
            serde_json::from_str(&std::fs::read_to_string(&summary_path)?)?;
        std::fs::remove_file(&summary_path).ok();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(summary["epoch"], 3.0);
        assert!((summary["bleu"] - scores.bleu).abs() < 1e-9);
        assert!((summary["edit_distance"] - scores.edit_distance).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_perfect_predictions_score_100() -> crate::Result<()> {
        let mut trainer = trainer(config(2, -1))?;
        trainer.fit(&mut seen()?, &mut seen()?)?;

        let scores = trainer.test(&mut seen()?)?;
        assert!((scores.bleu - 100.0).abs() < 1e-9);
        assert!((scores.edit_distance - 100.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_scores_are_bounded() -> crate::Result<()> {
        let mut trainer = trainer(config(2, -1))?;
        trainer.fit(&mut seen()?, &mut seen()?)?;

        let scores = trainer.test(&mut unseen()?)?;
        for score in [scores.bleu, scores.edit_distance] {
            assert!((0.0..=100.0).contains(&score), "score {} out of range", score);
        }
        Ok(())
    }

    #[test]
    fn test_test_requires_checkpoint_when_saving_best() -> crate::Result<()> {
        let mut trainer = trainer(TrainerConfig {
            save_best_model: true,
            ..config(2, -1)
        })?;
        assert!(trainer.test(&mut seen()?).is_err());
        Ok(())
    }

    #[test]
    fn test_one_cycle_with_range_test() -> crate::Result<()> {
        let mut trainer = trainer(TrainerConfig {
            use_scheduler: true,
            max_lr: -1.0,
            ..config(4, -1)
        })?
        .with_lr_finder(Box::new(FixedSuggestion(Some(0.05))));

        let report = trainer.fit(&mut loader([4, 5, 6, 7], 3)?, &mut seen()?)?;

        assert_eq!(trainer.config().max_lr, 0.05);
        // 4 epochs x 3 batches: the schedule ran to its last step
        let final_lr = report.history.last().unwrap().lr;
        assert!((final_lr - 0.05 / 10.0 / 1e4).abs() < 1e-12);
        let peak = report.history.iter().map(|r| r.lr).fold(f64::MIN, f64::max);
        assert!(peak <= 0.05 + 1e-12);

        // beta1 dips towards 0.85 around the peak and is back at 0.95 at the end
        let lowest = report.history.iter().map(|r| r.momentum).fold(f64::MAX, f64::min);
        assert!(lowest < 0.9);
        assert!((report.history.last().unwrap().momentum - 0.95).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_one_cycle_moves_beta1() -> crate::Result<()> {
        let mut trainer = trainer(TrainerConfig {
            use_scheduler: true,
            max_lr: 0.01,
            ..config(2, -1)
        })?;
        assert_eq!(trainer.current_momentum(), ADAM_BETA1);

        // 2 epochs x 2 batches: beta1 bottoms out at 0.85 after the first step,
        // is half way back after the second and ends at 0.95
        let report = trainer.fit(&mut loader([4, 5, 6, 7], 2)?, &mut seen()?)?;
        assert!((report.history[0].momentum - 0.9).abs() < 1e-12);
        assert!((report.history[1].momentum - 0.95).abs() < 1e-12);
        assert!((trainer.current_momentum() - 0.95).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_constant_lr_without_scheduler() -> crate::Result<()> {
        let mut trainer = trainer(config(3, -1))?;
        let report = trainer.fit(&mut seen()?, &mut seen()?)?;

        for record in &report.history {
            assert_eq!(record.lr, 0.1);
            assert_eq!(record.momentum, ADAM_BETA1);
        }
        Ok(())
    }

    #[test]
    fn test_range_test_failures() -> crate::Result<()> {
        let scheduled = TrainerConfig {
            use_scheduler: true,
            max_lr: -1.0,
            ..config(2, -1)
        };

        let mut without_finder = trainer(scheduled.clone())?;
        assert!(matches!(
            without_finder.fit(&mut seen()?, &mut seen()?),
            Err(crate::TrainerError::Config(_))
        ));

        let mut no_suggestion =
            trainer(scheduled)?.with_lr_finder(Box::new(FixedSuggestion(None)));
        assert!(matches!(
            no_suggestion.fit(&mut seen()?, &mut seen()?),
            Err(crate::TrainerError::Training(_))
        ));
        Ok(())
    }

    #[test]
    fn test_empty_loaders_are_errors() -> crate::Result<()> {
        let mut trainer = trainer(config(2, -1))?;
        let mut empty = InMemoryLoader::new(Vec::new());

        assert!(trainer.fit(&mut empty, &mut seen()?).is_err());
        assert!(trainer.fit(&mut seen()?, &mut empty).is_err());
        assert!(trainer.test(&mut empty).is_err());
        Ok(())
    }

    #[test]
    fn test_resume_from_checkpoint() -> crate::Result<()> {
        let dir = temp_path("resume");
        let mut first = trainer(TrainerConfig {
            save_best_model: true,
            checkpoint_dir: Some(dir.clone()),
            ..config(20, 2)
        })?;
        let report = first.fit(&mut seen()?, &mut unseen()?)?;

        let mut resumed = trainer(config(20, 2))?;
        let metadata = resumed.resume_from(dir.join(CHECKPOINT_FILENAME))?;
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(metadata.epoch, 1);
        assert_eq!(resumed.start_epoch(), 2);
        assert!((resumed.best_val_loss() - report.history[0].val_loss).abs() < 1e-12);
        let best = first.best_checkpoint().unwrap()["table"].clone();
        assert_eq!(table_diff(&resumed, &best)?, 0.0);

        // Continuing on the unseen targets stalls straight away
        let continued = resumed.fit(&mut seen()?, &mut unseen()?)?;
        assert_eq!(continued.history[0].epoch, 2);
        assert_eq!(continued.epochs_run, 2);
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(trainer(config(0, 10)).is_err());
    }
}
