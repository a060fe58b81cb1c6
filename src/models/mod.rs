/// Model seam for the training harness
use candle_core::{Result, Tensor};

pub mod baseline;

pub use baseline::{BaselineConfig, BaselineModel};

/// Image-to-sequence model driven by the [`crate::Trainer`]
///
/// Parameters live in the `VarMap` the model was built from; the trainer
/// holds that map to optimise, snapshot and restore them.
pub trait Seq2SeqModel {
    /// Teacher-forced forward pass.
    ///
    /// # Arguments
    /// * `images` - `[batch, channels, height, width]`
    /// * `targets` - `[batch, seq_len]` token indices
    /// * `train` - training mode (dropout etc.)
    ///
    /// # Returns
    /// Logits `[batch, seq_len, vocab_size]` aligned with `targets`
    fn forward_t(&self, images: &Tensor, targets: &Tensor, train: bool) -> Result<Tensor>;

    /// Greedy decoding, `[batch, max_output_len]` u32 token indices
    fn predict(&self, images: &Tensor) -> Result<Tensor>;
}
