/// Data loading for training and evaluation
pub mod numpy_dataset;

pub use numpy_dataset::{DatasetMetadata, ImageFormulaDataset, ImageFormulaLoader};

use candle_core::{Device, Result, Tensor};

/// Generic data loader trait
///
/// Batches are `(images, targets)`: images `[batch, channels, height, width]`,
/// targets `[batch, seq_len]` token indices.
pub trait BatchDataLoader {
    /// Get next batch of (input, target) tensors
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>>;

    /// Reset loader for new epoch
    fn reset(&mut self);

    /// Get total number of batches
    fn num_batches(&self) -> usize;
}

/// Loader over a fixed, pre-built list of batches
pub struct InMemoryLoader {
    batches: Vec<(Tensor, Tensor)>,
    position: usize,
}

impl InMemoryLoader {
    pub fn new(batches: Vec<(Tensor, Tensor)>) -> Self {
        Self {
            batches,
            position: 0,
        }
    }
}

impl BatchDataLoader for InMemoryLoader {
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        let Some((images, targets)) = self.batches.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        Ok(Some((images.to_device(device)?, targets.to_device(device)?)))
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn num_batches(&self) -> usize {
        self.batches.len()
    }
}
