/// Loss functions for sequence targets
use candle_core::{DType, Result, Tensor, D};
use candle_nn::{loss, ops};

/// Scalar training objective from logits and targets
pub trait Criterion {
    /// # Arguments
    /// * `logits` - `[batch, seq_len, num_classes]`
    /// * `targets` - `[batch, seq_len]` class indices
    fn loss(&self, logits: &Tensor, targets: &Tensor) -> Result<Tensor>;
}

/// Token-level cross entropy averaged over non-ignored positions
#[derive(Debug, Clone, Default)]
pub struct SequenceCrossEntropy {
    /// Target index excluded from the loss, typically padding
    pub ignore_index: Option<u32>,
}

impl SequenceCrossEntropy {
    pub fn new(ignore_index: Option<u32>) -> Self {
        Self { ignore_index }
    }
}

impl Criterion for SequenceCrossEntropy {
    fn loss(&self, logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let (batch_size, seq_len, num_classes) = logits.dims3()?;
        let target_dims = targets.dims2()?;
        if target_dims != (batch_size, seq_len) {
            return Err(candle_core::Error::Msg(format!(
                "logits {:?} do not match targets {:?}",
                logits.dims(),
                targets.dims()
            )));
        }

        let logits_flat = logits.reshape((batch_size * seq_len, num_classes))?;
        let targets_flat = targets.flatten_all()?.to_dtype(DType::U32)?;

        let Some(ignore_index) = self.ignore_index else {
            return loss::cross_entropy(&logits_flat, &targets_flat);
        };

        let log_probs = ops::log_softmax(&logits_flat, D::Minus1)?;
        let picked = log_probs
            .gather(&targets_flat.unsqueeze(1)?, 1)?
            .squeeze(1)?; // [batch * seq_len]

        let ignored = Tensor::full(ignore_index, targets_flat.elem_count(), targets.device())?;
        let mask = targets_flat.ne(&ignored)?.to_dtype(picked.dtype())?;
        let kept = mask.sum_all()?.to_dtype(DType::F64)?.to_scalar::<f64>()?;
        if kept == 0.0 {
            return Err(candle_core::Error::Msg(
                "every target position is ignored".to_string(),
            ));
        }

        (picked * mask)?.sum_all()?.neg()?.affine(1.0 / kept, 0.0)
    }
}
