/// Learning rate range test seam
use candle_core::Device;
use candle_nn::VarMap;

use crate::data::BatchDataLoader;
use crate::models::Seq2SeqModel;
use crate::training::loss::Criterion;

/// Suggests a peak learning rate for the one-cycle schedule
///
/// Run by [`crate::Trainer::fit`] when the scheduler is enabled and `max-lr`
/// is negative. Implementations must leave the variables as they found them
/// and may consume the loader freely; the trainer resets it afterwards.
pub trait LrRangeTest<M: Seq2SeqModel> {
    fn suggest_lr(
        &mut self,
        model: &M,
        varmap: &VarMap,
        criterion: &dyn Criterion,
        loader: &mut dyn BatchDataLoader,
        device: &Device,
    ) -> crate::Result<Option<f64>>;
}
