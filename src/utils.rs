/// Utility functions for the training harness
use candle_core::{Device, Result};
use std::time::Duration;

/// Split an elapsed duration into whole minutes and remaining seconds
pub fn time_elapsed(elapsed: Duration) -> (u64, u64) {
    let total = elapsed.as_secs();
    (total / 60, total % 60)
}

/// Pick CUDA device 0 when available, CPU otherwise
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if !force_cpu && candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)
    } else {
        Ok(Device::Cpu)
    }
}

/// Total number of scalar parameters in a var map
pub fn count_parameters(varmap: &candle_nn::VarMap) -> usize {
    varmap
        .all_vars()
        .iter()
        .map(|v| v.as_tensor().elem_count())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_elapsed() {
        assert_eq!(time_elapsed(Duration::from_secs(0)), (0, 0));
        assert_eq!(time_elapsed(Duration::from_secs(59)), (0, 59));
        assert_eq!(time_elapsed(Duration::from_millis(125_900)), (2, 5));
    }

    #[test]
    fn test_count_parameters() -> Result<()> {
        let varmap = candle_nn::VarMap::new();
        let vb = candle_nn::VarBuilder::from_varmap(&varmap, candle_core::DType::F32, &Device::Cpu);
        let _ = candle_nn::linear(4, 3, vb.pp("proj"))?;

        assert_eq!(count_parameters(&varmap), 4 * 3 + 3);
        Ok(())
    }
}
