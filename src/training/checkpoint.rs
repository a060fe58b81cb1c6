/// Model checkpointing with safetensors
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;

/// File name used for the best-model checkpoint
pub const CHECKPOINT_FILENAME: &str = "best.safetensors";

/// Header key holding the JSON-encoded [`CheckpointMetadata`]
const METADATA_KEY: &str = "trainer";

/// Checkpoint metadata
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckpointMetadata {
    /// Epoch that produced these weights
    pub epoch: usize,
    /// Learning rate at the end of that epoch
    pub lr: f64,
    /// Validation loss of that epoch
    pub val_loss: f64,
    /// Trainer configuration summary
    pub config: Option<serde_json::Value>,
}

/// Model checkpoint
pub struct Checkpoint {
    /// Model parameters
    pub tensors: HashMap<String, Tensor>,
    /// Metadata
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Create new checkpoint
    pub fn new(tensors: HashMap<String, Tensor>, metadata: CheckpointMetadata) -> Self {
        Self { tensors, metadata }
    }

    /// Save checkpoint to a safetensors file, metadata in the header
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut info = HashMap::new();
        info.insert(METADATA_KEY.to_string(), serde_json::to_string(&self.metadata)?);

        safetensors::tensor::serialize_to_file(
            self.tensors.iter().map(|(name, tensor)| (name.as_str(), tensor)),
            &Some(info),
            path,
        )?;

        Ok(())
    }

    /// Load checkpoint from file
    ///
    /// # Arguments
    /// * `path` - Path to checkpoint file
    /// * `device` - Device to load tensors on
    pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> crate::Result<Self> {
        let data = std::fs::read(path.as_ref())?;

        let (_, header) = SafeTensors::read_metadata(&data)?;
        let raw = header
            .metadata()
            .as_ref()
            .and_then(|m| m.get(METADATA_KEY))
            .ok_or_else(|| {
                crate::TrainerError::Checkpoint(format!(
                    "{:?} has no trainer metadata",
                    path.as_ref()
                ))
            })?;
        let metadata: CheckpointMetadata = serde_json::from_str(raw)?;

        let tensors = candle_core::safetensors::load_buffer(&data, device)?;

        Ok(Self { tensors, metadata })
    }
}

/// Deep copy of every variable in the map, keyed by name
pub fn snapshot(varmap: &VarMap) -> crate::Result<HashMap<String, Tensor>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| crate::TrainerError::Checkpoint("var map lock poisoned".to_string()))?;

    let mut tensors = HashMap::with_capacity(data.len());
    for (name, var) in data.iter() {
        tensors.insert(name.clone(), var.as_tensor().copy()?);
    }
    Ok(tensors)
}

/// Write snapshot tensors back into the variables
///
/// The snapshot must cover exactly the variables of the map with matching shapes.
pub fn restore(varmap: &VarMap, tensors: &HashMap<String, Tensor>) -> crate::Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| crate::TrainerError::Checkpoint("var map lock poisoned".to_string()))?;

    if let Some(extra) = tensors.keys().find(|name| !data.contains_key(*name)) {
        return Err(crate::TrainerError::Checkpoint(format!(
            "checkpoint has unknown parameter {}",
            extra
        )));
    }

    for (name, var) in data.iter() {
        let tensor = tensors.get(name).ok_or_else(|| {
            crate::TrainerError::Checkpoint(format!("checkpoint is missing parameter {}", name))
        })?;
        if tensor.dims() != var.dims() {
            return Err(crate::TrainerError::Checkpoint(format!(
                "shape mismatch for {}: checkpoint {:?} vs model {:?}",
                name,
                tensor.dims(),
                var.dims()
            )));
        }
        var.set(&tensor.to_dtype(var.dtype())?.to_device(var.device())?)?;
    }

    Ok(())
}
