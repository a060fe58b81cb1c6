/// NumPy dataset loader for rendered formula images and their token sequences (.npy format)
use candle_core::{Device, Result, Tensor};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};
use ndarray_npy::ReadNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::BatchDataLoader;

/// Metadata from dataset.json
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetMetadata {
    pub vocab_size: usize,
    pub max_seq_len: usize,
    #[serde(default)]
    pub num_examples: usize,
    #[serde(default)]
    pub description: String,
}

/// Dataset loaded from NumPy .npy files
pub struct ImageFormulaDataset {
    images: Array3<f32>,   // [N, height, width]
    formulas: Array2<u32>, // [N, seq_len], padded token indices
    metadata: Option<DatasetMetadata>,
}

fn read_npy_error(name: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("Failed to read {}: {}", name, e),
    )
}

impl ImageFormulaDataset {
    /// Load from directory containing `images.npy`, `formulas.npy` and optionally `dataset.json`
    pub fn from_directory<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let dir = path.as_ref();

        log::info!("Loading image/formula dataset from: {:?}", dir);

        let metadata_path = dir.join("dataset.json");
        let metadata: Option<DatasetMetadata> = if metadata_path.exists() {
            let reader = BufReader::new(File::open(&metadata_path)?);
            Some(serde_json::from_reader(reader)?)
        } else {
            log::warn!("dataset.json not found in {:?}", dir);
            None
        };

        let images = <Array3<f32> as ReadNpyExt>::read_npy(File::open(dir.join("images.npy"))?)
            .map_err(|e| read_npy_error("images.npy", e))?;

        log::info!("Loaded images: shape {:?}", images.shape());

        // Token indices are usually written as int64
        let formulas_i64 =
            <Array2<i64> as ReadNpyExt>::read_npy(File::open(dir.join("formulas.npy"))?)
                .map_err(|e| read_npy_error("formulas.npy", e))?;

        if let Some(bad) = formulas_i64.iter().find(|&&x| x < 0 || x > u32::MAX as i64) {
            return Err(crate::TrainerError::Config(format!(
                "formulas.npy contains an invalid token index: {}",
                bad
            )));
        }
        let formulas = formulas_i64.mapv(|x| x as u32);

        log::info!("Loaded formulas: shape {:?}", formulas.shape());

        Self::from_arrays(images, formulas, metadata)
    }

    /// Build a dataset from in-memory arrays
    pub fn from_arrays(
        images: Array3<f32>,
        formulas: Array2<u32>,
        metadata: Option<DatasetMetadata>,
    ) -> crate::Result<Self> {
        if images.len_of(Axis(0)) != formulas.nrows() {
            return Err(crate::TrainerError::Config(format!(
                "Example count mismatch: {} images vs {} formulas",
                images.len_of(Axis(0)),
                formulas.nrows()
            )));
        }

        Ok(Self {
            images,
            formulas,
            metadata,
        })
    }

    /// Get number of examples
    pub fn len(&self) -> usize {
        self.formulas.nrows()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.formulas.nrows() == 0
    }

    /// Image height and width
    pub fn image_size(&self) -> (usize, usize) {
        let shape = self.images.shape();
        (shape[1], shape[2])
    }

    /// Padded formula length
    pub fn seq_len(&self) -> usize {
        self.formulas.ncols()
    }

    pub fn metadata(&self) -> Option<&DatasetMetadata> {
        self.metadata.as_ref()
    }

    pub fn get_image(&self, idx: usize) -> ArrayView2<f32> {
        self.images.index_axis(Axis(0), idx)
    }

    pub fn get_formula(&self, idx: usize) -> ArrayView1<u32> {
        self.formulas.row(idx)
    }
}

/// Batching loader over an [`ImageFormulaDataset`]
pub struct ImageFormulaLoader {
    dataset: ImageFormulaDataset,
    batch_size: usize,
    current_idx: usize,
    indices: Vec<usize>,
    shuffle: bool,
}

impl ImageFormulaLoader {
    /// Create new data loader
    pub fn new(dataset: ImageFormulaDataset, batch_size: usize, shuffle: bool) -> Self {
        let mut loader = Self {
            indices: (0..dataset.len()).collect(),
            dataset,
            batch_size: batch_size.max(1),
            current_idx: 0,
            shuffle,
        };
        loader.reset();
        loader
    }
}

impl BatchDataLoader for ImageFormulaLoader {
    fn next_batch(&mut self, device: &Device) -> Result<Option<(Tensor, Tensor)>> {
        if self.current_idx >= self.indices.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.current_idx..end_idx];
        let actual_batch_size = batch_indices.len();

        let (height, width) = self.dataset.image_size();
        let seq_len = self.dataset.seq_len();

        let mut image_data = Vec::with_capacity(actual_batch_size * height * width);
        let mut target_data = Vec::with_capacity(actual_batch_size * seq_len);
        for &idx in batch_indices {
            image_data.extend(self.dataset.get_image(idx).iter().copied());
            target_data.extend(self.dataset.get_formula(idx).iter().copied());
        }

        self.current_idx = end_idx;

        let images = Tensor::from_vec(image_data, (actual_batch_size, 1, height, width), device)?;
        let targets = Tensor::from_vec(target_data, (actual_batch_size, seq_len), device)?;

        Ok(Some((images, targets)))
    }

    fn reset(&mut self) {
        self.current_idx = 0;

        if self.shuffle {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            self.indices.shuffle(&mut rng);
        }
    }

    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }
}
