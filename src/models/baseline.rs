/// Position-conditioned baseline model
///
/// A global image feature is combined with a learned embedding per output
/// position and projected to the vocabulary. It has no attention and no
/// autoregression; it exists to run the harness end to end.
use candle_core::{Result, Tensor, D};
use candle_nn::{Dropout, Embedding, Linear, Module, VarBuilder};

use super::Seq2SeqModel;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BaselineConfig {
    /// Input image height (single channel)
    pub image_height: usize,
    /// Input image width
    pub image_width: usize,
    pub hidden_size: usize,
    pub vocab_size: usize,
    /// Number of positions produced by `predict`
    pub max_output_len: usize,
    pub dropout: f32,
}

impl BaselineConfig {
    pub fn validate(&self) -> crate::Result<()> {
        let dims = [
            ("image_height", self.image_height),
            ("image_width", self.image_width),
            ("hidden_size", self.hidden_size),
            ("vocab_size", self.vocab_size),
            ("max_output_len", self.max_output_len),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(crate::TrainerError::Config(format!("{} must be > 0", name)));
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(crate::TrainerError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

pub struct BaselineModel {
    config: BaselineConfig,
    encoder: Linear,
    positions: Embedding,
    head: Linear,
    dropout: Dropout,
}

impl BaselineModel {
    pub fn new(config: BaselineConfig, vb: VarBuilder) -> crate::Result<Self> {
        config.validate()?;

        let input_dim = config.image_height * config.image_width;
        let encoder = candle_nn::linear(input_dim, config.hidden_size, vb.pp("encoder"))?;
        let positions =
            candle_nn::embedding(config.max_output_len, config.hidden_size, vb.pp("positions"))?;
        let head = candle_nn::linear(config.hidden_size, config.vocab_size, vb.pp("head"))?;
        let dropout = Dropout::new(config.dropout);

        Ok(Self {
            config,
            encoder,
            positions,
            head,
            dropout,
        })
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Logits for the first `seq_len` positions: `[batch, seq_len, vocab_size]`
    fn decode(&self, images: &Tensor, seq_len: usize, train: bool) -> Result<Tensor> {
        if seq_len > self.config.max_output_len {
            return Err(candle_core::Error::Msg(format!(
                "sequence length {} exceeds max_output_len {}",
                seq_len, self.config.max_output_len
            )));
        }

        let features = self.encoder.forward(&images.flatten_from(1)?)?.relu()?; // [batch, hidden]
        let features = self.dropout.forward(&features, train)?;

        let positions = self.positions.embeddings().narrow(0, 0, seq_len)?; // [seq_len, hidden]
        let hidden = features
            .unsqueeze(1)?
            .broadcast_add(&positions.unsqueeze(0)?)?
            .relu()?;

        self.head.forward(&hidden)
    }
}

impl Seq2SeqModel for BaselineModel {
    fn forward_t(&self, images: &Tensor, targets: &Tensor, train: bool) -> Result<Tensor> {
        self.decode(images, targets.dim(1)?, train)
    }

    fn predict(&self, images: &Tensor) -> Result<Tensor> {
        self.decode(images, self.config.max_output_len, false)?
            .argmax(D::Minus1)
    }
}
