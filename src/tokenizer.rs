/// Mapping from token indices back to LaTeX tokens
use std::path::Path;

pub const SOS_TOKEN: &str = "<SOS>";
pub const EOS_TOKEN: &str = "<EOS>";
pub const PAD_TOKEN: &str = "<PAD>";
pub const UNK_TOKEN: &str = "<UNK>";

/// Turns index sequences into token sequences
pub trait Detokenizer {
    /// Map each index sequence to tokens.
    ///
    /// With `inference` set, decoding stops at the end-of-sequence token and
    /// start/padding tokens are dropped.
    fn unindex(&self, indices: &[Vec<u32>], inference: bool) -> Vec<Vec<String>>;

    /// Index of the padding token, if the vocabulary has one
    fn pad_index(&self) -> Option<u32> {
        None
    }
}

/// Token list where the position of a token is its index
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    sos: Option<u32>,
    eos: Option<u32>,
    pad: Option<u32>,
    unk: Option<u32>,
}

impl Vocabulary {
    pub fn new(tokens: Vec<String>) -> Self {
        let find = |name: &str| tokens.iter().position(|t| t == name).map(|i| i as u32);
        Self {
            sos: find(SOS_TOKEN),
            eos: find(EOS_TOKEN),
            pad: find(PAD_TOKEN),
            unk: find(UNK_TOKEN),
            tokens,
        }
    }

    /// Load a JSON array of tokens
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let tokens: Vec<String> = serde_json::from_reader(std::io::BufReader::new(file))?;
        if tokens.is_empty() {
            return Err(crate::TrainerError::Config(format!(
                "vocabulary {:?} is empty",
                path.as_ref()
            )));
        }
        Ok(Self::new(tokens))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn token(&self, index: u32) -> String {
        match self.tokens.get(index as usize) {
            Some(token) => token.clone(),
            None => match self.unk {
                Some(unk) => self.tokens[unk as usize].clone(),
                None => UNK_TOKEN.to_string(),
            },
        }
    }
}

impl Detokenizer for Vocabulary {
    fn unindex(&self, indices: &[Vec<u32>], inference: bool) -> Vec<Vec<String>> {
        indices
            .iter()
            .map(|sequence| {
                let mut tokens = Vec::with_capacity(sequence.len());
                for &index in sequence {
                    if inference {
                        if Some(index) == self.eos {
                            break;
                        }
                        if Some(index) == self.sos || Some(index) == self.pad {
                            continue;
                        }
                    }
                    tokens.push(self.token(index));
                }
                tokens
            })
            .collect()
    }

    fn pad_index(&self) -> Option<u32> {
        self.pad
    }
}
