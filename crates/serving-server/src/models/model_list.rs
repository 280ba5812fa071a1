//! Model listing types.

use serde::{Deserialize, Serialize};
use serving_engine::{ModelSpec, TokenId};

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub vocab_size: usize,
    pub eos_token_id: TokenId,
    pub max_seq_len: usize,
    pub max_new_tokens: usize,
}

impl From<ModelSpec> for ModelInfo {
    fn from(spec: ModelSpec) -> Self {
        Self {
            id: spec.name,
            vocab_size: spec.vocab_size,
            eos_token_id: spec.eos_token_id,
            max_seq_len: spec.max_seq_len,
            max_new_tokens: spec.max_new_tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}
