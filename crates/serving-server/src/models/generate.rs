//! Generation request/response types.

use serde::{Deserialize, Serialize};
use serving_engine::{GenerationConfig, Status, TokenId};
use serving_runtime::FinishReason;
use uuid::Uuid;

use crate::models::common::Usage;

/// Generation request.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Falls back to the server's default model when omitted.
    #[serde(default)]
    pub model_name: Option<String>,
    pub input_tokens: Vec<TokenId>,
    #[serde(default)]
    pub generation_config: GenerationConfig,
    #[serde(default)]
    pub stream: bool,
}

/// Blocking generation response.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub id: Uuid,
    pub created: i64,
    pub model: String,
    pub status: Status,
    /// One sequence per returned beam, best first.
    pub output_tokens: Vec<Vec<TokenId>>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}
