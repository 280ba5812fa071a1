//! Server-Sent Events (SSE) payloads for streaming generation.

use serde::{Deserialize, Serialize};
use serving_engine::{Status, TokenId};
use serving_runtime::FinishReason;
use uuid::Uuid;

/// One generated token.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamToken {
    pub session_id: Uuid,
    pub token_id: TokenId,
}

/// Terminal event: `RET_STOP_ITERATION` on success, the error otherwise.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamFinal {
    pub session_id: Uuid,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}
