//! MiniMax `chatcompletion_v2` wire format
//!
//! Requests are OpenAI-shaped. Responses add a `base_resp` status block, and
//! the last stream frame carries the whole message under `message` instead
//! of an incremental `delta`.

use serde::{Deserialize, Serialize};

use super::openai::{OpenAiChoice, OpenAiChoiceMessage, OpenAiStreamDelta, OpenAiUsage};

/// Vendor status block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiniMaxBaseResp {
    /// Zero on success
    #[serde(default)]
    pub status_code: i64,
    /// Human-readable status
    #[serde(default)]
    pub status_msg: String,
}

impl MiniMaxBaseResp {
    /// Whether the vendor reported a failure
    pub const fn is_error(&self) -> bool {
        self.status_code != 0
    }
}

// -- Response types --

/// Blocking response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniMaxResponse {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created: Option<i64>,
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    /// Token usage (often only `total_tokens`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
    /// Vendor status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_resp: Option<MiniMaxBaseResp>,
}

// -- Streaming types --

/// Streaming frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniMaxStreamChunk {
    /// Frame identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created: Option<i64>,
    /// Choices in this frame
    #[serde(default)]
    pub choices: Vec<MiniMaxStreamChoice>,
    /// Token usage (final frame)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAiUsage>,
    /// Vendor status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_resp: Option<MiniMaxBaseResp>,
}

/// Choice within a streaming frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniMaxStreamChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Incremental delta (intermediate frames)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<OpenAiStreamDelta>,
    /// Whole message (final frame)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<OpenAiChoiceMessage>,
    /// Finish reason (final frame)
    #[serde(default)]
    pub finish_reason: Option<String>,
}
