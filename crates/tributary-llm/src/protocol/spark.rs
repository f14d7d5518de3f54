//! iFlytek Spark WebSocket chat wire format

use serde::{Deserialize, Serialize};

// -- Request types --

/// Single request frame sent after the handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkRequest {
    /// Application identity
    pub header: SparkRequestHeader,
    /// Generation parameters
    pub parameter: SparkParameter,
    /// Conversation
    pub payload: SparkRequestPayload,
}

/// Request header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkRequestHeader {
    /// Application id from the console
    pub app_id: String,
    /// End-user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Parameter block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkParameter {
    /// Chat parameters
    pub chat: SparkChatParameter,
}

/// Chat parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkChatParameter {
    /// Model domain, e.g. `generalv3.5`
    pub domain: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u64>,
}

/// Request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkRequestPayload {
    /// Conversation history
    pub message: SparkMessages,
}

/// Conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkMessages {
    /// Turns, oldest first
    pub text: Vec<SparkMessage>,
}

/// Conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Turn text
    pub content: String,
}

// -- Response types --

/// One server frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkResponse {
    /// Status header
    pub header: SparkResponseHeader,
    /// Generated content; absent on errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SparkResponsePayload>,
}

/// Response header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkResponseHeader {
    /// Non-zero on failure
    pub code: i64,
    /// Status text
    #[serde(default)]
    pub message: Option<String>,
    /// Session identifier
    #[serde(default)]
    pub sid: Option<String>,
    /// 0 first frame, 1 intermediate, 2 last
    #[serde(default)]
    pub status: u8,
}

impl SparkResponseHeader {
    /// Whether this is the session's last frame
    pub const fn is_last(&self) -> bool {
        self.status == 2
    }
}

/// Response payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparkResponsePayload {
    /// Generated text fragments
    #[serde(default)]
    pub choices: Option<SparkChoices>,
    /// Usage, on the last frame only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<SparkUsage>,
}

/// Generated text fragments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparkChoices {
    /// Fragments in this frame
    #[serde(default)]
    pub text: Vec<SparkFragment>,
}

/// Text fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparkFragment {
    /// Increment of the assistant reply
    #[serde(default)]
    pub content: String,
    /// Choice index
    #[serde(default)]
    pub index: u32,
}

/// Usage block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparkUsage {
    /// Text token counts
    #[serde(default)]
    pub text: SparkTokenUsage,
}

/// Token counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparkTokenUsage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: Option<u32>,
}
