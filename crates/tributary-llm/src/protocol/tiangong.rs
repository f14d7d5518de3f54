//! Kunlun Tiangong (`SkyWork`) generate API wire format

use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Request types --

/// Generate request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiangongRequest {
    /// Model identifier
    pub model: String,
    /// Conversation turns
    pub messages: Vec<TiangongMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiangongMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Turn text
    pub content: String,
}

// -- Response types --

/// Response body; also one line of the NDJSON stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiangongResponse {
    /// 200 on success
    #[serde(default)]
    pub code: i64,
    /// Status text
    #[serde(default)]
    pub code_msg: Option<String>,
    /// Trace identifier
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Payload
    #[serde(default)]
    pub resp_data: Option<TiangongData>,
}

/// Response payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TiangongData {
    /// Generated text (an increment when streaming)
    #[serde(default)]
    pub reply: Option<String>,
    /// Present on the final frame; string or numeric depending on model
    #[serde(default)]
    pub finish_reason: Option<Value>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TiangongUsage>,
}

/// Token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TiangongUsage {
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
