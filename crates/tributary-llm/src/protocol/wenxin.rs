//! Baidu Qianfan (ERNIE) chat wire format

use serde::{Deserialize, Serialize};

// -- Auth --

/// OAuth client-credentials token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WenxinToken {
    /// Bearer token
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Error code (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error description (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

// -- Request types --

/// Chat request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WenxinRequest {
    /// Alternating user/assistant turns
    pub messages: Vec<WenxinMessage>,
    /// System prompt, sent out of band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// End-user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WenxinMessage {
    /// `user` or `assistant`
    pub role: String,
    /// Turn text
    pub content: String,
}

// -- Response types --

/// Chat response; also the shape of each stream frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WenxinResponse {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created: Option<i64>,
    /// Generated text (an increment when streaming)
    #[serde(default)]
    pub result: Option<String>,
    /// Whether this is the last stream frame
    #[serde(default)]
    pub is_end: Option<bool>,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<WenxinUsage>,
    /// Error code (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    /// Error message (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

/// Token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WenxinUsage {
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
