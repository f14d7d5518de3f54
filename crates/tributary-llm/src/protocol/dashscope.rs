//! Alibaba `DashScope` generation API wire format (Qwen models)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::openai::{OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall};

// -- Request types --

/// Generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeRequest {
    /// Model identifier
    pub model: String,
    /// Conversation input
    pub input: DashScopeInput,
    /// Generation parameters
    pub parameters: DashScopeParameters,
}

/// Conversation input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeInput {
    /// Conversation messages
    pub messages: Vec<DashScopeMessage>,
}

/// Message within a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeMessage {
    /// Message role
    pub role: String,
    /// Text, or parts on the multimodal endpoint
    pub content: DashScopeContent,
    /// Participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    /// Tool call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DashScopeContent {
    /// Plain text
    Text(String),
    /// Multimodal parts
    Parts(Vec<DashScopePart>),
}

impl DashScopeContent {
    /// Concatenated text parts
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    DashScopePart::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Single-key part object: `{"text": …}`, `{"image": …}` or `{"video": …}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashScopePart {
    /// Text
    Text(String),
    /// Image URL or data URI
    Image(String),
    /// Video URL
    Video(String),
}

/// Generation parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashScopeParameters {
    /// Always `message` so choices carry chat messages
    pub result_format: String,
    /// Stream increments instead of running snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_output: Option<bool>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Random seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    /// Tool choice configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    /// Extension parameters
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// -- Response types --

/// Generation response; also the shape of each stream frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeResponse {
    /// Request identifier
    #[serde(default)]
    pub request_id: Option<String>,
    /// Generated output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<DashScopeOutput>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<DashScopeUsage>,
    /// Error code (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Generated output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashScopeOutput {
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<DashScopeChoice>,
}

/// Choice within the output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashScopeChoice {
    /// Why generation stopped; the literal string `null` mid-stream
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Generated message (or increment when streaming)
    #[serde(default)]
    pub message: DashScopeResponseMessage,
}

/// Message within a response choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashScopeResponseMessage {
    /// Role
    #[serde(default)]
    pub role: Option<String>,
    /// Text, or parts from the multimodal endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<DashScopeContent>,
    /// Reasoning trace (QwQ and thinking modes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Tool calls (fragments when streaming)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

/// Token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashScopeUsage {
    /// Prompt tokens
    #[serde(default)]
    pub input_tokens: Option<u32>,
    /// Completion tokens
    #[serde(default)]
    pub output_tokens: Option<u32>,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: Option<u32>,
}
