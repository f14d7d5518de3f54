//! Dify chat-messages wire format

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// -- Request types --

/// Chat-messages request
///
/// Dify keeps history server-side; only the latest user turn is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyRequest {
    /// Latest user question
    pub query: String,
    /// App input variables
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// `blocking` or `streaming`
    pub response_mode: String,
    /// End-user identifier
    pub user: String,
    /// Existing conversation; empty starts a new one
    #[serde(default)]
    pub conversation_id: String,
}

// -- Response types --

/// Blocking response, and the shape of every stream event
///
/// Stream events are told apart by `event`: `message` / `agent_message`
/// carry an `answer` increment, `message_end` carries `metadata`, and
/// `error` carries `status`, `code` and `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyResponse {
    /// Event type
    #[serde(default)]
    pub event: Option<String>,
    /// Message identifier
    #[serde(default)]
    pub message_id: Option<String>,
    /// Legacy message identifier on blocking responses
    #[serde(default)]
    pub id: Option<String>,
    /// Conversation identifier
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Answer text (an increment when streaming)
    #[serde(default)]
    pub answer: Option<String>,
    /// Creation timestamp
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Usage and retrieval metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DifyMetadata>,
    /// HTTP status of an `error` event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    /// Error code of an `error` event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message of an `error` event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Usage and retrieval metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyMetadata {
    /// Token usage
    #[serde(default)]
    pub usage: Option<DifyUsage>,
    /// Knowledge snippets used for the answer
    #[serde(default)]
    pub retriever_resources: Option<Vec<DifyRetrieverResource>>,
}

/// Token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyUsage {
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

/// Knowledge snippet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyRetrieverResource {
    /// Rank among the retrieved snippets
    #[serde(default)]
    pub position: Option<i64>,
    /// Segment identifier
    #[serde(default)]
    pub segment_id: Option<String>,
    /// Relevance score
    #[serde(default)]
    pub score: Option<f64>,
    /// Snippet text
    #[serde(default)]
    pub content: String,
}
