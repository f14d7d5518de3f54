//! Coze bot chat wire formats
//!
//! Blocking calls use the v2 `open_api/v2/chat` endpoint; streaming calls
//! use the v3 `chat` endpoint, whose SSE events carry an `event:` name.

use serde::{Deserialize, Serialize};

// -- Shared --

/// Conversation message, as sent in history and received in responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeMessage {
    /// Message identifier (responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Conversation identifier (v3 responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Chat identifier (v3 responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// `user` or `assistant`
    pub role: String,
    /// `question`, `answer`, `verbose`, `follow_up`, ...
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Message body; JSON text for `verbose` and image messages
    #[serde(default)]
    pub content: String,
    /// `text`, `image`, `object_string`, ...
    #[serde(default)]
    pub content_type: String,
}

impl CozeMessage {
    /// Whether this is an assistant message of `message_type`
    pub fn is_assistant(&self, message_type: &str) -> bool {
        self.role == "assistant" && self.message_type.as_deref() == Some(message_type)
    }
}

// -- v2 (blocking) --

/// v2 chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeV2Request {
    /// Bot to talk to
    pub bot_id: String,
    /// End-user identifier
    pub user: String,
    /// Latest user question
    pub query: String,
    /// Earlier turns
    pub chat_history: Vec<CozeMessage>,
    /// Always false on this endpoint
    pub stream: bool,
    /// Existing conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// v2 chat response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeV2Response {
    /// Conversation identifier
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Messages produced by the bot
    #[serde(default)]
    pub messages: Vec<CozeMessage>,
    /// 0 on success
    #[serde(default)]
    pub code: i64,
    /// Status text
    #[serde(default)]
    pub msg: Option<String>,
    /// Token usage, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CozeV2Usage>,
}

/// v2 token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeV2Usage {
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

/// Body of a `verbose` message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeVerbose {
    /// `knowledge` for knowledge-base recalls
    #[serde(default)]
    pub verbose_type: Option<String>,
    /// Recalled slices
    #[serde(default)]
    pub chunks: Vec<CozeKnowledgeChunk>,
}

/// Recalled knowledge slice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeKnowledgeChunk {
    /// Slice text
    #[serde(default)]
    pub slice: String,
    /// Relevance score
    #[serde(default)]
    pub score: Option<f64>,
}

// -- v3 (streaming) --

/// v3 chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeV3Request {
    /// Bot to talk to
    pub bot_id: String,
    /// End-user identifier
    pub user_id: String,
    /// Messages appended to the conversation, question last
    pub additional_messages: Vec<CozeMessage>,
    /// Always true on this path
    pub stream: bool,
    /// Keep the exchange in the conversation
    pub auto_save_history: bool,
}

/// Chat object carried by `conversation.chat.*` events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeChat {
    /// Chat identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Conversation identifier
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// `created`, `in_progress`, `completed`, `failed`, ...
    #[serde(default)]
    pub status: Option<String>,
    /// Token usage (on completion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CozeChatUsage>,
    /// Failure detail (on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<CozeError>,
}

/// v3 token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeChatUsage {
    /// Total tokens
    #[serde(default)]
    pub token_count: Option<u32>,
    /// Completion tokens
    #[serde(default)]
    pub output_count: Option<u32>,
    /// Prompt tokens
    #[serde(default)]
    pub input_count: Option<u32>,
}

/// Error body of `error` events and failed chats
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeError {
    /// Vendor error code
    #[serde(default)]
    pub code: i64,
    /// Error message
    #[serde(default)]
    pub msg: String,
}

/// Element of an image message body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeImage {
    /// Original-resolution image
    #[serde(default)]
    pub image_ori: Option<CozeImageUrl>,
}

/// Image location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CozeImageUrl {
    /// Image URL
    #[serde(default)]
    pub url: String,
}
