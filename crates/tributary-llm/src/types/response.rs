use std::marker::PhantomData;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::message::{Role, ToolCall};
use super::stream::StreamingChoice;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
}

impl FinishReason {
    /// Map a vendor's finish/stop reason onto the canonical set
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stop" | "end_turn" | "stop_sequence" | "normal" | "finish" => Some(Self::Stop),
            "length" | "max_tokens" | "max_output_tokens" => Some(Self::Length),
            "tool_calls" | "tool_use" | "function_call" => Some(Self::ToolCalls),
            "content_filter" | "safety" | "sensitive" | "recitation" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}

/// Token usage statistics
///
/// Every field is optional: `None` means the vendor did not report it, which
/// is distinct from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    /// Tokens generated in the completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    /// Total tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Usage {
    /// Usage with all three counts reported
    pub const fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens: Some(prompt_tokens),
            completion_tokens: Some(completion_tokens),
            total_tokens: Some(total_tokens),
        }
    }

    /// Usage from prompt and completion counts
    ///
    /// The total is derived only because the vendor omitted it.
    pub fn from_parts(prompt_tokens: Option<u32>, completion_tokens: Option<u32>) -> Self {
        let total_tokens = prompt_tokens.zip(completion_tokens).map(|(p, c)| p.saturating_add(c));
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Whether the vendor reported any figure at all
    pub const fn is_reported(&self) -> bool {
        self.prompt_tokens.is_some() || self.completion_tokens.is_some() || self.total_tokens.is_some()
    }

    /// Fill fields that are still absent from `other`
    ///
    /// Reported values are never overwritten.
    pub fn merge(&mut self, other: &Self) {
        self.prompt_tokens = self.prompt_tokens.or(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.or(other.completion_tokens);
        self.total_tokens = self.total_tokens.or(other.total_tokens);
    }
}

/// Retrieved knowledge snippet surfaced by retrieval-augmented vendors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Vendor-side identifier (or position) of the snippet
    pub id: String,
    /// Snippet text
    pub content: String,
    /// Relevance score, when the vendor reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice
    pub index: u32,
    /// Generated message
    pub message: ChoiceMessage,
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
}

impl Choice {
    /// First choice that ended naturally
    pub const fn stop(message: ChoiceMessage) -> Self {
        Self {
            index: 0,
            message,
            finish_reason: Some(FinishReason::Stop),
        }
    }
}

/// Message content within a response choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    /// Role is always assistant for completions
    pub role: Role,
    /// Text content
    pub content: Option<String>,
    /// Reasoning trace, for vendors that expose one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChoiceMessage {
    /// Create a simple text message from the assistant
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            reasoning_content: None,
            tool_calls: None,
        }
    }

    /// Create a tool-calling message from the assistant
    pub const fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            reasoning_content: None,
            tool_calls: Some(tool_calls),
        }
    }
}

// -- Envelope --

/// Distinguishes terminal responses from stream frames at the type level
pub trait FrameKind {
    /// Value of the `object` field
    const OBJECT: &'static str;
    /// Choice shape carried by this kind of frame
    type Choice: Serialize + std::fmt::Debug + Clone + PartialEq;
}

/// Marker for a complete, blocking response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal;

/// Marker for one frame of a streaming response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incremental;

impl FrameKind for Terminal {
    const OBJECT: &'static str = "chat.completion";
    type Choice = Choice;
}

impl FrameKind for Incremental {
    const OBJECT: &'static str = "chat.completion.chunk";
    type Choice = StreamingChoice;
}

/// Canonical response envelope
///
/// The `object` field is derived from `F` and cannot be set independently.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse<F: FrameKind> {
    /// Unique response identifier
    pub id: String,
    /// Unix timestamp of creation
    pub created: i64,
    /// Model used for generation
    pub model: String,
    /// Generated choices or deltas
    pub choices: Vec<F::Choice>,
    /// Token usage; empty when not reported
    pub usage: Usage,
    /// Vendor-side conversation handle
    pub conversation_id: Option<String>,
    /// Retrieved knowledge attached by the vendor
    pub context: Vec<Context>,
    kind: PhantomData<F>,
}

/// Blocking completion result
pub type ChatCompletion = ModelResponse<Terminal>;

/// One streaming frame
pub type ChatCompletionChunk = ModelResponse<Incremental>;

impl<F: FrameKind> ModelResponse<F> {
    /// Envelope object type
    pub const fn object(&self) -> &'static str {
        F::OBJECT
    }

    /// Serialize to a JSON value for callers that want dictionary access
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl<F: FrameKind> Serialize for ModelResponse<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let optional = usize::from(self.conversation_id.is_some()) + usize::from(!self.context.is_empty());
        let mut state = serializer.serialize_struct("ModelResponse", 6 + optional)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("object", F::OBJECT)?;
        state.serialize_field("created", &self.created)?;
        state.serialize_field("model", &self.model)?;
        state.serialize_field("choices", &self.choices)?;
        state.serialize_field("usage", &self.usage)?;
        if let Some(conversation_id) = &self.conversation_id {
            state.serialize_field("conversation_id", conversation_id)?;
        }
        if !self.context.is_empty() {
            state.serialize_field("context", &self.context)?;
        }
        state.end()
    }
}

/// Identity shared by every response of one call
///
/// Adapters build one stamp per call and use it for the terminal response
/// or for every stream frame, so ids and timestamps stay consistent.
#[derive(Debug, Clone)]
pub struct ResponseStamp {
    id: String,
    created: i64,
    model: String,
    conversation_id: Option<String>,
}

impl ResponseStamp {
    /// Fresh `chatcmpl-` id stamped with the current time
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            created: jiff::Timestamp::now().as_second(),
            model: model.into(),
            conversation_id: None,
        }
    }

    /// Replace the generated id with one issued by the vendor
    #[must_use]
    pub fn with_id(mut self, id: Option<impl Into<String>>) -> Self {
        if let Some(id) = id {
            let id = id.into();
            if !id.is_empty() {
                self.id = id;
            }
        }
        self
    }

    /// Replace the local timestamp with one issued by the vendor
    #[must_use]
    pub const fn with_created(mut self, created: Option<i64>) -> Self {
        if let Some(created) = created {
            self.created = created;
        }
        self
    }

    /// Attach a vendor conversation handle
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id.filter(|c| !c.is_empty());
        self
    }

    /// Record a conversation id learned mid-stream
    pub fn set_conversation(&mut self, conversation_id: impl Into<String>) {
        let conversation_id = conversation_id.into();
        if !conversation_id.is_empty() {
            self.conversation_id = Some(conversation_id);
        }
    }

    /// Model name in this stamp
    pub fn model(&self) -> &str {
        &self.model
    }

    fn envelope<F: FrameKind>(&self, choices: Vec<F::Choice>, usage: Usage) -> ModelResponse<F> {
        ModelResponse {
            id: self.id.clone(),
            created: self.created,
            model: self.model.clone(),
            choices,
            usage,
            conversation_id: self.conversation_id.clone(),
            context: Vec::new(),
            kind: PhantomData,
        }
    }

    /// Terminal response
    pub fn completion(&self, choices: Vec<Choice>, usage: Usage) -> ChatCompletion {
        self.envelope(choices, usage)
    }

    /// Terminal response with a single assistant message
    pub fn single(&self, message: ChoiceMessage, finish_reason: Option<FinishReason>, usage: Usage) -> ChatCompletion {
        self.completion(
            vec![Choice {
                index: 0,
                message,
                finish_reason,
            }],
            usage,
        )
    }

    /// Stream frame
    pub fn chunk(&self, choices: Vec<StreamingChoice>) -> ChatCompletionChunk {
        self.envelope(choices, Usage::default())
    }

    /// Stream frame carrying only usage statistics
    pub fn usage_chunk(&self, usage: Usage) -> ChatCompletionChunk {
        self.envelope(Vec::new(), usage)
    }
}

impl<F: FrameKind> ModelResponse<F> {
    /// Attach retrieved knowledge
    #[must_use]
    pub fn with_context(mut self, context: Vec<Context>) -> Self {
        self.context = context;
        self
    }

    /// Attach usage statistics
    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

impl ChatCompletion {
    /// Text of the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_deref())
    }
}
