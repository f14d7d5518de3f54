use serde::{Deserialize, Serialize};

use super::message::{Role, ToolType};
use super::response::FinishReason;

/// One choice within a stream frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingChoice {
    /// Choice index this delta belongs to
    pub index: u32,
    /// Fields that changed in this frame
    pub delta: DeltaMessage,
    /// Reason generation finished (present on the final delta)
    pub finish_reason: Option<FinishReason>,
}

impl StreamingChoice {
    /// Delta without a finish reason
    pub const fn new(index: u32, delta: DeltaMessage) -> Self {
        Self {
            index,
            delta,
            finish_reason: None,
        }
    }

    /// Empty delta that only closes the choice
    pub fn finished(index: u32, finish_reason: FinishReason) -> Self {
        Self {
            index,
            delta: DeltaMessage::default(),
            finish_reason: Some(finish_reason),
        }
    }

    /// Attach a finish reason
    #[must_use]
    pub const fn with_finish_reason(mut self, finish_reason: Option<FinishReason>) -> Self {
        self.finish_reason = finish_reason;
        self
    }
}

/// Partial message; absent fields mean "no change in this frame"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaMessage {
    /// Role (usually only on the first frame)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental reasoning trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    /// Incremental tool call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

impl DeltaMessage {
    /// Assistant text fragment
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// Tool call fragments
    pub fn tool_calls(calls: Vec<ToolCallDelta>) -> Self {
        Self {
            role: Some(Role::Assistant),
            tool_calls: Some(calls),
            ..Self::default()
        }
    }

    /// Whether the delta carries no payload
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.reasoning_content.as_deref().is_none_or(str::is_empty)
            && self.tool_calls.as_ref().is_none_or(Vec::is_empty)
    }
}

/// Partial tool call data within a stream delta
///
/// Fragments for one call share `index`; `arguments` pieces must be
/// concatenated in arrival order before they form valid JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Index of this tool call in the `tool_calls` array
    pub index: u32,
    /// Tool call ID (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool type (first fragment only)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub call_type: Option<ToolType>,
    /// Partial function call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

impl ToolCallDelta {
    /// Opening fragment naming the function
    pub fn start(index: u32, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            call_type: Some(ToolType::Function),
            function: Some(FunctionDelta {
                name: Some(name.into()),
                arguments: Some(String::new()),
            }),
        }
    }

    /// Continuation fragment carrying more argument text
    pub fn arguments(index: u32, fragment: impl Into<String>) -> Self {
        Self {
            index,
            id: None,
            call_type: None,
            function: Some(FunctionDelta {
                name: None,
                arguments: Some(fragment.into()),
            }),
        }
    }
}

/// Partial function call data within a streaming tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDelta {
    /// Function name (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments JSON fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
