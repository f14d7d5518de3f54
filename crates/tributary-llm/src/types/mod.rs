//! Canonical, vendor-agnostic request and response types
//!
//! Every adapter translates its vendor's wire format to and from these
//! shapes; nothing outside `protocol` and `convert` sees vendor JSON.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, Message, Modality, Role, ToolCall, ToolType};
pub use request::{CompletionOptions, CompletionRequest};
pub use response::{
    ChatCompletion, ChatCompletionChunk, Choice, ChoiceMessage, Context, FinishReason, FrameKind, Incremental,
    ModelResponse, ResponseStamp, Terminal, Usage,
};
pub use stream::{DeltaMessage, FunctionDelta, StreamingChoice, ToolCallDelta};
pub use tool::{FunctionDefinition, ToolChoice, ToolChoiceFunction, ToolChoiceFunctionName, ToolChoiceMode, ToolDefinition};
