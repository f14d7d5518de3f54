//! Conversion between canonical types and the OpenAI-compatible wire format

use crate::protocol::openai::{
    OpenAiChoice, OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall, OpenAiMediaUrl, OpenAiMessage,
    OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions, OpenAiStreamToolCall, OpenAiTool,
    OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, Choice, ChoiceMessage, CompletionRequest, Content, ContentPart, Context,
    DeltaMessage, FinishReason, FunctionDelta, Message, ResponseStamp, Role, StreamingChoice, ToolCall, ToolCallDelta,
    ToolDefinition, ToolType, Usage,
};

// -- Outbound: canonical request -> wire request --

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        let options = &req.options;
        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: options.stop.clone(),
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
            seed: options.seed,
            user: options.user_id.clone(),
            stream: options.stream.then_some(true),
            tools: options.tools.as_ref().map(|tools| tools.iter().map(Into::into).collect()),
            tool_choice: options.tool_choice.as_ref().map(crate::types::ToolChoice::to_value),
            stream_options: None,
            extra: options.extra.clone(),
        }
    }
}

impl OpenAiRequest {
    /// Ask for a trailing usage frame when streaming
    #[must_use]
    pub fn with_stream_usage(mut self) -> Self {
        if self.stream == Some(true) {
            self.stream_options = Some(OpenAiStreamOptions { include_usage: true });
        }
        self
    }
}

impl From<&ToolDefinition> for OpenAiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function: OpenAiFunction {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                parameters: tool.function.parameters.clone(),
            },
        }
    }
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            tool_type: "function".to_owned(),
            function: OpenAiFunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            },
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let content = match &msg.content {
            Content::Text(text) if text.is_empty() && msg.tool_calls.is_some() => None,
            Content::Text(text) => Some(OpenAiContent::Text(text.clone())),
            Content::Parts(parts) => Some(OpenAiContent::Parts(parts.iter().map(Into::into).collect())),
        };

        Self {
            role: msg.role.as_str().to_owned(),
            content,
            name: msg.name.clone(),
            tool_calls: msg
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(Into::into).collect()),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&ContentPart> for OpenAiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => Self::Text { text: text.clone() },
            ContentPart::Image { url, detail } => Self::ImageUrl {
                image_url: OpenAiMediaUrl {
                    url: url.clone(),
                    detail: detail.clone(),
                },
            },
            ContentPart::Video { url } => Self::VideoUrl {
                video_url: OpenAiMediaUrl {
                    url: url.clone(),
                    detail: None,
                },
            },
            ContentPart::File { data } => Self::FileUrl {
                file_url: OpenAiMediaUrl {
                    url: data.clone(),
                    detail: None,
                },
            },
        }
    }
}

// -- Inbound: wire response -> canonical response --

impl From<&OpenAiUsage> for Usage {
    fn from(usage: &OpenAiUsage) -> Self {
        let derived = Self::from_parts(usage.prompt_tokens, usage.completion_tokens);
        Self {
            total_tokens: usage.total_tokens.or(derived.total_tokens),
            ..derived
        }
    }
}

pub(crate) fn tool_calls_from_wire(calls: &[OpenAiToolCall]) -> Vec<ToolCall> {
    calls
        .iter()
        .enumerate()
        .map(|(i, call)| {
            let id = if call.id.is_empty() {
                format!("call_{i}")
            } else {
                call.id.clone()
            };
            ToolCall::function(id, call.function.name.clone(), call.function.arguments.clone())
        })
        .collect()
}

pub(crate) fn choice_from_wire(choice: &OpenAiChoice) -> Choice {
    let tool_calls = choice
        .message
        .tool_calls
        .as_deref()
        .filter(|calls| !calls.is_empty())
        .map(tool_calls_from_wire);

    Choice {
        index: choice.index,
        message: ChoiceMessage {
            role: Role::Assistant,
            content: choice.message.content.clone(),
            reasoning_content: choice.message.reasoning_content.clone(),
            tool_calls,
        },
        finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
    }
}

/// Canonical response from a blocking wire response
///
/// `model` is the model the caller asked for; vendors that echo a different
/// spelling are normalized to it.
pub fn completion_from_openai(response: &OpenAiResponse, model: &str) -> ChatCompletion {
    ResponseStamp::new(model)
        .with_id(response.id.clone())
        .with_created(response.created)
        .completion(
            response.choices.iter().map(choice_from_wire).collect(),
            response.usage.as_ref().map(Usage::from).unwrap_or_default(),
        )
}

// -- Stream conversion --

/// Translates wire stream chunks into canonical frames for one call
#[derive(Debug)]
pub struct OpenAiStreamState {
    model: String,
    stamp: Option<ResponseStamp>,
}

impl OpenAiStreamState {
    /// State for a stream of `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stamp: None,
        }
    }

    /// Stamp fixed by the first chunk
    fn stamp(&mut self, chunk: &OpenAiStreamChunk) -> &ResponseStamp {
        self.stamp.get_or_insert_with(|| {
            ResponseStamp::new(self.model.clone())
                .with_id(chunk.id.clone())
                .with_created(chunk.created)
        })
    }

    /// Canonical frames for one wire chunk
    ///
    /// Keep-alive chunks with neither choices nor usage produce nothing.
    pub fn convert(&mut self, chunk: &OpenAiStreamChunk) -> Vec<ChatCompletionChunk> {
        let usage = chunk.usage.as_ref().map(Usage::from).unwrap_or_default();
        if chunk.choices.is_empty() && !usage.is_reported() {
            return Vec::new();
        }

        let choices = chunk
            .choices
            .iter()
            .map(|choice| StreamingChoice {
                index: choice.index,
                delta: DeltaMessage {
                    role: choice.delta.role.as_ref().map(|_| Role::Assistant),
                    content: choice.delta.content.clone(),
                    reasoning_content: choice.delta.reasoning_content.clone(),
                    tool_calls: choice
                        .delta
                        .tool_calls
                        .as_ref()
                        .map(|calls| calls.iter().map(tool_call_delta_from_wire).collect()),
                },
                finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
            })
            .collect();

        vec![self.stamp(chunk).chunk(choices).with_usage(usage)]
    }

    /// Frame carrying only retrieved knowledge
    pub fn context_chunk(&mut self, context: Vec<Context>) -> ChatCompletionChunk {
        self.stamp
            .get_or_insert_with(|| ResponseStamp::new(self.model.clone()))
            .chunk(Vec::new())
            .with_context(context)
    }
}

pub(crate) fn tool_call_delta_from_wire(call: &OpenAiStreamToolCall) -> ToolCallDelta {
    ToolCallDelta {
        index: call.index,
        id: call.id.clone().filter(|id| !id.is_empty()),
        call_type: call.id.as_ref().map(|_| ToolType::Function),
        function: call.function.as_ref().map(|f| FunctionDelta {
            name: f.name.clone().filter(|n| !n.is_empty()),
            arguments: f.arguments.clone(),
        }),
    }
}
