//! Conversion between canonical types and the Anthropic Messages format

use serde_json::json;

use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse,
    AnthropicResponseBlock, AnthropicSource, AnthropicStreamBlock, AnthropicStreamDelta, AnthropicStreamEvent,
    AnthropicThinking, AnthropicTool, AnthropicToolChoice, AnthropicUsage,
};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChoiceMessage, CompletionRequest, Content, ContentPart, DeltaMessage,
    FinishReason, Message, ResponseStamp, Role, StreamingChoice, ToolCall, ToolCallDelta, ToolChoice, ToolChoiceMode,
    Usage,
};

/// `max_tokens` sent when the caller gives none
pub const DEFAULT_MAX_TOKENS: u32 = 30_000;

/// Smallest `max_tokens` that leaves room for the minimum thinking budget
const MIN_THINKING_MAX_TOKENS: u32 = 1025;

// -- Outbound: canonical request -> Messages request --

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        let options = &req.options;

        let system: Vec<String> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_text())
            .collect();
        let messages = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(message_to_anthropic)
            .collect();

        let tools = options.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| json!({"type": "object"})),
                })
                .collect()
        });

        let mut max_tokens = options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let mut temperature = options.temperature;
        // Anthropic rejects temperature and top_p together.
        let mut top_p = if temperature.is_some() { None } else { options.top_p };

        // Any reasoning effort turns on extended thinking with all but one
        // token of the output budget; thinking requires temperature 1.
        let thinking = options.extra_str("reasoning_effort").map(|_| {
            max_tokens = max_tokens.max(MIN_THINKING_MAX_TOKENS);
            temperature = Some(1.0);
            top_p = None;
            AnthropicThinking {
                thinking_type: "enabled".to_owned(),
                budget_tokens: max_tokens - 1,
            }
        });

        Self {
            model: req.model.clone(),
            max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n")),
            messages,
            temperature,
            top_p,
            stop_sequences: options.stop.clone(),
            stream: options.stream.then_some(true),
            tools,
            tool_choice: options.tool_choice.as_ref().map(tool_choice_to_anthropic),
            thinking,
        }
    }
}

fn message_to_anthropic(msg: &Message) -> AnthropicMessage {
    if msg.role == Role::Tool {
        return AnthropicMessage {
            role: "user".to_owned(),
            content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: Some(msg.content.as_text()),
            }]),
        };
    }

    let role = if msg.role == Role::Assistant { "assistant" } else { "user" };

    let content = match (&msg.content, &msg.tool_calls) {
        (Content::Text(text), None) => AnthropicContent::Text(text.clone()),
        (content, calls) => {
            let mut blocks: Vec<AnthropicContentBlock> = match content {
                Content::Text(text) if text.is_empty() => Vec::new(),
                Content::Text(text) => vec![AnthropicContentBlock::Text { text: text.clone() }],
                Content::Parts(parts) => parts.iter().map(part_to_anthropic).collect(),
            };
            blocks.extend(calls.iter().flatten().map(|call| AnthropicContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.function.name.clone(),
                input: serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({})),
            }));
            AnthropicContent::Blocks(blocks)
        }
    };

    AnthropicMessage {
        role: role.to_owned(),
        content,
    }
}

fn source(reference: &str) -> AnthropicSource {
    if let Some(rest) = reference.strip_prefix("data:")
        && let Some((header, data)) = rest.split_once(',')
    {
        return AnthropicSource::Base64 {
            media_type: header.strip_suffix(";base64").unwrap_or(header).to_owned(),
            data: data.to_owned(),
        };
    }
    AnthropicSource::Url {
        url: reference.to_owned(),
    }
}

/// Video has no block type; it is passed as a text reference
fn part_to_anthropic(part: &ContentPart) -> AnthropicContentBlock {
    match part {
        ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        ContentPart::Image { url, .. } => AnthropicContentBlock::Image { source: source(url) },
        ContentPart::File { data } => AnthropicContentBlock::Document { source: source(data) },
        ContentPart::Video { url } => AnthropicContentBlock::Text {
            text: format!("[video] {url}"),
        },
    }
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => ("none", None),
        ToolChoice::Mode(ToolChoiceMode::Auto) => ("auto", None),
        ToolChoice::Mode(ToolChoiceMode::Required) => ("any", None),
        ToolChoice::Function(f) => ("tool", Some(f.function.name.clone())),
    };
    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

// -- Inbound: Messages response -> canonical types --

impl From<&AnthropicUsage> for Usage {
    fn from(usage: &AnthropicUsage) -> Self {
        Self::from_parts(usage.input_tokens, usage.output_tokens)
    }
}

/// Canonical response from a blocking Messages response
pub fn completion_from_anthropic(response: &AnthropicResponse, model: &str) -> ChatCompletion {
    let mut text = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();
    for block in &response.content {
        match block {
            AnthropicResponseBlock::Text { text: t } => text.push_str(t),
            AnthropicResponseBlock::Thinking { thinking: t } => thinking.push_str(t),
            AnthropicResponseBlock::ToolUse { id, name, input } => {
                let arguments = serde_json::to_string(input).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(ToolCall::function(id.clone(), name.clone(), arguments));
            }
            AnthropicResponseBlock::Other => {}
        }
    }

    let mut message = if tool_calls.is_empty() {
        ChoiceMessage::text(text)
    } else {
        ChoiceMessage {
            content: Some(text).filter(|t| !t.is_empty()),
            ..ChoiceMessage::with_tool_calls(tool_calls)
        }
    };
    message.reasoning_content = Some(thinking).filter(|t| !t.is_empty());

    ResponseStamp::new(model).with_id(Some(response.id.clone())).single(
        message,
        response.stop_reason.as_deref().and_then(FinishReason::parse),
        response.usage.as_ref().map(Usage::from).unwrap_or_default(),
    )
}

// -- Stream conversion --

/// Translates Messages stream events into canonical frames for one call
///
/// Content block indexes are shared by text, thinking and tool blocks, so
/// tool calls are renumbered sequentially from zero.
#[derive(Debug)]
pub struct AnthropicStreamState {
    model: String,
    stamp: Option<ResponseStamp>,
    input_tokens: Option<u32>,
    current_tool_call: Option<u32>,
    next_tool_call: u32,
}

impl AnthropicStreamState {
    /// State for a stream of `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stamp: None,
            input_tokens: None,
            current_tool_call: None,
            next_tool_call: 0,
        }
    }

    fn frame(&mut self, delta: DeltaMessage, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        self.stamp
            .get_or_insert_with(|| ResponseStamp::new(self.model.clone()))
            .chunk(vec![StreamingChoice::new(0, delta).with_finish_reason(finish_reason)])
    }

    /// Canonical frames for one event
    ///
    /// `message_stop` and `error` are handled by the caller.
    pub fn convert(&mut self, event: &AnthropicStreamEvent) -> Vec<ChatCompletionChunk> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.stamp = Some(ResponseStamp::new(self.model.clone()).with_id(Some(message.id.clone())));
                self.input_tokens = message.usage.as_ref().and_then(|u| u.input_tokens);
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockStart {
                content_block: AnthropicStreamBlock::ToolUse { id, name },
                ..
            } => {
                let index = self.next_tool_call;
                self.next_tool_call += 1;
                self.current_tool_call = Some(index);
                let delta = DeltaMessage::tool_calls(vec![ToolCallDelta::start(index, id.clone(), name.clone())]);
                vec![self.frame(delta, None)]
            }
            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => {
                let delta = match delta {
                    AnthropicStreamDelta::TextDelta { text } if !text.is_empty() => DeltaMessage::content(text.clone()),
                    AnthropicStreamDelta::ThinkingDelta { thinking } if !thinking.is_empty() => DeltaMessage {
                        reasoning_content: Some(thinking.clone()),
                        ..DeltaMessage::default()
                    },
                    AnthropicStreamDelta::InputJsonDelta { partial_json } if !partial_json.is_empty() => {
                        let Some(index) = self.current_tool_call else {
                            return Vec::new();
                        };
                        DeltaMessage::tool_calls(vec![ToolCallDelta::arguments(index, partial_json.clone())])
                    }
                    _ => return Vec::new(),
                };
                vec![self.frame(delta, None)]
            }
            AnthropicStreamEvent::ContentBlockStop { .. } => {
                self.current_tool_call = None;
                Vec::new()
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.as_deref().and_then(FinishReason::parse);
                let output_tokens = usage.as_ref().and_then(|u| u.output_tokens);
                let input_tokens = usage.as_ref().and_then(|u| u.input_tokens).or(self.input_tokens);
                let usage = Usage::from_parts(input_tokens, output_tokens);

                vec![self.frame(DeltaMessage::default(), finish_reason).with_usage(usage)]
            }
            AnthropicStreamEvent::ContentBlockStart { .. }
            | AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping
            | AnthropicStreamEvent::Error { .. } => Vec::new(),
        }
    }
}
