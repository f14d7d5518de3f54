//! Conversion between canonical types and the `DashScope` wire format

use super::openai::tool_call_delta_from_wire;
use crate::protocol::dashscope::{
    DashScopeContent, DashScopeInput, DashScopeMessage, DashScopeParameters, DashScopePart, DashScopeRequest,
    DashScopeResponse, DashScopeResponseMessage, DashScopeUsage,
};
use crate::protocol::openai::{OpenAiTool, OpenAiToolCall};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, Choice, ChoiceMessage, CompletionRequest, Content, ContentPart, DeltaMessage,
    FinishReason, Message, ResponseStamp, Role, StreamingChoice, ToolCall, Usage,
};

// -- Outbound --

/// Build a generation request
///
/// `multimodal` selects the parts representation required by the
/// multimodal endpoint; every message is then sent as a part list.
pub fn to_dashscope(request: &CompletionRequest, multimodal: bool) -> DashScopeRequest {
    let options = &request.options;
    DashScopeRequest {
        model: request.model.clone(),
        input: DashScopeInput {
            messages: request.messages.iter().map(|m| message(m, multimodal)).collect(),
        },
        parameters: DashScopeParameters {
            result_format: "message".to_owned(),
            incremental_output: options.stream.then_some(true),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: options.stop.clone(),
            presence_penalty: options.presence_penalty,
            seed: options.seed,
            tools: options.tools.as_ref().map(|tools| tools.iter().map(OpenAiTool::from).collect()),
            tool_choice: options.tool_choice.as_ref().map(crate::types::ToolChoice::to_value),
            extra: options.extra.clone(),
        },
    }
}

fn message(msg: &Message, multimodal: bool) -> DashScopeMessage {
    let content = if multimodal {
        let parts = match &msg.content {
            Content::Text(text) => vec![DashScopePart::Text(text.clone())],
            Content::Parts(parts) => parts.iter().map(part).collect(),
        };
        DashScopeContent::Parts(parts)
    } else {
        DashScopeContent::Text(msg.content.as_text())
    };

    DashScopeMessage {
        role: msg.role.as_str().to_owned(),
        content,
        name: msg.name.clone(),
        tool_calls: msg
            .tool_calls
            .as_ref()
            .map(|calls| calls.iter().map(OpenAiToolCall::from).collect()),
        tool_call_id: msg.tool_call_id.clone(),
    }
}

fn part(part: &ContentPart) -> DashScopePart {
    match part {
        ContentPart::Text { text } => DashScopePart::Text(text.clone()),
        ContentPart::Image { url, .. } => DashScopePart::Image(url.clone()),
        ContentPart::Video { url } => DashScopePart::Video(url.clone()),
        ContentPart::File { data } => DashScopePart::Text(format!("[file]({data})")),
    }
}

// -- Inbound --

impl From<&DashScopeUsage> for Usage {
    fn from(usage: &DashScopeUsage) -> Self {
        let derived = Self::from_parts(usage.input_tokens, usage.output_tokens);
        Self {
            total_tokens: usage.total_tokens.or(derived.total_tokens),
            ..derived
        }
    }
}

fn text_of(message: &DashScopeResponseMessage) -> Option<String> {
    message.content.as_ref().map(DashScopeContent::text)
}

/// Canonical response from a blocking generation response
pub fn completion_from_dashscope(response: &DashScopeResponse, model: &str) -> ChatCompletion {
    let choices = response
        .output
        .iter()
        .flat_map(|output| output.choices.iter())
        .zip(0_u32..)
        .map(|(choice, index)| {
            let tool_calls: Vec<ToolCall> = choice
                .message
                .tool_calls
                .iter()
                .flatten()
                .zip(0_u32..)
                .map(|(call, i)| {
                    let function = call.function.as_ref();
                    ToolCall::function(
                        call.id.clone().unwrap_or_else(|| format!("call_{i}")),
                        function.and_then(|f| f.name.clone()).unwrap_or_default(),
                        function.and_then(|f| f.arguments.clone()).unwrap_or_default(),
                    )
                })
                .collect();

            Choice {
                index,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content: text_of(&choice.message),
                    reasoning_content: choice.message.reasoning_content.clone(),
                    tool_calls: Some(tool_calls).filter(|t| !t.is_empty()),
                },
                finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
            }
        })
        .collect();

    ResponseStamp::new(model).with_id(response.request_id.clone()).completion(
        choices,
        response.usage.as_ref().map(Usage::from).unwrap_or_default(),
    )
}

/// Translates `DashScope` stream frames for one call
#[derive(Debug)]
pub struct DashScopeStreamState {
    model: String,
    stamp: Option<ResponseStamp>,
}

impl DashScopeStreamState {
    /// State for a stream of `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stamp: None,
        }
    }

    /// Canonical frames for one incremental frame
    ///
    /// Every frame repeats the running usage; the accumulator keeps the last.
    pub fn convert(&mut self, frame: &DashScopeResponse) -> Vec<ChatCompletionChunk> {
        let choices: Vec<StreamingChoice> = frame
            .output
            .iter()
            .flat_map(|output| output.choices.iter())
            .zip(0_u32..)
            .filter_map(|(choice, index)| {
                let delta = DeltaMessage {
                    role: choice.message.role.as_ref().map(|_| Role::Assistant),
                    content: text_of(&choice.message).filter(|t| !t.is_empty()),
                    reasoning_content: choice.message.reasoning_content.clone().filter(|r| !r.is_empty()),
                    tool_calls: choice
                        .message
                        .tool_calls
                        .as_ref()
                        .map(|calls| calls.iter().map(tool_call_delta_from_wire).collect()),
                };
                let finish_reason = choice.finish_reason.as_deref().and_then(FinishReason::parse);
                (delta.content.is_some()
                    || delta.reasoning_content.is_some()
                    || delta.tool_calls.is_some()
                    || finish_reason.is_some())
                .then_some(StreamingChoice {
                    index,
                    delta,
                    finish_reason,
                })
            })
            .collect();

        let usage = frame.usage.as_ref().map(Usage::from).unwrap_or_default();
        if choices.is_empty() && !usage.is_reported() {
            return Vec::new();
        }

        let stamp = self
            .stamp
            .get_or_insert_with(|| ResponseStamp::new(self.model.clone()).with_id(frame.request_id.clone()));
        vec![stamp.chunk(choices).with_usage(usage)]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::CompletionOptions;

    fn request(messages: Vec<Message>, options: CompletionOptions) -> CompletionRequest {
        CompletionRequest {
            model: "qwen-vl-plus".to_owned(),
            messages,
            options,
        }
    }

    #[test]
    fn text_request_uses_message_format() {
        let wire = to_dashscope(
            &request(vec![Message::user("Hi")], CompletionOptions::default().streaming()),
            false,
        );
        let value = serde_json::to_value(wire).unwrap();
        assert_eq!(value["input"]["messages"][0], json!({"role": "user", "content": "Hi"}));
        assert_eq!(value["parameters"]["result_format"], "message");
        assert_eq!(value["parameters"]["incremental_output"], true);
    }

    #[test]
    fn multimodal_request_uses_single_key_parts() {
        let messages = vec![
            Message::system("describe"),
            Message::user_parts(vec![ContentPart::text("what?"), ContentPart::image("http://x/a.png")]),
        ];
        let value = serde_json::to_value(to_dashscope(&request(messages, CompletionOptions::default()), true)).unwrap();
        assert_eq!(value["input"]["messages"][0]["content"], json!([{"text": "describe"}]));
        assert_eq!(
            value["input"]["messages"][1]["content"],
            json!([{"text": "what?"}, {"image": "http://x/a.png"}])
        );
        assert!(value["parameters"].get("incremental_output").is_none());
    }

    #[test]
    fn blocking_response_maps_usage_names() {
        let response: DashScopeResponse = serde_json::from_value(json!({
            "request_id": "req-1",
            "output": {"choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": "Hello"}}]},
            "usage": {"input_tokens": 4, "output_tokens": 2, "total_tokens": 6}
        }))
        .unwrap();

        let completion = completion_from_dashscope(&response, "qwen-turbo");
        assert_eq!(completion.id, "req-1");
        assert_eq!(completion.text(), Some("Hello"));
        assert_eq!(completion.usage, Usage::new(4, 2, 6));
    }

    #[test]
    fn multimodal_response_content_list_is_joined() {
        let response: DashScopeResponse = serde_json::from_value(json!({
            "output": {"choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": [{"text": "A cat"}]}}]}
        }))
        .unwrap();
        assert_eq!(completion_from_dashscope(&response, "qwen-vl-plus").text(), Some("A cat"));
    }

    #[test]
    fn null_string_finish_reason_is_ignored_mid_stream() {
        let mut state = DashScopeStreamState::new("qwen-turbo");
        let frame: DashScopeResponse = serde_json::from_value(json!({
            "request_id": "r",
            "output": {"choices": [{"finish_reason": "null", "message": {"role": "assistant", "content": "He"}}]},
            "usage": {"input_tokens": 4, "output_tokens": 1, "total_tokens": 5}
        }))
        .unwrap();

        let out = state.convert(&frame);
        assert_eq!(out[0].id, "r");
        assert_eq!(out[0].choices[0].finish_reason, None);
        assert_eq!(out[0].choices[0].delta.content.as_deref(), Some("He"));
    }
}
