//! Conversion between canonical types and the Gemini wire format

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::protocol::google::{
    GoogleBlob, GoogleCandidate, GoogleContent, GoogleFileData, GoogleFunctionCall, GoogleFunctionCallingConfig,
    GoogleFunctionDeclaration, GoogleFunctionResponse, GoogleGenerationConfig, GooglePart, GoogleRequest,
    GoogleResponse, GoogleTool, GoogleToolConfig, GoogleUsageMetadata,
};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, Choice, ChoiceMessage, CompletionRequest, Content, ContentPart, DeltaMessage,
    FinishReason, Message, ResponseStamp, Role, StreamingChoice, ToolCall, ToolChoice, ToolChoiceMode, Usage,
};

// -- Outbound: canonical request -> Gemini request --

impl From<&CompletionRequest> for GoogleRequest {
    fn from(req: &CompletionRequest) -> Self {
        let options = &req.options;

        // Function responses must name the function, which tool messages only
        // reference by call id.
        let call_names: HashMap<&str, &str> = req
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().flatten())
            .map(|c| (c.id.as_str(), c.function.name.as_str()))
            .collect();

        let mut system_parts = Vec::new();
        let mut contents = Vec::new();
        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(GooglePart::text(msg.content.as_text())),
                Role::User => contents.push(message_content(msg, "user")),
                Role::Assistant => contents.push(message_content(msg, "model")),
                Role::Tool => contents.push(function_response(msg, &call_names)),
            }
        }

        let tools = options.tools.as_ref().map(|tools| {
            vec![GoogleTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        let tool_config = options.tool_choice.as_ref().map(|choice| {
            let (mode, allowed_function_names) = match choice {
                ToolChoice::Mode(ToolChoiceMode::None) => ("NONE", None),
                ToolChoice::Mode(ToolChoiceMode::Auto) => ("AUTO", None),
                ToolChoice::Mode(ToolChoiceMode::Required) => ("ANY", None),
                ToolChoice::Function(f) => ("ANY", Some(vec![f.function.name.clone()])),
            };
            GoogleToolConfig {
                function_calling_config: GoogleFunctionCallingConfig {
                    mode: mode.to_owned(),
                    allowed_function_names,
                },
            }
        });

        Self {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| GoogleContent {
                role: None,
                parts: system_parts,
            }),
            generation_config: Some(GoogleGenerationConfig {
                temperature: options.temperature,
                top_p: options.top_p,
                max_output_tokens: options.max_tokens,
                stop_sequences: options.stop.clone(),
                presence_penalty: options.presence_penalty,
                frequency_penalty: options.frequency_penalty,
            }),
            tools,
            tool_config,
        }
    }
}

fn message_content(msg: &Message, role: &str) -> GoogleContent {
    let mut parts = Vec::new();
    match &msg.content {
        Content::Text(text) if text.is_empty() => {}
        Content::Text(text) => parts.push(GooglePart::text(text.clone())),
        Content::Parts(content_parts) => parts.extend(content_parts.iter().map(media_part)),
    }

    for call in msg.tool_calls.iter().flatten() {
        let args = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
        parts.push(GooglePart {
            function_call: Some(GoogleFunctionCall {
                name: call.function.name.clone(),
                args,
            }),
            ..GooglePart::default()
        });
    }

    if parts.is_empty() {
        parts.push(GooglePart::text(String::new()));
    }
    GoogleContent {
        role: Some(role.to_owned()),
        parts,
    }
}

fn function_response(msg: &Message, call_names: &HashMap<&str, &str>) -> GoogleContent {
    let call_id = msg.tool_call_id.as_deref().unwrap_or_default();
    let output = msg.content.as_text();
    let response = match serde_json::from_str::<Value>(&output) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({"result": output}),
    };
    GoogleContent {
        role: Some("function".to_owned()),
        parts: vec![GooglePart {
            function_response: Some(GoogleFunctionResponse {
                name: call_names.get(call_id).copied().unwrap_or(call_id).to_owned(),
                response,
            }),
            ..GooglePart::default()
        }],
    }
}

/// Data URIs travel inline; anything else as a file reference
fn media_part(part: &ContentPart) -> GooglePart {
    let (reference, fallback_mime) = match part {
        ContentPart::Text { text } => return GooglePart::text(text.clone()),
        ContentPart::Image { url, .. } => (url.as_str(), "image/jpeg"),
        ContentPart::Video { url } => (url.as_str(), "video/mp4"),
        ContentPart::File { data } => (data.as_str(), "application/pdf"),
    };

    if let Some(rest) = reference.strip_prefix("data:")
        && let Some((header, data)) = rest.split_once(',')
    {
        let mime_type = header.strip_suffix(";base64").unwrap_or(header);
        return GooglePart {
            inline_data: Some(GoogleBlob {
                mime_type: mime_type.to_owned(),
                data: data.to_owned(),
            }),
            ..GooglePart::default()
        };
    }

    GooglePart {
        file_data: Some(GoogleFileData {
            mime_type: mime_from_extension(reference).unwrap_or(fallback_mime).to_owned(),
            file_uri: reference.to_owned(),
        }),
        ..GooglePart::default()
    }
}

fn mime_from_extension(uri: &str) -> Option<&'static str> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => return None,
    })
}

// -- Inbound: Gemini response -> canonical types --

impl From<&GoogleUsageMetadata> for Usage {
    fn from(usage: &GoogleUsageMetadata) -> Self {
        let derived = Self::from_parts(usage.prompt_token_count, usage.candidates_token_count);
        Self {
            total_tokens: usage.total_token_count.or(derived.total_tokens),
            ..derived
        }
    }
}

fn finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "" | "FINISH_REASON_UNSPECIFIED" => None,
        "MAX_TOKENS" => Some(FinishReason::Length),
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            Some(FinishReason::ContentFilter)
        }
        _ => Some(FinishReason::Stop),
    }
}

/// Generated images come back inline and are rendered as markdown
fn image_markdown(blob: &GoogleBlob) -> String {
    format!("\n![generated_image](data:{};base64,{})\n", blob.mime_type, blob.data)
}

/// Output of one candidate; `next_call` numbers the tool calls
#[derive(Default)]
struct CandidateOutput {
    text: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
}

fn candidate_output(candidate: &GoogleCandidate, next_call: &mut u32) -> CandidateOutput {
    let mut output = CandidateOutput::default();
    for part in &candidate.content.parts {
        if let Some(text) = &part.text {
            if part.thought == Some(true) {
                output.reasoning.push_str(text);
            } else {
                output.text.push_str(text);
            }
        }
        if let Some(blob) = &part.inline_data {
            output.text.push_str(&image_markdown(blob));
        }
        if let Some(call) = &part.function_call {
            let arguments = serde_json::to_string(&call.args).unwrap_or_else(|_| "{}".to_owned());
            output.tool_calls.push(ToolCall::function(
                format!("call_{}_{}", call.name, *next_call),
                call.name.clone(),
                arguments,
            ));
            *next_call += 1;
        }
    }
    output
}

/// Canonical response from a blocking Gemini response
pub fn completion_from_google(response: &GoogleResponse, model: &str) -> ChatCompletion {
    let mut next_call = 0;
    let choices = response
        .candidates
        .iter()
        .zip(0u32..)
        .map(|(candidate, position)| {
            let output = candidate_output(candidate, &mut next_call);
            let finish_reason = if output.tool_calls.is_empty() {
                candidate.finish_reason.as_deref().and_then(finish_reason)
            } else {
                Some(FinishReason::ToolCalls)
            };
            let mut message = if output.tool_calls.is_empty() {
                ChoiceMessage::text(output.text)
            } else {
                ChoiceMessage {
                    content: Some(output.text).filter(|t| !t.is_empty()),
                    ..ChoiceMessage::with_tool_calls(output.tool_calls)
                }
            };
            message.reasoning_content = Some(output.reasoning).filter(|r| !r.is_empty());
            Choice {
                index: candidate.index.unwrap_or(position),
                message,
                finish_reason,
            }
        })
        .collect();

    ResponseStamp::new(model).with_id(response.response_id.clone()).completion(
        choices,
        response.usage_metadata.as_ref().map(Usage::from).unwrap_or_default(),
    )
}

// -- Stream conversion --

/// Translates Gemini stream events into canonical frames for one call
///
/// Function calls arrive whole, so each becomes a single indexed delta.
#[derive(Debug)]
pub struct GoogleStreamState {
    model: String,
    stamp: Option<ResponseStamp>,
    next_call: u32,
}

impl GoogleStreamState {
    /// State for a stream of `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stamp: None,
            next_call: 0,
        }
    }

    /// Canonical frames for one stream event
    pub fn convert(&mut self, event: &GoogleResponse) -> Vec<ChatCompletionChunk> {
        let mut choices = Vec::new();
        for (candidate, position) in event.candidates.iter().zip(0u32..) {
            let index = candidate.index.unwrap_or(position);
            let first_call = self.next_call;
            let output = candidate_output(candidate, &mut self.next_call);

            let mut delta = if output.text.is_empty() {
                DeltaMessage::default()
            } else {
                DeltaMessage::content(output.text)
            };
            delta.reasoning_content = Some(output.reasoning).filter(|r| !r.is_empty());
            if !output.tool_calls.is_empty() {
                delta.tool_calls = Some(
                    output
                        .tool_calls
                        .iter()
                        .zip(first_call..)
                        .map(|(call, i)| super::whole_tool_call(i, call))
                        .collect(),
                );
            }

            let finish = if delta.tool_calls.is_none() {
                candidate.finish_reason.as_deref().and_then(finish_reason)
            } else {
                Some(FinishReason::ToolCalls)
            };
            if !delta.is_empty() || finish.is_some() {
                choices.push(StreamingChoice::new(index, delta).with_finish_reason(finish));
            }
        }

        let usage = event.usage_metadata.as_ref().map(Usage::from).unwrap_or_default();
        if choices.is_empty() && !usage.is_reported() {
            return Vec::new();
        }

        let stamp = self
            .stamp
            .get_or_insert_with(|| ResponseStamp::new(self.model.clone()).with_id(event.response_id.clone()));
        vec![stamp.chunk(choices).with_usage(usage)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompletionOptions, ToolDefinition};

    fn request(messages: Vec<Message>, options: CompletionOptions) -> CompletionRequest {
        CompletionRequest {
            model: "gemini-2.0-flash".to_owned(),
            messages,
            options,
        }
    }

    #[test]
    fn system_becomes_instruction_and_roles_map() {
        let req = request(
            vec![Message::system("Be brief."), Message::user("Hi"), Message::assistant("Hello")],
            CompletionOptions {
                max_tokens: Some(64),
                stop: Some(vec!["END".to_owned()]),
                ..CompletionOptions::default()
            },
        );

        let wire = serde_json::to_value(GoogleRequest::from(&req)).unwrap();
        assert_eq!(wire["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(wire["contents"][0]["role"], "user");
        assert_eq!(wire["contents"][1]["role"], "model");
        assert_eq!(wire["generationConfig"]["maxOutputTokens"], 64);
        assert_eq!(wire["generationConfig"]["stopSequences"][0], "END");
    }

    #[test]
    fn tools_become_function_declarations() {
        let req = request(
            vec![Message::user("Weather?")],
            CompletionOptions {
                tools: Some(vec![ToolDefinition::function(
                    "get_weather",
                    "Current weather",
                    json!({"type": "object", "properties": {"city": {"type": "string"}}}),
                )]),
                tool_choice: Some(ToolChoice::Mode(ToolChoiceMode::Required)),
                ..CompletionOptions::default()
            },
        );

        let wire = serde_json::to_value(GoogleRequest::from(&req)).unwrap();
        assert_eq!(wire["tools"][0]["functionDeclarations"][0]["name"], "get_weather");
        assert_eq!(wire["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
    }

    #[test]
    fn tool_result_names_the_called_function() {
        let req = request(
            vec![
                Message::user("Weather?"),
                Message::assistant_tool_calls(vec![ToolCall::function("c1", "get_weather", r#"{"city":"Paris"}"#)]),
                Message::tool("c1", "sunny"),
            ],
            CompletionOptions::default(),
        );

        let wire = serde_json::to_value(GoogleRequest::from(&req)).unwrap();
        assert_eq!(wire["contents"][1]["parts"][0]["functionCall"]["args"]["city"], "Paris");
        let response = &wire["contents"][2]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "get_weather");
        assert_eq!(response["response"]["result"], "sunny");
    }

    #[test]
    fn media_parts_inline_or_reference() {
        let req = request(
            vec![Message::user_parts(vec![
                ContentPart::text("What is this?"),
                ContentPart::image("data:image/png;base64,iVBORw0"),
                ContentPart::video("https://cdn.example/clip.mp4?sig=1"),
            ])],
            CompletionOptions::default(),
        );

        let wire = serde_json::to_value(GoogleRequest::from(&req)).unwrap();
        let parts = &wire["contents"][0]["parts"];
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "iVBORw0");
        assert_eq!(parts[2]["fileData"]["mimeType"], "video/mp4");
    }

    #[test]
    fn function_call_response_is_tool_calls() {
        let response: GoogleResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"functionCall": {"name": "get_weather", "args": {"city": "Paris"}}}
            ]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4, "totalTokenCount": 14}
        }))
        .unwrap();

        let completion = completion_from_google(&response, "gemini-2.0-flash");
        let choice = &completion.choices[0];
        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(calls[0].function.arguments, r#"{"city":"Paris"}"#);
        assert_eq!(completion.usage, Usage::new(10, 4, 14));
    }

    #[test]
    fn inline_image_output_becomes_markdown() {
        let response: GoogleResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"text": "Here:"},
                {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
            ]}, "finishReason": "STOP"}]
        }))
        .unwrap();

        let completion = completion_from_google(&response, "gemini-2.0-flash");
        assert_eq!(
            completion.text(),
            Some("Here:\n![generated_image](data:image/png;base64,AAAA)\n")
        );
    }

    #[test]
    fn safety_stop_is_content_filter() {
        assert_eq!(finish_reason("SAFETY"), Some(FinishReason::ContentFilter));
        assert_eq!(finish_reason("MAX_TOKENS"), Some(FinishReason::Length));
        assert_eq!(finish_reason("FINISH_REASON_UNSPECIFIED"), None);
    }

    #[test]
    fn stream_numbers_tool_calls_across_events() {
        let mut state = GoogleStreamState::new("gemini-2.0-flash");
        let event = |name: &str| -> GoogleResponse {
            serde_json::from_value(json!({
                "responseId": "resp-1",
                "candidates": [{"content": {"parts": [{"functionCall": {"name": name, "args": {}}}]}}]
            }))
            .unwrap()
        };

        let first = state.convert(&event("a"));
        let second = state.convert(&event("b"));
        assert_eq!(first[0].id, "resp-1");
        let index = |frames: &[ChatCompletionChunk]| frames[0].choices[0].delta.tool_calls.as_ref().unwrap()[0].index;
        assert_eq!(index(&first), 0);
        assert_eq!(index(&second), 1);
    }
}
