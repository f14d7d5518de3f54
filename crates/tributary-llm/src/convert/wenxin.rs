//! Conversion between canonical types and the Qianfan chat format

use crate::protocol::wenxin::{WenxinMessage, WenxinRequest, WenxinResponse, WenxinUsage};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChoiceMessage, CompletionRequest, DeltaMessage, FinishReason, ResponseStamp,
    Role, StreamingChoice, Usage,
};

impl From<&CompletionRequest> for WenxinRequest {
    fn from(req: &CompletionRequest) -> Self {
        let mut system = Vec::new();
        let mut messages = Vec::new();

        for (role, text) in super::plain_turns(&req.messages) {
            if role == "system" {
                system.push(text);
            } else {
                messages.push(WenxinMessage {
                    role: role.to_owned(),
                    content: text,
                });
            }
        }

        let options = &req.options;
        Self {
            messages,
            system: Some(system.join("\n")).filter(|s| !s.is_empty()),
            temperature: options.temperature,
            top_p: options.top_p,
            max_output_tokens: options.max_tokens,
            stop: options.stop.clone(),
            user_id: options.user_id.clone(),
            stream: options.stream.then_some(true),
        }
    }
}

impl From<&WenxinUsage> for Usage {
    fn from(usage: &WenxinUsage) -> Self {
        let derived = Self::from_parts(usage.prompt_tokens, usage.completion_tokens);
        Self {
            total_tokens: usage.total_tokens.or(derived.total_tokens),
            ..derived
        }
    }
}

fn finish_reason(response: &WenxinResponse) -> Option<FinishReason> {
    response
        .finish_reason
        .as_deref()
        .and_then(FinishReason::parse)
        .or_else(|| response.is_end.filter(|end| *end).map(|_| FinishReason::Stop))
}

/// Canonical response from a blocking chat response
pub fn completion_from_wenxin(response: &WenxinResponse, model: &str) -> ChatCompletion {
    ResponseStamp::new(model)
        .with_id(response.id.clone())
        .with_created(response.created)
        .single(
            ChoiceMessage::text(response.result.clone().unwrap_or_default()),
            finish_reason(response).or(Some(FinishReason::Stop)),
            response.usage.as_ref().map(Usage::from).unwrap_or_default(),
        )
}

/// Canonical frame for one stream frame
pub fn chunk_from_wenxin(stamp: &ResponseStamp, frame: &WenxinResponse, first: bool) -> ChatCompletionChunk {
    let delta = DeltaMessage {
        role: first.then_some(Role::Assistant),
        content: frame.result.clone().filter(|r| !r.is_empty()),
        ..DeltaMessage::default()
    };
    stamp
        .chunk(vec![StreamingChoice::new(0, delta).with_finish_reason(finish_reason(frame))])
        .with_usage(frame.usage.as_ref().map(Usage::from).unwrap_or_default())
}
