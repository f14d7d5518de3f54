//! Conversion between canonical types and the Tiangong generate format

use serde_json::Value;

use crate::protocol::tiangong::{TiangongData, TiangongMessage, TiangongRequest, TiangongUsage};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChoiceMessage, CompletionRequest, DeltaMessage, FinishReason, ResponseStamp,
    Role, StreamingChoice, Usage,
};

impl From<&CompletionRequest> for TiangongRequest {
    fn from(req: &CompletionRequest) -> Self {
        let options = &req.options;
        Self {
            model: req.model.clone(),
            messages: super::plain_turns(&req.messages)
                .into_iter()
                .map(|(role, content)| TiangongMessage {
                    role: role.to_owned(),
                    content,
                })
                .collect(),
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.extra_u64("top_k"),
            max_tokens: options.max_tokens,
        }
    }
}

impl From<&TiangongUsage> for Usage {
    fn from(usage: &TiangongUsage) -> Self {
        let derived = Self::from_parts(usage.prompt_tokens, usage.completion_tokens);
        Self {
            total_tokens: usage.total_tokens.or(derived.total_tokens),
            ..derived
        }
    }
}

/// Finish reason of a payload; any non-null marker without a known
/// spelling means a normal stop
fn finish_reason(data: &TiangongData) -> Option<FinishReason> {
    match data.finish_reason.as_ref()? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(FinishReason::parse(s).unwrap_or(FinishReason::Stop)),
        _ => Some(FinishReason::Stop),
    }
}

/// Canonical response from a blocking response payload
pub fn completion_from_tiangong(stamp: &ResponseStamp, data: &TiangongData) -> ChatCompletion {
    stamp.single(
        ChoiceMessage::text(data.reply.clone().unwrap_or_default()),
        finish_reason(data).or(Some(FinishReason::Stop)),
        data.usage.as_ref().map(Usage::from).unwrap_or_default(),
    )
}

/// Canonical frame for one NDJSON line
pub fn chunk_from_tiangong(stamp: &ResponseStamp, data: &TiangongData, first: bool) -> ChatCompletionChunk {
    let delta = DeltaMessage {
        role: first.then_some(Role::Assistant),
        content: data.reply.clone().filter(|r| !r.is_empty()),
        ..DeltaMessage::default()
    };
    stamp
        .chunk(vec![StreamingChoice::new(0, delta).with_finish_reason(finish_reason(data))])
        .with_usage(data.usage.as_ref().map(Usage::from).unwrap_or_default())
}
