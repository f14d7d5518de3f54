//! Conversion between canonical types and Spark frames

use crate::protocol::spark::{
    SparkChatParameter, SparkMessage, SparkMessages, SparkParameter, SparkRequest, SparkRequestHeader,
    SparkRequestPayload, SparkResponse, SparkTokenUsage,
};
use crate::types::{
    ChatCompletionChunk, CompletionRequest, DeltaMessage, FinishReason, ResponseStamp, Role, StreamingChoice, Usage,
};

const DEFAULT_TEMPERATURE: f64 = 0.5;
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Request frame for `app_id`
pub fn to_spark(request: &CompletionRequest, app_id: &str) -> SparkRequest {
    let options = &request.options;
    SparkRequest {
        header: SparkRequestHeader {
            app_id: app_id.to_owned(),
            uid: options.user_id.clone(),
        },
        parameter: SparkParameter {
            chat: SparkChatParameter {
                domain: request.model.clone(),
                temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                top_k: options.extra_u64("top_k"),
            },
        },
        payload: SparkRequestPayload {
            message: SparkMessages {
                text: super::plain_turns(&request.messages)
                    .into_iter()
                    .map(|(role, content)| SparkMessage {
                        role: role.to_owned(),
                        content,
                    })
                    .collect(),
            },
        },
    }
}

impl From<&SparkTokenUsage> for Usage {
    fn from(usage: &SparkTokenUsage) -> Self {
        let derived = Self::from_parts(usage.prompt_tokens, usage.completion_tokens);
        Self {
            total_tokens: usage.total_tokens.or(derived.total_tokens),
            ..derived
        }
    }
}

/// Canonical frame for one successful server frame
pub fn chunk_from_spark(stamp: &ResponseStamp, frame: &SparkResponse, first: bool) -> ChatCompletionChunk {
    let payload = frame.payload.clone().unwrap_or_default();
    let content: String = payload
        .choices
        .iter()
        .flat_map(|choices| choices.text.iter())
        .map(|fragment| fragment.content.as_str())
        .collect();

    let delta = DeltaMessage {
        role: first.then_some(Role::Assistant),
        content: Some(content).filter(|c| !c.is_empty()),
        ..DeltaMessage::default()
    };
    let finish_reason = frame.header.is_last().then_some(FinishReason::Stop);

    stamp
        .chunk(vec![StreamingChoice::new(0, delta).with_finish_reason(finish_reason)])
        .with_usage(payload.usage.as_ref().map(|u| Usage::from(&u.text)).unwrap_or_default())
}
