//! Conversion from MiniMax responses to canonical types

use std::collections::BTreeMap;

use super::openai::{choice_from_wire, tool_call_delta_from_wire, tool_calls_from_wire};
use crate::protocol::minimax::{MiniMaxResponse, MiniMaxStreamChunk};
use crate::stream::CumulativeText;
use crate::types::{
    ChatCompletion, ChatCompletionChunk, DeltaMessage, FinishReason, ResponseStamp, Role, StreamingChoice, Usage,
};

/// Canonical response from a blocking MiniMax response
pub fn completion_from_minimax(response: &MiniMaxResponse, model: &str) -> ChatCompletion {
    ResponseStamp::new(model)
        .with_id(response.id.clone())
        .with_created(response.created)
        .completion(
            response.choices.iter().map(choice_from_wire).collect(),
            response.usage.as_ref().map(Usage::from).unwrap_or_default(),
        )
}

#[derive(Debug, Default)]
struct ChoiceTrack {
    content: CumulativeText,
    reasoning: CumulativeText,
    streamed_tool_calls: bool,
}

/// Translates MiniMax stream frames for one call
///
/// Intermediate frames carry increments; the final frame repeats the whole
/// message, of which only the unseen tail is emitted.
#[derive(Debug)]
pub struct MiniMaxStreamState {
    model: String,
    stamp: Option<ResponseStamp>,
    choices: BTreeMap<u32, ChoiceTrack>,
}

impl MiniMaxStreamState {
    /// State for a stream of `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stamp: None,
            choices: BTreeMap::new(),
        }
    }

    /// Canonical frames for one wire frame
    pub fn convert(&mut self, chunk: &MiniMaxStreamChunk) -> Vec<ChatCompletionChunk> {
        let mut choices = Vec::new();

        for choice in &chunk.choices {
            let track = self.choices.entry(choice.index).or_default();

            let delta = if let Some(delta) = &choice.delta {
                if let Some(content) = &delta.content {
                    track.content.push(content);
                }
                if let Some(reasoning) = &delta.reasoning_content {
                    track.reasoning.push(reasoning);
                }
                let tool_calls = delta
                    .tool_calls
                    .as_deref()
                    .filter(|calls| !calls.is_empty())
                    .map(|calls| calls.iter().map(tool_call_delta_from_wire).collect::<Vec<_>>());
                track.streamed_tool_calls |= tool_calls.is_some();

                DeltaMessage {
                    role: delta.role.as_ref().map(|_| Role::Assistant),
                    content: delta.content.clone(),
                    reasoning_content: delta.reasoning_content.clone(),
                    tool_calls,
                }
            } else if let Some(message) = &choice.message {
                let tool_calls = message
                    .tool_calls
                    .as_deref()
                    .filter(|calls| !calls.is_empty() && !track.streamed_tool_calls)
                    .map(|calls| {
                        tool_calls_from_wire(calls)
                            .iter()
                            .zip(0_u32..)
                            .map(|(call, i)| super::whole_tool_call(i, call))
                            .collect()
                    });

                DeltaMessage {
                    role: None,
                    content: message.content.as_deref().and_then(|c| track.content.suffix(c)),
                    reasoning_content: message
                        .reasoning_content
                        .as_deref()
                        .and_then(|r| track.reasoning.suffix(r)),
                    tool_calls,
                }
            } else {
                DeltaMessage::default()
            };

            let finish_reason = choice.finish_reason.as_deref().and_then(FinishReason::parse);
            if delta.is_empty() && finish_reason.is_none() {
                continue;
            }
            choices.push(StreamingChoice {
                index: choice.index,
                delta,
                finish_reason,
            });
        }

        let usage = chunk.usage.as_ref().map(Usage::from).unwrap_or_default();
        if choices.is_empty() && !usage.is_reported() {
            return Vec::new();
        }

        let stamp = self.stamp.get_or_insert_with(|| {
            ResponseStamp::new(self.model.clone())
                .with_id(chunk.id.clone())
                .with_created(chunk.created)
        });
        vec![stamp.chunk(choices).with_usage(usage)]
    }
}
