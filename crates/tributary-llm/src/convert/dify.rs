//! Conversion between canonical types and Dify chat-messages

use serde_json::Map;

use crate::protocol::dify::{DifyMetadata, DifyRequest, DifyResponse, DifyUsage};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChoiceMessage, CompletionRequest, Context, DeltaMessage, FinishReason,
    ResponseStamp, StreamingChoice, Usage,
};

/// End user reported when the caller supplies none
pub const DEFAULT_USER: &str = "guest-user";

/// Request carrying `query` as the question
pub fn to_dify(request: &CompletionRequest, query: String) -> DifyRequest {
    let options = &request.options;
    DifyRequest {
        query,
        inputs: Map::new(),
        response_mode: if options.stream { "streaming" } else { "blocking" }.to_owned(),
        user: options.user_id.clone().unwrap_or_else(|| DEFAULT_USER.to_owned()),
        conversation_id: options.conversation_id.clone().unwrap_or_default(),
    }
}

impl From<&DifyUsage> for Usage {
    fn from(usage: &DifyUsage) -> Self {
        let derived = Self::from_parts(usage.prompt_tokens, usage.completion_tokens);
        Self {
            total_tokens: usage.total_tokens.or(derived.total_tokens),
            ..derived
        }
    }
}

fn usage(metadata: Option<&DifyMetadata>) -> Usage {
    metadata
        .and_then(|m| m.usage.as_ref())
        .map(Usage::from)
        .unwrap_or_default()
}

/// Retrieved snippets as canonical context, in rank order
pub fn context(metadata: Option<&DifyMetadata>) -> Vec<Context> {
    metadata
        .and_then(|m| m.retriever_resources.as_ref())
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(i, resource)| Context {
            id: resource
                .position
                .map_or_else(|| (i + 1).to_string(), |p| p.to_string()),
            content: resource.content.clone(),
            score: resource.score,
        })
        .collect()
}

/// Identity for a response: vendor message id and conversation
pub fn stamp_for(response: &DifyResponse, model: &str) -> ResponseStamp {
    ResponseStamp::new(model)
        .with_id(response.message_id.clone().or_else(|| response.id.clone()))
        .with_created(response.created_at)
        .with_conversation(response.conversation_id.clone())
}

/// Canonical response from a blocking response
pub fn completion_from_dify(response: &DifyResponse, model: &str) -> ChatCompletion {
    let metadata = response.metadata.as_ref();
    stamp_for(response, model)
        .single(
            ChoiceMessage::text(response.answer.clone().unwrap_or_default()),
            Some(FinishReason::Stop),
            usage(metadata),
        )
        .with_context(context(metadata))
}

/// Text increment frame for a `message` event
pub fn answer_chunk(stamp: &ResponseStamp, answer: &str) -> ChatCompletionChunk {
    stamp.chunk(vec![StreamingChoice::new(0, DeltaMessage::content(answer))])
}

/// Closing frame for a `message_end` event
pub fn end_chunk(stamp: &ResponseStamp, metadata: Option<&DifyMetadata>) -> ChatCompletionChunk {
    stamp
        .chunk(vec![StreamingChoice::finished(0, FinishReason::Stop)])
        .with_usage(usage(metadata))
        .with_context(context(metadata))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{CompletionOptions, Message};

    #[test]
    fn request_defaults_user_and_conversation() {
        let request = CompletionRequest {
            model: "app".to_owned(),
            messages: vec![Message::user("What is Dify?")],
            options: CompletionOptions::default(),
        };

        let value = serde_json::to_value(to_dify(&request, "What is Dify?".to_owned())).unwrap();
        assert_eq!(
            value,
            json!({
                "query": "What is Dify?",
                "inputs": {},
                "response_mode": "blocking",
                "user": "guest-user",
                "conversation_id": ""
            })
        );
    }

    #[test]
    fn blocking_response_carries_context_and_conversation() {
        let response: DifyResponse = serde_json::from_value(json!({
            "event": "message",
            "message_id": "msg-1",
            "conversation_id": "conv-1",
            "answer": "Dify is an LLM app platform.",
            "created_at": 1_705_407_629,
            "metadata": {
                "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18},
                "retriever_resources": [
                    {"position": 1, "segment_id": "seg-1", "score": 0.98, "content": "Dify overview"},
                    {"position": 2, "score": 0.5, "content": "Install guide"}
                ]
            }
        }))
        .unwrap();

        let completion = completion_from_dify(&response, "app");
        assert_eq!(completion.id, "msg-1");
        assert_eq!(completion.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(completion.usage.total_tokens, Some(18));
        assert_eq!(completion.context.len(), 2);
        assert_eq!(completion.context[0].id, "1");
        assert_eq!(completion.context[1].content, "Install guide");
        assert!(completion.context[1].score.is_some_and(|s| (s - 0.5).abs() < f64::EPSILON));
    }

    #[test]
    fn missing_metadata_means_empty_context() {
        assert!(context(None).is_empty());
        let metadata = DifyMetadata::default();
        assert!(context(Some(&metadata)).is_empty());
    }
}
