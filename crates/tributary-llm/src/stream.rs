//! Stream framing, accumulation, and the blocking/streaming call result

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use eventsource_stream::{Event, Eventsource};
use futures_util::future::ready;
use futures_util::{Stream, StreamExt};

use crate::error::LlmError;
use crate::types::{
    ChatCompletion, ChatCompletionChunk, Choice, ChoiceMessage, Context, FinishReason, ResponseStamp, Role, ToolCall,
    Usage,
};

/// Lazy, single-pass, finite sequence of stream frames
///
/// Dropping the stream drops the underlying connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, LlmError>> + Send>>;

/// Result of one frame translation
pub(crate) enum Frames {
    /// Zero or more canonical frames to emit
    Emit(Vec<ChatCompletionChunk>),
    /// The vendor signalled the end of the stream
    Done,
}

impl Frames {
    pub(crate) fn one(chunk: ChatCompletionChunk) -> Self {
        Self::Emit(vec![chunk])
    }

    pub(crate) const fn none() -> Self {
        Self::Emit(Vec::new())
    }
}

/// Error for a frame that could not be decoded; aborts the stream
pub(crate) fn malformed_frame(provider: &str, error: impl fmt::Display) -> LlmError {
    tracing::debug!(provider = %provider, error = %error, "malformed stream frame");
    LlmError::internal(provider, format!("malformed stream frame: {error}"))
}

/// Canonical stream over a Server-Sent-Events response
///
/// A `[DONE]` data payload ends the stream. The first error (transport or
/// translation) is yielded and ends the stream.
pub(crate) fn sse_stream<F>(provider: impl Into<String>, response: reqwest::Response, mut translate: F) -> ChunkStream
where
    F: FnMut(&Event) -> Result<Frames, LlmError> + Send + 'static,
{
    let provider = provider.into();

    let frames = response
        .bytes_stream()
        .eventsource()
        .scan(false, move |finished, event| {
            if *finished {
                return ready(None);
            }

            let items = match event {
                Err(e) => {
                    *finished = true;
                    vec![Err(LlmError::internal(&provider, format!("stream read failed: {e}")))]
                }
                Ok(event) if event.data.trim() == "[DONE]" => return ready(None),
                Ok(event) => match translate(&event) {
                    Ok(Frames::Emit(chunks)) => chunks.into_iter().map(Ok).collect(),
                    Ok(Frames::Done) => return ready(None),
                    Err(e) => {
                        *finished = true;
                        vec![Err(e)]
                    }
                },
            };

            ready(Some(futures_util::stream::iter(items)))
        })
        .flatten();

    Box::pin(frames)
}

/// Canonical stream over a newline-delimited response body
///
/// Blank lines are skipped; a trailing line without a newline is still
/// translated when the body ends.
pub(crate) fn line_stream<F>(provider: impl Into<String>, response: reqwest::Response, mut translate: F) -> ChunkStream
where
    F: FnMut(&str) -> Result<Frames, LlmError> + Send + 'static,
{
    let provider = provider.into();

    let frames = response
        .bytes_stream()
        .map(Some)
        .chain(futures_util::stream::once(ready(None)))
        .scan((Vec::<u8>::new(), false), move |(buffer, finished), item| {
            if *finished {
                return ready(None);
            }

            let mut items = Vec::new();
            let lines = match item {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    drain_lines(buffer)
                }
                Some(Err(e)) => {
                    *finished = true;
                    items.push(Err(LlmError::internal(&provider, format!("stream read failed: {e}"))));
                    Vec::new()
                }
                None => {
                    *finished = true;
                    vec![std::mem::take(buffer)]
                }
            };

            for line in lines {
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match translate(line) {
                    Ok(Frames::Emit(chunks)) => items.extend(chunks.into_iter().map(Ok)),
                    Ok(Frames::Done) => {
                        *finished = true;
                        break;
                    }
                    Err(e) => {
                        *finished = true;
                        items.push(Err(e));
                        break;
                    }
                }
            }

            ready(Some(futures_util::stream::iter(items)))
        })
        .flatten();

    Box::pin(frames)
}

/// Split complete lines off the front of `buffer`
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        line.pop();
        lines.push(line);
    }
    lines
}

/// Emits only the unseen tail of vendors' cumulative snapshots
///
/// Some vendors stream true increments and then repeat the whole message on
/// their final frame. Feed increments through [`CumulativeText::push`] and
/// the snapshot through [`CumulativeText::suffix`].
#[derive(Debug, Clone, Default)]
pub struct CumulativeText {
    emitted: String,
}

impl CumulativeText {
    /// Record an incremental fragment that was emitted as-is
    pub fn push(&mut self, fragment: &str) {
        self.emitted.push_str(fragment);
    }

    /// Portion of `snapshot` not yet emitted
    ///
    /// Returns `None` when nothing is new, or when the snapshot does not
    /// extend what was already emitted.
    pub fn suffix(&mut self, snapshot: &str) -> Option<String> {
        let tail = snapshot
            .strip_prefix(self.emitted.as_str())
            .filter(|tail| !tail.is_empty())
            .map(str::to_owned);
        snapshot.clone_into(&mut self.emitted);
        tail
    }

    /// Everything emitted so far
    pub fn as_str(&self) -> &str {
        &self.emitted
    }
}

#[derive(Debug, Default)]
struct ToolCallState {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Default)]
struct ChoiceState {
    content: String,
    reasoning: String,
    tool_calls: BTreeMap<u32, ToolCallState>,
    finish_reason: Option<FinishReason>,
}

/// Folds stream frames into one terminal response
///
/// Tool-call fragments are keyed by `(choice index, tool index)`; argument
/// fragments are concatenated in arrival order since partial JSON cannot be
/// merged by content.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    id: Option<String>,
    created: Option<i64>,
    model: String,
    conversation_id: Option<String>,
    choices: BTreeMap<u32, ChoiceState>,
    usage: Usage,
    context: Vec<Context>,
}

impl StreamAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one frame
    pub fn push(&mut self, chunk: &ChatCompletionChunk) {
        if self.id.is_none() {
            self.id = Some(chunk.id.clone());
            self.created = Some(chunk.created);
        }
        if self.model.is_empty() {
            self.model.clone_from(&chunk.model);
        }
        if chunk.conversation_id.is_some() {
            self.conversation_id.clone_from(&chunk.conversation_id);
        }

        // Vendors report running totals; the latest reported figure wins.
        let mut latest = chunk.usage;
        latest.merge(&self.usage);
        self.usage = latest;
        self.context.extend(chunk.context.iter().cloned());

        for choice in &chunk.choices {
            let state = self.choices.entry(choice.index).or_default();
            if let Some(content) = &choice.delta.content {
                state.content.push_str(content);
            }
            if let Some(reasoning) = &choice.delta.reasoning_content {
                state.reasoning.push_str(reasoning);
            }
            for fragment in choice.delta.tool_calls.iter().flatten() {
                let call = state.tool_calls.entry(fragment.index).or_default();
                if call.id.is_none() {
                    call.id.clone_from(&fragment.id);
                }
                if let Some(function) = &fragment.function {
                    if call.name.is_none() {
                        call.name.clone_from(&function.name);
                    }
                    if let Some(arguments) = &function.arguments {
                        call.arguments.push_str(arguments);
                    }
                }
            }
            if choice.finish_reason.is_some() {
                state.finish_reason = choice.finish_reason;
            }
        }
    }

    /// Terminal response built from everything absorbed
    ///
    /// Always carries at least one choice.
    pub fn finish(mut self) -> ChatCompletion {
        if self.choices.is_empty() {
            self.choices.insert(0, ChoiceState::default());
        }

        let choices = self
            .choices
            .into_iter()
            .map(|(index, state)| {
                let tool_calls: Vec<ToolCall> = state
                    .tool_calls
                    .into_iter()
                    .map(|(i, call)| {
                        ToolCall::function(
                            call.id.unwrap_or_else(|| format!("call_{i}")),
                            call.name.unwrap_or_default(),
                            call.arguments,
                        )
                    })
                    .collect();

                let content = if state.content.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(state.content)
                };

                Choice {
                    index,
                    message: ChoiceMessage {
                        role: Role::Assistant,
                        content,
                        reasoning_content: Some(state.reasoning).filter(|r| !r.is_empty()),
                        tool_calls: Some(tool_calls).filter(|t| !t.is_empty()),
                    },
                    finish_reason: state.finish_reason,
                }
            })
            .collect();

        ResponseStamp::new(self.model)
            .with_id(self.id)
            .with_created(self.created)
            .with_conversation(self.conversation_id)
            .completion(choices, self.usage)
            .with_context(self.context)
    }
}

/// Result of one completion call
///
/// The `stream` option selects the variant; callers that only want the
/// final answer can [`collect`](Completion::collect) either one.
pub enum Completion {
    /// Blocking response
    Response(ChatCompletion),
    /// Lazy frame stream
    Stream(ChunkStream),
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl Completion {
    /// Terminal response, draining the stream if necessary
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by the stream
    pub async fn collect(self) -> Result<ChatCompletion, LlmError> {
        match self {
            Self::Response(response) => Ok(response),
            Self::Stream(mut stream) => {
                let mut accumulator = StreamAccumulator::new();
                while let Some(chunk) = stream.next().await {
                    accumulator.push(&chunk?);
                }
                Ok(accumulator.finish())
            }
        }
    }

    /// Blocking response, if this was not a streaming call
    pub fn into_response(self) -> Option<ChatCompletion> {
        match self {
            Self::Response(response) => Some(response),
            Self::Stream(_) => None,
        }
    }

    /// Frame stream, if this was a streaming call
    pub fn into_stream(self) -> Option<ChunkStream> {
        match self {
            Self::Response(_) => None,
            Self::Stream(stream) => Some(stream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeltaMessage, StreamingChoice, ToolCallDelta};

    fn stream_of(chunks: Vec<Result<ChatCompletionChunk, LlmError>>) -> ChunkStream {
        Box::pin(futures_util::stream::iter(chunks))
    }

    #[test]
    fn tool_call_fragments_reassemble_into_valid_json() {
        let stamp = ResponseStamp::new("model-x");
        let mut acc = StreamAccumulator::new();

        acc.push(&stamp.chunk(vec![StreamingChoice::new(
            0,
            DeltaMessage::tool_calls(vec![ToolCallDelta::start(0, "call_1", "get_weather")]),
        )]));
        acc.push(&stamp.chunk(vec![StreamingChoice::new(
            0,
            DeltaMessage::tool_calls(vec![ToolCallDelta::arguments(0, "{\"city\": ")]),
        )]));
        acc.push(&stamp.chunk(vec![
            StreamingChoice::new(0, DeltaMessage::tool_calls(vec![ToolCallDelta::arguments(0, "\"Paris\"}")]))
                .with_finish_reason(Some(FinishReason::ToolCalls)),
        ]));

        let response = acc.finish();
        let calls = response.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "get_weather");
        let args: serde_json::Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args, serde_json::json!({"city": "Paris"}));
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.choices[0].message.content, None);
    }

    #[test]
    fn interleaved_tool_calls_stay_separate() {
        let stamp = ResponseStamp::new("m");
        let mut acc = StreamAccumulator::new();
        acc.push(&stamp.chunk(vec![StreamingChoice::new(
            0,
            DeltaMessage::tool_calls(vec![ToolCallDelta::start(0, "a", "f"), ToolCallDelta::start(1, "b", "g")]),
        )]));
        acc.push(&stamp.chunk(vec![StreamingChoice::new(
            0,
            DeltaMessage::tool_calls(vec![ToolCallDelta::arguments(1, "{}"), ToolCallDelta::arguments(0, "[]")]),
        )]));

        let response = acc.finish();
        let calls = response.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, "[]");
        assert_eq!(calls[1].function.arguments, "{}");
    }

    #[test]
    fn content_usage_and_identity_are_carried() {
        let stamp = ResponseStamp::new("model-x").with_id(Some("vendor-7"));
        let mut acc = StreamAccumulator::new();
        acc.push(&stamp.chunk(vec![StreamingChoice::new(0, DeltaMessage::content("Hel"))]));
        acc.push(&stamp.chunk(vec![StreamingChoice::new(0, DeltaMessage::content("lo"))]));
        acc.push(&stamp.chunk(vec![StreamingChoice::finished(0, FinishReason::Stop)]));
        acc.push(&stamp.usage_chunk(Usage::new(3, 2, 5)));

        let response = acc.finish();
        assert_eq!(response.id, "vendor-7");
        assert_eq!(response.model, "model-x");
        assert_eq!(response.text(), Some("Hello"));
        assert_eq!(response.usage, Usage::new(3, 2, 5));
        assert_eq!(response.object(), "chat.completion");
    }

    #[test]
    fn latest_usage_wins_and_missing_fields_are_kept() {
        let stamp = ResponseStamp::new("model-x");
        let mut acc = StreamAccumulator::new();
        acc.push(&stamp.usage_chunk(Usage::new(4, 1, 5)));
        acc.push(&stamp.usage_chunk(Usage {
            completion_tokens: Some(6),
            ..Usage::default()
        }));

        let response = acc.finish();
        assert_eq!(response.usage.prompt_tokens, Some(4));
        assert_eq!(response.usage.completion_tokens, Some(6));
        assert_eq!(response.usage.total_tokens, Some(5));
    }

    #[test]
    fn empty_stream_still_yields_one_choice() {
        let response = StreamAccumulator::new().finish();
        assert_eq!(response.choices.len(), 1);
        assert!(!response.usage.is_reported());
    }

    #[test]
    fn cumulative_snapshot_yields_only_new_suffix() {
        let mut text = CumulativeText::default();
        text.push("Hello, ");
        text.push("wor");
        assert_eq!(text.suffix("Hello, world!").as_deref(), Some("ld!"));
        assert_eq!(text.suffix("Hello, world!"), None);
        assert_eq!(text.as_str(), "Hello, world!");
    }

    #[test]
    fn cumulative_snapshot_without_prior_deltas_is_whole() {
        let mut text = CumulativeText::default();
        assert_eq!(text.suffix("all at once").as_deref(), Some("all at once"));
    }

    #[test]
    fn diverging_snapshot_emits_nothing() {
        let mut text = CumulativeText::default();
        text.push("abc");
        assert_eq!(text.suffix("xyz"), None);
    }

    #[test]
    fn drain_lines_keeps_partial_tail() {
        let mut buffer = b"one\ntwo\nthr".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(buffer, b"thr".to_vec());
    }

    #[tokio::test]
    async fn collect_drains_stream() {
        let stamp = ResponseStamp::new("m");
        let stream = stream_of(vec![
            Ok(stamp.chunk(vec![StreamingChoice::new(0, DeltaMessage::content("a"))])),
            Ok(stamp.chunk(vec![StreamingChoice::new(0, DeltaMessage::content("b"))])),
        ]);

        let response = Completion::Stream(stream).collect().await.unwrap();
        assert_eq!(response.text(), Some("ab"));
    }

    #[tokio::test]
    async fn collect_surfaces_stream_error() {
        let stamp = ResponseStamp::new("m");
        let stream = stream_of(vec![
            Ok(stamp.chunk(vec![StreamingChoice::new(0, DeltaMessage::content("a"))])),
            Err(malformed_frame("minimax", "expected value at line 1")),
        ]);

        let err = Completion::Stream(stream).collect().await.unwrap_err();
        assert!(err.client_message().starts_with("malformed stream frame:"));
    }
}
