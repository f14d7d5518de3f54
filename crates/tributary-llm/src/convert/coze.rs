//! Conversion between canonical types and Coze v2/v3 chat

use crate::protocol::coze::{CozeChat, CozeChatUsage, CozeImage, CozeMessage, CozeV2Response, CozeV2Usage, CozeVerbose};
use crate::stream::CumulativeText;
use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChoiceMessage, Context, DeltaMessage, FinishReason, Message, ResponseStamp,
    StreamingChoice, Usage,
};

/// Fresh end-user id: hex microseconds followed by four random hex digits
pub fn generate_uid() -> String {
    let micros = jiff::Timestamp::now().as_microsecond();
    format!("{micros:x}{:04x}", rand::random::<u16>())
}

/// Text turns in Coze's message shape; system turns are dropped since the
/// bot carries its own persona
pub fn coze_turns(messages: &[Message]) -> Vec<CozeMessage> {
    super::plain_turns(messages)
        .into_iter()
        .filter(|(role, _)| *role != "system")
        .map(|(role, content)| CozeMessage {
            role: role.to_owned(),
            message_type: (role == "assistant").then(|| "answer".to_owned()),
            content,
            content_type: "text".to_owned(),
            ..CozeMessage::default()
        })
        .collect()
}

impl From<&CozeV2Usage> for Usage {
    fn from(usage: &CozeV2Usage) -> Self {
        let derived = Self::from_parts(usage.prompt_tokens, usage.completion_tokens);
        Self {
            total_tokens: usage.total_tokens.or(derived.total_tokens),
            ..derived
        }
    }
}

impl From<&CozeChatUsage> for Usage {
    fn from(usage: &CozeChatUsage) -> Self {
        let derived = Self::from_parts(usage.input_count, usage.output_count);
        Self {
            total_tokens: usage.token_count.or(derived.total_tokens),
            ..derived
        }
    }
}

/// Knowledge recalls from `verbose` messages, numbered from 1
pub fn context_from_messages(messages: &[CozeMessage]) -> Vec<Context> {
    messages
        .iter()
        .filter(|m| m.is_assistant("verbose"))
        .filter_map(|m| serde_json::from_str::<CozeVerbose>(&m.content).ok())
        .filter(|v| v.verbose_type.as_deref() == Some("knowledge"))
        .flat_map(|v| v.chunks)
        .enumerate()
        .map(|(i, chunk)| Context {
            id: (i + 1).to_string(),
            content: chunk.slice,
            score: chunk.score,
        })
        .collect()
}

/// Markdown image links for an image message body
pub fn image_markdown(content: &str) -> Option<String> {
    let images: Vec<CozeImage> = serde_json::from_str(content).ok()?;
    let links: Vec<String> = images
        .iter()
        .filter_map(|image| image.image_ori.as_ref())
        .map(|image| format!("![image]({})", image.url))
        .collect();
    (!links.is_empty()).then(|| links.join("\n"))
}

/// Canonical response from a v2 blocking response
///
/// Returns `None` when the bot produced no answer message.
pub fn completion_from_v2(response: &CozeV2Response, model: &str) -> Option<ChatCompletion> {
    let answer = response.messages.iter().find(|m| m.is_assistant("answer"))?;
    let content = if answer.content_type == "image" {
        image_markdown(&answer.content).unwrap_or_else(|| answer.content.clone())
    } else {
        answer.content.clone()
    };

    let completion = ResponseStamp::new(model)
        .with_id(response.conversation_id.clone())
        .with_conversation(response.conversation_id.clone())
        .single(
            ChoiceMessage::text(content),
            Some(FinishReason::Stop),
            response.usage.as_ref().map(Usage::from).unwrap_or_default(),
        )
        .with_context(context_from_messages(&response.messages));
    Some(completion)
}

/// Translates v3 stream events into canonical frames for one call
#[derive(Debug)]
pub struct CozeStreamState {
    model: String,
    stamp: Option<ResponseStamp>,
    message_id: Option<String>,
    answer: CumulativeText,
}

impl CozeStreamState {
    /// State for a stream of `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stamp: None,
            message_id: None,
            answer: CumulativeText::default(),
        }
    }

    fn stamp(&mut self, chat_id: Option<&String>, conversation_id: Option<&String>) -> &ResponseStamp {
        let stamp = self
            .stamp
            .get_or_insert_with(|| ResponseStamp::new(self.model.clone()).with_id(chat_id.cloned()));
        if let Some(conversation_id) = conversation_id {
            stamp.set_conversation(conversation_id.clone());
        }
        stamp
    }

    fn content_chunk(&mut self, message: &CozeMessage, text: String) -> ChatCompletionChunk {
        self.stamp(message.chat_id.as_ref(), message.conversation_id.as_ref())
            .chunk(vec![StreamingChoice::new(0, DeltaMessage::content(text))])
    }

    /// `conversation.chat.created` / `conversation.chat.in_progress`
    pub fn chat_started(&mut self, chat: &CozeChat) {
        self.stamp(chat.id.as_ref(), chat.conversation_id.as_ref());
    }

    /// `conversation.message.delta`
    pub fn message_delta(&mut self, message: &CozeMessage) -> Vec<ChatCompletionChunk> {
        if !message.is_assistant("answer") || message.content.is_empty() {
            return Vec::new();
        }
        if message.id.is_some() && message.id != self.message_id {
            self.message_id.clone_from(&message.id);
            self.answer = CumulativeText::default();
        }
        self.answer.push(&message.content);
        vec![self.content_chunk(message, message.content.clone())]
    }

    /// `conversation.message.completed`
    ///
    /// Answer text repeats everything streamed so far, so only the unseen
    /// tail is emitted. Image answers arrive only here.
    pub fn message_completed(&mut self, message: &CozeMessage) -> Vec<ChatCompletionChunk> {
        if message.is_assistant("verbose") {
            let context = context_from_messages(std::slice::from_ref(message));
            if context.is_empty() {
                return Vec::new();
            }
            let stamp = self.stamp(message.chat_id.as_ref(), message.conversation_id.as_ref());
            return vec![stamp.chunk(Vec::new()).with_context(context)];
        }
        if !message.is_assistant("answer") {
            return Vec::new();
        }

        let text = if message.content_type == "image" {
            image_markdown(&message.content)
        } else {
            if message.id != self.message_id {
                self.message_id.clone_from(&message.id);
                self.answer = CumulativeText::default();
            }
            self.answer.suffix(&message.content)
        };
        text.map(|text| vec![self.content_chunk(message, text)]).unwrap_or_default()
    }

    /// `conversation.chat.completed`
    pub fn chat_completed(&mut self, chat: &CozeChat) -> Vec<ChatCompletionChunk> {
        let usage = chat.usage.as_ref().map(Usage::from).unwrap_or_default();
        let stamp = self.stamp(chat.id.as_ref(), chat.conversation_id.as_ref());
        vec![
            stamp
                .chunk(vec![StreamingChoice::finished(0, FinishReason::Stop)])
                .with_usage(usage),
        ]
    }
}
