//! Dify application adapter
//!
//! Dify apps keep conversation history server-side, so only the last user
//! message is sent; callers continue a conversation by passing the
//! `conversation_id` returned on an earlier response.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::dify::{answer_chunk, completion_from_dify, end_chunk, stamp_for, to_dify};
use crate::error::LlmError;
use crate::protocol::dify::DifyResponse;
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest, ResponseStamp, Role};

const NAME: &str = "dify";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.dify.ai/v1";

/// Environment variable holding the app API key
pub const API_KEY_VAR: &str = "DIFY_API_KEY";

const OPTIONS: &[&str] = &[
    "max_tokens",
    "temperature",
    "top_p",
    "n",
    "logprobs",
    "stream",
    "stop",
    "presence_penalty",
    "frequency_penalty",
    "best_of",
    "logit_bias",
    "user_id",
    "conversation_id",
];

/// Dify provider
pub struct DifyProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl DifyProvider {
    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns a 422 if the API key is missing
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            api_key: super::require_api_key(NAME, settings, API_KEY_VAR)?,
            client: super::http_client(NAME, settings)?,
            base_url: super::base_url(NAME, settings, DEFAULT_BASE_URL)?,
        })
    }

    fn request(&self, request: &CompletionRequest) -> Result<RequestBuilder, LlmError> {
        let body = to_dify(request, query(request)?);
        Ok(self
            .client
            .post(super::endpoint(&self.base_url, "chat-messages"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body))
    }
}

/// The question: text of the final message, which must come from the user
fn query(request: &CompletionRequest) -> Result<String, LlmError> {
    match request.messages.last() {
        Some(message) if message.role == Role::User => Ok(message.content.as_text()),
        _ => Err(LlmError::validation(NAME, "Last message role should be user")),
    }
}

fn event_error(event: &DifyResponse) -> LlmError {
    let status = event
        .status
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| (400..600).contains(s))
        .unwrap_or(500);
    let message = event.message.as_deref().unwrap_or("unknown error");
    match &event.code {
        Some(code) => LlmError::upstream(NAME, status, format!("{code}: {message}")),
        None => LlmError::upstream(NAME, status, message),
    }
}

#[async_trait]
impl Provider for DifyProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            options: OPTIONS,
            temperature: STANDARD_TEMPERATURE,
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, LlmError> {
        let response = send(NAME, self.request(request)?).await?;
        let wire_response: DifyResponse = parse_json(NAME, response).await?;
        Ok(completion_from_dify(&wire_response, &request.model))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let response = send(NAME, self.request(request)?).await?;

        let model = request.model.clone();
        let mut stamp: Option<ResponseStamp> = None;
        Ok(sse_stream(NAME, response, move |event| {
            let frame: DifyResponse = decode_frame(NAME, &event.data)?;
            let stamp = stamp.get_or_insert_with(|| stamp_for(&frame, &model));
            if let Some(conversation_id) = &frame.conversation_id {
                stamp.set_conversation(conversation_id.clone());
            }

            match frame.event.as_deref() {
                Some("message" | "agent_message") => Ok(frame
                    .answer
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .map_or_else(Frames::none, |answer| Frames::one(answer_chunk(stamp, answer)))),
                Some("message_end") => Ok(Frames::one(end_chunk(stamp, frame.metadata.as_ref()))),
                Some("error") => Err(event_error(&frame)),
                _ => Ok(Frames::none()),
            }
        }))
    }
}
