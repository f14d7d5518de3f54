//! `FastGPT` knowledge-base adapter
//!
//! Requests always ask for `detail`, so blocking responses carry
//! `responseData` and streams interleave `flowResponses` events with the
//! answer. Knowledge-base quotes surface as [`Context`](crate::types::Context).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::fastgpt::{context_from_modules, to_fastgpt};
use crate::convert::openai::{OpenAiStreamState, completion_from_openai};
use crate::error::LlmError;
use crate::protocol::fastgpt::{FastGptModule, FastGptResponse};
use crate::protocol::openai::{OpenAiRequest, OpenAiStreamChunk};
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest};

const NAME: &str = "fastgpt";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.fastgpt.in/api/v1";

/// Environment variable holding the app API key
pub const API_KEY_VAR: &str = "FASTGPT_API_KEY";

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
    "conversation_id",
];

/// `FastGPT` provider
pub struct FastGptProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl FastGptProvider {
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

    fn request(&self, body: &OpenAiRequest) -> RequestBuilder {
        self.client
            .post(super::endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
    }
}

#[async_trait]
impl Provider for FastGptProvider {
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
        let mut body = to_fastgpt(request);
        body.stream = None;

        let response = send(NAME, self.request(&body)).await?;
        let wire_response: FastGptResponse = parse_json(NAME, response).await?;

        if let Some(error) = &wire_response.completion.error {
            return Err(LlmError::internal(NAME, error.message.clone()));
        }
        if wire_response.completion.choices.is_empty() {
            return Err(LlmError::internal(NAME, "response contained no choices"));
        }

        Ok(completion_from_openai(&wire_response.completion, &request.model)
            .with_context(context_from_modules(&wire_response.response_data)))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let mut body = to_fastgpt(request);
        body.stream = Some(true);

        let response = send(NAME, self.request(&body)).await?;

        let mut state = OpenAiStreamState::new(request.model.clone());
        Ok(sse_stream(NAME, response, move |event| match event.event.as_str() {
            "" | "message" | "answer" | "fastAnswer" => {
                let chunk: OpenAiStreamChunk = decode_frame(NAME, &event.data)?;
                if let Some(error) = &chunk.error {
                    return Err(LlmError::internal(NAME, error.message.clone()));
                }
                Ok(Frames::Emit(state.convert(&chunk)))
            }
            "flowResponses" => {
                let modules: Vec<FastGptModule> = decode_frame(NAME, &event.data)?;
                let context = context_from_modules(&modules);
                if context.is_empty() {
                    return Ok(Frames::none());
                }
                Ok(Frames::one(state.context_chunk(context)))
            }
            "error" => Err(LlmError::internal(
                NAME,
                super::error_detail(&event.data).unwrap_or_else(|| event.data.clone()),
            )),
            _ => Ok(Frames::none()),
        }))
    }
}
