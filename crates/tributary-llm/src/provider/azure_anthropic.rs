//! Anthropic Claude models served from an Azure AI Foundry endpoint

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::anthropic::{AnthropicStreamState, completion_from_anthropic};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest};

const NAME: &str = "azure_anthropic";

/// API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "AZURE_ANTHROPIC_API_KEY";

/// Environment variable holding the endpoint, e.g.
/// `https://<resource>.services.ai.azure.com/anthropic`
pub const API_BASE_VAR: &str = "AZURE_ANTHROPIC_API_BASE";

/// Older spelling of [`API_BASE_VAR`]
pub const ENDPOINT_VAR: &str = "AZURE_ANTHROPIC_ENDPOINT";

const OPTIONS: &[&str] = &[
    "max_tokens",
    "temperature",
    "top_p",
    "stream",
    "stop",
    "tools",
    "tool_choice",
    "reasoning_effort",
];

/// Azure Anthropic provider
pub struct AzureAnthropicProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl AzureAnthropicProvider {
    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns a 422 if the API key or endpoint is missing, or the endpoint
    /// is not a URL
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        let base_url = match &settings.base_url {
            Some(url) => url.clone(),
            None => {
                let raw = super::env_value(API_BASE_VAR)
                    .or_else(|| super::env_value(ENDPOINT_VAR))
                    .ok_or_else(|| {
                        LlmError::validation(
                            NAME,
                            format!("Missing Azure Anthropic endpoint (set {API_BASE_VAR} or provide base_url)"),
                        )
                    })?;
                Url::parse(&raw).map_err(|e| LlmError::validation(NAME, format!("invalid endpoint {raw}: {e}")))?
            }
        };

        Ok(Self {
            api_key: super::require_api_key(NAME, settings, API_KEY_VAR)?,
            client: super::http_client(NAME, settings)?,
            base_url,
        })
    }

    fn request(&self, body: &AnthropicRequest) -> RequestBuilder {
        self.client
            .post(super::endpoint(&self.base_url, "v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }
}

#[async_trait]
impl Provider for AzureAnthropicProvider {
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
        let mut body = AnthropicRequest::from(request);
        body.stream = None;

        let response = send(NAME, self.request(&body)).await?;
        let wire_response: AnthropicResponse = parse_json(NAME, response).await?;
        Ok(completion_from_anthropic(&wire_response, &request.model))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let mut body = AnthropicRequest::from(request);
        body.stream = Some(true);

        let response = send(NAME, self.request(&body)).await?;

        let mut state = AnthropicStreamState::new(request.model.clone());
        Ok(sse_stream(NAME, response, move |event| {
            let frame: AnthropicStreamEvent = decode_frame(NAME, &event.data)?;
            match &frame {
                AnthropicStreamEvent::MessageStop => Ok(Frames::Done),
                AnthropicStreamEvent::Error { error } => Err(LlmError::internal(
                    NAME,
                    format!("{}: {}", error.error_type, error.message),
                )),
                _ => Ok(Frames::Emit(state.convert(&frame))),
            }
        }))
    }
}
