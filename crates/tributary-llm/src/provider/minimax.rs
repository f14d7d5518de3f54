//! MiniMax adapter

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{COMMON_OPTIONS, Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::minimax::{MiniMaxStreamState, completion_from_minimax};
use crate::error::LlmError;
use crate::protocol::minimax::{MiniMaxResponse, MiniMaxStreamChunk};
use crate::protocol::openai::OpenAiRequest;
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest};

const NAME: &str = "minimax";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.minimax.chat/v1";

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "MINIMAX_API_KEY";

/// MiniMax provider
pub struct MiniMaxProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl MiniMaxProvider {
    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns a 422 if no API key is configured
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            api_key: super::require_api_key(NAME, settings, API_KEY_VAR)?,
            client: super::http_client(NAME, settings)?,
            base_url: super::base_url(NAME, settings, DEFAULT_BASE_URL)?,
        })
    }

    fn request(&self, body: &OpenAiRequest) -> reqwest::RequestBuilder {
        self.client
            .post(super::endpoint(&self.base_url, "text/chatcompletion_v2"))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
    }
}

#[async_trait]
impl Provider for MiniMaxProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            options: COMMON_OPTIONS,
            temperature: STANDARD_TEMPERATURE,
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, LlmError> {
        let mut wire_request: OpenAiRequest = request.into();
        wire_request.stream = None;

        let response = send(NAME, self.request(&wire_request)).await?;
        let wire_response: MiniMaxResponse = parse_json(NAME, response).await?;

        if let Some(status) = wire_response.base_resp.as_ref().filter(|s| s.is_error()) {
            return Err(super::vendor_error(NAME, status.status_code, &status.status_msg));
        }
        if wire_response.choices.is_empty() {
            return Err(LlmError::internal(NAME, "response contained no choices"));
        }

        Ok(completion_from_minimax(&wire_response, &request.model))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let mut wire_request: OpenAiRequest = request.into();
        wire_request.stream = Some(true);

        let response = send(NAME, self.request(&wire_request)).await?;

        let mut state = MiniMaxStreamState::new(request.model.clone());
        Ok(sse_stream(NAME, response, move |event| {
            let chunk: MiniMaxStreamChunk = decode_frame(NAME, &event.data)?;
            if let Some(status) = chunk.base_resp.as_ref().filter(|s| s.is_error()) {
                return Err(super::vendor_error(NAME, status.status_code, &status.status_msg));
            }
            Ok(Frames::Emit(state.convert(&chunk)))
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::{CompletionOptions, Message};

    fn provider(server: &MockServer) -> MiniMaxProvider {
        let settings = ProviderSettings::default()
            .with_api_key("mm-key")
            .with_base_url(Url::parse(&server.uri()).unwrap());
        MiniMaxProvider::new(&settings).unwrap()
    }

    fn request(stream: bool) -> CompletionRequest {
        let options = CompletionOptions {
            stream,
            ..CompletionOptions::default()
        };
        CompletionRequest {
            model: "abab6.5s-chat".to_owned(),
            messages: vec![Message::user("Hello")],
            options,
        }
    }

    #[tokio::test]
    async fn base_resp_failure_is_vendor_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text/chatcompletion_v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [],
                "base_resp": {"status_code": 1004, "status_msg": "authorization failure"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request(false)).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.client_message().contains("authorization failure"));
    }

    #[tokio::test]
    async fn stream_reads_data_lines_until_close() {
        let body = concat!(
            "data: {\"id\":\"m1\",\"created\":3,\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hi\"}}]}\n\n",
            "data: {\"id\":\"m1\",\"choices\":[{\"index\":0,\"message\":{\"role\":\"assistant\",\"content\":\"Hi there\"},\"finish_reason\":\"stop\"}],\"usage\":{\"total_tokens\":8}}\n\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text/chatcompletion_v2"))
            .and(header("authorization", "Bearer mm-key"))
            .and(body_partial_json(json!({"stream": true, "model": "abab6.5s-chat"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider(&server).complete_stream(&request(true)).await.unwrap();
        let frames: Vec<_> = futures_util::StreamExt::collect::<Vec<_>>(stream)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id, "m1");
        assert_eq!(frames[1].choices[0].delta.content.as_deref(), Some(" there"));
        assert_eq!(frames[1].usage.total_tokens, Some(8));
    }
}
