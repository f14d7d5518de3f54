//! Google Gemini adapter (Generative Language API)

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, WIDE_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::google::{GoogleStreamState, completion_from_google};
use crate::error::LlmError;
use crate::protocol::google::{GoogleRequest, GoogleResponse};
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest};

const NAME: &str = "gemini";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

const OPTIONS: &[&str] = &[
    "max_tokens",
    "temperature",
    "top_p",
    "stream",
    "stop",
    "presence_penalty",
    "frequency_penalty",
    "tools",
    "tool_choice",
];

/// Gemini provider
pub struct GeminiProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl GeminiProvider {
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

    /// `models/{model}:{method}` authenticated with the `key` query parameter
    fn request(&self, model: &str, method: &str, body: &GoogleRequest) -> RequestBuilder {
        self.client
            .post(super::endpoint(&self.base_url, &format!("models/{model}:{method}")))
            .query(&[("key", self.api_key.expose_secret())])
            .json(body)
    }
}

fn body_error(response: &GoogleResponse) -> Option<LlmError> {
    response
        .error
        .as_ref()
        .map(|error| super::vendor_error(NAME, error.code, &error.message))
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            options: OPTIONS,
            temperature: WIDE_TEMPERATURE,
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, LlmError> {
        let body = GoogleRequest::from(request);
        let response = send(NAME, self.request(&request.model, "generateContent", &body)).await?;
        let wire_response: GoogleResponse = parse_json(NAME, response).await?;

        if let Some(error) = body_error(&wire_response) {
            return Err(error);
        }
        if wire_response.candidates.is_empty() {
            let reason = wire_response
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.as_deref());
            let message = match reason {
                Some(reason) => format!("response contained no candidates (prompt blocked: {reason})"),
                None => "response contained no candidates".to_owned(),
            };
            return Err(LlmError::internal(NAME, message));
        }
        Ok(completion_from_google(&wire_response, &request.model))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let body = GoogleRequest::from(request);
        let builder = self
            .request(&request.model, "streamGenerateContent", &body)
            .query(&[("alt", "sse")]);
        let response = send(NAME, builder).await?;

        let mut state = GoogleStreamState::new(request.model.clone());
        Ok(sse_stream(NAME, response, move |event| {
            let frame: GoogleResponse = decode_frame(NAME, &event.data)?;
            if let Some(error) = body_error(&frame) {
                return Err(error);
            }
            Ok(Frames::Emit(state.convert(&frame)))
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::stream::Completion;
    use crate::types::{CompletionOptions, FinishReason, Message};

    fn provider(server: &MockServer) -> GeminiProvider {
        let settings = ProviderSettings::default()
            .with_api_key("g-key")
            .with_base_url(Url::parse(&server.uri()).unwrap());
        GeminiProvider::new(&settings).unwrap()
    }

    fn request(options: CompletionOptions) -> CompletionRequest {
        CompletionRequest {
            model: "gemini-2.0-flash".to_owned(),
            messages: vec![Message::system("Be brief."), Message::user("Hi")],
            options,
        }
    }

    #[tokio::test]
    async fn blocking_uses_key_query_and_system_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "Be brief."}]},
                "contents": [{"role": "user", "parts": [{"text": "Hi"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello!"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6},
                "responseId": "resp-9"
            })))
            .mount(&server)
            .await;

        let completion = provider(&server)
            .complete(&request(CompletionOptions::default()))
            .await
            .unwrap();
        assert_eq!(completion.id, "resp-9");
        assert_eq!(completion.text(), Some("Hello!"));
        assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.total_tokens, Some(6));
    }

    #[tokio::test]
    async fn stream_requests_sse_and_collects() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}],",
            "\"usageMetadata\":{\"promptTokenCount\":4},\"responseId\":\"resp-10\"}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":2,\"totalTokenCount\":6},\"responseId\":\"resp-10\"}\r\n\r\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .complete_stream(&request(CompletionOptions::default().streaming()))
            .await
            .unwrap();
        let response = Completion::Stream(stream).collect().await.unwrap();
        assert_eq!(response.id, "resp-10");
        assert_eq!(response.text(), Some("Hello"));
        assert_eq!(response.usage.completion_tokens, Some(2));
    }

    #[tokio::test]
    async fn http_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&request(CompletionOptions::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
        assert!(err.client_message().contains("API key not valid."));
    }

    #[tokio::test]
    async fn blocked_prompt_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "SAFETY"},
                "usageMetadata": {"promptTokenCount": 4, "totalTokenCount": 4}
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&request(CompletionOptions::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.client_message().contains("SAFETY"));
    }

    #[test]
    fn missing_key_is_rejected() {
        temp_env::with_var_unset(API_KEY_VAR, || {
            let err = GeminiProvider::new(&ProviderSettings::default()).err().unwrap();
            assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
        });
    }
}
