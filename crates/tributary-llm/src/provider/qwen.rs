//! Qwen adapter over the `DashScope` generation API

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{COMMON_OPTIONS, Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::dashscope::{DashScopeStreamState, completion_from_dashscope, to_dashscope};
use crate::error::LlmError;
use crate::protocol::dashscope::{DashScopeRequest, DashScopeResponse};
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest};

const NAME: &str = "qwen";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

const TEXT_PATH: &str = "services/aigc/text-generation/generation";
const MULTIMODAL_PATH: &str = "services/aigc/multimodal-generation/generation";

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "DASHSCOPE_API_KEY";

/// Qwen provider
pub struct QwenProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl QwenProvider {
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

    /// Wire request plus the endpoint it must go to
    fn request(&self, request: &CompletionRequest) -> reqwest::RequestBuilder {
        let multimodal = request.messages.iter().any(|m| m.content.has_media());
        let body: DashScopeRequest = to_dashscope(request, multimodal);
        let path = if multimodal { MULTIMODAL_PATH } else { TEXT_PATH };

        self.client
            .post(super::endpoint(&self.base_url, path))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
    }
}

/// Error carried in a success-status body or an `error` stream event
fn reported_error(response: &DashScopeResponse) -> Option<LlmError> {
    let code = response.code.as_deref().filter(|c| !c.is_empty())?;
    let message = response.message.as_deref().unwrap_or_default();
    Some(LlmError::internal(NAME, format!("{code}: {message}")))
}

#[async_trait]
impl Provider for QwenProvider {
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
        let response = send(NAME, self.request(request)).await?;
        let wire_response: DashScopeResponse = parse_json(NAME, response).await?;

        if let Some(err) = reported_error(&wire_response) {
            return Err(err);
        }
        let completion = completion_from_dashscope(&wire_response, &request.model);
        if completion.choices.is_empty() {
            return Err(LlmError::internal(NAME, "response contained no choices"));
        }
        Ok(completion)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let builder = self.request(request).header("X-DashScope-SSE", "enable");
        let response = send(NAME, builder).await?;

        let mut state = DashScopeStreamState::new(request.model.clone());
        Ok(sse_stream(NAME, response, move |event| {
            let frame: DashScopeResponse = decode_frame(NAME, &event.data)?;
            if let Some(err) = reported_error(&frame) {
                return Err(err);
            }
            if event.event == "error" {
                return Err(LlmError::internal(NAME, "stream reported an error"));
            }
            Ok(Frames::Emit(state.convert(&frame)))
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::stream::Completion;
    use crate::types::{CompletionOptions, ContentPart, Message};

    fn provider(server: &MockServer) -> QwenProvider {
        let settings = ProviderSettings::default()
            .with_api_key("ds-key")
            .with_base_url(Url::parse(&server.uri()).unwrap());
        QwenProvider::new(&settings).unwrap()
    }

    fn request(messages: Vec<Message>, stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: "qwen-turbo".to_owned(),
            messages,
            options: CompletionOptions {
                stream,
                ..CompletionOptions::default()
            },
        }
    }

    #[tokio::test]
    async fn media_selects_multimodal_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{MULTIMODAL_PATH}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "request_id": "r1",
                "output": {"choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": [{"text": "a dog"}]}}]},
                "usage": {"input_tokens": 30, "output_tokens": 2}
            })))
            .mount(&server)
            .await;

        let messages = vec![Message::user_parts(vec![
            ContentPart::text("what is it?"),
            ContentPart::image("http://x/dog.png"),
        ])];
        let response = provider(&server).complete(&request(messages, false)).await.unwrap();
        assert_eq!(response.text(), Some("a dog"));
        assert_eq!(response.usage.total_tokens, Some(32));
    }

    #[tokio::test]
    async fn non_success_status_raises() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{TEXT_PATH}")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "InvalidParameter", "message": "bad temperature", "request_id": "r"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&request(vec![Message::user("Hi")], false))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
        assert!(err.client_message().contains("bad temperature"));
    }

    #[tokio::test]
    async fn stream_sends_sse_header_and_collects() {
        let body = concat!(
            "id:1\nevent:result\n:HTTP_STATUS/200\ndata:{\"request_id\":\"r2\",\"output\":{\"choices\":[{\"finish_reason\":\"null\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]},\"usage\":{\"input_tokens\":3,\"output_tokens\":1,\"total_tokens\":4}}\n\n",
            "id:2\nevent:result\n:HTTP_STATUS/200\ndata:{\"request_id\":\"r2\",\"output\":{\"choices\":[{\"finish_reason\":\"stop\",\"message\":{\"role\":\"assistant\",\"content\":\"lo\"}}]},\"usage\":{\"input_tokens\":3,\"output_tokens\":2,\"total_tokens\":5}}\n\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{TEXT_PATH}")))
            .and(header("X-DashScope-SSE", "enable"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .complete_stream(&request(vec![Message::user("Hi")], true))
            .await
            .unwrap();
        let response = Completion::Stream(stream).collect().await.unwrap();

        assert_eq!(response.id, "r2");
        assert_eq!(response.text(), Some("Hello"));
        assert_eq!(response.usage.total_tokens, Some(5));
    }

    #[tokio::test]
    async fn error_event_aborts_stream() {
        let body = "event:error\n:HTTP_STATUS/400\ndata:{\"code\":\"DataInspectionFailed\",\"message\":\"unsafe\"}\n\n";
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .complete_stream(&request(vec![Message::user("Hi")], true))
            .await
            .unwrap();
        let err = Completion::Stream(stream).collect().await.unwrap_err();
        assert!(err.client_message().contains("DataInspectionFailed"));
    }
}
