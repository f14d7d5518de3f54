//! Kunlun Tiangong (`SkyWork`) adapter
//!
//! Every request is signed with `md5(app_key + app_secret + timestamp)`.
//! Streaming responses are newline-delimited JSON rather than SSE.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::tiangong::{chunk_from_tiangong, completion_from_tiangong};
use crate::error::LlmError;
use crate::protocol::tiangong::{TiangongRequest, TiangongResponse};
use crate::stream::{ChunkStream, Frames, line_stream};
use crate::types::{ChatCompletion, CompletionRequest, ResponseStamp};

const NAME: &str = "tiangong";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://sky-api.singularity-ai.com/saas/api/v4";

/// Environment variable holding the app key
pub const APP_KEY_VAR: &str = "TIANGONG_APP_KEY";

/// Environment variable holding the app secret
pub const APP_SECRET_VAR: &str = "TIANGONG_APP_SECRET";

const OPTIONS: &[&str] = &["max_tokens", "temperature", "top_p", "top_k", "stream"];

/// Hex md5 request signature
fn sign(app_key: &str, app_secret: &str, timestamp: &str) -> String {
    format!("{:x}", md5::compute(format!("{app_key}{app_secret}{timestamp}")))
}

/// Tiangong provider
pub struct TiangongProvider {
    client: Client,
    base_url: Url,
    app_key: SecretString,
    app_secret: SecretString,
}

impl TiangongProvider {
    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns a 422 if the app key or secret is missing
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            app_key: super::require_api_key(NAME, settings, APP_KEY_VAR)?,
            app_secret: super::require_secret(NAME, settings.api_secret.as_ref(), APP_SECRET_VAR, "api_secret")?,
            client: super::http_client(NAME, settings)?,
            base_url: super::base_url(NAME, settings, DEFAULT_BASE_URL)?,
        })
    }

    fn request(&self, request: &CompletionRequest, stream: bool) -> RequestBuilder {
        let timestamp = jiff::Timestamp::now().as_second().to_string();
        let app_key = self.app_key.expose_secret();
        let signature = sign(app_key, self.app_secret.expose_secret(), &timestamp);

        self.client
            .post(super::endpoint(&self.base_url, "generate"))
            .header("app_key", app_key)
            .header("timestamp", timestamp)
            .header("sign", signature)
            .header("stream", if stream { "true" } else { "false" })
            .json(&TiangongRequest::from(request))
    }
}

fn reported_error(response: &TiangongResponse) -> Option<LlmError> {
    (response.code != 200).then(|| {
        super::vendor_error(
            NAME,
            response.code,
            response.code_msg.as_deref().unwrap_or("unknown error"),
        )
    })
}

#[async_trait]
impl Provider for TiangongProvider {
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
        let response = send(NAME, self.request(request, false)).await?;
        let wire_response: TiangongResponse = parse_json(NAME, response).await?;

        if let Some(err) = reported_error(&wire_response) {
            return Err(err);
        }
        let Some(data) = wire_response.resp_data.as_ref() else {
            return Err(LlmError::internal(NAME, "response contained no resp_data"));
        };
        let stamp = ResponseStamp::new(request.model.clone()).with_id(wire_response.trace_id.clone());
        Ok(completion_from_tiangong(&stamp, data))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let response = send(NAME, self.request(request, true)).await?;

        let model = request.model.clone();
        let mut stamp: Option<ResponseStamp> = None;
        Ok(line_stream(NAME, response, move |line| {
            let frame: TiangongResponse = decode_frame(NAME, line)?;
            if let Some(err) = reported_error(&frame) {
                return Err(err);
            }
            let Some(data) = frame.resp_data.as_ref() else {
                return Ok(Frames::none());
            };
            let first = stamp.is_none();
            let stamp = stamp.get_or_insert_with(|| ResponseStamp::new(model.clone()).with_id(frame.trace_id.clone()));
            Ok(Frames::one(chunk_from_tiangong(stamp, data, first)))
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::stream::Completion;
    use crate::types::{CompletionOptions, Message};

    fn provider(server: &MockServer) -> TiangongProvider {
        let settings = ProviderSettings::default()
            .with_api_key("app-key")
            .with_api_secret("app-secret")
            .with_base_url(Url::parse(&server.uri()).unwrap());
        TiangongProvider::new(&settings).unwrap()
    }

    fn request(stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: "SkyChat-MegaVerse".to_owned(),
            messages: vec![Message::user("Hi")],
            options: CompletionOptions {
                stream,
                ..CompletionOptions::default()
            },
        }
    }

    #[test]
    fn signature_is_hex_md5_of_key_secret_timestamp() {
        assert_eq!(sign("a", "b", "c"), format!("{:x}", md5::compute("abc")));
        assert_eq!(sign("a", "b", "c").len(), 32);
    }

    #[tokio::test]
    async fn blocking_request_is_signed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("app_key", "app-key"))
            .and(header("stream", "false"))
            .and(header_exists("sign"))
            .and(header_exists("timestamp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200, "code_msg": "success", "trace_id": "tr-1",
                "resp_data": {
                    "reply": "Hello",
                    "usage": {"prompt_tokens": 2, "completion_tokens": 1, "total_tokens": 3}
                }
            })))
            .mount(&server)
            .await;

        let completion = provider(&server).complete(&request(false)).await.unwrap();
        assert_eq!(completion.id, "tr-1");
        assert_eq!(completion.text(), Some("Hello"));
        assert_eq!(completion.usage.total_tokens, Some(3));

        let received = server.received_requests().await.unwrap();
        let headers = &received[0].headers;
        let timestamp = headers.get("timestamp").unwrap().to_str().unwrap();
        let signature = headers.get("sign").unwrap().to_str().unwrap();
        assert_eq!(signature, sign("app-key", "app-secret", timestamp));
    }

    #[tokio::test]
    async fn non_200_body_code_is_vendor_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 401, "code_msg": "sign verification failed"})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request(false)).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::UNAUTHORIZED);
        assert!(err.client_message().contains("sign verification failed"));
    }

    #[tokio::test]
    async fn success_code_without_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 200, "code_msg": "success", "trace_id": "tr-3"})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).complete(&request(false)).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.client_message().contains("resp_data"));
    }

    #[tokio::test]
    async fn ndjson_stream_is_collected() {
        let body = concat!(
            "{\"code\":200,\"trace_id\":\"tr-2\",\"resp_data\":{\"reply\":\"Hel\"}}\n",
            "\n",
            "{\"code\":200,\"trace_id\":\"tr-2\",\"resp_data\":{\"reply\":\"lo\",\"finish_reason\":\"stop\",",
            "\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":2,\"total_tokens\":3}}}",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("stream", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let stream = provider(&server).complete_stream(&request(true)).await.unwrap();
        let response = Completion::Stream(stream).collect().await.unwrap();
        assert_eq!(response.id, "tr-2");
        assert_eq!(response.text(), Some("Hello"));
        assert_eq!(response.usage.total_tokens, Some(3));
    }

    #[test]
    fn missing_secret_names_variable() {
        temp_env::with_var_unset(APP_SECRET_VAR, || {
            let settings = ProviderSettings::default().with_api_key("k");
            let err = TiangongProvider::new(&settings).err().unwrap();
            assert!(err.client_message().contains(APP_SECRET_VAR));
        });
    }
}
