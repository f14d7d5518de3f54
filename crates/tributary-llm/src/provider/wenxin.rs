//! Baidu Wenxin (ERNIE) adapter
//!
//! Authenticates with OAuth client credentials. The access token is cached
//! per adapter and refreshed shortly before it expires.

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::wenxin::{chunk_from_wenxin, completion_from_wenxin};
use crate::error::LlmError;
use crate::protocol::wenxin::{WenxinRequest, WenxinResponse, WenxinToken};
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest, ResponseStamp};

const NAME: &str = "wenxin";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://aip.baidubce.com";

const TOKEN_PATH: &str = "oauth/2.0/token";
const CHAT_PATH: &str = "rpc/2.0/ai_custom/v1/wenxinworkshop/chat";

/// Environment variable holding the client id
pub const API_KEY_VAR: &str = "WENXIN_API_KEY";

/// Environment variable holding the client secret
pub const SECRET_KEY_VAR: &str = "WENXIN_SECRET_KEY";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN: SignedDuration = SignedDuration::from_secs(60);

const OPTIONS: &[&str] = &["max_tokens", "temperature", "top_p", "stream", "stop", "user_id"];

/// Chat endpoint segment for a model name
fn model_endpoint(model: &str) -> String {
    match model.to_ascii_lowercase().as_str() {
        "ernie-4.0-8k" | "ernie-bot-4" | "ernie-4.0" => "completions_pro".to_owned(),
        "ernie-3.5-8k" | "ernie-bot" | "ernie-3.5" => "completions".to_owned(),
        "ernie-bot-turbo" => "eb-instant".to_owned(),
        other => other.to_owned(),
    }
}

#[derive(Debug)]
struct CachedToken {
    value: SecretString,
    expires_at: Timestamp,
}

/// Wenxin provider
pub struct WenxinProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
    secret_key: SecretString,
    token: Mutex<Option<CachedToken>>,
}

impl WenxinProvider {
    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns a 422 if the client id or secret is missing
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            api_key: super::require_api_key(NAME, settings, API_KEY_VAR)?,
            secret_key: super::require_secret(NAME, settings.api_secret.as_ref(), SECRET_KEY_VAR, "api_secret")?,
            client: super::http_client(NAME, settings)?,
            base_url: super::base_url(NAME, settings, DEFAULT_BASE_URL)?,
            token: Mutex::new(None),
        })
    }

    /// Current access token, fetching a new one when needed
    async fn access_token(&self) -> Result<String, LlmError> {
        let mut cached = self.token.lock().await;
        let now = Timestamp::now();
        if let Some(token) = cached.as_ref()
            && token.expires_at > now
        {
            return Ok(token.value.expose_secret().to_owned());
        }

        let builder = self.client.post(super::endpoint(&self.base_url, TOKEN_PATH)).query(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.api_key.expose_secret()),
            ("client_secret", self.secret_key.expose_secret()),
        ]);
        let response: WenxinToken = parse_json(NAME, send(NAME, builder).await?).await?;

        let Some(value) = response.access_token.filter(|t| !t.is_empty()) else {
            let reason = response
                .error_description
                .or(response.error)
                .unwrap_or_else(|| "no access token in response".to_owned());
            return Err(LlmError::upstream(NAME, 401, format!("token exchange failed: {reason}")));
        };

        let lifetime = SignedDuration::from_secs(response.expires_in.unwrap_or(0)) - REFRESH_MARGIN;
        let expires_at = now.checked_add(lifetime).unwrap_or(now);
        tracing::debug!(provider = NAME, expires_at = %expires_at, "refreshed access token");

        *cached = Some(CachedToken {
            value: SecretString::from(value.clone()),
            expires_at,
        });
        Ok(value)
    }

    async fn request(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::RequestBuilder, LlmError> {
        let token = self.access_token().await?;
        let mut body: WenxinRequest = request.into();
        body.stream = stream.then_some(true);

        let url = super::endpoint(&self.base_url, &format!("{CHAT_PATH}/{}", model_endpoint(&request.model)));
        Ok(self.client.post(url).query(&[("access_token", token)]).json(&body))
    }
}

fn reported_error(response: &WenxinResponse) -> Option<LlmError> {
    let code = response.error_code.filter(|c| *c != 0)?;
    Some(super::vendor_error(
        NAME,
        code,
        response.error_msg.as_deref().unwrap_or("unknown error"),
    ))
}

#[async_trait]
impl Provider for WenxinProvider {
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
        let response = send(NAME, self.request(request, false).await?).await?;
        let wire_response: WenxinResponse = parse_json(NAME, response).await?;

        if let Some(err) = reported_error(&wire_response) {
            return Err(err);
        }
        Ok(completion_from_wenxin(&wire_response, &request.model))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let response = send(NAME, self.request(request, true).await?).await?;

        // Failures arrive as a plain JSON body even on streaming calls
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            let body: WenxinResponse = parse_json(NAME, response).await?;
            return Err(reported_error(&body)
                .unwrap_or_else(|| LlmError::internal(NAME, "expected an event stream, got a JSON body")));
        }

        let model = request.model.clone();
        let mut stamp: Option<ResponseStamp> = None;
        Ok(sse_stream(NAME, response, move |event| {
            let frame: WenxinResponse = decode_frame(NAME, &event.data)?;
            if let Some(err) = reported_error(&frame) {
                return Err(err);
            }
            let first = stamp.is_none();
            let stamp = stamp.get_or_insert_with(|| {
                ResponseStamp::new(model.clone())
                    .with_id(frame.id.clone())
                    .with_created(frame.created)
            });
            let chunk = chunk_from_wenxin(stamp, &frame, first);
            Ok(Frames::one(chunk))
        }))
    }
}
