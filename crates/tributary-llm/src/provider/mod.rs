//! Provider trait and implementations for vendor backends

pub mod azure_anthropic;
pub mod coze;
pub mod dify;
pub mod fastgpt;
pub mod gemini;
pub mod litellm;
pub mod minimax;
pub mod openai_compat;
pub mod qwen;
pub mod tiangong;
pub mod wenxin;
pub mod xunfei;

use std::ops::RangeInclusive;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tributary_config::ProviderSettings;
use url::Url;

use crate::capability::CapabilityProfile;
use crate::error::LlmError;
use crate::stream::{ChunkStream, malformed_frame};
use crate::types::{ChatCompletion, CompletionRequest};

/// Options accepted by most OpenAI-shaped vendors
pub const COMMON_OPTIONS: &[&str] = &[
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
    "tools",
    "tool_choice",
];

/// Temperature range most vendors document
pub const STANDARD_TEMPERATURE: RangeInclusive<f64> = 0.0..=1.0;

/// Temperature range for vendors that follow the `OpenAI` convention
pub const WIDE_TEMPERATURE: RangeInclusive<f64> = 0.0..=2.0;

/// Capabilities advertised by a provider
#[derive(Debug, Clone)]
pub struct ProviderCapabilities {
    /// Option keys forwarded to the vendor; everything else is dropped
    pub options: &'static [&'static str],
    /// Accepted sampling temperature
    pub temperature: RangeInclusive<f64>,
}

/// Trait implemented by each vendor adapter
///
/// Requests reaching `complete` and `complete_stream` have already passed
/// the prompt check and option filtering.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name used in errors and logs
    fn name(&self) -> &str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Multi-modal support for `model`
    fn profile(&self, model: &str) -> CapabilityProfile {
        CapabilityProfile::lookup(self.name(), model)
    }

    /// Send a blocking completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, LlmError>;

    /// Send a streaming completion request
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError>;
}

// -- Construction helpers --

/// Resolve a secret from settings, else from `var`
///
/// # Errors
///
/// Returns a 422 naming `var` when neither source has a value
pub(crate) fn require_secret(
    provider: &str,
    explicit: Option<&SecretString>,
    var: &str,
    field: &str,
) -> Result<SecretString, LlmError> {
    explicit
        .cloned()
        .or_else(|| env_value(var).map(SecretString::from))
        .ok_or_else(|| missing(provider, var, field))
}

/// Resolve the primary API key
pub(crate) fn require_api_key(provider: &str, settings: &ProviderSettings, var: &str) -> Result<SecretString, LlmError> {
    require_secret(provider, settings.api_key.as_ref(), var, "api_key")
}

/// Resolve a plain identifier from settings, else from `var`
pub(crate) fn require_value(
    provider: &str,
    explicit: Option<&str>,
    var: &str,
    field: &str,
) -> Result<String, LlmError> {
    explicit
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .or_else(|| env_value(var))
        .ok_or_else(|| missing(provider, var, field))
}

/// Non-empty environment variable
pub(crate) fn env_value(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn missing(provider: &str, var: &str, field: &str) -> LlmError {
    let what = match field {
        "api_key" => "API key",
        "api_secret" => "API secret",
        "app_id" => "app id",
        "bot_id" => "bot id",
        other => other,
    };
    LlmError::validation(provider, format!("Missing {what} (set {var} or provide {field})"))
}

/// HTTP client honouring the configured timeout
pub(crate) fn http_client(provider: &str, settings: &ProviderSettings) -> Result<Client, LlmError> {
    let timeout = settings
        .timeout()
        .map_err(|e| LlmError::validation(provider, e.to_string()))?;

    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| LlmError::internal(provider, format!("failed to build HTTP client: {e}")))
}

/// Configured base URL, else `default`
pub(crate) fn base_url(provider: &str, settings: &ProviderSettings, default: &str) -> Result<Url, LlmError> {
    match &settings.base_url {
        Some(url) => Ok(url.clone()),
        None => Url::parse(default).map_err(|e| LlmError::internal(provider, format!("invalid base URL: {e}"))),
    }
}

/// Join a path onto a base URL without doubling slashes
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

// -- Call helpers --

/// Send a request, turning transport failures and non-success statuses
/// into provider errors
pub(crate) async fn send(provider: &str, builder: RequestBuilder) -> Result<Response, LlmError> {
    let response = builder.send().await.map_err(|e| {
        tracing::error!(provider = %provider, error = %e, "upstream request failed");
        LlmError::internal(provider, e.to_string())
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            provider = %provider,
            status = %status,
            "upstream returned error"
        );
        let detail = error_detail(&body).unwrap_or(body);
        return Err(LlmError::upstream(
            provider,
            status.as_u16(),
            format!("provider returned {status}: {detail}"),
        ));
    }

    Ok(response)
}

/// Decode a success body
pub(crate) async fn parse_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T, LlmError> {
    let body = response
        .text()
        .await
        .map_err(|e| LlmError::internal(provider, format!("failed to read response: {e}")))?;
    serde_json::from_str(&body).map_err(|e| LlmError::internal(provider, format!("failed to parse response: {e}")))
}

/// Decode one stream frame; failures abort the stream
pub(crate) fn decode_frame<T: DeserializeOwned>(provider: &str, data: &str) -> Result<T, LlmError> {
    serde_json::from_str(data).map_err(|e| malformed_frame(provider, e))
}

/// Failure the vendor reported inside a success-status body
///
/// Codes that are valid HTTP statuses pass through; anything else is a 500.
pub(crate) fn vendor_error(provider: &str, code: i64, message: &str) -> LlmError {
    tracing::warn!(provider = %provider, code, "vendor reported error");
    let status = u16::try_from(code).unwrap_or(500);
    LlmError::upstream(provider, status, format!("{message} (code {code})"))
}

/// Best-effort human message from a vendor error body
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    [
        "/error/message",
        "/message",
        "/msg",
        "/error_msg",
        "/error",
        "/base_resp/status_msg",
    ]
    .iter()
    .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
    .filter(|m| !m.is_empty())
    .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn explicit_key_wins_over_environment() {
        temp_env::with_var("TRIBUTARY_TEST_KEY", Some("from-env"), || {
            let settings = ProviderSettings::default().with_api_key("explicit");
            let key = require_api_key("acme", &settings, "TRIBUTARY_TEST_KEY").unwrap();
            assert_eq!(key.expose_secret(), "explicit");
        });
    }

    #[test]
    fn environment_key_used_when_settings_empty() {
        temp_env::with_var("TRIBUTARY_TEST_KEY", Some("from-env"), || {
            let key = require_api_key("acme", &ProviderSettings::default(), "TRIBUTARY_TEST_KEY").unwrap();
            assert_eq!(key.expose_secret(), "from-env");
        });
    }

    #[test]
    fn missing_key_is_validation_error() {
        temp_env::with_var_unset("TRIBUTARY_TEST_KEY", || {
            let err = require_api_key("acme", &ProviderSettings::default(), "TRIBUTARY_TEST_KEY").unwrap_err();
            assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(
                err.client_message(),
                "Missing API key (set TRIBUTARY_TEST_KEY or provide api_key)"
            );
        });
    }

    #[test]
    fn blank_environment_value_counts_as_missing() {
        temp_env::with_var("TRIBUTARY_TEST_APP", Some("  "), || {
            let err = require_value("acme", None, "TRIBUTARY_TEST_APP", "app_id").unwrap_err();
            assert!(err.client_message().starts_with("Missing app id"));
        });
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let base = Url::parse("http://localhost:9000/v1/").unwrap();
        assert_eq!(endpoint(&base, "/chat/completions"), "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let settings = ProviderSettings::default().with_timeout("soon");
        let err = http_client("acme", &settings).unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn vendor_codes_outside_http_range_become_500() {
        assert_eq!(vendor_error("acme", 429, "slow down").status_code(), http::StatusCode::TOO_MANY_REQUESTS);
        let err = vendor_error("acme", 1004, "auth failed");
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "auth failed (code 1004)");
    }

    #[test]
    fn error_detail_reads_common_shapes() {
        assert_eq!(error_detail(r#"{"error":{"message":"bad key"}}"#).as_deref(), Some("bad key"));
        assert_eq!(error_detail(r#"{"code":1,"msg":"quota"}"#).as_deref(), Some("quota"));
        assert_eq!(error_detail("not json"), None);
    }
}
