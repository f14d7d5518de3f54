//! Fallback backend: an OpenAI-compatible multi-provider proxy
//!
//! Providers without a native adapter are served by a proxy such as a
//! `LiteLLM` deployment. The dispatcher rewrites the model name into the
//! form the proxy routes on before calling it.

use tributary_config::ProviderSettings;
use url::Url;

use super::openai_compat::OpenAiCompatProvider;
use crate::error::LlmError;

/// Proxy address when neither settings nor environment provide one
pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// Environment variable holding the proxy address
pub const BASE_URL_VAR: &str = "LITELLM_API_BASE";

/// Environment variable holding the optional proxy key
pub const API_KEY_VAR: &str = "LITELLM_API_KEY";

/// Name used when the caller gave no provider
pub const FALLBACK_NAME: &str = "litellm";

/// Options the proxy forwards
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
];

/// Create the fallback adapter
///
/// `provider` names the requested provider for errors and logs. The key is
/// optional since local proxies usually run without one.
///
/// # Errors
///
/// Returns an error if the proxy address is not a valid URL or the timeout
/// is invalid
pub fn fallback(provider: Option<&str>, settings: &ProviderSettings) -> Result<OpenAiCompatProvider, LlmError> {
    let name = provider.unwrap_or(FALLBACK_NAME);

    let base_url = match (&settings.base_url, super::env_value(BASE_URL_VAR)) {
        (Some(url), _) => url.clone(),
        (None, Some(raw)) => Url::parse(&raw)
            .map_err(|e| LlmError::validation(name, format!("invalid {BASE_URL_VAR} '{raw}': {e}")))?,
        (None, None) => super::base_url(name, settings, DEFAULT_BASE_URL)?,
    };

    let api_key = settings
        .api_key
        .clone()
        .or_else(|| super::env_value(API_KEY_VAR).map(Into::into));

    Ok(OpenAiCompatProvider::custom(
        name,
        super::http_client(name, settings)?,
        base_url,
        api_key,
        OPTIONS,
    ))
}
