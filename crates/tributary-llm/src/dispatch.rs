//! Provider name resolution and the shared pre-flight pipeline
//!
//! [`Dispatcher::resolve`] maps a provider name onto a native adapter or
//! onto the OpenAI-compatible fallback proxy. The returned
//! [`AdapterHandle`] validates, normalizes and filters every request before
//! the adapter sees it.

use std::sync::Arc;

use tributary_config::{Config, ProviderSettings};

use crate::error::LlmError;
use crate::normalizer::check_prompt_with;
use crate::provider::azure_anthropic::AzureAnthropicProvider;
use crate::provider::coze::CozeProvider;
use crate::provider::dify::DifyProvider;
use crate::provider::fastgpt::FastGptProvider;
use crate::provider::gemini::GeminiProvider;
use crate::provider::minimax::MiniMaxProvider;
use crate::provider::openai_compat::{self, OpenAiCompatProvider};
use crate::provider::qwen::QwenProvider;
use crate::provider::tiangong::TiangongProvider;
use crate::provider::wenxin::WenxinProvider;
use crate::provider::xunfei::XunfeiProvider;
use crate::provider::{Provider, ProviderCapabilities, litellm};
use crate::stream::Completion;
use crate::types::CompletionRequest;
use crate::vendor::Vendor;

/// Fallback providers whose model is routed as `provider/model`
const PROVIDER_PREFIXED: &[&str] = &[
    "azure",
    "anthropic",
    "sagemaker",
    "bedrock",
    "vertex_ai",
    "vertex_ai_beta",
    "palm",
    "mistral",
    "cloudflare",
    "huggingface",
    "replicate",
    "together_ai",
    "openrouter",
    "baseten",
    "nlp_cloud",
    "petals",
    "ollama",
    "perplexity",
    "groq",
    "anyscale",
    "watsonx",
    "voyage",
    "xinference",
];

/// Fallback providers whose model is routed unchanged
const BARE: &[&str] = &["openai", "cohere", "ai21", "deepinfra", "aleph_alpha"];

/// Fallback providers served through the proxy's generic OpenAI route
const OPENAI_PREFIXED: &[&str] = &["vllm", "lmstudio", "siliconflow", "openai_compatible"];

/// How the fallback proxy expects the model name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRewrite {
    /// Model sent as given
    AsGiven,
    /// Model sent as `{prefix}/{model}` unless it already starts that way
    Prefix(String),
}

impl ModelRewrite {
    /// Model name to send
    pub fn apply(&self, model: &str) -> String {
        match self {
            Self::AsGiven => model.to_owned(),
            Self::Prefix(prefix) => {
                let already = model
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
                if already {
                    model.to_owned()
                } else {
                    format!("{prefix}/{model}")
                }
            }
        }
    }
}

/// Where a provider name is served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Bespoke adapter
    Native(Vendor),
    /// OpenAI-compatible proxy
    Fallback {
        /// Lowercased provider name, `None` when the caller gave none
        provider: Option<String>,
        /// Model name policy
        rewrite: ModelRewrite,
    },
}

/// Classify a provider name
///
/// `None` routes to the fallback with the model used as given, leaving the
/// proxy to infer the vendor from the model's own prefix.
///
/// # Errors
///
/// Returns [`LlmError::ProviderNotSupported`] for names neither served
/// natively nor known to the fallback
pub fn route(provider: Option<&str>) -> Result<Route, LlmError> {
    let Some(raw) = provider else {
        return Ok(Route::Fallback {
            provider: None,
            rewrite: ModelRewrite::AsGiven,
        });
    };

    if let Ok(vendor) = raw.parse::<Vendor>() {
        return Ok(Route::Native(vendor));
    }

    let name = raw.to_ascii_lowercase();
    let rewrite = if PROVIDER_PREFIXED.contains(&name.as_str()) {
        ModelRewrite::Prefix(name.clone())
    } else if BARE.contains(&name.as_str()) {
        ModelRewrite::AsGiven
    } else if OPENAI_PREFIXED.contains(&name.as_str()) {
        ModelRewrite::Prefix("openai".to_owned())
    } else {
        return Err(LlmError::ProviderNotSupported {
            provider: raw.to_owned(),
        });
    };

    Ok(Route::Fallback {
        provider: Some(name),
        rewrite,
    })
}

/// Construct the native adapter for `vendor`
fn native(vendor: Vendor, settings: &ProviderSettings) -> Result<Arc<dyn Provider>, LlmError> {
    let compat = |entry: &openai_compat::CompatVendor| -> Result<Arc<dyn Provider>, LlmError> {
        Ok(Arc::new(OpenAiCompatProvider::new(entry, settings)?))
    };

    match vendor {
        Vendor::Zhipuai => compat(&openai_compat::ZHIPUAI),
        Vendor::Moonshot => compat(&openai_compat::MOONSHOT),
        Vendor::Baichuan => compat(&openai_compat::BAICHUAN),
        Vendor::XunfeiHttp => compat(&openai_compat::XUNFEI_HTTP),
        Vendor::Lingyi => compat(&openai_compat::LINGYI),
        Vendor::Stepfun => compat(&openai_compat::STEPFUN),
        Vendor::Doubao => compat(&openai_compat::DOUBAO),
        Vendor::Deepseek => compat(&openai_compat::DEEPSEEK),
        Vendor::Minimax => Ok(Arc::new(MiniMaxProvider::new(settings)?)),
        Vendor::Qwen => Ok(Arc::new(QwenProvider::new(settings)?)),
        Vendor::Tiangong => Ok(Arc::new(TiangongProvider::new(settings)?)),
        Vendor::Wenxin => Ok(Arc::new(WenxinProvider::new(settings)?)),
        Vendor::Xunfei => Ok(Arc::new(XunfeiProvider::new(settings)?)),
        Vendor::Dify => Ok(Arc::new(DifyProvider::new(settings)?)),
        Vendor::Fastgpt => Ok(Arc::new(FastGptProvider::new(settings)?)),
        Vendor::Coze => Ok(Arc::new(CozeProvider::new(settings)?)),
        Vendor::Gemini => Ok(Arc::new(GeminiProvider::new(settings)?)),
        Vendor::AzureAnthropic => Ok(Arc::new(AzureAnthropicProvider::new(settings)?)),
    }
}

/// Resolve a provider name using one settings table
///
/// For native vendors `settings` configures the adapter; for fallback
/// providers it configures the proxy.
///
/// # Errors
///
/// Returns [`LlmError::ProviderNotSupported`] for unknown names, or the
/// adapter's construction error (typically a 422 for a missing credential)
pub fn resolve(provider: Option<&str>, settings: &ProviderSettings) -> Result<AdapterHandle, LlmError> {
    let handle = match route(provider)? {
        Route::Native(vendor) => AdapterHandle::new(native(vendor, settings)?, ModelRewrite::AsGiven),
        Route::Fallback { provider, rewrite } => {
            AdapterHandle::new(Arc::new(litellm::fallback(provider.as_deref(), settings)?), rewrite)
        }
    };

    tracing::debug!(provider = %handle.name(), "resolved adapter");
    Ok(handle.with_default_user(settings.user.clone()))
}

/// Resolve and run one completion
///
/// # Errors
///
/// Returns resolution, validation or vendor errors
pub async fn completion(
    provider: Option<&str>,
    settings: &ProviderSettings,
    request: CompletionRequest,
) -> Result<Completion, LlmError> {
    resolve(provider, settings)?.completion(request).await
}

/// Configured entry point
///
/// Holds the loaded configuration and picks the settings table for each
/// provider name: `[providers.<name>]` for native vendors, `[fallback]` for
/// everything served by the proxy.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: Arc<Config>,
}

impl Dispatcher {
    /// Create from loaded configuration
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Resolve a provider name to an adapter
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ProviderNotSupported`] for unknown names, or the
    /// adapter's construction error
    pub fn resolve(&self, provider: Option<&str>) -> Result<AdapterHandle, LlmError> {
        let settings = match route(provider)? {
            Route::Native(vendor) => self.config.provider(vendor.as_ref()),
            Route::Fallback { .. } => Some(&self.config.fallback),
        };
        resolve(provider, settings.unwrap_or(&ProviderSettings::default()))
    }

    /// Resolve and run one completion
    ///
    /// # Errors
    ///
    /// Returns resolution, validation or vendor errors
    pub async fn completion(&self, provider: Option<&str>, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.resolve(provider)?.completion(request).await
    }

    /// [`completion`](Self::completion) on a spawned task
    ///
    /// # Errors
    ///
    /// Returns resolution, validation or vendor errors, or a 500 if the task
    /// panicked
    pub async fn acompletion(&self, provider: Option<&str>, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.resolve(provider)?.acompletion(request).await
    }
}

/// Resolved adapter plus the checks every call goes through
#[derive(Clone)]
pub struct AdapterHandle {
    provider: Arc<dyn Provider>,
    rewrite: ModelRewrite,
    default_user: Option<String>,
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("provider", &self.provider.name())
            .field("rewrite", &self.rewrite)
            .finish_non_exhaustive()
    }
}

impl AdapterHandle {
    /// Wrap an adapter
    pub fn new(provider: Arc<dyn Provider>, rewrite: ModelRewrite) -> Self {
        Self {
            provider,
            rewrite,
            default_user: None,
        }
    }

    /// User id sent when the request carries none and the vendor accepts one
    #[must_use]
    pub fn with_default_user(mut self, user: Option<String>) -> Self {
        self.default_user = user.filter(|u| !u.is_empty());
        self
    }

    /// Adapter name
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    /// Adapter capabilities
    pub fn capabilities(&self) -> ProviderCapabilities {
        self.provider.capabilities()
    }

    /// Validate, normalize and filter a request
    ///
    /// Runs entirely offline: required inputs, message invariants, the
    /// prompt check, the option allowlist and the temperature range.
    ///
    /// # Errors
    ///
    /// Returns a 422 describing the first failed check
    pub fn prepare(&self, request: CompletionRequest) -> Result<CompletionRequest, LlmError> {
        let name = self.provider.name();

        if request.model.trim().is_empty() {
            return Err(LlmError::validation(name, "model is required"));
        }
        if request.messages.is_empty() {
            return Err(LlmError::validation(name, "messages must not be empty"));
        }
        for message in &request.messages {
            message.validate().map_err(|reason| LlmError::validation(name, reason))?;
        }

        let profile = self.provider.profile(&request.model);
        let messages = check_prompt_with(name, &profile, &request.messages)
            .into_messages()
            .map_err(|reason| {
                tracing::debug!(provider = %name, reason = %reason, "prompt rejected");
                LlmError::validation(name, reason)
            })?;

        let capabilities = self.provider.capabilities();
        let mut options = request.options.retain(capabilities.options);

        if let Some(temperature) = options.temperature
            && !capabilities.temperature.contains(&temperature)
        {
            return Err(LlmError::validation(
                name,
                format!(
                    "Temperature must be between {} and {}",
                    capabilities.temperature.start(),
                    capabilities.temperature.end()
                ),
            ));
        }

        if options.user_id.is_none() && capabilities.options.contains(&"user_id") {
            options.user_id.clone_from(&self.default_user);
        }

        Ok(CompletionRequest {
            model: self.rewrite.apply(&request.model),
            messages,
            options,
        })
    }

    /// Run one completion; the `stream` option selects the result shape
    ///
    /// # Errors
    ///
    /// Returns a 422 from [`prepare`](Self::prepare) or the vendor error
    pub async fn completion(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let request = self.prepare(request)?;

        if request.options.stream {
            self.provider.complete_stream(&request).await.map(Completion::Stream)
        } else {
            self.provider.complete(&request).await.map(Completion::Response)
        }
    }

    /// [`completion`](Self::completion) on a spawned task
    ///
    /// Each call awaits its own task, so results reach the caller in call
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the completion error, or a 500 if the task panicked
    pub async fn acompletion(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let handle = self.clone();
        let name = handle.name().to_owned();
        tokio::spawn(async move { handle.completion(request).await })
            .await
            .map_err(|e| LlmError::internal(name, format!("completion task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::{CompletionOptions, ContentPart, FinishReason, Message};

    fn request(model: &str, messages: Vec<Message>, options: CompletionOptions) -> CompletionRequest {
        CompletionRequest {
            model: model.to_owned(),
            messages,
            options,
        }
    }

    fn keyed() -> ProviderSettings {
        ProviderSettings::default()
            .with_api_key("test-key")
            .with_base_url(Url::parse("http://127.0.0.1:9").unwrap())
    }

    async fn echo_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi there"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            })))
            .mount(&server)
            .await;
        server
    }

    async fn sent_body(server: &MockServer) -> serde_json::Value {
        let received = server.received_requests().await.unwrap();
        serde_json::from_slice(&received[0].body).unwrap()
    }

    #[test]
    fn native_names_route_case_insensitively() {
        assert_eq!(route(Some("ZhipuAI")).unwrap(), Route::Native(Vendor::Zhipuai));
        assert_eq!(route(Some("Gemini")).unwrap(), Route::Native(Vendor::Gemini));
        assert_eq!(route(Some("deepseek")).unwrap(), Route::Native(Vendor::Deepseek));
    }

    #[test]
    fn fallback_policies_follow_provider_lists() {
        assert_eq!(
            route(Some("Groq")).unwrap(),
            Route::Fallback {
                provider: Some("groq".to_owned()),
                rewrite: ModelRewrite::Prefix("groq".to_owned()),
            }
        );
        assert_eq!(
            route(Some("openai")).unwrap(),
            Route::Fallback {
                provider: Some("openai".to_owned()),
                rewrite: ModelRewrite::AsGiven,
            }
        );
        assert_eq!(
            route(Some("vllm")).unwrap(),
            Route::Fallback {
                provider: Some("vllm".to_owned()),
                rewrite: ModelRewrite::Prefix("openai".to_owned()),
            }
        );
        assert_eq!(
            route(None).unwrap(),
            Route::Fallback {
                provider: None,
                rewrite: ModelRewrite::AsGiven,
            }
        );
    }

    #[test]
    fn unknown_provider_is_not_supported() {
        let err = route(Some("not-a-real-vendor")).unwrap_err();
        assert!(matches!(err, LlmError::ProviderNotSupported { ref provider } if provider == "not-a-real-vendor"));
        assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
        assert!(resolve(Some("not-a-real-vendor"), &keyed()).is_err());
    }

    #[test]
    fn prefix_is_not_doubled() {
        let rewrite = ModelRewrite::Prefix("groq".to_owned());
        assert_eq!(rewrite.apply("llama3-8b"), "groq/llama3-8b");
        assert_eq!(rewrite.apply("groq/llama3-8b"), "groq/llama3-8b");
        assert_eq!(rewrite.apply("groqish/model"), "groq/groqish/model");
    }

    #[test]
    fn missing_credential_fails_at_resolution() {
        temp_env::with_var_unset(openai_compat::MOONSHOT.key_var, || {
            let err = resolve(Some("moonshot"), &ProviderSettings::default()).unwrap_err();
            assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
            assert!(err.client_message().contains("API key"));
        });
    }

    #[test]
    fn empty_model_and_messages_are_rejected() {
        let handle = resolve(Some("moonshot"), &keyed()).unwrap();

        let err = handle
            .prepare(request("", vec![Message::user("Hi")], CompletionOptions::default()))
            .unwrap_err();
        assert!(err.client_message().contains("model"));

        let err = handle
            .prepare(request("moonshot-v1-8k", Vec::new(), CompletionOptions::default()))
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn tool_message_without_id_is_rejected() {
        let handle = resolve(Some("deepseek"), &keyed()).unwrap();
        let mut orphan = Message::tool("call_1", "42");
        orphan.tool_call_id = None;

        let err = handle
            .prepare(request("deepseek-chat", vec![orphan], CompletionOptions::default()))
            .unwrap_err();
        assert!(err.client_message().contains("tool_call_id"));
    }

    #[test]
    fn image_rejected_for_text_only_model() {
        let handle = resolve(Some("deepseek"), &keyed()).unwrap();
        let messages = vec![Message::user_parts(vec![ContentPart::image("http://x/y.png")])];

        let err = handle
            .prepare(request("deepseek-chat", messages, CompletionOptions::default()))
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.client_message().contains("Vision input is not supported"));
    }

    #[test]
    fn temperature_range_is_per_vendor() {
        let options = CompletionOptions {
            temperature: Some(1.5),
            ..CompletionOptions::default()
        };

        let err = resolve(Some("moonshot"), &keyed())
            .unwrap()
            .prepare(request("moonshot-v1-8k", vec![Message::user("Hi")], options.clone()))
            .unwrap_err();
        assert_eq!(err.client_message(), "Temperature must be between 0 and 1");

        let prepared = resolve(Some("deepseek"), &keyed())
            .unwrap()
            .prepare(request("deepseek-chat", vec![Message::user("Hi")], options))
            .unwrap();
        assert_eq!(prepared.options.temperature, Some(1.5));
    }

    #[test]
    fn default_user_fills_vendors_that_accept_one() {
        let mut settings = keyed();
        settings.user = Some("team-a".to_owned());

        let prepared = resolve(Some("dify"), &settings)
            .unwrap()
            .prepare(request("app", vec![Message::user("Hi")], CompletionOptions::default()))
            .unwrap();
        assert_eq!(prepared.options.user_id.as_deref(), Some("team-a"));

        let prepared = resolve(Some("moonshot"), &settings)
            .unwrap()
            .prepare(request("moonshot-v1-8k", vec![Message::user("Hi")], CompletionOptions::default()))
            .unwrap();
        assert_eq!(prepared.options.user_id, None);
    }

    #[tokio::test]
    async fn unknown_options_never_reach_the_vendor() {
        let server = echo_server().await;
        let settings = ProviderSettings::default()
            .with_api_key("zp-key")
            .with_base_url(Url::parse(&server.uri()).unwrap());

        let mut options = CompletionOptions {
            top_p: Some(0.9),
            max_tokens: Some(64),
            ..CompletionOptions::default()
        };
        options.extra.insert("frobnicate".to_owned(), json!(true));

        let completion = resolve(Some("zhipuai"), &settings)
            .unwrap()
            .completion(request("glm-4", vec![Message::user("Hello")], options))
            .await
            .unwrap();
        let response = completion.into_response().unwrap();
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));

        let body = sent_body(&server).await;
        assert_eq!(body["max_tokens"], 64);
        assert!(body.get("top_p").is_none());
        assert!(body.get("frobnicate").is_none());
    }

    #[tokio::test]
    async fn fallback_rewrites_model_before_sending() {
        let server = echo_server().await;
        let settings = ProviderSettings::default().with_base_url(Url::parse(&server.uri()).unwrap());

        assert_eq!(resolve(Some("siliconflow"), &settings).unwrap().name(), "siliconflow");
        completion(
            Some("siliconflow"),
            &settings,
            request("Qwen/Qwen2-7B", vec![Message::user("Hello")], CompletionOptions::default()),
        )
        .await
        .unwrap();

        assert_eq!(sent_body(&server).await["model"], "openai/Qwen/Qwen2-7B");
    }

    #[tokio::test]
    async fn dispatcher_uses_matching_settings_table() {
        let server = echo_server().await;
        let config = Config::from_toml_str(&format!(
            "[providers.deepseek]\napi_key = \"ds-key\"\nbase_url = \"{}\"\n",
            server.uri()
        ))
        .unwrap();

        let completion = Dispatcher::new(config)
            .acompletion(
                Some("DeepSeek"),
                request("deepseek-chat", vec![Message::user("Hello")], CompletionOptions::default()),
            )
            .await
            .unwrap();
        let response = completion.collect().await.unwrap();
        assert_eq!(response.text(), Some("Hi there"));
        assert_eq!(response.usage.total_tokens, Some(5));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received[0].headers.get("authorization").unwrap(), "Bearer ds-key");
    }

    #[tokio::test]
    async fn acompletion_delivers_results_in_call_order() {
        let server = echo_server().await;
        let settings = ProviderSettings::default()
            .with_api_key("ms-key")
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let handle = resolve(Some("moonshot"), &settings).unwrap();

        let first = handle
            .acompletion(request("moonshot-v1-8k", vec![Message::user("one")], CompletionOptions::default()))
            .await
            .unwrap();
        let second = handle
            .acompletion(request("moonshot-v1-8k", Vec::new(), CompletionOptions::default()))
            .await;

        assert!(first.into_response().is_some());
        assert_eq!(second.unwrap_err().status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
