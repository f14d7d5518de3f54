//! Adapter for vendors exposing an OpenAI-compatible `/chat/completions`

use std::ops::RangeInclusive;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{
    COMMON_OPTIONS, Provider, ProviderCapabilities, STANDARD_TEMPERATURE, WIDE_TEMPERATURE, decode_frame, parse_json,
    send,
};
use crate::convert::openai::{OpenAiStreamState, completion_from_openai};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse, OpenAiStreamChunk};
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest};

/// Options for vendors that reject `top_p`
const NO_TOP_P_OPTIONS: &[&str] = &[
    "max_tokens",
    "temperature",
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

/// Options for Volcengine Ark, which rejects `top_p` and `n`
const DOUBAO_OPTIONS: &[&str] = &[
    "max_tokens",
    "temperature",
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

/// Static description of one OpenAI-compatible vendor
#[derive(Debug, Clone)]
pub struct CompatVendor {
    /// Provider name
    pub name: &'static str,
    /// Environment variable holding the API key
    pub key_var: &'static str,
    /// Default API base URL
    pub base_url: &'static str,
    /// Option allowlist
    pub options: &'static [&'static str],
    /// Accepted temperature range
    pub temperature: RangeInclusive<f64>,
    /// Whether the vendor honours `stream_options.include_usage`
    pub stream_usage: bool,
}

/// Zhipu AI (GLM)
pub const ZHIPUAI: CompatVendor = CompatVendor {
    name: "zhipuai",
    key_var: "ZHIPUAI_API_KEY",
    base_url: "https://open.bigmodel.cn/api/paas/v4",
    options: NO_TOP_P_OPTIONS,
    temperature: STANDARD_TEMPERATURE,
    stream_usage: false,
};

/// Moonshot (Kimi)
pub const MOONSHOT: CompatVendor = CompatVendor {
    name: "moonshot",
    key_var: "MOONSHOT_API_KEY",
    base_url: "https://api.moonshot.cn/v1",
    options: COMMON_OPTIONS,
    temperature: STANDARD_TEMPERATURE,
    stream_usage: false,
};

/// 01.AI (Yi)
pub const LINGYI: CompatVendor = CompatVendor {
    name: "lingyi",
    key_var: "LINGYI_API_KEY",
    base_url: "https://api.lingyiwanwu.com/v1",
    options: COMMON_OPTIONS,
    temperature: STANDARD_TEMPERATURE,
    stream_usage: false,
};

/// StepFun
pub const STEPFUN: CompatVendor = CompatVendor {
    name: "stepfun",
    key_var: "STEPFUN_API_KEY",
    base_url: "https://api.stepfun.com/v1",
    options: COMMON_OPTIONS,
    temperature: STANDARD_TEMPERATURE,
    stream_usage: false,
};

/// DeepSeek; reasoning models also return `reasoning_content`
pub const DEEPSEEK: CompatVendor = CompatVendor {
    name: "deepseek",
    key_var: "DEEPSEEK_API_KEY",
    base_url: "https://api.deepseek.com",
    options: COMMON_OPTIONS,
    temperature: WIDE_TEMPERATURE,
    stream_usage: true,
};

/// Volcengine Ark (Doubao)
pub const DOUBAO: CompatVendor = CompatVendor {
    name: "doubao",
    key_var: "ARK_API_KEY",
    base_url: "https://ark.cn-beijing.volces.com/api/v3",
    options: DOUBAO_OPTIONS,
    temperature: STANDARD_TEMPERATURE,
    stream_usage: true,
};

/// Baichuan
pub const BAICHUAN: CompatVendor = CompatVendor {
    name: "baichuan",
    key_var: "BAICHUAN_API_KEY",
    base_url: "https://api.baichuan-ai.com/v1",
    options: COMMON_OPTIONS,
    temperature: STANDARD_TEMPERATURE,
    stream_usage: false,
};

/// iFlytek Spark over its HTTP gateway
pub const XUNFEI_HTTP: CompatVendor = CompatVendor {
    name: "xunfei_http",
    key_var: "XUNFEI_API_PASSWORD",
    base_url: "https://spark-api-open.xf-yun.com/v1",
    options: COMMON_OPTIONS,
    temperature: STANDARD_TEMPERATURE,
    stream_usage: false,
};

/// OpenAI-compatible provider
pub struct OpenAiCompatProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    options: &'static [&'static str],
    temperature: RangeInclusive<f64>,
    stream_usage: bool,
}

impl OpenAiCompatProvider {
    /// Create for a known vendor
    ///
    /// # Errors
    ///
    /// Returns a 422 if no API key is configured or the timeout is invalid
    pub fn new(vendor: &CompatVendor, settings: &ProviderSettings) -> Result<Self, LlmError> {
        let api_key = super::require_api_key(vendor.name, settings, vendor.key_var)?;
        Ok(Self {
            name: vendor.name.to_owned(),
            client: super::http_client(vendor.name, settings)?,
            base_url: super::base_url(vendor.name, settings, vendor.base_url)?,
            api_key: Some(api_key),
            options: vendor.options,
            temperature: vendor.temperature.clone(),
            stream_usage: vendor.stream_usage,
        })
    }

    /// Create for an arbitrary endpoint where the key is optional
    pub(crate) fn custom(
        name: impl Into<String>,
        client: Client,
        base_url: Url,
        api_key: Option<SecretString>,
        options: &'static [&'static str],
    ) -> Self {
        Self {
            name: name.into(),
            client,
            base_url,
            api_key,
            options,
            temperature: WIDE_TEMPERATURE,
            stream_usage: true,
        }
    }

    /// Build the chat completions URL
    fn completions_url(&self) -> String {
        super::endpoint(&self.base_url, "chat/completions")
    }

    fn request(&self, body: &OpenAiRequest) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.completions_url()).json(body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            options: self.options,
            temperature: self.temperature.clone(),
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ChatCompletion, LlmError> {
        let mut wire_request: OpenAiRequest = request.into();
        wire_request.stream = None;

        let response = send(&self.name, self.request(&wire_request)).await?;
        let wire_response: OpenAiResponse = parse_json(&self.name, response).await?;

        if let Some(error) = &wire_response.error {
            return Err(LlmError::internal(&self.name, error.message.clone()));
        }
        if wire_response.choices.is_empty() {
            return Err(LlmError::internal(&self.name, "response contained no choices"));
        }

        Ok(completion_from_openai(&wire_response, &request.model))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let mut wire_request: OpenAiRequest = request.into();
        wire_request.stream = Some(true);
        if self.stream_usage {
            wire_request = wire_request.with_stream_usage();
        }

        let response = send(&self.name, self.request(&wire_request)).await?;

        let name = self.name.clone();
        let mut state = OpenAiStreamState::new(request.model.clone());
        Ok(sse_stream(self.name.clone(), response, move |event| {
            let chunk: OpenAiStreamChunk = decode_frame(&name, &event.data)?;
            if let Some(error) = &chunk.error {
                return Err(LlmError::internal(&name, error.message.clone()));
            }
            Ok(Frames::Emit(state.convert(&chunk)))
        }))
    }
}
