//! Vendors with a native adapter

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Vendor served by a bespoke adapter
///
/// Parsing is case-insensitive and uses the snake_case names callers pass
/// as the provider (`"zhipuai"`, `"xunfei_http"`, `"azure_anthropic"`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Vendor {
    Zhipuai,
    Moonshot,
    Minimax,
    Qwen,
    Tiangong,
    Baichuan,
    Wenxin,
    Xunfei,
    XunfeiHttp,
    Dify,
    Fastgpt,
    Coze,
    Lingyi,
    Stepfun,
    Doubao,
    Deepseek,
    Gemini,
    AzureAnthropic,
}
