//! `FastGPT` chat completions with `detail=true`
//!
//! The request is OpenAI-shaped with `chatId` and `detail` added as
//! extension fields; responses gain a `responseData` module list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::openai::OpenAiResponse;

/// Blocking response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastGptResponse {
    /// OpenAI-shaped body
    #[serde(flatten)]
    pub completion: OpenAiResponse,
    /// Per-module execution details
    #[serde(default, rename = "responseData")]
    pub response_data: Vec<FastGptModule>,
}

/// Execution detail of one workflow module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FastGptModule {
    /// Module name
    #[serde(default, rename = "moduleName")]
    pub module_name: Option<String>,
    /// Knowledge-base hits, on search modules
    #[serde(default, rename = "quoteList")]
    pub quote_list: Option<Vec<FastGptQuote>>,
}

/// Knowledge-base hit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FastGptQuote {
    /// Entry identifier (string or number)
    #[serde(default)]
    pub id: Value,
    /// Question side of the entry
    #[serde(default)]
    pub q: String,
    /// Answer side of the entry
    #[serde(default)]
    pub a: String,
}
