//! Conversion for `FastGPT` requests and knowledge-base quotes

use serde_json::Value;

use crate::protocol::fastgpt::{FastGptModule, FastGptQuote};
use crate::protocol::openai::OpenAiRequest;
use crate::types::{CompletionRequest, Context};

/// OpenAI-shaped request with `detail` enabled and `chatId` taken from
/// the conversation id
pub fn to_fastgpt(request: &CompletionRequest) -> OpenAiRequest {
    let mut body = OpenAiRequest::from(request);
    body.extra.insert("detail".to_owned(), Value::Bool(true));
    if let Some(chat_id) = &request.options.conversation_id {
        body.extra.insert("chatId".to_owned(), Value::String(chat_id.clone()));
    }
    body
}

fn quote_context(quote: &FastGptQuote) -> Context {
    Context {
        id: match &quote.id {
            Value::String(id) => id.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        },
        content: format!("question:[{}], answer:[{}]", quote.q, quote.a),
        score: None,
    }
}

/// Quotes of every search module, in module order
pub fn context_from_modules(modules: &[FastGptModule]) -> Vec<Context> {
    modules
        .iter()
        .filter_map(|module| module.quote_list.as_ref())
        .flatten()
        .map(quote_context)
        .collect()
}
