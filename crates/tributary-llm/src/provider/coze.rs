//! Coze bot adapter
//!
//! The model name is informational; the bot is chosen by `bot_id`.
//! Blocking calls go to the v2 chat endpoint and streaming calls to v3.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame, parse_json, send};
use crate::convert::coze::{CozeStreamState, completion_from_v2, coze_turns, generate_uid};
use crate::error::LlmError;
use crate::protocol::coze::{CozeChat, CozeError, CozeMessage, CozeV2Request, CozeV2Response, CozeV3Request};
use crate::stream::{ChunkStream, Frames, sse_stream};
use crate::types::{ChatCompletion, CompletionRequest, Message, Role};

const NAME: &str = "coze";

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.coze.com";

/// Environment variable holding the personal access token
pub const API_KEY_VAR: &str = "COZE_API_KEY";

/// Environment variable holding the bot id
pub const BOT_ID_VAR: &str = "COZE_BOT_ID";

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
    "user_id",
    "conversation_id",
];

/// Coze provider
pub struct CozeProvider {
    client: Client,
    base_url: Url,
    api_key: SecretString,
    bot_id: String,
}

impl CozeProvider {
    /// Create from provider settings
    ///
    /// # Errors
    ///
    /// Returns a 422 if the API key or bot id is missing
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            api_key: super::require_api_key(NAME, settings, API_KEY_VAR)?,
            bot_id: super::require_value(NAME, settings.bot_id.as_deref(), BOT_ID_VAR, "bot_id")?,
            client: super::http_client(NAME, settings)?,
            base_url: super::base_url(NAME, settings, DEFAULT_BASE_URL)?,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(super::endpoint(&self.base_url, path))
            .bearer_auth(self.api_key.expose_secret())
    }
}

/// Split off the final question, which must come from the user
fn split_question(request: &CompletionRequest) -> Result<(String, &[Message]), LlmError> {
    match request.messages.split_last() {
        Some((last, history)) if last.role == Role::User => Ok((last.content.as_text(), history)),
        _ => Err(LlmError::validation(NAME, "Last message role should be user")),
    }
}

fn user(request: &CompletionRequest) -> String {
    request.options.user_id.clone().unwrap_or_else(generate_uid)
}

fn chat_error(error: Option<&CozeError>) -> LlmError {
    match error {
        Some(error) => super::vendor_error(NAME, error.code, &error.msg),
        None => LlmError::internal(NAME, "chat failed"),
    }
}

#[async_trait]
impl Provider for CozeProvider {
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
        let (query, history) = split_question(request)?;
        let body = CozeV2Request {
            bot_id: self.bot_id.clone(),
            user: user(request),
            query,
            chat_history: coze_turns(history),
            stream: false,
            conversation_id: request.options.conversation_id.clone(),
        };

        let response = send(NAME, self.post("open_api/v2/chat").json(&body)).await?;
        let wire_response: CozeV2Response = parse_json(NAME, response).await?;

        if wire_response.code != 0 {
            return Err(super::vendor_error(
                NAME,
                wire_response.code,
                wire_response.msg.as_deref().unwrap_or("unknown error"),
            ));
        }
        completion_from_v2(&wire_response, &request.model)
            .ok_or_else(|| LlmError::internal(NAME, "bot returned no answer"))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        split_question(request)?;
        let body = CozeV3Request {
            bot_id: self.bot_id.clone(),
            user_id: user(request),
            additional_messages: coze_turns(&request.messages),
            stream: true,
            auto_save_history: true,
        };

        let mut builder = self.post("v3/chat").json(&body);
        if let Some(conversation_id) = &request.options.conversation_id {
            builder = builder.query(&[("conversation_id", conversation_id)]);
        }
        let response = send(NAME, builder).await?;

        let mut state = CozeStreamState::new(request.model.clone());
        Ok(sse_stream(NAME, response, move |event| match event.event.as_str() {
            "conversation.chat.created" | "conversation.chat.in_progress" => {
                let chat: CozeChat = decode_frame(NAME, &event.data)?;
                state.chat_started(&chat);
                Ok(Frames::none())
            }
            "conversation.message.delta" => {
                let message: CozeMessage = decode_frame(NAME, &event.data)?;
                Ok(Frames::Emit(state.message_delta(&message)))
            }
            "conversation.message.completed" => {
                let message: CozeMessage = decode_frame(NAME, &event.data)?;
                Ok(Frames::Emit(state.message_completed(&message)))
            }
            "conversation.chat.completed" => {
                let chat: CozeChat = decode_frame(NAME, &event.data)?;
                Ok(Frames::Emit(state.chat_completed(&chat)))
            }
            "conversation.chat.failed" => {
                let chat: CozeChat = decode_frame(NAME, &event.data)?;
                Err(chat_error(chat.last_error.as_ref()))
            }
            "error" => {
                let error: CozeError = decode_frame(NAME, &event.data)?;
                Err(chat_error(Some(&error)))
            }
            "done" => Ok(Frames::Done),
            _ => Ok(Frames::none()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::stream::Completion;
    use crate::types::CompletionOptions;

    fn provider(server: &MockServer) -> CozeProvider {
        let settings = ProviderSettings::default()
            .with_api_key("pat-1")
            .with_bot_id("bot-7")
            .with_base_url(Url::parse(&server.uri()).unwrap());
        CozeProvider::new(&settings).unwrap()
    }

    fn request(messages: Vec<Message>, options: CompletionOptions) -> CompletionRequest {
        CompletionRequest {
            model: "coze-bot".to_owned(),
            messages,
            options,
        }
    }

    #[tokio::test]
    async fn blocking_sends_history_and_question() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open_api/v2/chat"))
            .and(header("authorization", "Bearer pat-1"))
            .and(body_partial_json(json!({
                "bot_id": "bot-7",
                "user": "u-1",
                "query": "And Coze?",
                "stream": false,
                "chat_history": [
                    {"role": "user", "content": "Hi", "content_type": "text"},
                    {"role": "assistant", "type": "answer", "content": "Hello", "content_type": "text"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "success",
                "conversation_id": "conv-3",
                "messages": [
                    {"role": "assistant", "type": "answer", "content": "A bot platform.", "content_type": "text"},
                    {"role": "assistant", "type": "follow_up", "content": "Anything else?", "content_type": "text"}
                ]
            })))
            .mount(&server)
            .await;

        let options = CompletionOptions {
            user_id: Some("u-1".to_owned()),
            ..CompletionOptions::default()
        };
        let messages = vec![
            Message::user("Hi"),
            Message::assistant("Hello"),
            Message::user("And Coze?"),
        ];

        let completion = provider(&server).complete(&request(messages, options)).await.unwrap();
        assert_eq!(completion.text(), Some("A bot platform."));
        assert_eq!(completion.conversation_id.as_deref(), Some("conv-3"));
        assert_eq!(completion.model, "coze-bot");
    }

    #[tokio::test]
    async fn nonzero_code_is_vendor_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open_api/v2/chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 4015, "msg": "bot not published"})),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&request(vec![Message::user("Hi")], CompletionOptions::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.client_message().contains("bot not published"));
    }

    #[tokio::test]
    async fn last_message_must_be_user() {
        let server = MockServer::start().await;
        let err = provider(&server)
            .complete_stream(&request(
                vec![Message::user("Hi"), Message::assistant("Hello")],
                CompletionOptions::default().streaming(),
            ))
            .await
            .err()
            .unwrap();

        assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_collects_answer_usage_and_knowledge() {
        let verbose = json!({"verbose_type": "knowledge", "chunks": [{"slice": "Coze hosts bots.", "score": 0.7}]})
            .to_string();
        let verbose_message = json!({
            "id": "m0", "chat_id": "chat-1", "conversation_id": "conv-4",
            "role": "assistant", "type": "verbose", "content": verbose, "content_type": "text"
        });
        let body = [
            ("conversation.chat.created", json!({"id": "chat-1", "conversation_id": "conv-4", "status": "created"})),
            ("conversation.message.completed", verbose_message),
            (
                "conversation.message.delta",
                json!({"id": "m1", "chat_id": "chat-1", "conversation_id": "conv-4", "role": "assistant",
                       "type": "answer", "content": "Hosts ", "content_type": "text"}),
            ),
            (
                "conversation.message.delta",
                json!({"id": "m1", "chat_id": "chat-1", "conversation_id": "conv-4", "role": "assistant",
                       "type": "answer", "content": "bots.", "content_type": "text"}),
            ),
            (
                "conversation.message.completed",
                json!({"id": "m1", "chat_id": "chat-1", "conversation_id": "conv-4", "role": "assistant",
                       "type": "answer", "content": "Hosts bots.", "content_type": "text"}),
            ),
            (
                "conversation.chat.completed",
                json!({"id": "chat-1", "conversation_id": "conv-4", "status": "completed",
                       "usage": {"token_count": 9, "output_count": 4, "input_count": 5}}),
            ),
        ]
        .iter()
        .map(|(event, data)| format!("event:{event}\ndata:{data}\n\n"))
        .chain(std::iter::once("event:done\ndata:\"[DONE]\"\n\n".to_owned()))
        .collect::<String>();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/chat"))
            .and(query_param("conversation_id", "conv-4"))
            .and(body_partial_json(json!({"bot_id": "bot-7", "stream": true, "auto_save_history": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let options = CompletionOptions {
            conversation_id: Some("conv-4".to_owned()),
            ..CompletionOptions::default().streaming()
        };
        let stream = provider(&server)
            .complete_stream(&request(vec![Message::user("What is Coze?")], options))
            .await
            .unwrap();
        let response = Completion::Stream(stream).collect().await.unwrap();

        assert_eq!(response.id, "chat-1");
        assert_eq!(response.text(), Some("Hosts bots."));
        assert_eq!(response.conversation_id.as_deref(), Some("conv-4"));
        assert_eq!(response.usage.total_tokens, Some(9));
        assert_eq!(response.context[0].content, "Coze hosts bots.");
    }

    #[tokio::test]
    async fn failed_chat_aborts_stream() {
        let body = concat!(
            "event:conversation.chat.created\ndata:{\"id\":\"chat-2\",\"conversation_id\":\"conv-5\"}\n\n",
            "event:conversation.chat.failed\n",
            "data:{\"id\":\"chat-2\",\"status\":\"failed\",\"last_error\":{\"code\":4011,\"msg\":\"quota exceeded\"}}\n\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .complete_stream(&request(vec![Message::user("Hi")], CompletionOptions::default().streaming()))
            .await
            .unwrap();
        let err = Completion::Stream(stream).collect().await.unwrap_err();
        assert!(err.client_message().contains("quota exceeded"));
    }

    #[test]
    fn missing_bot_id_is_rejected() {
        temp_env::with_var_unset(BOT_ID_VAR, || {
            let settings = ProviderSettings::default().with_api_key("pat-1");
            let err = CozeProvider::new(&settings).err().unwrap();
            assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
            assert!(err.client_message().contains(BOT_ID_VAR));
        });
    }
}
