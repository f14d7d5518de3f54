//! iFlytek Spark adapter over the native WebSocket protocol
//!
//! Each call opens one socket with an HMAC-signed handshake URL, sends a
//! single request frame and reads frames until `header.status == 2`. A
//! worker task owns the socket and forwards translated frames over a
//! bounded channel; dropping the stream closes the channel, which stops the
//! worker and closes the socket.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tributary_config::ProviderSettings;
use url::Url;

use super::{Provider, ProviderCapabilities, STANDARD_TEMPERATURE, decode_frame};
use crate::convert::spark::{chunk_from_spark, to_spark};
use crate::error::LlmError;
use crate::protocol::spark::SparkResponse;
use crate::stream::{ChunkStream, Completion};
use crate::types::{ChatCompletion, ChatCompletionChunk, CompletionRequest, ResponseStamp};

const NAME: &str = "xunfei";

/// Environment variable holding the application id
pub const APP_ID_VAR: &str = "XUNFEI_APP_ID";

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "XUNFEI_API_KEY";

/// Environment variable holding the API secret
pub const API_SECRET_VAR: &str = "XUNFEI_API_SECRET";

const OPTIONS: &[&str] = &["max_tokens", "temperature", "top_k", "stream", "user_id"];

/// Frames buffered between the socket worker and the consumer
const CHANNEL_CAPACITY: usize = 32;

type HmacSha256 = Hmac<Sha256>;
type SparkSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Chat endpoint for a model domain
fn spark_url(model: &str) -> Option<&'static str> {
    match model {
        "generalv3.5" => Some("wss://spark-api.xf-yun.com/v3.5/chat"),
        "generalv3" => Some("wss://spark-api.xf-yun.com/v3.1/chat"),
        "generalv2" => Some("wss://spark-api.xf-yun.com/v2.1/chat"),
        "general" => Some("wss://spark-api.xf-yun.com/v1.1/chat"),
        _ => None,
    }
}

/// Current time in the RFC 1123 form the signature expects
fn http_date() -> Result<String, LlmError> {
    jiff::fmt::rfc2822::DateTimePrinter::new()
        .timestamp_to_rfc9110_string(&jiff::Timestamp::now())
        .map_err(|e| LlmError::internal(NAME, format!("failed to format date: {e}")))
}

/// Handshake URL carrying `authorization`, `date` and `host` query
/// parameters
fn signed_url(url: &Url, api_key: &str, api_secret: &str, date: &str) -> Result<Url, LlmError> {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        (None, _) => return Err(LlmError::internal(NAME, format!("endpoint has no host: {url}"))),
    };

    let origin = format!("host: {host}\ndate: {date}\nGET {} HTTP/1.1", url.path());
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| LlmError::internal(NAME, format!("invalid API secret: {e}")))?;
    mac.update(origin.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let authorization = format!(
        r#"api_key="{api_key}", algorithm="hmac-sha256", headers="host date request-line", signature="{signature}""#
    );

    let mut signed = url.clone();
    signed
        .query_pairs_mut()
        .append_pair("authorization", &BASE64.encode(authorization))
        .append_pair("date", date)
        .append_pair("host", &host);
    Ok(signed)
}

/// Spark WebSocket provider
pub struct XunfeiProvider {
    app_id: String,
    api_key: SecretString,
    api_secret: SecretString,
    endpoint: Option<Url>,
    timeout: Option<Duration>,
}

impl XunfeiProvider {
    /// Create from provider settings
    ///
    /// A configured `base_url` is used as the chat endpoint for every model.
    ///
    /// # Errors
    ///
    /// Returns a 422 if a credential is missing or the timeout is invalid
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            app_id: super::require_value(NAME, settings.app_id.as_deref(), APP_ID_VAR, "app_id")?,
            api_key: super::require_api_key(NAME, settings, API_KEY_VAR)?,
            api_secret: super::require_secret(NAME, settings.api_secret.as_ref(), API_SECRET_VAR, "api_secret")?,
            endpoint: settings.base_url.clone(),
            timeout: settings.timeout().map_err(|e| LlmError::validation(NAME, e.to_string()))?,
        })
    }

    fn endpoint_for(&self, model: &str) -> Result<Url, LlmError> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let raw = spark_url(model).ok_or_else(|| LlmError::validation(NAME, format!("Unsupported model: {model}")))?;
        Url::parse(raw).map_err(|e| LlmError::internal(NAME, format!("invalid endpoint: {e}")))
    }

    async fn connect(&self, url: &Url) -> Result<SparkSocket, LlmError> {
        let handshake = connect_async(url.as_str());
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| LlmError::internal(NAME, format!("handshake timed out after {timeout:?}")))?,
            None => handshake.await,
        };

        let (socket, _) = result.map_err(|e| {
            tracing::error!(provider = NAME, error = %e, "upstream request failed");
            match e {
                WsError::Http(response) => {
                    let status = response.status();
                    LlmError::upstream(NAME, status.as_u16(), format!("provider returned {status}"))
                }
                other => LlmError::internal(NAME, other.to_string()),
            }
        })?;
        Ok(socket)
    }
}

/// Translate one text frame; the flag marks the session's last frame
fn translate(
    text: &str,
    model: &str,
    stamp: &mut Option<ResponseStamp>,
) -> Result<(ChatCompletionChunk, bool), LlmError> {
    let frame: SparkResponse = decode_frame(NAME, text)?;
    if frame.header.code != 0 {
        return Err(super::vendor_error(
            NAME,
            frame.header.code,
            frame.header.message.as_deref().unwrap_or("unknown error"),
        ));
    }

    let first = stamp.is_none();
    let stamp = stamp.get_or_insert_with(|| ResponseStamp::new(model).with_id(frame.header.sid.clone()));
    Ok((chunk_from_spark(stamp, &frame, first), frame.header.is_last()))
}

/// Forward translated frames until the last frame, the first error, or
/// the consumer going away
async fn relay(mut socket: SparkSocket, model: String, tx: mpsc::Sender<Result<ChatCompletionChunk, LlmError>>) {
    let mut stamp = None;

    while let Some(message) = socket.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                let _ = tx
                    .send(Err(LlmError::internal(NAME, format!("stream read failed: {e}"))))
                    .await;
                break;
            }
        };

        let (item, last) = match translate(text.as_str(), &model, &mut stamp) {
            Ok((chunk, last)) => (Ok(chunk), last),
            Err(e) => (Err(e), true),
        };
        if tx.send(item).await.is_err() || last {
            break;
        }
    }

    if let Err(e) = socket.close(None).await {
        tracing::debug!(provider = NAME, error = %e, "socket close failed");
    }
}

#[async_trait]
impl Provider for XunfeiProvider {
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
        Completion::Stream(self.complete_stream(request).await?).collect().await
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, LlmError> {
        let endpoint = self.endpoint_for(&request.model)?;
        let url = signed_url(
            &endpoint,
            self.api_key.expose_secret(),
            self.api_secret.expose_secret(),
            &http_date()?,
        )?;

        let mut socket = self.connect(&url).await?;
        let frame = serde_json::to_string(&to_spark(request, &self.app_id))
            .map_err(|e| LlmError::internal(NAME, format!("failed to encode request: {e}")))?;
        socket
            .send(Message::text(frame))
            .await
            .map_err(|e| LlmError::internal(NAME, format!("failed to send request frame: {e}")))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(relay(socket, request.model.clone(), tx));

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}
