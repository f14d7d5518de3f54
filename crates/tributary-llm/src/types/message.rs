use serde::{Deserialize, Serialize};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

impl Role {
    /// Wire spelling of the role
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    #[serde(default)]
    pub content: Content,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is a response to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// System instruction
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    /// Plain-text user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    /// Multi-part user turn
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(Role::User, Content::Parts(parts))
    }

    /// Plain-text assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }

    /// Assistant turn that only requests tool calls
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::new(Role::Assistant, Content::default())
        }
    }

    /// Result of a tool invocation
    pub fn tool(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, Content::Text(output.into()))
        }
    }

    /// Check structural invariants
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant
    pub fn validate(&self) -> Result<(), String> {
        if self.role == Role::Tool && self.tool_call_id.as_deref().is_none_or(str::is_empty) {
            return Err("Tool messages must carry tool_call_id".to_owned());
        }
        Ok(())
    }
}

/// Message content, either plain text or structured parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Ordered content parts (text, image, video, file)
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Content {
    /// Concatenated text, ignoring non-text parts
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Whether any part carries non-text content
    pub fn has_media(&self) -> bool {
        matches!(self, Self::Parts(parts) if parts.iter().any(|p| p.modality() != Modality::Text))
    }
}

/// Kind of payload a content part carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Video,
    File,
}

/// Individual part within a multipart message
///
/// Deserialization also accepts the `image_url` / `video_url` / `file_url`
/// shapes used by chat-completion clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "RawContentPart")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference
    Image {
        /// URL or base64 data URI
        url: String,
        /// Detail level hint (e.g. "auto", "low", "high")
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Video reference
    Video {
        /// URL of the video
        url: String,
    },
    /// File reference
    File {
        /// URL or inline (data URI) payload
        data: String,
    },
}

impl ContentPart {
    /// Text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image part
    pub fn image(url: impl Into<String>) -> Self {
        Self::Image {
            url: url.into(),
            detail: None,
        }
    }

    /// Video part
    pub fn video(url: impl Into<String>) -> Self {
        Self::Video { url: url.into() }
    }

    /// File part
    pub fn file(data: impl Into<String>) -> Self {
        Self::File { data: data.into() }
    }

    /// Modality of this part
    pub const fn modality(&self) -> Modality {
        match self {
            Self::Text { .. } => Modality::Text,
            Self::Image { .. } => Modality::Image,
            Self::Video { .. } => Modality::Video,
            Self::File { .. } => Modality::File,
        }
    }

    /// URL or inline payload of a non-text part
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { url, .. } | Self::Video { url } => Some(url),
            Self::File { data } => Some(data),
        }
    }
}

/// Permissive wire shape for content parts
#[derive(Deserialize)]
struct RawContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    image_url: Option<UrlRef>,
    #[serde(default)]
    video_url: Option<UrlRef>,
    #[serde(default)]
    file_url: Option<UrlRef>,
}

/// `"https://…"` or `{"url": "https://…", "detail": "low"}`
#[derive(Deserialize)]
#[serde(untagged)]
enum UrlRef {
    Bare(String),
    Object {
        #[serde(default)]
        url: String,
        #[serde(default)]
        detail: Option<String>,
    },
}

impl UrlRef {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            Self::Bare(url) => (url, None),
            Self::Object { url, detail } => (url, detail),
        }
    }
}

impl TryFrom<RawContentPart> for ContentPart {
    type Error = String;

    // Missing references become empty strings so the prompt check can
    // report them as format errors instead of failing deserialization.
    fn try_from(raw: RawContentPart) -> Result<Self, Self::Error> {
        match raw.kind.as_str() {
            "text" => Ok(Self::Text {
                text: raw.text.unwrap_or_default(),
            }),
            "image" | "image_url" => {
                let (url, detail) = match raw.image_url {
                    Some(reference) => reference.into_parts(),
                    None => (raw.url.unwrap_or_default(), None),
                };
                Ok(Self::Image {
                    url,
                    detail: detail.or(raw.detail),
                })
            }
            "video" | "video_url" => Ok(Self::Video {
                url: raw
                    .video_url
                    .map(|r| r.into_parts().0)
                    .or(raw.url)
                    .unwrap_or_default(),
            }),
            "file" | "file_url" => Ok(Self::File {
                data: raw
                    .file_url
                    .map(|r| r.into_parts().0)
                    .or(raw.data)
                    .or(raw.url)
                    .unwrap_or_default(),
            }),
            other => Err(format!("unknown content part type `{other}`")),
        }
    }
}

/// Tool type; only functions exist today
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    #[default]
    Function,
}

/// A tool/function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Always `function`
    #[serde(rename = "type", default)]
    pub call_type: ToolType,
    /// Name of the function to call
    pub function: FunctionCall,
}

impl ToolCall {
    /// Build a function tool call; `arguments` stays an opaque JSON string
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: ToolType::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}
