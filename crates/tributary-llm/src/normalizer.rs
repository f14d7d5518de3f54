//! Prompt check: validate and rewrite multi-modal messages for a vendor

use crate::capability::{CapabilityProfile, SupportLevel};
use crate::types::{Content, ContentPart, Message, Modality};

/// Modalities checked against the capability profile, in reporting order
const MEDIA: [Modality; 3] = [Modality::Image, Modality::Video, Modality::File];

/// Outcome of a prompt check
#[derive(Debug, Clone, PartialEq)]
pub enum PromptCheck {
    /// Messages can be sent, possibly after rewriting
    Pass {
        /// Messages to send
        messages: Vec<Message>,
        /// Whether any content was rewritten
        reformatted: bool,
    },
    /// Messages cannot be represented for this vendor
    Reject {
        /// Human-readable reason
        reason: String,
    },
}

impl PromptCheck {
    /// Whether the check passed
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    /// Rejection reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass { .. } => None,
            Self::Reject { reason } => Some(reason),
        }
    }

    /// Messages on success, reason on failure
    ///
    /// # Errors
    ///
    /// Returns the rejection reason when the check failed
    pub fn into_messages(self) -> Result<Vec<Message>, String> {
        match self {
            Self::Pass { messages, .. } => Ok(messages),
            Self::Reject { reason } => Err(reason),
        }
    }
}

/// Check messages against the static capability tables
pub fn check_prompt(provider: &str, model: &str, messages: &[Message]) -> PromptCheck {
    check_prompt_with(provider, &CapabilityProfile::lookup(provider, model), messages)
}

/// Check messages against an explicit capability profile
///
/// Validation is fail-fast: the first malformed part rejects the whole list.
pub fn check_prompt_with(provider: &str, profile: &CapabilityProfile, messages: &[Message]) -> PromptCheck {
    let mut present = Vec::new();
    for part in messages.iter().flat_map(parts) {
        let modality = part.modality();
        if modality == Modality::Text {
            continue;
        }
        if part.reference().is_none_or(|r| r.trim().is_empty()) {
            return reject(format!("Invalid {modality} content: a URL or inline data is required"));
        }
        if !present.contains(&modality) {
            present.push(modality);
        }
    }

    if present.is_empty() {
        return pass(messages.to_vec(), false);
    }

    for modality in MEDIA {
        if present.contains(&modality) && profile.level(modality) == SupportLevel::None {
            return reject(unsupported_reason(modality, provider));
        }
    }

    if profile.object == SupportLevel::None {
        if let Some(part) = messages.iter().flat_map(parts).find(|p| is_inline(p)) {
            return reject(format!(
                "Structured content is not supported by {provider}; inline {} data cannot be sent as text",
                part.modality()
            ));
        }
        let flattened = messages.iter().map(|m| rewrite(m, |_| true)).collect();
        return pass(flattened, true);
    }

    let partial: Vec<Modality> = present
        .iter()
        .copied()
        .filter(|m| profile.object == SupportLevel::Partial || profile.level(*m) == SupportLevel::Partial)
        .collect();

    if partial.is_empty() {
        return pass(messages.to_vec(), false);
    }

    let rewritten = messages
        .iter()
        .map(|m| rewrite(m, |modality| partial.contains(&modality)))
        .collect();
    pass(rewritten, true)
}

fn pass(messages: Vec<Message>, reformatted: bool) -> PromptCheck {
    PromptCheck::Pass { messages, reformatted }
}

const fn reject(reason: String) -> PromptCheck {
    PromptCheck::Reject { reason }
}

fn unsupported_reason(modality: Modality, provider: &str) -> String {
    let label = match modality {
        Modality::Image => "Vision",
        Modality::Video => "Video",
        Modality::File | Modality::Text => "File",
    };
    format!("{label} input is not supported by {provider}")
}

fn parts(message: &Message) -> &[ContentPart] {
    match &message.content {
        Content::Parts(parts) => parts,
        Content::Text(_) => &[],
    }
}

/// Data URIs and bare payloads cannot be expressed as a markdown link
fn is_inline(part: &ContentPart) -> bool {
    part.reference()
        .is_some_and(|r| !(r.starts_with("http://") || r.starts_with("https://")))
}

/// Markdown rendering of a part
fn markdown(part: &ContentPart) -> String {
    match part {
        ContentPart::Text { text } => text.clone(),
        ContentPart::Image { url, .. } => format!("![image]({url})"),
        ContentPart::Video { url } => format!("![video]({url})"),
        ContentPart::File { data } => format!("[file]({data})"),
    }
}

/// Flatten the selected modalities to text, collapsing all-text part lists
fn rewrite(message: &Message, flatten: impl Fn(Modality) -> bool) -> Message {
    let Content::Parts(parts) = &message.content else {
        return message.clone();
    };

    let rewritten: Vec<ContentPart> = parts
        .iter()
        .map(|part| match part.modality() {
            Modality::Text => part.clone(),
            modality if flatten(modality) => ContentPart::text(markdown(part)),
            _ => part.clone(),
        })
        .collect();

    let content = if rewritten.iter().all(|p| p.modality() == Modality::Text) {
        Content::Text(rewritten.iter().map(markdown).collect())
    } else {
        Content::Parts(rewritten)
    };

    Message {
        content,
        ..message.clone()
    }
}
