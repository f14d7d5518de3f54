//! Static multi-modal support tables
//!
//! Lookups are keyed by provider name so the fallback backend (whose
//! providers are not [`Vendor`]s) gets the permissive defaults.

use strum::Display;

use crate::types::Modality;
use crate::vendor::Vendor;

/// How far a vendor supports a kind of input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SupportLevel {
    /// Input must be rejected
    None,
    /// Input is accepted after flattening to markdown text
    Partial,
    /// Input is sent as structured parts
    Full,
}

fn vendor(provider: &str) -> Option<Vendor> {
    provider.parse().ok()
}

/// Whether the vendor accepts structured (list-of-parts) content at all
pub fn object_content_support(provider: &str) -> SupportLevel {
    match vendor(provider) {
        Some(
            Vendor::Wenxin
            | Vendor::Baichuan
            | Vendor::Minimax
            | Vendor::Xunfei
            | Vendor::Tiangong
            | Vendor::Lingyi
            | Vendor::Fastgpt
            | Vendor::Doubao
            | Vendor::Moonshot,
        ) => SupportLevel::None,
        Some(Vendor::Coze) => SupportLevel::Partial,
        _ => SupportLevel::Full,
    }
}

/// Image input support
pub fn vision_support(provider: &str, model: &str) -> SupportLevel {
    match vendor(provider) {
        Some(Vendor::Coze) => SupportLevel::Partial,
        Some(Vendor::Deepseek) if !model.to_ascii_lowercase().contains("vl") => SupportLevel::None,
        _ => SupportLevel::Full,
    }
}

/// Video input support
pub fn video_support(provider: &str, _model: &str) -> SupportLevel {
    match vendor(provider) {
        Some(Vendor::Coze) => SupportLevel::Partial,
        Some(Vendor::Deepseek) => SupportLevel::None,
        _ => SupportLevel::Full,
    }
}

/// File input support
pub const fn file_support(_provider: &str, _model: &str) -> SupportLevel {
    SupportLevel::Partial
}

/// Support levels for one vendor/model pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityProfile {
    /// Structured content at all
    pub object: SupportLevel,
    /// Images
    pub vision: SupportLevel,
    /// Videos
    pub video: SupportLevel,
    /// Files
    pub file: SupportLevel,
}

impl CapabilityProfile {
    /// Profile from the static tables
    pub fn lookup(provider: &str, model: &str) -> Self {
        Self {
            object: object_content_support(provider),
            vision: vision_support(provider, model),
            video: video_support(provider, model),
            file: file_support(provider, model),
        }
    }

    /// Profile that accepts everything as structured parts
    pub const fn full() -> Self {
        Self {
            object: SupportLevel::Full,
            vision: SupportLevel::Full,
            video: SupportLevel::Full,
            file: SupportLevel::Full,
        }
    }

    /// Level for one modality; text is always fully supported
    pub const fn level(&self, modality: Modality) -> SupportLevel {
        match modality {
            Modality::Text => SupportLevel::Full,
            Modality::Image => self.vision,
            Modality::Video => self.video,
            Modality::File => self.file,
        }
    }
}
