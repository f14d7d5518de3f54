//! Unified chat completion over many LLM vendors
//!
//! Callers build one canonical [`CompletionRequest`] and get back either a
//! [`ChatCompletion`] or a lazy stream of [`ChatCompletionChunk`] frames,
//! whichever vendor serves the call. Vendors without a bespoke adapter are
//! reached through an OpenAI-compatible proxy.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod capability;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod normalizer;
pub mod protocol;
pub mod provider;
pub mod stream;
pub mod types;
pub mod vendor;

pub use capability::{CapabilityProfile, SupportLevel};
pub use dispatch::{AdapterHandle, Dispatcher, ModelRewrite, Route, completion, resolve};
pub use error::LlmError;
pub use normalizer::{PromptCheck, check_prompt};
pub use provider::{Provider, ProviderCapabilities};
pub use stream::{ChunkStream, Completion, StreamAccumulator};
pub use types::{
    ChatCompletion, ChatCompletionChunk, CompletionOptions, CompletionRequest, Content, ContentPart, FinishReason,
    Message, Usage,
};
pub use vendor::Vendor;
