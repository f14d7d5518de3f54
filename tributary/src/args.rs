use std::path::PathBuf;

use clap::Parser;
use tributary_llm::{CompletionOptions, CompletionRequest, Message};

/// Tributary chat completion
#[derive(Debug, Parser)]
#[command(name = "tributary", about = "Run one chat completion against any supported LLM vendor")]
pub struct Args {
    /// Path to configuration file; a missing file means defaults
    #[arg(short, long, default_value = "tributary.toml", env = "TRIBUTARY_CONFIG")]
    pub config: PathBuf,

    /// Provider name; omit to send the model straight to the fallback proxy
    #[arg(short, long, env = "TRIBUTARY_PROVIDER")]
    pub provider: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    pub model: String,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Stream the response
    #[arg(long)]
    pub stream: bool,

    /// Print canonical JSON, one line per frame when streaming
    #[arg(long)]
    pub json: bool,

    /// User prompt
    pub prompt: String,
}

impl Args {
    /// Canonical request for these arguments
    pub fn request(&self) -> CompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.prompt.clone()));

        CompletionRequest {
            model: self.model.clone(),
            messages,
            options: CompletionOptions {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stream: self.stream,
                ..CompletionOptions::default()
            },
        }
    }
}
