#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod logging;
pub mod provider;

use indexmap::IndexMap;
use serde::Deserialize;

pub use logging::*;
pub use provider::*;

/// Top-level Tributary configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-vendor settings keyed by provider name
    #[serde(default)]
    pub providers: IndexMap<String, ProviderSettings>,
    /// OpenAI-compatible proxy used for providers without a native adapter
    #[serde(default)]
    pub fallback: ProviderSettings,
}

impl Config {
    /// Settings table for a provider, matched case-insensitively
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, settings)| settings)
    }
}
