//! Programmatic configuration builder for integration tests

use tributary_config::Config;

/// Builder assembling a TOML document and loading it the way the binary does
#[derive(Default)]
pub struct ConfigBuilder {
    toml: String,
}

impl ConfigBuilder {
    /// Add a `[providers.<name>]` table with a key and base URL
    pub fn with_provider(mut self, name: &str, base_url: &str, api_key: &str) -> Self {
        self.toml.push_str(&format!(
            "[providers.{name}]\napi_key = \"{api_key}\"\nbase_url = \"{base_url}\"\n\n"
        ));
        self
    }

    /// Add a Spark table with the full credential triple
    pub fn with_spark(mut self, endpoint: &str) -> Self {
        self.toml.push_str(&format!(
            "[providers.xunfei]\napp_id = \"app-1\"\napi_key = \"key-1\"\napi_secret = \"secret-1\"\nbase_url = \"{endpoint}\"\ntimeout = \"5s\"\n\n"
        ));
        self
    }

    /// Point the fallback proxy at `base_url`
    pub fn with_fallback(mut self, base_url: &str) -> Self {
        self.toml
            .push_str(&format!("[fallback]\nbase_url = \"{base_url}\"\n\n"));
        self
    }

    /// Parse and validate the assembled configuration
    pub fn build(self) -> Config {
        Config::from_toml_str(&self.toml).expect("test configuration must be valid")
    }
}
