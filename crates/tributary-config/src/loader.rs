use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion or parsing
    /// fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error on blank provider names, unparseable timeouts, or
    /// an invalid log filter
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_logging()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        for (name, settings) in &self.providers {
            if name.trim().is_empty() {
                anyhow::bail!("provider names must not be blank");
            }
            settings
                .timeout()
                .map_err(|e| anyhow::anyhow!("provider '{name}': {e}"))?;
        }

        self.fallback
            .timeout()
            .map_err(|e| anyhow::anyhow!("fallback: {e}"))?;

        Ok(())
    }

    fn validate_logging(&self) -> anyhow::Result<()> {
        EnvFilter::try_new(&self.logging.level)
            .map_err(|e| anyhow::anyhow!("invalid logging.level '{}': {e}", self.logging.level))?;
        Ok(())
    }
}
