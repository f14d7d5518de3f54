use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Credentials and endpoint overrides for one vendor
///
/// Every field is optional. Adapters fall back to their documented
/// environment variables for anything left unset here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// API key (or app key, client id) for the vendor
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Secondary secret (app secret, client secret, API secret)
    #[serde(default)]
    pub api_secret: Option<SecretString>,
    /// Application identifier for vendors that require one
    #[serde(default)]
    pub app_id: Option<String>,
    /// Bot identifier for chat-bot style vendors
    #[serde(default)]
    pub bot_id: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Request timeout (e.g. "30s", "2m")
    #[serde(default)]
    pub timeout: Option<String>,
    /// Default end-user identifier sent to vendors that track users
    #[serde(default)]
    pub user: Option<String>,
}

impl ProviderSettings {
    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Set the secondary secret
    #[must_use]
    pub fn with_api_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Set the application identifier
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Set the bot identifier
    #[must_use]
    pub fn with_bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    /// Point the adapter at a different endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set the request timeout from a duration string
    #[must_use]
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Parsed request timeout, if configured
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout string is not a valid duration
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|s| duration_str::parse(s).map_err(|e| anyhow::anyhow!("invalid timeout '{s}': {e}")))
            .transpose()
    }
}
