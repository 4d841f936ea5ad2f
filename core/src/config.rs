//! Runtime configuration of the actions taken for a tap.

use url::Url;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Authorization header requires a webhook")]
    AuthorizationWithoutWebhook,

    #[error("Meta URL can not be used together with {0}")]
    MetaUrlConflict(&'static str),

    #[error("Unsupported scheme of {0}: {1}")]
    UnsupportedScheme(&'static str, String),
}

/// Immutable configuration, fixed at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RuntimeConfigBuilder"))]
pub struct RuntimeConfig {
    uid_url: Option<Url>,
    meta_url: Option<Url>,
    webhook: Option<Url>,
    authorization: Option<String>,
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// URL opened with the UID of tags carrying no URL.
    pub fn uid_url(&self) -> Option<&Url> {
        self.uid_url.as_ref()
    }

    /// URL opened with the UID and the URL of every tag.
    pub fn meta_url(&self) -> Option<&Url> {
        self.meta_url.as_ref()
    }

    /// Endpoint receiving every tap.
    pub fn webhook(&self) -> Option<&Url> {
        self.webhook.as_ref()
    }

    /// Value of the `Authorization` header sent to the webhook.
    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuntimeConfigBuilder {
    pub uid_url: Option<Url>,
    pub meta_url: Option<Url>,
    pub webhook: Option<Url>,
    pub authorization: Option<String>,
}

impl RuntimeConfigBuilder {
    pub fn uid_url(mut self, url: Url) -> Self {
        self.uid_url = Some(url);
        self
    }

    pub fn meta_url(mut self, url: Url) -> Self {
        self.meta_url = Some(url);
        self
    }

    pub fn webhook(mut self, url: Url) -> Self {
        self.webhook = Some(url);
        self
    }

    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Overrides every option set in the other builder.
    pub fn merge(self, other: RuntimeConfigBuilder) -> Self {
        Self {
            uid_url: other.uid_url.or(self.uid_url),
            meta_url: other.meta_url.or(self.meta_url),
            webhook: other.webhook.or(self.webhook),
            authorization: other.authorization.or(self.authorization),
        }
    }

    /// Validates the combination of options.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        if self.authorization.is_some() && self.webhook.is_none() {
            return Err(ConfigError::AuthorizationWithoutWebhook);
        }

        if self.meta_url.is_some() {
            if self.webhook.is_some() {
                return Err(ConfigError::MetaUrlConflict("webhook"));
            }
            if self.uid_url.is_some() {
                return Err(ConfigError::MetaUrlConflict("UID URL"));
            }
        }

        for (name, url) in [
            ("UID URL", &self.uid_url),
            ("meta URL", &self.meta_url),
            ("webhook", &self.webhook),
        ] {
            if let Some(url) = url {
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::UnsupportedScheme(name, url.to_string()));
                }
            }
        }

        Ok(RuntimeConfig {
            uid_url: self.uid_url,
            meta_url: self.meta_url,
            webhook: self.webhook,
            authorization: self.authorization,
        })
    }
}

impl TryFrom<RuntimeConfigBuilder> for RuntimeConfig {
    type Error = ConfigError;

    fn try_from(builder: RuntimeConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}
