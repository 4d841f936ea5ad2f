use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use nfc4pc::config::RuntimeConfigBuilder;
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "NFC4PC_";

/// Settings read from the configuration file and the environment.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub actions: RuntimeConfigBuilder,

    /// Seconds to wait for a tap in single-shot mode.
    pub timeout: Option<u64>,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> figment::Result<Self> {
        let mut figment = Figment::new();
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX)).extract()
    }
}
