//! Active provider configuration as seen by the core.
//!
//! The host owns persistence; this module only defines the shape of the
//! stored entry and the narrow read interface the cache consumes.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderOptions;
use crate::Result;

/// The single currently-active provider configuration.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigEntry {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Extra parameters appended to every authorization URL.
    pub auth_url_params: HashMap<String, String>,
    pub provider_name: String,
    /// `0` lets the provider factory pick its default.
    pub provider_version: u32,
    pub provider_options: ProviderOptions,
}

impl ConfigEntry {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            ..Self::default()
        }
    }

    /// Merge option overrides on top of this entry's options; overrides win.
    /// The cache applies this to a copy, never to the stored entry.
    pub fn merge_options(&mut self, overrides: &ProviderOptions) {
        for (key, value) in overrides {
            self.provider_options.insert(key.clone(), value.clone());
        }
    }
}

impl fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut option_keys: Vec<&str> = self.provider_options.keys().map(String::as_str).collect();
        option_keys.sort_unstable();

        f.debug_struct("ConfigEntry")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_url_params", &self.auth_url_params)
            .field("provider_name", &self.provider_name)
            .field("provider_version", &self.provider_version)
            .field("provider_options", &option_keys)
            .finish()
    }
}

/// Read side of the host's configuration storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigReader: Send + Sync {
    /// Returns `None` when no provider has been configured yet.
    async fn read_config(&self) -> Result<Option<ConfigEntry>>;
}
