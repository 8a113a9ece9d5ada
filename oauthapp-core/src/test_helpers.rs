//! Test helpers and fixtures for oauthapp-core tests

use crate::store::ConfigEntry;

/// Test fixture builder for [`ConfigEntry`]
pub struct ConfigEntryFixture {
    entry: ConfigEntry,
}

impl ConfigEntryFixture {
    pub fn new(provider_name: &str) -> Self {
        Self {
            entry: ConfigEntry {
                client_id: "test-client".to_string(),
                ..ConfigEntry::new(provider_name)
            },
        }
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.entry.client_id = client_id.to_string();
        self
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.entry.client_secret = Some(secret.to_string());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.entry.provider_version = version;
        self
    }

    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.entry
            .provider_options
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_auth_url_param(mut self, name: &str, value: &str) -> Self {
        self.entry
            .auth_url_params
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> ConfigEntry {
        self.entry
    }
}
