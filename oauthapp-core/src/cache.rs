//! Single-slot provider cache
//!
//! Holds the provider built from the host's active configuration. The slot is
//! filled on first use and reused until the host invalidates it, so provider
//! construction (and any OIDC discovery it does) happens once per
//! configuration rather than once per request.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provider::{
    AuthCodeUrlOptions, PrivateOperations, Provider, ProviderOptions, PublicOperations, Registry,
};
use crate::store::{ConfigEntry, ConfigReader};
use crate::Result;

/// A constructed provider and the configuration it was built from.
pub struct CacheEntry {
    /// The stored configuration, without any construction-time overrides.
    pub config: ConfigEntry,
    pub provider: Provider,
    lifetime: CancellationToken,
}

impl CacheEntry {
    /// Cancel the provider's lifetime. Network flows on this entry fail with
    /// [`crate::Error::Cancelled`] afterwards.
    pub fn close(&self) {
        self.lifetime.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    #[must_use]
    pub fn public(&self) -> Box<dyn PublicOperations> {
        self.provider.public(self.config.client_id.as_str())
    }

    #[must_use]
    pub fn private(&self) -> Box<dyn PrivateOperations> {
        self.provider.private(
            self.config.client_id.as_str(),
            self.config.client_secret.clone().unwrap_or_default(),
        )
    }

    /// Authorization URL carrying the configured `auth_url_params` ahead of
    /// the call's own parameters.
    pub fn auth_code_url(
        &self,
        state: &str,
        mut options: AuthCodeUrlOptions,
    ) -> Result<Option<String>> {
        let mut params: Vec<(String, String)> = self
            .config
            .auth_url_params
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        params.sort();
        params.append(&mut options.extra_params);
        options.extra_params = params;

        self.public().auth_code_url(state, options)
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

pub struct ProviderCache {
    registry: Arc<Registry>,
    slot: Mutex<Option<Arc<CacheEntry>>>,
}

impl ProviderCache {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached entry, building it from `reader` if the slot is
    /// empty.
    ///
    /// `overrides` are merged into a copy of the stored options and only
    /// take effect when this call constructs the provider. Returns `Ok(None)`
    /// when nothing is configured yet.
    pub async fn get(
        &self,
        reader: &dyn ConfigReader,
        overrides: Option<&ProviderOptions>,
    ) -> Result<Option<Arc<CacheEntry>>> {
        let mut slot = self.slot.lock().await;
        if let Some(entry) = slot.as_ref() {
            debug!(provider = %entry.config.provider_name, "Provider cache hit");
            return Ok(Some(Arc::clone(entry)));
        }

        let Some(config) = reader.read_config().await? else {
            debug!("No provider configured");
            return Ok(None);
        };

        let mut merged = config.clone();
        if let Some(overrides) = overrides {
            merged.merge_options(overrides);
        }

        let lifetime = CancellationToken::new();
        let provider = match self
            .registry
            .construct(
                &config.provider_name,
                config.provider_version,
                merged.provider_options,
                lifetime.clone(),
            )
            .await
        {
            Ok(provider) => provider,
            Err(err) => {
                lifetime.cancel();
                warn!(
                    provider = %config.provider_name,
                    error = %err,
                    "Provider construction failed"
                );
                return Err(err);
            }
        };

        info!(
            provider = %config.provider_name,
            version = provider.version(),
            "Provider constructed"
        );

        let entry = Arc::new(CacheEntry {
            config,
            provider,
            lifetime,
        });
        *slot = Some(Arc::clone(&entry));
        Ok(Some(entry))
    }

    /// Cancel the cached entry's lifetime. The entry stays in the slot.
    pub async fn close(&self) {
        if let Some(entry) = self.slot.lock().await.as_ref() {
            debug!(provider = %entry.config.provider_name, "Closing cached provider");
            entry.close();
        }
    }

    /// Cancel and drop the cached entry so the next [`get`](Self::get)
    /// rebuilds from storage.
    pub async fn invalidate(&self) {
        if let Some(entry) = self.slot.lock().await.take() {
            debug!(provider = %entry.config.provider_name, "Invalidating cached provider");
            entry.close();
        }
    }
}

impl fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCache")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::provider::{ClientCredentialsOptions, Endpoint, ProviderFactory};
    use crate::store::MockConfigReader;
    use crate::test_helpers::ConfigEntryFixture;
    use crate::Error;

    fn counting_registry(constructions: Arc<AtomicUsize>) -> Arc<Registry> {
        let mut registry = Registry::builtin(reqwest::Client::new());
        registry.must_register(
            "counting",
            ProviderFactory::new(1).version(1, move |ctx, _options| {
                let constructions = Arc::clone(&constructions);
                async move {
                    constructions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(ctx.provider(Endpoint::new(
                        "https://idp.example.com/authorize",
                        "https://idp.example.com/token",
                    )))
                }
            }),
        );
        Arc::new(registry)
    }

    fn reader_returning(entry: Option<ConfigEntry>, times: usize) -> MockConfigReader {
        let mut reader = MockConfigReader::new();
        reader
            .expect_read_config()
            .times(times)
            .returning(move || Ok(entry.clone()));
        reader
    }

    #[tokio::test]
    async fn test_concurrent_get_constructs_once() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let cache = ProviderCache::new(counting_registry(Arc::clone(&constructions)));
        let reader = reader_returning(Some(ConfigEntryFixture::new("counting").build()), 1);

        let (first, second) = tokio::join!(cache.get(&reader, None), cache.get(&reader, None));
        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unconfigured_returns_none() {
        let cache = ProviderCache::new(Arc::new(Registry::builtin(reqwest::Client::new())));
        let reader = reader_returning(None, 2);

        assert!(cache.get(&reader, None).await.unwrap().is_none());
        assert!(cache.get(&reader, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_construction_failure_leaves_slot_empty() {
        let cache = ProviderCache::new(Arc::new(Registry::builtin(reqwest::Client::new())));
        let reader = reader_returning(Some(ConfigEntryFixture::new("nope").build()), 2);

        for _ in 0..2 {
            let err = cache.get(&reader, None).await.unwrap_err();
            assert!(matches!(err, Error::UnknownProvider(_)));
        }
    }

    #[tokio::test]
    async fn test_close_cancels_provider() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let cache = ProviderCache::new(counting_registry(constructions));
        let reader = reader_returning(
            Some(ConfigEntryFixture::new("counting").with_secret("shh").build()),
            1,
        );

        let entry = cache.get(&reader, None).await.unwrap().unwrap();
        cache.close().await;

        assert!(entry.is_closed());
        assert!(entry.provider.is_closed());
        let err = entry
            .private()
            .client_credentials(ClientCredentialsOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        // Slot stays populated after close.
        let again = cache.get(&reader, None).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&entry, &again));
    }

    #[tokio::test]
    async fn test_invalidate_rebuilds() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let cache = ProviderCache::new(counting_registry(Arc::clone(&constructions)));
        let reader = reader_returning(Some(ConfigEntryFixture::new("counting").build()), 2);

        let first = cache.get(&reader, None).await.unwrap().unwrap();
        cache.invalidate().await;
        let second = cache.get(&reader, None).await.unwrap().unwrap();

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(constructions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overrides_do_not_leak_into_config() {
        let cache = ProviderCache::new(Arc::new(Registry::builtin(reqwest::Client::new())));
        let reader = reader_returning(
            Some(
                ConfigEntryFixture::new("microsoft_azure_ad")
                    .with_option("tenant", "contoso")
                    .build(),
            ),
            1,
        );
        let overrides = ProviderOptions::from([("tenant".to_string(), "fabrikam".to_string())]);

        let entry = cache.get(&reader, Some(&overrides)).await.unwrap().unwrap();

        assert_eq!(entry.config.provider_options["tenant"], "contoso");
        let endpoint = entry.provider.resolve_endpoint(&ProviderOptions::new());
        assert_eq!(
            endpoint.token_url,
            "https://login.microsoftonline.com/fabrikam/oauth2/v2.0/token"
        );

        // A cache hit ignores later overrides.
        let other = ProviderOptions::from([("tenant".to_string(), "northwind".to_string())]);
        let hit = cache.get(&reader, Some(&other)).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&entry, &hit));
    }

    #[tokio::test]
    async fn test_stored_version_selects_handler() {
        let cache = ProviderCache::new(Arc::new(Registry::builtin(reqwest::Client::new())));
        let reader = reader_returning(
            Some(
                ConfigEntryFixture::new("custom")
                    .with_version(1)
                    .with_option("token_url", "https://idp.example.com/token")
                    .build(),
            ),
            1,
        );

        let entry = cache.get(&reader, None).await.unwrap().unwrap();

        assert_eq!(entry.config.provider_version, 1);
        assert_eq!(entry.provider.version(), 1);
        assert_eq!(entry.provider.endpoint().token_url, "https://idp.example.com/token");
    }

    #[tokio::test]
    async fn test_auth_code_url_includes_configured_params() {
        let cache = ProviderCache::new(Arc::new(Registry::builtin(reqwest::Client::new())));
        let reader = reader_returning(
            Some(
                ConfigEntryFixture::new("google")
                    .with_client_id("client-1")
                    .with_auth_url_param("access_type", "offline")
                    .build(),
            ),
            1,
        );

        let entry = cache.get(&reader, None).await.unwrap().unwrap();
        let url = entry
            .auth_code_url("state-1", AuthCodeUrlOptions::default())
            .unwrap()
            .unwrap();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("client_id=client-1"));
    }
}
