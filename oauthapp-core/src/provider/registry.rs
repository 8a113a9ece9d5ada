// Provider Registry
//
// Factory-based registry turning a provider name, a version and an option
// bag into a constructed provider.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::discovery::{Discoverer, HttpDiscoverer};
use super::{builtin, Endpoint, Provider, ProviderOptions};
use crate::config::Settings;
use crate::{Error, Result};

/// Constructor for one version of a provider.
pub type VersionHandler = Box<
    dyn Fn(FactoryContext, ProviderOptions) -> BoxFuture<'static, Result<Provider>> + Send + Sync,
>;

/// What a version handler gets to build a provider with.
#[derive(Clone)]
pub struct FactoryContext {
    version: u32,
    lifetime: CancellationToken,
    http: reqwest::Client,
    discoverer: Arc<dyn Discoverer>,
}

impl FactoryContext {
    /// The version being constructed, after default selection.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Cancelled when the provider's owner is closed.
    #[must_use]
    pub const fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    #[must_use]
    pub fn discoverer(&self) -> Arc<dyn Discoverer> {
        Arc::clone(&self.discoverer)
    }

    /// A provider for `endpoint` at the selected version, sharing this
    /// context's lifetime and HTTP client.
    #[must_use]
    pub fn provider(&self, endpoint: Endpoint) -> Provider {
        Provider::new(self.version, endpoint, self.lifetime.clone(), self.http.clone())
    }
}

/// A named provider's version handlers.
///
/// Each version validates its own options, so backward-compatible behavior
/// stays isolated from the current version's logic.
pub struct ProviderFactory {
    default_version: u32,
    handlers: BTreeMap<u32, VersionHandler>,
}

impl ProviderFactory {
    /// `default_version` is used when the caller asks for version `0`.
    #[must_use]
    pub fn new(default_version: u32) -> Self {
        Self {
            default_version,
            handlers: BTreeMap::new(),
        }
    }

    /// Add the handler for `version`.
    ///
    /// # Example
    /// ```ignore
    /// let factory = ProviderFactory::new(1).version(1, |ctx, _options| async move {
    ///     Ok(ctx.provider(Endpoint::new(AUTH_URL, TOKEN_URL)))
    /// });
    /// ```
    #[must_use]
    pub fn version<F, Fut>(mut self, version: u32, handler: F) -> Self
    where
        F: Fn(FactoryContext, ProviderOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provider>> + Send + 'static,
    {
        self.handlers.insert(
            version,
            Box::new(move |ctx: FactoryContext, options: ProviderOptions| {
                handler(ctx, options).boxed()
            }),
        );
        self
    }

    #[must_use]
    pub const fn default_version(&self) -> u32 {
        self.default_version
    }

    /// Supported versions, ascending.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.handlers.keys().copied()
    }
}

impl fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("default_version", &self.default_version)
            .field("versions", &self.versions().collect::<Vec<_>>())
            .finish()
    }
}

/// Provider registry
///
/// Built once at startup and shared by reference. Registering a name twice is
/// a configuration error.
pub struct Registry {
    factories: HashMap<String, ProviderFactory>,
    http: reqwest::Client,
    discoverer: Arc<dyn Discoverer>,
}

impl Registry {
    /// An empty registry using `http` for every provider it constructs.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            factories: HashMap::new(),
            discoverer: Arc::new(HttpDiscoverer::new(http.clone())),
            http,
        }
    }

    /// A registry holding every built-in provider.
    #[must_use]
    pub fn builtin(http: reqwest::Client) -> Self {
        let mut registry = Self::new(http);
        builtin::register_all(&mut registry);
        registry
    }

    /// A built-in registry with the HTTP client described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = settings.http.build_client()?;
        Ok(Self::builtin(http))
    }

    /// Replace the OIDC discoverer.
    #[must_use]
    pub fn with_discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> Self {
        self.discoverer = discoverer;
        self
    }

    pub fn register(&mut self, name: &str, factory: ProviderFactory) -> Result<()> {
        if self.factories.contains_key(name) {
            return Err(Error::DuplicateProvider(name.to_string()));
        }
        debug!(
            provider = name,
            default_version = factory.default_version,
            "Registered provider factory"
        );
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Register during startup.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn must_register(&mut self, name: &str, factory: ProviderFactory) {
        if let Err(err) = self.register(name, factory) {
            panic!("provider registry misconfigured: {err}");
        }
    }

    /// Registered provider names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn factory(&self, name: &str) -> Option<&ProviderFactory> {
        self.factories.get(name)
    }

    /// Construct provider `name` at `version` (`0` for the default).
    ///
    /// `lifetime` bounds any background work the provider does; cancel it to
    /// release the provider.
    pub async fn construct(
        &self,
        name: &str,
        version: u32,
        options: ProviderOptions,
        lifetime: CancellationToken,
    ) -> Result<Provider> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;

        let selected = if version == 0 {
            factory.default_version
        } else {
            version
        };
        let handler = factory
            .handlers
            .get(&selected)
            .ok_or_else(|| Error::UnsupportedVersion {
                provider: name.to_string(),
                version: selected,
            })?;

        debug!(provider = name, version = selected, "Constructing provider");

        let ctx = FactoryContext {
            version: selected,
            lifetime,
            http: self.http.clone(),
            discoverer: Arc::clone(&self.discoverer),
        };
        handler(ctx, options).await
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.names())
            .finish_non_exhaustive()
    }
}
