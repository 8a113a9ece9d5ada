//! OAuth2 provider system with a versioned factory registry
//!
//! # Architecture
//!
//! 1. **Registry**: provider name -> [`ProviderFactory`] (ordered version handlers)
//! 2. **Factory**: validates the option bag and returns a [`Provider`]
//! 3. **Provider**: immutable endpoint template plus override hook; hands out
//!    [`PublicOperations`] / [`PrivateOperations`] bound to client credentials
//! 4. **Operations**: the grant flows, resolving the endpoint on every call

pub mod builtin;
pub mod discovery;
pub mod endpoint;
pub mod operations;
pub mod options;
pub mod registry;
pub mod token;

pub use discovery::{DiscoveredEndpoints, Discoverer, DiscoveryError, HttpDiscoverer};
pub use endpoint::{AuthStyle, Endpoint, EndpointOverride, TENANT_PLACEHOLDER};
pub use options::{
    AuthCodeExchangeOptions, AuthCodeUrlOptions, ClientCredentialsOptions, DeviceCodeAuthOptions,
    DeviceCodeExchangeOptions, RefreshTokenOptions,
};
pub use registry::{FactoryContext, ProviderFactory, Registry};
pub use token::{DeviceAuth, Token};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use operations::{AuthStyleMemo, BasicOperations};

/// Provider configuration options, keyed by option name.
pub type ProviderOptions = HashMap<String, String>;

/// Flows available to a client that only holds a client ID.
#[async_trait]
pub trait PublicOperations: Send + Sync {
    /// Build the authorization request URL. `None` when the provider has no
    /// authorization endpoint.
    fn auth_code_url(&self, state: &str, options: AuthCodeUrlOptions) -> Result<Option<String>>;

    /// Start a device authorization. `None` when the provider has no device
    /// endpoint.
    async fn device_code_auth(&self, options: DeviceCodeAuthOptions) -> Result<Option<DeviceAuth>>;

    /// Exchange a device code once. Pending authorizations surface as
    /// `authorization_pending` / `slow_down` errors for the caller to retry.
    async fn device_code_exchange(
        &self,
        device_code: &str,
        options: DeviceCodeExchangeOptions,
    ) -> Result<Token>;

    async fn refresh_token(&self, token: &Token, options: RefreshTokenOptions) -> Result<Token>;
}

/// Flows that need the client secret.
#[async_trait]
pub trait PrivateOperations: PublicOperations {
    async fn auth_code_exchange(
        &self,
        code: &str,
        options: AuthCodeExchangeOptions,
    ) -> Result<Token>;

    async fn client_credentials(&self, options: ClientCredentialsOptions) -> Result<Token>;
}

/// A constructed, versioned provider.
///
/// Cloning is cheap; all clones share the lifetime token and the learned
/// authentication styles.
#[derive(Clone)]
pub struct Provider {
    version: u32,
    endpoint: Endpoint,
    endpoint_override: EndpointOverride,
    lifetime: CancellationToken,
    http: reqwest::Client,
    auth_styles: Arc<AuthStyleMemo>,
}

impl Provider {
    pub(crate) fn new(
        version: u32,
        endpoint: Endpoint,
        lifetime: CancellationToken,
        http: reqwest::Client,
    ) -> Self {
        Self {
            version,
            endpoint,
            endpoint_override: EndpointOverride::None,
            lifetime,
            http,
            auth_styles: Arc::default(),
        }
    }

    #[must_use]
    pub(crate) fn with_override(mut self, endpoint_override: EndpointOverride) -> Self {
        self.endpoint_override = endpoint_override;
        self
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// The endpoint template, placeholders included.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub const fn endpoint_override(&self) -> &EndpointOverride {
        &self.endpoint_override
    }

    /// The endpoint a call carrying `options` would use.
    #[must_use]
    pub fn resolve_endpoint(&self, options: &ProviderOptions) -> Endpoint {
        self.endpoint_override.apply(&self.endpoint, options)
    }

    /// Whether the lifetime this provider was built under has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    #[must_use]
    pub fn public(&self, client_id: impl Into<String>) -> Box<dyn PublicOperations> {
        Box::new(BasicOperations::new(self.clone(), client_id.into(), None))
    }

    #[must_use]
    pub fn private(
        &self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Box<dyn PrivateOperations> {
        let client_secret: String = client_secret.into();
        let client_secret = Some(client_secret).filter(|secret| !secret.is_empty());
        Box::new(BasicOperations::new(self.clone(), client_id.into(), client_secret))
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("version", &self.version)
            .field("endpoint", &self.endpoint)
            .field("endpoint_override", &self.endpoint_override)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
