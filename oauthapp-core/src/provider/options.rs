// Per-call option bags for the grant flows
//
// `provider_options` feeds the endpoint override (for example a per-call
// Azure AD tenant); the remaining fields shape the OAuth2 request itself.

use super::ProviderOptions;

#[derive(Debug, Clone, Default)]
pub struct AuthCodeUrlOptions {
    pub redirect_url: Option<String>,
    pub scopes: Vec<String>,
    /// Additional query parameters, e.g. `access_type=offline` or a PKCE
    /// `code_challenge`.
    pub extra_params: Vec<(String, String)>,
    pub provider_options: ProviderOptions,
}

impl AuthCodeUrlOptions {
    #[must_use]
    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceCodeAuthOptions {
    pub scopes: Vec<String>,
    pub provider_options: ProviderOptions,
}

impl DeviceCodeAuthOptions {
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceCodeExchangeOptions {
    pub provider_options: ProviderOptions,
}

impl DeviceCodeExchangeOptions {
    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthCodeExchangeOptions {
    pub redirect_url: Option<String>,
    /// Additional form parameters, e.g. a PKCE `code_verifier`.
    pub extra_params: Vec<(String, String)>,
    pub provider_options: ProviderOptions,
}

impl AuthCodeExchangeOptions {
    #[must_use]
    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RefreshTokenOptions {
    pub provider_options: ProviderOptions,
}

impl RefreshTokenOptions {
    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientCredentialsOptions {
    pub scopes: Vec<String>,
    /// Provider-specific form parameters, e.g. `resource` or `audience`.
    pub endpoint_params: Vec<(String, String)>,
    pub provider_options: ProviderOptions,
}

impl ClientCredentialsOptions {
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.endpoint_params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn provider_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.provider_options.insert(key.into(), value.into());
        self
    }
}
