//! Built-in provider factories
//!
//! - Simple providers (Bitbucket, GitHub, GitLab, Google, Slack) have fixed
//!   endpoints and take no options.
//! - Azure AD templates its endpoints on a tenant.
//! - Custom providers describe their endpoints entirely through options.

use std::future::ready;

use tracing::{debug, warn};

use super::discovery::{DiscoveredEndpoints, DiscoveryError};
use super::endpoint::{AuthStyle, Endpoint, EndpointOverride, TENANT_PLACEHOLDER};
use super::registry::{FactoryContext, ProviderFactory, Registry};
use super::{Provider, ProviderOptions};
use crate::error::OptionError;
use crate::Result;

pub const BITBUCKET: &str = "bitbucket";
pub const GITHUB: &str = "github";
pub const GITLAB: &str = "gitlab";
pub const GOOGLE: &str = "google";
pub const MICROSOFT_AZURE_AD: &str = "microsoft_azure_ad";
pub const SLACK: &str = "slack";
pub const CUSTOM: &str = "custom";

/// Register every built-in provider.
pub fn register_all(registry: &mut Registry) {
    registry.must_register(
        BITBUCKET,
        simple(Endpoint::new(
            "https://bitbucket.org/site/oauth2/authorize",
            "https://bitbucket.org/site/oauth2/access_token",
        )),
    );
    registry.must_register(
        GITHUB,
        simple(
            Endpoint::new(
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
            )
            .with_device_url("https://github.com/login/device/code"),
        ),
    );
    registry.must_register(
        GITLAB,
        simple(Endpoint::new(
            "https://gitlab.com/oauth/authorize",
            "https://gitlab.com/oauth/token",
        )),
    );
    registry.must_register(
        GOOGLE,
        simple(
            Endpoint::new(
                "https://accounts.google.com/o/oauth2/auth",
                "https://oauth2.googleapis.com/token",
            )
            .with_device_url("https://oauth2.googleapis.com/device/code")
            .with_auth_style(AuthStyle::InParams),
        ),
    );
    registry.must_register(MICROSOFT_AZURE_AD, azure_ad());
    registry.must_register(
        SLACK,
        simple(Endpoint::new(
            "https://slack.com/oauth/authorize",
            "https://slack.com/api/oauth.access",
        )),
    );
    registry.must_register(CUSTOM, custom());
}

/// A provider with a fixed endpoint and no options, version 1 only.
#[must_use]
pub fn simple(endpoint: Endpoint) -> ProviderFactory {
    ProviderFactory::new(1).version(1, move |ctx, options| {
        ready(simple_provider(&ctx, &options, endpoint.clone()))
    })
}

/// Azure AD, version 1. Requires `tenant`; a per-call `tenant` option
/// overrides it for multi-tenant applications.
#[must_use]
pub fn azure_ad() -> ProviderFactory {
    ProviderFactory::new(1).version(1, |ctx, options| ready(azure_ad_provider(&ctx, &options)))
}

/// Arbitrary OAuth2 endpoints, versions 1 and 2 (default).
///
/// Version 1 is deprecated but kept for existing configurations: it also
/// accepts `discovery_url` and resolves the endpoints through OIDC discovery.
#[must_use]
pub fn custom() -> ProviderFactory {
    ProviderFactory::new(2)
        .version(1, custom_v1)
        .version(2, |ctx, options| ready(custom_provider(&ctx, &options)))
}

fn simple_provider(
    ctx: &FactoryContext,
    options: &ProviderOptions,
    endpoint: Endpoint,
) -> Result<Provider> {
    if let Some(option) = options.keys().min() {
        return Err(OptionError::new(option.as_str(), "provider does not accept options").into());
    }
    Ok(ctx.provider(endpoint))
}

fn azure_ad_provider(ctx: &FactoryContext, options: &ProviderOptions) -> Result<Provider> {
    let tenant = non_empty(options, "tenant")
        .ok_or_else(|| OptionError::new("tenant", "tenant is required"))?
        .to_string();

    let base = format!("https://login.microsoftonline.com/{TENANT_PLACEHOLDER}/oauth2/v2.0");
    let endpoint = Endpoint::new(format!("{base}/authorize"), format!("{base}/token"))
        .with_device_url(format!("{base}/devicecode"));

    Ok(ctx
        .provider(endpoint)
        .with_override(EndpointOverride::Tenant { default_tenant: tenant }))
}

async fn custom_v1(ctx: FactoryContext, mut options: ProviderOptions) -> Result<Provider> {
    if let Some(issuer) = non_empty(&options, "discovery_url").map(str::to_string) {
        let discovered = discover(&ctx, &issuer).await.map_err(|err| {
            warn!(issuer = %issuer, error = %err, "OIDC discovery failed");
            OptionError::new("discovery_url", "error making new provider").with_cause(err)
        })?;

        options.insert("auth_code_url".to_string(), discovered.auth_url.unwrap_or_default());
        options.insert("token_url".to_string(), discovered.token_url.unwrap_or_default());
    }
    custom_provider(&ctx, &options)
}

async fn discover(
    ctx: &FactoryContext,
    issuer: &str,
) -> std::result::Result<DiscoveredEndpoints, DiscoveryError> {
    debug!(issuer, "Resolving custom provider endpoints");
    let discoverer = ctx.discoverer();
    tokio::select! {
        biased;
        () = ctx.lifetime().cancelled() => Err(DiscoveryError::Cancelled),
        result = discoverer.discover(issuer) => result,
    }
}

fn custom_provider(ctx: &FactoryContext, options: &ProviderOptions) -> Result<Provider> {
    let token_url = non_empty(options, "token_url")
        .ok_or_else(|| OptionError::new("token_url", "token URL is required"))?;
    let auth_style = AuthStyle::from_option(options.get("auth_style").map_or("", String::as_str))?;

    let mut endpoint = Endpoint {
        auth_url: None,
        token_url: valid_url("token_url", token_url)?,
        device_url: None,
        auth_style,
    };
    if let Some(url) = non_empty(options, "auth_code_url") {
        endpoint.auth_url = Some(valid_url("auth_code_url", url)?);
    }
    if let Some(url) = non_empty(options, "device_code_url") {
        endpoint.device_url = Some(valid_url("device_code_url", url)?);
    }

    Ok(ctx.provider(endpoint))
}

fn non_empty<'a>(options: &'a ProviderOptions, key: &str) -> Option<&'a str> {
    options
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn valid_url(option: &str, value: &str) -> std::result::Result<String, OptionError> {
    url::Url::parse(value)
        .map(|_| value.to_string())
        .map_err(|err| OptionError::new(option, "invalid URL").with_cause(err))
}
