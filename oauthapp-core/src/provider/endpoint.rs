// Endpoint model
//
// URLs a provider exposes, the client authentication style its token endpoint
// expects, and the per-call hook that fills in multi-tenant templates.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use super::ProviderOptions;
use crate::error::OptionError;

/// Placeholder substituted with the tenant at call time.
pub const TENANT_PLACEHOLDER: &str = "{{tenant}}";

/// Characters left alone when escaping a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// How client credentials are presented to the token endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// Try HTTP Basic first, fall back to form parameters.
    #[default]
    AutoDetect,
    /// HTTP Basic `Authorization` header.
    InHeader,
    /// `client_id` and `client_secret` in the form body.
    InParams,
}

impl AuthStyle {
    /// Parse the `auth_style` provider option. Empty selects auto-detection.
    pub fn from_option(value: &str) -> Result<Self, OptionError> {
        match value {
            "" => Ok(Self::AutoDetect),
            "in_header" => Ok(Self::InHeader),
            "in_params" => Ok(Self::InParams),
            _ => Err(OptionError::new(
                "auth_style",
                r#"unknown authentication style; expected one of "in_header" or "in_params""#,
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Authorization endpoint; `None` when the code flow is not offered.
    pub auth_url: Option<String>,
    pub token_url: String,
    /// Device authorization endpoint; `None` when the device flow is not offered.
    pub device_url: Option<String>,
    pub auth_style: AuthStyle,
}

impl Endpoint {
    pub fn new(auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            auth_url: Some(auth_url.into()),
            token_url: token_url.into(),
            device_url: None,
            auth_style: AuthStyle::AutoDetect,
        }
    }

    #[must_use]
    pub fn with_device_url(mut self, device_url: impl Into<String>) -> Self {
        self.device_url = Some(device_url.into());
        self
    }

    #[must_use]
    pub const fn with_auth_style(mut self, auth_style: AuthStyle) -> Self {
        self.auth_style = auth_style;
        self
    }
}

/// Rewrites an endpoint template before each call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointOverride {
    #[default]
    None,
    /// Replace [`TENANT_PLACEHOLDER`] with the call's `tenant` option, or
    /// `default_tenant` when the call does not carry one.
    Tenant { default_tenant: String },
}

impl EndpointOverride {
    #[must_use]
    pub fn apply(&self, endpoint: &Endpoint, options: &ProviderOptions) -> Endpoint {
        match self {
            Self::None => endpoint.clone(),
            Self::Tenant { default_tenant } => {
                let tenant = options
                    .get("tenant")
                    .filter(|tenant| !tenant.is_empty())
                    .unwrap_or(default_tenant);
                // The templates are not escaped upstream.
                let tenant = utf8_percent_encode(tenant, PATH_SEGMENT).to_string();
                let substitute = |url: &str| url.replacen(TENANT_PLACEHOLDER, &tenant, 1);

                Endpoint {
                    auth_url: endpoint.auth_url.as_deref().map(substitute),
                    token_url: substitute(&endpoint.token_url),
                    device_url: endpoint.device_url.as_deref().map(substitute),
                    auth_style: endpoint.auth_style,
                }
            }
        }
    }
}
