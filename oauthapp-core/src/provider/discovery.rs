//! OIDC discovery
//!
//! Resolves an issuer's authorization and token endpoints from its
//! `/.well-known/openid-configuration` document. Only the deprecated custom
//! provider version 1 uses this.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Endpoints advertised by an OIDC issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DiscoveredEndpoints {
    pub issuer: String,
    #[serde(default, rename = "authorization_endpoint")]
    pub auth_url: Option<String>,
    #[serde(default, rename = "token_endpoint")]
    pub token_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("discovery document returned HTTP {0}")]
    Status(u16),

    #[error("issuer mismatch, expected {expected:?} got {actual:?}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("discovery cancelled")]
    Cancelled,
}

/// Looks up OIDC endpoints for an issuer URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, issuer: &str) -> Result<DiscoveredEndpoints, DiscoveryError>;
}

/// Discovery over HTTP using the shared client.
#[derive(Debug, Clone)]
pub struct HttpDiscoverer {
    http: reqwest::Client,
}

impl HttpDiscoverer {
    #[must_use]
    pub const fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Discoverer for HttpDiscoverer {
    async fn discover(&self, issuer: &str) -> Result<DiscoveredEndpoints, DiscoveryError> {
        let well_known = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        debug!(url = %well_known, "Fetching OIDC discovery document");

        let response = self.http.get(&well_known).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let endpoints: DiscoveredEndpoints = response.json().await?;
        if endpoints.issuer != issuer {
            return Err(DiscoveryError::IssuerMismatch {
                expected: issuer.to_string(),
                actual: endpoints.issuer,
            });
        }

        Ok(endpoints)
    }
}
