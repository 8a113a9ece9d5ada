// Token types produced by the grant flows

use std::time::Duration;

use chrono::{DateTime, Utc};
use oauth2::basic::BasicTokenResponse;
use oauth2::{StandardDeviceAuthorizationResponse, TokenResponse};
use serde::{Deserialize, Serialize};

/// An access token as issued by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    /// A bare token carrying only a refresh token, for use with
    /// `refresh_token` when the access token is no longer at hand.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            token_type: String::new(),
            refresh_token: Some(refresh_token.into()),
            expiry: None,
        }
    }

    /// Whether the token expires within `leeway` from now. Tokens without an
    /// expiry never expire.
    #[must_use]
    pub fn is_expired_within(&self, leeway: Duration) -> bool {
        let Some(expiry) = self.expiry else {
            return false;
        };
        let leeway = chrono::Duration::from_std(leeway).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_add_signed(leeway)
            .map_or(true, |deadline| expiry <= deadline)
    }

    pub(crate) fn from_parts(
        access_token: String,
        token_type: String,
        refresh_token: Option<String>,
        expires_in: Option<Duration>,
    ) -> Self {
        Self {
            access_token,
            token_type,
            refresh_token,
            expiry: expires_in.and_then(expiry_from_now),
        }
    }
}

impl From<BasicTokenResponse> for Token {
    fn from(response: BasicTokenResponse) -> Self {
        Self::from_parts(
            response.access_token().secret().clone(),
            response.token_type().as_ref().to_string(),
            response.refresh_token().map(|token| token.secret().clone()),
            response.expires_in(),
        )
    }
}

/// Result of a device authorization request (RFC 8628 section 3.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuth {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    /// Minimum wait between exchange attempts.
    #[serde(with = "interval_seconds")]
    pub interval: Duration,
}

impl From<StandardDeviceAuthorizationResponse> for DeviceAuth {
    fn from(response: StandardDeviceAuthorizationResponse) -> Self {
        Self {
            device_code: response.device_code().secret().clone(),
            user_code: response.user_code().secret().clone(),
            verification_uri: response.verification_uri().url().to_string(),
            verification_uri_complete: response
                .verification_uri_complete()
                .map(|uri| uri.secret().clone()),
            expiry: expiry_from_now(response.expires_in()),
            interval: response.interval(),
        }
    }
}

fn expiry_from_now(expires_in: Duration) -> Option<DateTime<Utc>> {
    let expires_in = chrono::Duration::from_std(expires_in).ok()?;
    Utc::now().checked_add_signed(expires_in)
}

mod interval_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(interval.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_computed_from_expires_in() {
        let token = Token::from_parts(
            "access".to_string(),
            "bearer".to_string(),
            None,
            Some(Duration::from_secs(3600)),
        );

        assert!(!token.is_expired_within(Duration::from_secs(60)));
        assert!(token.is_expired_within(Duration::from_secs(7200)));
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let token = Token::from_refresh_token("refresh");
        assert!(!token.is_expired_within(Duration::from_secs(u64::MAX / 2)));
    }

    #[test]
    fn test_token_serde_skips_empty_fields() {
        let token = Token::from_parts("access".to_string(), "bearer".to_string(), None, None);
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"access_token": "access", "token_type": "bearer"})
        );
    }
}
