use std::fmt;

use thiserror::Error;

/// Boxed cause carried by option and OAuth errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown provider {0:?}")]
    UnknownProvider(String),

    #[error("provider {provider:?} has no version {version}")]
    UnsupportedVersion { provider: String, version: u32 },

    #[error("provider {0:?} is already registered")]
    DuplicateProvider(String),

    #[error(transparent)]
    InvalidOption(#[from] OptionError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("provider context cancelled")]
    Cancelled,

    #[error("failed to read configuration: {0}")]
    Storage(#[source] BoxError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Wrap an error raised by the configuration store.
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Storage(err.into())
    }

    /// Returns the offending option when this is an option error.
    #[must_use]
    pub fn option(&self) -> Option<&str> {
        match self {
            Self::InvalidOption(err) => Some(&err.option),
            _ => None,
        }
    }

    /// Whether the caller (not the system) is responsible for the failure.
    #[must_use]
    pub fn is_user_caused(&self) -> bool {
        matches!(self, Self::OAuth(err) if err.fault() == Fault::User)
    }
}

/// A configuration option that is missing, malformed or broke a downstream
/// call. Always names the option so hosts can point users at it.
#[derive(Error, Debug)]
#[error("{option}: {message}")]
pub struct OptionError {
    pub option: String,
    pub message: String,
    #[source]
    pub cause: Option<BoxError>,
}

impl OptionError {
    pub fn new(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            message: message.into(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Into<BoxError>,
    {
        self.cause = Some(cause.into());
        self
    }
}

/// Who is to blame for a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The end user declined, or took too long.
    User,
    /// Provider outage, network trouble, or anything else.
    System,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::System => f.write_str("system"),
        }
    }
}

/// A provider or transport failure normalized into the OAuth2 error model.
///
/// `code` is the RFC 6749 `error` value when the provider returned one; it is
/// `None` for transport failures and malformed responses.
#[derive(Error, Debug)]
#[error("{}", self.render())]
pub struct OAuthError {
    code: Option<String>,
    description: Option<String>,
    uri: Option<String>,
    message: Option<String>,
    fault: Fault,
    #[source]
    source: Option<BoxError>,
}

impl OAuthError {
    /// An error response returned by the provider.
    pub fn server(
        code: impl Into<String>,
        description: Option<String>,
        uri: Option<String>,
    ) -> Self {
        Self {
            code: Some(code.into()),
            description,
            uri,
            message: None,
            fault: Fault::System,
            source: None,
        }
    }

    /// A failure that never produced a usable provider response.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            code: None,
            description: None,
            uri: None,
            message: Some(message.into()),
            fault: Fault::System,
            source: Some(source.into()),
        }
    }

    /// A failure with no underlying cause.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: None,
            description: None,
            uri: None,
            message: Some(message.into()),
            fault: Fault::System,
            source: None,
        }
    }

    /// Reclassify as user-caused when the provider code is one of `codes`.
    #[must_use]
    pub fn mark_user_if_code(mut self, codes: &[&str]) -> Self {
        if self.code.as_deref().is_some_and(|code| codes.contains(&code)) {
            self.fault = Fault::User;
        }
        self
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    #[must_use]
    pub const fn fault(&self) -> Fault {
        self.fault
    }

    fn render(&self) -> String {
        let mut out = String::from("oauth2");
        if let Some(code) = &self.code {
            out.push_str(": ");
            out.push_str(code);
        }
        if let Some(description) = &self.description {
            out.push_str(": ");
            out.push_str(description);
        }
        if let Some(message) = &self.message {
            out.push_str(": ");
            out.push_str(message);
        }
        if let Some(source) = &self.source {
            out.push_str(": ");
            out.push_str(&source.to_string());
        }
        out
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_error_names_option() {
        let err: Error = OptionError::new("tenant", "tenant is required").into();
        assert_eq!(err.option(), Some("tenant"));
        assert_eq!(err.to_string(), "tenant: tenant is required");
    }

    #[test]
    fn test_option_error_keeps_cause() {
        let cause = std::io::Error::other("connection refused");
        let err = OptionError::new("discovery_url", "discovery failed").with_cause(cause);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_mark_user_only_matching_codes() {
        let denied = OAuthError::server("access_denied", None, None)
            .mark_user_if_code(&["access_denied", "expired_token"]);
        assert_eq!(denied.fault(), Fault::User);

        let pending = OAuthError::server("authorization_pending", None, None)
            .mark_user_if_code(&["access_denied", "expired_token"]);
        assert_eq!(pending.fault(), Fault::System);

        let transport = OAuthError::other("timed out").mark_user_if_code(&["access_denied"]);
        assert_eq!(transport.fault(), Fault::System);
    }

    #[test]
    fn test_oauth_error_display() {
        let err = OAuthError::server(
            "invalid_grant",
            Some("code already used".to_string()),
            None,
        );
        assert_eq!(err.to_string(), "oauth2: invalid_grant: code already used");
        assert!(!Error::from(err).is_user_caused());
    }
}
