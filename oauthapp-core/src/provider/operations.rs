//! Grant flows
//!
//! One concrete operations object implements both capability traits. Every
//! call resolves the endpoint through the provider's override first, so a
//! multi-tenant provider can serve a different tenant per call.
//!
//! Token endpoint errors are normalized into [`OAuthError`]; only the device
//! code exchange reclassifies `access_denied` and `expired_token` as
//! user-caused.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    DeviceAuthorizationUrl, EndpointNotSet, EndpointSet, RedirectUrl, RefreshToken,
    RequestTokenError, Scope, StandardDeviceAuthorizationResponse, TokenUrl,
};
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, warn};

use super::endpoint::{AuthStyle, Endpoint};
use super::options::{
    AuthCodeExchangeOptions, AuthCodeUrlOptions, ClientCredentialsOptions, DeviceCodeAuthOptions,
    DeviceCodeExchangeOptions, RefreshTokenOptions,
};
use super::token::{DeviceAuth, Token};
use super::{PrivateOperations, Provider, ProviderOptions, PublicOperations};
use crate::error::OAuthError;
use crate::{Error, Result};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Device exchange codes that mean the user declined or ran out of time.
const USER_DEVICE_CODES: [&str; 2] = ["access_denied", "expired_token"];

/// A client that can only talk to the token endpoint.
type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

type TokenResult<RE> =
    std::result::Result<BasicTokenResponse, RequestTokenError<RE, BasicErrorResponse>>;

/// Authentication styles learned while auto-detecting, keyed by
/// `(token_url, client_id)`.
#[derive(Debug, Default)]
pub(crate) struct AuthStyleMemo {
    styles: RwLock<HashMap<(String, String), AuthStyle>>,
}

impl AuthStyleMemo {
    fn get(&self, token_url: &str, client_id: &str) -> Option<AuthStyle> {
        self.styles
            .read()
            .get(&(token_url.to_string(), client_id.to_string()))
            .copied()
    }

    fn remember(&self, token_url: &str, client_id: &str, style: AuthStyle) {
        self.styles
            .write()
            .insert((token_url.to_string(), client_id.to_string()), style);
    }
}

pub(crate) struct BasicOperations {
    provider: Provider,
    client_id: String,
    client_secret: Option<String>,
}

impl BasicOperations {
    pub(crate) const fn new(
        provider: Provider,
        client_id: String,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            provider,
            client_id,
            client_secret,
        }
    }

    fn endpoint(&self, options: &ProviderOptions) -> Endpoint {
        self.provider.resolve_endpoint(options)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.provider.is_closed() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn token_client(&self, token_url: &str, style: AuthStyle) -> Result<TokenClient> {
        let token_url = TokenUrl::new(token_url.to_string())
            .map_err(|err| OAuthError::transport("invalid token URL", err))?;
        let auth_type = match style {
            AuthStyle::InParams => AuthType::RequestBody,
            AuthStyle::InHeader | AuthStyle::AutoDetect => AuthType::BasicAuth,
        };

        let mut client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_token_uri(token_url)
            .set_auth_type(auth_type);
        if let Some(secret) = &self.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        Ok(client)
    }

    /// Run a token request, honouring the endpoint's authentication style.
    ///
    /// Auto-detection tries the `Authorization` header first and retries with
    /// form parameters when the provider rejects it. The style that worked is
    /// remembered for the provider's lifetime.
    async fn request_token<F, Fut, RE>(
        &self,
        endpoint: &Endpoint,
        grant: &'static str,
        request: F,
    ) -> Result<Token>
    where
        F: Fn(TokenClient) -> Fut,
        Fut: Future<Output = TokenResult<RE>>,
        RE: std::error::Error + Send + Sync + 'static,
    {
        let token_url = endpoint.token_url.as_str();
        let (style, probing) = match endpoint.auth_style {
            AuthStyle::AutoDetect => self
                .provider
                .auth_styles
                .get(token_url, &self.client_id)
                .map_or((AuthStyle::InHeader, true), |style| (style, false)),
            style => (style, false),
        };

        debug!(grant, token_url, auth_style = ?style, "Requesting token");

        let rejected = match request(self.token_client(token_url, style)?).await {
            Ok(response) => {
                if probing {
                    self.provider.auth_styles.remember(token_url, &self.client_id, style);
                }
                return Ok(Token::from(response));
            }
            Err(err) => map_request_error(err),
        };

        // Only a provider error response means the header was rejected.
        if !probing || rejected.code().is_none() {
            return Err(rejected.into());
        }
        warn!(
            grant,
            token_url,
            error = rejected.code().unwrap_or_default(),
            "Token endpoint rejected header credentials, retrying with form parameters"
        );

        let response = request(self.token_client(token_url, AuthStyle::InParams)?)
            .await
            .map_err(map_request_error)?;
        self.provider
            .auth_styles
            .remember(token_url, &self.client_id, AuthStyle::InParams);
        Ok(Token::from(response))
    }
}

impl fmt::Debug for BasicOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicOperations")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl PublicOperations for BasicOperations {
    fn auth_code_url(&self, state: &str, options: AuthCodeUrlOptions) -> Result<Option<String>> {
        if self.provider.endpoint().auth_url.is_none() {
            return Ok(None);
        }

        let endpoint = self.endpoint(&options.provider_options);
        let Some(auth_url) = endpoint.auth_url else {
            return Ok(None);
        };
        let auth_url = AuthUrl::new(auth_url)
            .map_err(|err| OAuthError::transport("invalid authorization URL", err))?;

        let mut client =
            BasicClient::new(ClientId::new(self.client_id.clone())).set_auth_uri(auth_url);
        if let Some(redirect_url) = options.redirect_url {
            let redirect_url = RedirectUrl::new(redirect_url)
                .map_err(|err| OAuthError::transport("invalid redirect URL", err))?;
            client = client.set_redirect_uri(redirect_url);
        }

        let state = state.to_string();
        let mut request = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(options.scopes.into_iter().map(Scope::new));
        for (name, value) in options.extra_params {
            request = request.add_extra_param(name, value);
        }

        let (url, _state) = request.url();
        Ok(Some(url.to_string()))
    }

    async fn device_code_auth(&self, options: DeviceCodeAuthOptions) -> Result<Option<DeviceAuth>> {
        if self.provider.endpoint().device_url.is_none() {
            return Ok(None);
        }
        self.ensure_open()?;

        let endpoint = self.endpoint(&options.provider_options);
        let Some(device_url) = endpoint.device_url else {
            return Ok(None);
        };
        debug!(device_url = %device_url, "Requesting device authorization");

        let device_url = DeviceAuthorizationUrl::new(device_url)
            .map_err(|err| OAuthError::transport("invalid device authorization URL", err))?;
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_device_authorization_url(device_url)
            .set_auth_type(AuthType::RequestBody);

        let details: StandardDeviceAuthorizationResponse = client
            .exchange_device_code()
            .add_scopes(options.scopes.into_iter().map(Scope::new))
            .request_async(&self.provider.http)
            .await
            .map_err(map_request_error)?;

        Ok(Some(DeviceAuth::from(details)))
    }

    async fn device_code_exchange(
        &self,
        device_code: &str,
        options: DeviceCodeExchangeOptions,
    ) -> Result<Token> {
        self.ensure_open()?;

        let endpoint = self.endpoint(&options.provider_options);
        debug!(token_url = %endpoint.token_url, "Exchanging device code");

        let form = [
            ("client_id", self.client_id.as_str()),
            ("device_code", device_code),
            ("grant_type", DEVICE_CODE_GRANT),
        ];
        let exchange = async {
            let response = self
                .provider
                .http
                .post(&endpoint.token_url)
                .header(ACCEPT, "application/json")
                .form(&form)
                .send()
                .await
                .map_err(|err| OAuthError::transport("token request failed", err))?;
            read_token_response(response).await
        };

        exchange
            .await
            .map_err(|err| err.mark_user_if_code(&USER_DEVICE_CODES).into())
    }

    async fn refresh_token(&self, token: &Token, options: RefreshTokenOptions) -> Result<Token> {
        self.ensure_open()?;

        let refresh_token = token
            .refresh_token
            .as_deref()
            .filter(|refresh_token| !refresh_token.is_empty())
            .map(|refresh_token| RefreshToken::new(refresh_token.to_string()))
            .ok_or_else(|| OAuthError::other("token expired and refresh token is not set"))?;

        let endpoint = self.endpoint(&options.provider_options);
        let http = &self.provider.http;
        let mut refreshed = self
            .request_token(&endpoint, "refresh_token", |client| {
                let refresh_token = refresh_token.clone();
                let http = http.clone();
                async move {
                    client
                        .exchange_refresh_token(&refresh_token)
                        .request_async(&http)
                        .await
                }
            })
            .await?;

        // Providers that do not rotate refresh tokens omit it from the response.
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token.secret().clone());
        }
        Ok(refreshed)
    }
}

#[async_trait]
impl PrivateOperations for BasicOperations {
    async fn auth_code_exchange(
        &self,
        code: &str,
        options: AuthCodeExchangeOptions,
    ) -> Result<Token> {
        self.ensure_open()?;

        let endpoint = self.endpoint(&options.provider_options);
        let redirect_url = options
            .redirect_url
            .map(RedirectUrl::new)
            .transpose()
            .map_err(|err| OAuthError::transport("invalid redirect URL", err))?;
        let code = AuthorizationCode::new(code.to_string());
        let extra_params = &options.extra_params;
        let http = &self.provider.http;

        self.request_token(&endpoint, "authorization_code", |client| {
            let client = match &redirect_url {
                Some(redirect_url) => client.set_redirect_uri(redirect_url.clone()),
                None => client,
            };
            let code = code.clone();
            let extra_params = extra_params.clone();
            let http = http.clone();
            async move {
                let mut request = client.exchange_code(code);
                for (name, value) in extra_params {
                    request = request.add_extra_param(name, value);
                }
                request.request_async(&http).await
            }
        })
        .await
    }

    async fn client_credentials(&self, options: ClientCredentialsOptions) -> Result<Token> {
        self.ensure_open()?;

        let endpoint = self.endpoint(&options.provider_options);
        let scopes: Vec<Scope> = options.scopes.iter().cloned().map(Scope::new).collect();
        let endpoint_params = &options.endpoint_params;
        let http = &self.provider.http;

        self.request_token(&endpoint, "client_credentials", |client| {
            let scopes = scopes.clone();
            let endpoint_params = endpoint_params.clone();
            let http = http.clone();
            async move {
                let mut request = client.exchange_client_credentials().add_scopes(scopes);
                for (name, value) in endpoint_params {
                    request = request.add_extra_param(name, value);
                }
                request.request_async(&http).await
            }
        })
        .await
    }
}

fn map_request_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> OAuthError
where
    RE: std::error::Error + Send + Sync + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => server_error(&response),
        // Some providers answer 200 with an error body.
        RequestTokenError::Parse(err, body) => serde_json::from_slice::<BasicErrorResponse>(&body)
            .map_or_else(
                |_| OAuthError::transport("malformed provider response", err),
                |response| server_error(&response),
            ),
        RequestTokenError::Request(err) => OAuthError::transport("request failed", err),
        RequestTokenError::Other(message) => OAuthError::other(message),
    }
}

fn server_error(response: &BasicErrorResponse) -> OAuthError {
    OAuthError::server(
        AsRef::<str>::as_ref(response.error()),
        response.error_description().cloned(),
        response.error_uri().cloned(),
    )
}

/// Token endpoint response, success and error fields together.
#[derive(Debug, Default, Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<ExpiresIn>,
    error: Option<String>,
    error_description: Option<String>,
    error_uri: Option<String>,
}

/// Some providers send `expires_in` as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(seconds) => Some(*seconds),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Decode a token endpoint response, JSON or form-encoded.
async fn read_token_response(
    response: reqwest::Response,
) -> std::result::Result<Token, OAuthError> {
    let status = response.status();
    let form_encoded = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value.starts_with("application/x-www-form-urlencoded")
                || value.starts_with("text/plain")
        });
    let body = response
        .bytes()
        .await
        .map_err(|err| OAuthError::transport("reading token response failed", err))?;

    let parsed = if form_encoded {
        serde_urlencoded::from_bytes::<RawTokenResponse>(&body)
            .map_err(|err| OAuthError::transport("malformed token response", err))
    } else {
        serde_json::from_slice::<RawTokenResponse>(&body)
            .map_err(|err| OAuthError::transport("malformed token response", err))
    };
    let raw = match parsed {
        Ok(raw) => raw,
        Err(_) if !status.is_success() => {
            return Err(OAuthError::other(format!("token endpoint returned HTTP {status}")));
        }
        Err(err) => return Err(err),
    };

    if let Some(code) = raw.error.filter(|code| !code.is_empty()) {
        return Err(OAuthError::server(code, raw.error_description, raw.error_uri));
    }
    if !status.is_success() {
        return Err(OAuthError::other(format!("token endpoint returned HTTP {status}")));
    }

    let access_token = raw
        .access_token
        .filter(|access_token| !access_token.is_empty())
        .ok_or_else(|| OAuthError::other("server response missing access_token"))?;

    Ok(Token::from_parts(
        access_token,
        raw.token_type.unwrap_or_default(),
        raw.refresh_token.filter(|refresh_token| !refresh_token.is_empty()),
        raw.expires_in
            .as_ref()
            .and_then(ExpiresIn::seconds)
            .filter(|seconds| *seconds > 0)
            .map(std::time::Duration::from_secs),
    ))
}
