//! OIDC discovery and the deprecated custom provider version
//!
//! Run with: cargo test --test discovery

use oauthapp_core::provider::{
    Discoverer, DiscoveryError, HttpDiscoverer, ProviderOptions, Registry,
};
use oauthapp_core::Error;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve_document(server: &MockServer, issuer: &str) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "jwks_uri": format!("{}/keys", server.uri()),
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_http_discoverer() {
    let server = MockServer::start().await;
    serve_document(&server, &server.uri()).await;

    let endpoints = HttpDiscoverer::new(reqwest::Client::new())
        .discover(&server.uri())
        .await
        .unwrap();

    assert_eq!(endpoints.issuer, server.uri());
    assert_eq!(endpoints.auth_url, Some(format!("{}/authorize", server.uri())));
    assert_eq!(endpoints.token_url, Some(format!("{}/token", server.uri())));
}

#[tokio::test]
async fn test_http_discoverer_issuer_mismatch() {
    let server = MockServer::start().await;
    serve_document(&server, "https://elsewhere.example.com").await;

    let err = HttpDiscoverer::new(reqwest::Client::new())
        .discover(&server.uri())
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::IssuerMismatch { .. }));
}

#[tokio::test]
async fn test_http_discoverer_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = HttpDiscoverer::new(reqwest::Client::new())
        .discover(&server.uri())
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::Status(404)));
}

#[tokio::test]
async fn test_custom_v1_resolves_endpoints() {
    let server = MockServer::start().await;
    serve_document(&server, &server.uri()).await;

    let options = ProviderOptions::from([("discovery_url".to_string(), server.uri())]);
    let provider = Registry::builtin(reqwest::Client::new())
        .construct("custom", 1, options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(provider.version(), 1);
    assert_eq!(provider.endpoint().token_url, format!("{}/token", server.uri()));
    assert_eq!(
        provider.endpoint().auth_url,
        Some(format!("{}/authorize", server.uri()))
    );
}

#[tokio::test]
async fn test_custom_v1_discovery_failure_names_option() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let options = ProviderOptions::from([("discovery_url".to_string(), server.uri())]);
    let err = Registry::builtin(reqwest::Client::new())
        .construct("custom", 1, options, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidOption(_)));
    assert_eq!(err.option(), Some("discovery_url"));
}

#[tokio::test]
async fn test_custom_v1_discovery_cancelled_with_lifetime() {
    let server = MockServer::start().await;
    serve_document(&server, &server.uri()).await;

    let lifetime = CancellationToken::new();
    lifetime.cancel();
    let options = ProviderOptions::from([("discovery_url".to_string(), server.uri())]);
    let err = Registry::builtin(reqwest::Client::new())
        .construct("custom", 1, options, lifetime)
        .await
        .unwrap_err();

    assert_eq!(err.option(), Some("discovery_url"));
}
