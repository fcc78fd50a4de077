//! Zoho Books.
//!
//! Client credentials travel in the form body. Zoho answers some grant
//! failures (e.g. a reused authorization code) with HTTP 200 and an `error`
//! field, which the shared endpoint client turns into an upstream auth error.

use super::token_endpoint::{self, ClientAuth, TokenEndpoint};
use super::{expiry_from, IntegrationConfig, IntegrationType, TokenResponse};
use crate::error::AdapterError;
use chrono::{DateTime, Utc};

pub const DEFAULT_TOKEN_URL: &str = "https://accounts.zoho.in/oauth/v2/token";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.zoho.in/oauth/v2/auth";
pub const DEFAULT_EXPIRES_IN: i64 = 3600;
const DEFAULT_SCOPES: &[&str] = &["ZohoBooks.fullaccess.all"];

pub struct ZohoAdapter {
    endpoint: TokenEndpoint,
    auth_url: String,
    scopes: Vec<String>,
}

impl ZohoAdapter {
    pub fn new(config: &IntegrationConfig, http: reqwest::Client) -> Result<Self, AdapterError> {
        Ok(Self {
            endpoint: TokenEndpoint::from_config(
                IntegrationType::Zoho,
                config,
                DEFAULT_TOKEN_URL,
                ClientAuth::RequestBody,
                http,
            )?,
            auth_url: config
                .auth_url
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
            scopes: config
                .scopes
                .clone()
                .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()),
        })
    }

    pub async fn exchange_auth_code(&self, code: &str) -> Result<TokenResponse, AdapterError> {
        self.endpoint.authorization_code(code).await
    }

    /// Zoho does not rotate refresh tokens; the response carries only a new
    /// access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AdapterError> {
        self.endpoint.refresh(refresh_token).await
    }

    pub fn compute_expiry(&self, token: &TokenResponse) -> Result<DateTime<Utc>, AdapterError> {
        expiry_from(token, IntegrationType::Zoho, DEFAULT_EXPIRES_IN, Utc::now())
    }

    /// Requests offline access with forced consent so that Zoho issues a
    /// refresh token on every authorization.
    pub fn authorization_url(&self, state: &str) -> String {
        token_endpoint::authorization_url(
            &self.auth_url,
            &self.endpoint,
            &self.scopes,
            ",",
            state,
            &[("access_type", "offline"), ("prompt", "consent")],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn adapter(token_url: String) -> ZohoAdapter {
        let config = IntegrationConfig {
            client_id: Some("1000.CLIENT".to_string()),
            client_secret: Some("zoho-secret".to_string()),
            redirect_uri: Some("https://app.example.com/zoho/callback".to_string()),
            token_url: Some(token_url),
            ..Default::default()
        };
        ZohoAdapter::new(&config, reqwest::Client::new()).unwrap()
    }

    #[tokio::test]
    async fn test_exchange_sends_credentials_in_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/v2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "1000.authcode".into()),
                Matcher::UrlEncoded("client_id".into(), "1000.CLIENT".into()),
                Matcher::UrlEncoded("client_secret".into(), "zoho-secret".into()),
                Matcher::UrlEncoded(
                    "redirect_uri".into(),
                    "https://app.example.com/zoho/callback".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"1000.access","refresh_token":"1000.refresh","expires_in":3600,"api_domain":"https://www.zohoapis.in","token_type":"Bearer"}"#,
            )
            .create_async()
            .await;

        let zoho = adapter(format!("{}/oauth/v2/token", server.url()));
        let token = zoho.exchange_auth_code("1000.authcode").await.unwrap();

        assert_eq!(token.access_token, "1000.access");
        assert_eq!(token.refresh_token.as_deref(), Some("1000.refresh"));
        assert_eq!(token.additional_data().unwrap()["api_domain"], "https://www.zohoapis.in");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_without_rotation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/v2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "1000.refresh".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"1000.new","expires_in":3600}"#)
            .create_async()
            .await;

        let zoho = adapter(format!("{}/oauth/v2/token", server.url()));
        let token = zoho.refresh_access_token("1000.refresh").await.unwrap();

        assert_eq!(token.access_token, "1000.new");
        assert_eq!(token.refresh_token, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_code_reported_with_200() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/v2/token")
            .with_status(200)
            .with_body(r#"{"error":"invalid_code"}"#)
            .create_async()
            .await;

        let zoho = adapter(format!("{}/oauth/v2/token", server.url()));
        let err = zoho.exchange_auth_code("reused").await.unwrap_err();
        match err {
            AdapterError::UpstreamAuth { integration, status, body } => {
                assert_eq!(integration, "zoho");
                assert_eq!(status, 200);
                assert!(body.contains("invalid_code"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_compute_expiry_defaults_to_one_hour() {
        let zoho = adapter("https://example.com/token".to_string());
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();

        let before = Utc::now();
        let expiry = zoho.compute_expiry(&token).unwrap();
        let after = Utc::now();

        assert!(expiry >= before + chrono::Duration::seconds(DEFAULT_EXPIRES_IN));
        assert!(expiry <= after + chrono::Duration::seconds(DEFAULT_EXPIRES_IN));
    }

    #[test]
    fn test_authorization_url_requests_offline_access() {
        let zoho = adapter("https://example.com/token".to_string());
        let url = zoho.authorization_url("csrf-state");

        assert!(url.starts_with(DEFAULT_AUTH_URL));
        assert!(url.contains("scope=ZohoBooks.fullaccess.all"));
        assert!(url.contains("state=csrf-state"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }
}
