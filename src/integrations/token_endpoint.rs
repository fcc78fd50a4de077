//! Shared OAuth 2.0 token endpoint client.
//!
//! Providers differ only in where the client credentials travel (form body
//! or HTTP Basic) and in their defaults; the request/response handling and
//! its logging are the same for all of them.

use super::redact::{redact_body, redact_form};
use super::{IntegrationConfig, IntegrationType, TokenResponse};
use crate::error::AdapterError;
use reqwest::header::ACCEPT;
use serde_json::Value;

/// Where the client id/secret are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientAuth {
    /// `client_id` and `client_secret` form fields
    RequestBody,
    /// `Authorization: Basic base64(id:secret)`
    BasicAuth,
}

pub(crate) struct TokenEndpoint {
    integration: IntegrationType,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    client_auth: ClientAuth,
    http: reqwest::Client,
}

impl TokenEndpoint {
    pub(crate) fn from_config(
        integration: IntegrationType,
        config: &IntegrationConfig,
        default_token_url: &str,
        client_auth: ClientAuth,
        http: reqwest::Client,
    ) -> Result<Self, AdapterError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AdapterError::NotConfigured(format!("{} {} is not set", integration, name)))
        };

        Ok(Self {
            integration,
            client_id: required(&config.client_id, "client_id")?,
            client_secret: required(&config.client_secret, "client_secret")?,
            redirect_uri: required(&config.redirect_uri, "redirect_uri")?,
            token_url: config
                .token_url
                .clone()
                .unwrap_or_else(|| default_token_url.to_string()),
            client_auth,
            http,
        })
    }

    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Authorization-code grant.
    pub(crate) async fn authorization_code(&self, code: &str) -> Result<TokenResponse, AdapterError> {
        self.request(
            "exchange_auth_code",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .await
    }

    /// Refresh-token grant.
    pub(crate) async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AdapterError> {
        self.request(
            "refresh_access_token",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn request(
        &self,
        operation: &str,
        grant: &[(&str, &str)],
    ) -> Result<TokenResponse, AdapterError> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        let mut request = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json");

        match self.client_auth {
            ClientAuth::RequestBody => {
                form.push(("client_id", self.client_id.as_str()));
                form.push(("client_secret", self.client_secret.as_str()));
            }
            ClientAuth::BasicAuth => {
                request = request.basic_auth(&self.client_id, Some(&self.client_secret));
            }
        }

        tracing::info!(
            integration = %self.integration,
            operation,
            token_url = %self.token_url,
            request = %redact_form(&form),
            "Calling token endpoint"
        );

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| self.unavailable(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.unavailable(operation, e))?;
        let redacted = redact_body(&body);

        tracing::info!(
            integration = %self.integration,
            operation,
            status = status.as_u16(),
            response = %redacted,
            "Token endpoint responded"
        );

        if !status.is_success() {
            tracing::error!(
                integration = %self.integration,
                operation,
                status = status.as_u16(),
                "Token endpoint rejected request"
            );
            return Err(self.upstream_auth(status.as_u16(), redacted));
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| AdapterError::InvalidResponse {
            integration: self.integration.to_string(),
            reason: format!("response is not JSON: {}", e),
        })?;

        // Some providers report grant failures as 200 with an error field
        if value.get("error").is_some() && value.get("access_token").is_none() {
            tracing::error!(
                integration = %self.integration,
                operation,
                "Token endpoint returned an error payload"
            );
            return Err(self.upstream_auth(status.as_u16(), redacted));
        }

        serde_json::from_value(value).map_err(|e| AdapterError::InvalidResponse {
            integration: self.integration.to_string(),
            reason: e.to_string(),
        })
    }

    fn upstream_auth(&self, status: u16, body: String) -> AdapterError {
        AdapterError::UpstreamAuth {
            integration: self.integration.to_string(),
            status,
            body,
        }
    }

    fn unavailable(&self, operation: &str, e: reqwest::Error) -> AdapterError {
        let reason = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        };
        tracing::warn!(
            integration = %self.integration,
            operation,
            reason = %reason,
            "Token endpoint unreachable"
        );
        AdapterError::UpstreamUnavailable {
            integration: self.integration.to_string(),
            reason,
        }
    }
}

/// Builds a provider consent URL.
pub(crate) fn authorization_url(
    auth_url: &str,
    endpoint: &TokenEndpoint,
    scopes: &[String],
    scope_separator: &str,
    state: &str,
    extra: &[(&str, &str)],
) -> String {
    let mut url = format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        auth_url,
        urlencoding::encode(endpoint.client_id()),
        urlencoding::encode(endpoint.redirect_uri()),
        urlencoding::encode(&scopes.join(scope_separator)),
        urlencoding::encode(state),
    );
    for (key, value) in extra {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}
