// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External identity handoff.
//!
//! The orchestrator never talks OAuth wire details; it sees the
//! [`IdentityHandoff`] seam: build an authorization URL carrying a CSRF
//! state value, then (when the provider redirects back) resolve the
//! authorization code into a verified `(email, display name)` pair. The
//! production implementation speaks the standard authorization-code flow:
//! a form POST to the token endpoint followed by a userinfo fetch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::OAuthConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const OAUTH_SCOPES: &str = "openid email profile";

/// An authenticated identity, owned transiently by one check-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider rejected the code exchange: {0}")]
    Exchange(String),

    #[error("identity provider request failed: {0}")]
    Request(String),

    #[error("identity provider response was invalid: {0}")]
    InvalidResponse(String),

    #[error("identity provider unreachable: {0}")]
    Unreachable(String),
}

/// The external authorization round trip, as the orchestrator sees it.
#[async_trait]
pub trait IdentityHandoff: Send + Sync {
    /// URL to send the user to, carrying the per-session `state` value the
    /// provider must echo back on the callback.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange the callback's authorization code for an identity.
    async fn resolve(&self, code: &str) -> Result<Identity, IdentityError>;
}

/// Authorization-code-flow client for an OIDC-style provider.
pub struct OAuthIdentityProvider {
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    redirect_url: String,
    http: Client,
}

impl OAuthIdentityProvider {
    pub fn new(config: &OAuthConfig, public_base_url: &str) -> Result<Self, IdentityError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
            redirect_url: format!("{}/callback", public_base_url.trim_end_matches('/')),
            http,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, IdentityError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    IdentityError::Unreachable(e.to_string())
                } else {
                    IdentityError::Request(format!("token request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(IdentityError::Exchange(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IdentityError::InvalidResponse(format!("invalid token response: {e}")))?;

        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                IdentityError::InvalidResponse(
                    "token response did not include access_token".to_string(),
                )
            })
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<Identity, IdentityError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    IdentityError::Unreachable(e.to_string())
                } else {
                    IdentityError::Request(format!("userinfo request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(IdentityError::Request(format!(
                "userinfo endpoint returned {status}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            IdentityError::InvalidResponse(format!("invalid userinfo response: {e}"))
        })?;

        let email = body
            .get("email")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                IdentityError::InvalidResponse("userinfo did not include an email".to_string())
            })?;

        // Fall back to the mailbox part when the provider sends no name.
        let display_name = body
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(Identity {
            email,
            display_name,
        })
    }
}

#[async_trait]
impl IdentityHandoff for OAuthIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        let params = [
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("scope", OAUTH_SCOPES),
            ("state", state),
        ];
        match Url::parse_with_params(&self.auth_url, params) {
            Ok(url) => url.to_string(),
            // auth_url is validated at startup by construction from config;
            // a parse failure here would be a misconfiguration.
            Err(_) => self.auth_url.clone(),
        }
    }

    async fn resolve(&self, code: &str) -> Result<Identity, IdentityError> {
        let access_token = self.exchange_code(code).await?;
        self.fetch_userinfo(&access_token).await
    }
}
