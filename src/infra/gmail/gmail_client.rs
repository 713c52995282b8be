use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::core::mail::{MailApi, MailError, MailerConfig, RefreshedToken, SendResult, TokenBundle};

/// Response from Google's token endpoint for a refresh grant.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    email_address: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    raw: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Thin Gmail REST client: token refresh, profile lookup, `messages.send`.
pub struct GmailApiClient {
    client: Client,
    base_url: String,
}

impl GmailApiClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("completion-mailer/0.1")
            .build()
            .map_err(|e| MailError::Endpoint {
                status: None,
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &MailerConfig) -> Result<Self, MailError> {
        Self::new(config.api_base.clone(), config.http_timeout)
    }

    fn users_url(&self, tail: &str) -> String {
        format!("{}/gmail/v1/users/me/{}", self.base_url, tail)
    }

    async fn endpoint_error(what: &str, response: Response) -> MailError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        MailError::Endpoint {
            status: Some(status.as_u16()),
            message: format!("{} returned {}: {}", what, status, body),
        }
    }

    fn transport_error(what: &str, e: reqwest::Error) -> MailError {
        MailError::Endpoint {
            status: e.status().map(|s| s.as_u16()),
            message: format!("{} failed: {}", what, e),
        }
    }
}

#[async_trait]
impl MailApi for GmailApiClient {
    async fn refresh_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken, MailError> {
        let response = self
            .client
            .post(&tokens.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", tokens.refresh_token.as_str()),
                ("client_id", tokens.client_id.as_str()),
                ("client_secret", tokens.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MailError::TokenRefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MailError::TokenRefreshFailed(format!(
                "token exchange failed ({}): {}",
                status, text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailError::TokenRefreshFailed(e.to_string()))?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }

    async fn get_profile(&self, access_token: &str) -> Result<String, MailError> {
        let response = self
            .client
            .get(self.users_url("profile"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Self::transport_error("profile request", e))?;

        if !response.status().is_success() {
            return Err(Self::endpoint_error("profile request", response).await);
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| Self::transport_error("profile decode", e))?;
        Ok(profile.email_address)
    }

    async fn send_raw(&self, access_token: &str, raw: &str) -> Result<SendResult, MailError> {
        let response = self
            .client
            .post(self.users_url("messages/send"))
            .bearer_auth(access_token)
            .json(&SendRequest { raw })
            .send()
            .await
            .map_err(|e| Self::transport_error("messages.send", e))?;

        if !response.status().is_success() {
            return Err(Self::endpoint_error("messages.send", response).await);
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| Self::transport_error("messages.send decode", e))?;
        Ok(sent.id)
    }
}
