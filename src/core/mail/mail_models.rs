use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tokens are refreshed this long before their stated expiry to absorb clock skew.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Sender sentinel meaning "whichever account the token belongs to".
pub const AUTHENTICATED_SENDER: &str = "me";

/// The OAuth2 client descriptor issued by Google (`credentials.json`).
///
/// Kept as raw JSON: the only thing we ever need out of it is the client id/secret
/// pair, and Google nests those under either `installed` or `web`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientDescriptor(Value);

impl ClientDescriptor {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    fn field(&self, key: &str) -> Option<&str> {
        ["installed", "web"]
            .iter()
            .filter_map(|section| self.0.get(section))
            .chain(std::iter::once(&self.0))
            .find_map(|obj| obj.get(key).and_then(Value::as_str))
    }

    pub fn client_id(&self) -> Option<&str> {
        self.field("client_id")
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.field("client_secret")
    }
}

/// User token bundle as written by Google's auth libraries (`token.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBundle {
    #[serde(rename = "token", alias = "access_token", default)]
    pub access_token: String,
    pub refresh_token: String,
    #[serde(alias = "token_endpoint_url")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl TokenBundle {
    /// An empty access token is always expired. A token with no recorded expiry is
    /// trusted until the API says otherwise.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expiry {
            Some(expiry) => now >= expiry - Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Replaces the access token in memory. The refresh token is never touched.
    pub fn apply_refresh(&mut self, refreshed: RefreshedToken) {
        self.access_token = refreshed.access_token;
        self.expiry = refreshed.expires_at;
    }

    /// Fills in a missing client id/secret from the client descriptor.
    pub fn fill_client_from(&mut self, client: &ClientDescriptor) {
        if self.client_id.is_empty() {
            if let Some(id) = client.client_id() {
                self.client_id = id.to_string();
            }
        }
        if self.client_secret.is_empty() {
            if let Some(secret) = client.client_secret() {
                self.client_secret = secret.to_string();
            }
        }
    }
}

/// Result of a refresh-token grant.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Capability for calling the mail endpoints on behalf of one account.
#[derive(Debug, Clone, PartialEq)]
pub struct MailHandle {
    pub access_token: String,
    /// Address reported by the profile endpoint for this token.
    pub account: String,
}

/// What the caller wants sent. Turned into an [`OutboundMessage`] by the composer.
#[derive(Debug, Clone, PartialEq)]
pub struct MailRequest {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

/// A fully composed message. Only the composer builds these; the sender, body and
/// attachments live on in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub(super) recipients: Vec<String>,
    pub(super) subject: String,
    pub(super) raw: String,
}

impl OutboundMessage {
    /// Recipients as they appear in the `To` header.
    pub fn to_header(&self) -> String {
        self.recipients.join(", ")
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// URL-safe base64 of the RFC 5322 byte stream, ready for `messages.send`.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Provider-assigned id of a sent message.
pub type SendResult = String;
