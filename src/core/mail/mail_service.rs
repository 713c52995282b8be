use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::composer::{compose, guard_attachment_path};
use super::mail_models::{
    ClientDescriptor, MailHandle, MailRequest, OutboundMessage, RefreshedToken, SendResult,
    TokenBundle, AUTHENTICATED_SENDER,
};

/// Everything that can go wrong between loading secrets and handing a message to Gmail.
#[derive(Debug, Error)]
pub enum MailError {
    #[error(
        "Gmail credentials not found. Either set the {client_var} and {token_var} environment \
         variables, or create {client_file} and {token_file}."
    )]
    CredentialsNotFound {
        client_var: String,
        token_var: String,
        client_file: String,
        token_file: String,
    },
    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed credentials in {origin}: {source}")]
    CredentialsMalformed {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to refresh access token: {0}")]
    TokenRefreshFailed(String),
    #[error("File path is outside the allowed directory: {}", .0.display())]
    UnsafeAttachmentPath(PathBuf),
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
    #[error("Failed to read attachment {}: {source}", .path.display())]
    AttachmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build message: {0}")]
    Compose(String),
    #[error("Gmail API error: {message}")]
    Endpoint { status: Option<u16>, message: String },
}

impl MailError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, MailError::Endpoint { status: Some(401), .. })
    }
}

/// Where the OAuth2 client descriptor and token bundle come from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Re-reads the secrets on every call; nothing is cached.
    async fn load(&self) -> Result<(ClientDescriptor, TokenBundle), MailError>;
}

/// The three provider calls the mailer needs.
#[async_trait]
pub trait MailApi: Send + Sync {
    async fn refresh_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken, MailError>;

    /// Returns the email address of the account the token belongs to.
    async fn get_profile(&self, access_token: &str) -> Result<String, MailError>;

    /// Submits a base64url message and returns the provider's message id.
    async fn send_raw(&self, access_token: &str, raw: &str) -> Result<SendResult, MailError>;
}

pub fn completion_subject(job_id: &str) -> String {
    format!("Document Processing Complete - Document ID: {}", job_id)
}

pub fn completion_body(job_id: &str) -> String {
    format!(
        "Hello,\n\n\
         Your document processing has been completed successfully.\n\
         Document ID: {}\n\n\
         Please find the processed document attached to this email.\n\n\
         Best regards,\n\
         Automated Testing System\n",
        job_id
    )
}

/// Loads credentials, authenticates and sends. Holds no state between calls: every
/// send starts from a fresh credential load.
pub struct MailService<C: CredentialSource, A: MailApi> {
    credentials: C,
    api: A,
    safe_root: PathBuf,
}

impl<C: CredentialSource, A: MailApi> MailService<C, A> {
    pub fn new(credentials: C, api: A, safe_root: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            api,
            safe_root: safe_root.into(),
        }
    }

    /// Refreshes the token when expired (or when forced), then probes the profile
    /// endpoint to confirm the token works and learn the account address.
    pub async fn build_handle(
        &self,
        tokens: &mut TokenBundle,
        force_refresh: bool,
    ) -> Result<MailHandle, MailError> {
        if force_refresh || tokens.is_expired() {
            tracing::info!(forced = force_refresh, "Refreshing Gmail access token");
            let refreshed = self.api.refresh_token(tokens).await.map_err(|e| {
                tracing::error!("Failed to refresh token: {}", e);
                match e {
                    MailError::TokenRefreshFailed(_) => e,
                    other => MailError::TokenRefreshFailed(other.to_string()),
                }
            })?;
            tokens.apply_refresh(refreshed);
            tracing::info!("Token refreshed successfully");
        }

        let account = self.api.get_profile(&tokens.access_token).await?;
        tracing::info!("Connected to Gmail account: {}", account);

        Ok(MailHandle {
            access_token: tokens.access_token.clone(),
            account,
        })
    }

    pub async fn send(
        &self,
        handle: &MailHandle,
        message: &OutboundMessage,
    ) -> Result<SendResult, MailError> {
        match self.api.send_raw(&handle.access_token, message.raw()).await {
            Ok(id) => {
                tracing::debug!(
                    to = %message.to_header(),
                    subject = %message.subject(),
                    "Gmail accepted message {}",
                    id
                );
                Ok(id)
            }
            Err(e) => {
                tracing::error!("An error occurred while sending email: {}", e);
                Err(e)
            }
        }
    }

    async fn attempt(
        &self,
        tokens: &mut TokenBundle,
        request: &MailRequest,
        force_refresh: bool,
    ) -> Result<SendResult, MailError> {
        let handle = self.build_handle(tokens, force_refresh).await?;

        let message = if request.sender.is_empty() || request.sender == AUTHENTICATED_SENDER {
            let resolved = MailRequest {
                sender: handle.account.clone(),
                ..request.clone()
            };
            compose(&resolved, &self.safe_root).await?
        } else {
            compose(request, &self.safe_root).await?
        };

        self.send(&handle, &message).await
    }

    /// Full pipeline: guard attachments, load credentials, authenticate, compose, send.
    ///
    /// A 401 from the profile probe or the send forces one token refresh and one more
    /// attempt. Whatever the second attempt returns is final.
    pub async fn send_mail(&self, request: &MailRequest) -> Result<SendResult, MailError> {
        for path in &request.attachments {
            guard_attachment_path(path, &self.safe_root)?;
        }

        let (_client, mut tokens) = self.credentials.load().await?;

        match self.attempt(&mut tokens, request, false).await {
            Err(e) if e.is_unauthorized() => {
                tracing::info!("Received 401 from Gmail, forcing token refresh and retrying once");
                self.attempt(&mut tokens, request, true).await
            }
            result => result,
        }
    }

    /// Mails the output of a finished job to `recipients`.
    ///
    /// An empty recipient list is not an error: nothing is sent and `None` comes back.
    pub async fn send_completion_notice(
        &self,
        recipients: &[String],
        output_file: Option<&Path>,
        job_id: &str,
    ) -> Result<Option<SendResult>, MailError> {
        if recipients.is_empty() {
            tracing::warn!("No email addresses provided for notification");
            return Ok(None);
        }

        let attachments = output_file
            .filter(|path| !path.as_os_str().is_empty())
            .map(|path| vec![path.to_path_buf()])
            .unwrap_or_default();

        let request = MailRequest {
            sender: AUTHENTICATED_SENDER.to_string(),
            recipients: recipients.to_vec(),
            subject: completion_subject(job_id),
            body: completion_body(job_id),
            attachments,
        };

        match self.send_mail(&request).await {
            Ok(id) => {
                tracing::info!("Completion email sent successfully. Message ID: {}", id);
                Ok(Some(id))
            }
            Err(e) => {
                tracing::error!("Failed to send completion email: {}", e);
                Err(e)
            }
        }
    }
}
