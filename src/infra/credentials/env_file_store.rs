use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::fs;

use crate::core::mail::{ClientDescriptor, CredentialSource, MailError, MailerConfig, TokenBundle};

/// Reads the Gmail secrets from two environment variables holding JSON, falling back
/// to two JSON files on disk.
pub struct EnvFileCredentialStore {
    client_var: String,
    token_var: String,
    client_path: PathBuf,
    token_path: PathBuf,
}

impl EnvFileCredentialStore {
    pub fn new(
        client_var: impl Into<String>,
        token_var: impl Into<String>,
        client_path: impl AsRef<Path>,
        token_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            client_var: client_var.into(),
            token_var: token_var.into(),
            client_path: client_path.as_ref().to_path_buf(),
            token_path: token_path.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &MailerConfig) -> Self {
        Self::new(
            &config.client_secret_var,
            &config.token_data_var,
            config.client_secret_path(),
            config.token_path(),
        )
    }

    fn read_env(&self) -> Option<(String, String)> {
        let client = std::env::var(&self.client_var).ok().filter(|v| !v.is_empty())?;
        let token = std::env::var(&self.token_var).ok().filter(|v| !v.is_empty())?;
        Some((client, token))
    }

    /// A missing file is `None`; a file that exists but cannot be read is an error.
    async fn read_file(path: &Path) -> Result<Option<String>, MailError> {
        match fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Credential file {} not present", path.display());
                Ok(None)
            }
            Err(source) => {
                tracing::error!("Failed to read credential file {}: {}", path.display(), source);
                Err(MailError::CredentialsUnreadable {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }

    async fn read_files(&self) -> Result<Option<(String, String)>, MailError> {
        let Some(client) = Self::read_file(&self.client_path).await? else {
            return Ok(None);
        };
        let Some(token) = Self::read_file(&self.token_path).await? else {
            return Ok(None);
        };
        Ok(Some((client, token)))
    }

    fn not_found(&self) -> MailError {
        MailError::CredentialsNotFound {
            client_var: self.client_var.clone(),
            token_var: self.token_var.clone(),
            client_file: self.client_path.display().to_string(),
            token_file: self.token_path.display().to_string(),
        }
    }
}

fn parse<T: DeserializeOwned>(origin: &str, text: &str) -> Result<T, MailError> {
    serde_json::from_str(text).map_err(|source| {
        tracing::error!("Error parsing JSON from {}: {}", origin, source);
        MailError::CredentialsMalformed {
            origin: origin.to_string(),
            source,
        }
    })
}

#[async_trait]
impl CredentialSource for EnvFileCredentialStore {
    async fn load(&self) -> Result<(ClientDescriptor, TokenBundle), MailError> {
        let (client_text, token_text, client_origin, token_origin) =
            if let Some((client, token)) = self.read_env() {
                tracing::info!("Loading Gmail credentials from environment");
                (client, token, self.client_var.clone(), self.token_var.clone())
            } else if let Some((client, token)) = self.read_files().await? {
                tracing::info!(
                    "Loading Gmail credentials from {} and {}",
                    self.client_path.display(),
                    self.token_path.display()
                );
                (
                    client,
                    token,
                    self.client_path.display().to_string(),
                    self.token_path.display().to_string(),
                )
            } else {
                let err = self.not_found();
                tracing::error!("{}", err);
                return Err(err);
            };

        let client = ClientDescriptor::new(parse(&client_origin, &client_text)?);
        let mut tokens: TokenBundle = parse(&token_origin, &token_text)?;
        tokens.fill_client_from(&client);

        tracing::info!("Successfully loaded and parsed Gmail credentials");
        Ok((client, tokens))
    }
}
