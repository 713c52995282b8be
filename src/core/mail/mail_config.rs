use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_CLIENT_SECRET_VAR: &str = "GMAIL_CLIENT_SECRET";
pub const DEFAULT_TOKEN_DATA_VAR: &str = "GMAIL_TOKEN_DATA";
pub const DEFAULT_CLIENT_SECRET_FILE: &str = "credentials.json";
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Whole seconds, strictly positive. A zero timeout would fail every request.
fn parse_timeout(value: Option<String>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
}

/// Runtime settings for the mailer. Everything has a default so a bare `.env` with
/// the two Gmail secrets is enough.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_base: String,
    pub client_secret_var: String,
    pub token_data_var: String,
    pub credentials_dir: PathBuf,
    pub client_secret_file: String,
    pub token_file: String,
    /// Attachments must live under this directory.
    pub safe_root: PathBuf,
    pub http_timeout: Duration,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            client_secret_var: DEFAULT_CLIENT_SECRET_VAR.to_string(),
            token_data_var: DEFAULT_TOKEN_DATA_VAR.to_string(),
            credentials_dir: PathBuf::from("."),
            client_secret_file: DEFAULT_CLIENT_SECRET_FILE.to_string(),
            token_file: DEFAULT_TOKEN_FILE.to_string(),
            safe_root: std::env::temp_dir(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl MailerConfig {
    /// Reads overrides from the environment. Call after `dotenv` has run.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let http_timeout = parse_timeout(std::env::var("MAILER_HTTP_TIMEOUT_SECS").ok())
            .unwrap_or(defaults.http_timeout);

        Self {
            api_base: std::env::var("GMAIL_API_BASE").unwrap_or(defaults.api_base),
            credentials_dir: std::env::var("MAILER_CREDENTIALS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_dir),
            safe_root: std::env::var("MAILER_SAFE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.safe_root),
            http_timeout,
            ..defaults
        }
    }

    pub fn client_secret_path(&self) -> PathBuf {
        self.credentials_dir.join(&self.client_secret_file)
    }

    pub fn token_path(&self) -> PathBuf {
        self.credentials_dir.join(&self.token_file)
    }
}
