// Entry point of the completion mailer.
//
// **Architecture Overview:**
// - `core/` = Message composition, token lifecycle and the send flow (provider-agnostic)
// - `infra/` = Implementations of core traits (credential sources, Gmail HTTP API)
//
// This file's job is to:
// 1. Load configuration
// 2. Wire the credential store and Gmail client into the mail service
// 3. Send one completion notice and report the message id

#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use std::path::PathBuf;

use anyhow::Context;

use crate::core::mail::{MailService, MailerConfig};
use crate::infra::credentials::EnvFileCredentialStore;
use crate::infra::gmail::GmailApiClient;

const USAGE: &str = "usage: completion-mailer <job-id> [output-file]";

fn recipients_from_env() -> Vec<String> {
    std::env::var("NOTIFY_EMAILS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let job_id = args.next().context(USAGE)?;
    let output_file = args.next().map(PathBuf::from);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Nothing is loaded at module level; credentials are read when the notice
    // is sent.

    let config = MailerConfig::from_env();
    let store = EnvFileCredentialStore::from_config(&config);
    let api = GmailApiClient::from_config(&config).context("Failed to create Gmail client")?;
    let service = MailService::new(store, api, config.safe_root.clone());

    let recipients = recipients_from_env();
    match service
        .send_completion_notice(&recipients, output_file.as_deref(), &job_id)
        .await
        .context("Failed to send completion email")?
    {
        Some(message_id) => println!("{}", message_id),
        None => tracing::warn!("NOTIFY_EMAILS is empty, no notification sent"),
    }

    Ok(())
}
