// Gmail infra layer: talks to Google's token endpoint and the Gmail REST API.

#[path = "gmail_client.rs"]
pub mod gmail_client;

pub use gmail_client::GmailApiClient;
