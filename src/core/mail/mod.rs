// Mail notification core.
// - `mail_models.rs` holds the credential, token and message types.
// - `composer.rs` builds MIME messages and guards attachment paths.
// - `mail_service.rs` owns the auth/compose/send flow and the traits infra implements.

pub mod composer;
pub mod mail_config;
pub mod mail_models;
pub mod mail_service;

pub use mail_config::MailerConfig;
pub use mail_models::{ClientDescriptor, RefreshedToken, SendResult, TokenBundle};
pub use mail_service::{CredentialSource, MailApi, MailError, MailService};
