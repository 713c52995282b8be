// Credential loading: environment variables first, JSON files second.

#[path = "env_file_store.rs"]
pub mod env_file_store;

pub use env_file_store::EnvFileCredentialStore;
