// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "mail/mod.rs"]
pub mod mail;
