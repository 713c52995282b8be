// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "credentials/mod.rs"]
pub mod credentials;

#[path = "gmail/mod.rs"]
pub mod gmail;
