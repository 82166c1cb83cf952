//! Authentication module - Persisted login credentials
//!
//! Keeps the refresh credential between runs using:
//! - The OS keychain (via keyring crate)
//! - An in-memory store for tests and ephemeral sessions

mod credential_store;

pub use credential_store::{CredentialError, CredentialStore, KeyringStore, MemoryStore};
