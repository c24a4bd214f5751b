//! Remote account credentials and the authenticated transport.

pub mod authenticated;
pub mod credential_store;

pub use authenticated::{system_clock, AuthenticatedClient, Clock};
pub use credential_store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
