#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `WebAuthn` passkey ceremony engine
//!
//! Issues registration and authentication challenges, binds them to
//! single-use sessions, verifies authenticator responses and keeps credential
//! counters for clone detection.

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ceremony;
pub mod models;
pub mod settings;
pub mod store;
pub mod utils;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use ceremony::{
    CeremonyError, CeremonyService, CredentialStoreDirectory, PasskeyCeremonies, UserDirectory,
};
pub use models::{ChallengeSession, Credential, CredentialId, PasskeyUser, UserAccount, UserId};
pub use settings::CeremonySettings;
pub use store::{
    ChallengeSessionStore, CredentialStore, MemoryCredentialStore, MemorySessionStore,
    SessionSelector,
};
pub use webauthn::{RelyingParty, VerificationError};
