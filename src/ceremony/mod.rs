//! Passkey ceremony orchestration
//!
//! Begin/Finish operations for registration and authentication on top of the
//! credential and session stores and the pure verifier in [`crate::webauthn`].

mod directory;
mod errors;
mod options;
mod service;

pub use directory::{CredentialStoreDirectory, DirectoryLookup, UserDirectory};
pub use errors::CeremonyError;
pub use options::*;
pub use service::{CeremonyService, IssuedChallenge, PasskeyCeremonies};
