//! `WebAuthn` verification
//!
//! Pure verification of registration and authentication responses: client data,
//! authenticator data, attestation statements and assertion signatures. This
//! module performs no I/O.

mod attestation;
mod cbor;
mod client_data;
mod crypto;
mod errors;
mod settings;
mod types;
mod verifier;

// Re-exports for public use
pub use attestation::{
    AttestationStatement, AttestationType, AttestationVerifier, StandardAttestationVerifier,
};
pub use cbor::{
    parse_attestation_object, parse_authenticator_data, AttestationObject,
    AttestedCredentialData, AuthenticatorData, AuthenticatorFlags, FLAG_ATTESTED_CREDENTIAL_DATA,
    FLAG_BACKUP_ELIGIBLE, FLAG_BACKUP_STATE, FLAG_EXTENSION_DATA, FLAG_USER_PRESENT,
    FLAG_USER_VERIFIED, MAX_CREDENTIAL_ID_LENGTH,
};
pub use client_data::{CollectedClientData, TYPE_CREATE, TYPE_GET};
pub use crypto::{
    generate_challenge, sha256, CoseAlgorithm, CoseKey, CoseKeyError, CoseKeyParams,
    CHALLENGE_LENGTH,
};
pub use errors::{ConfigurationError, VerificationError};
pub use settings::RelyingParty;
pub use types::*;
pub use verifier::{CeremonyVerifier, VerifiedAssertion};
