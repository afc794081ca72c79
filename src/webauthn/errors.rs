//! `WebAuthn` verification errors
//!
//! Every variant is a rejection of one client response. None of them is retried
//! with the same challenge session.

/// Reasons a registration or authentication response is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// Response could not be decoded into the fields the ceremony needs
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("challenge does not match the issued session")]
    ChallengeMismatch,

    #[error("origin is not an allowed relying party origin")]
    OriginMismatch,

    #[error("RP ID hash does not match the relying party")]
    RpIdMismatch,

    #[error("user presence or verification requirement not met")]
    UserVerificationFailed,

    #[error("attestation invalid: {0}")]
    AttestationInvalid(String),

    #[error("credential is already registered")]
    CredentialAlreadyRegistered,

    #[error("credential is not allowed for this session")]
    CredentialNotAllowed,

    #[error("credential not found")]
    CredentialNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("assertion signature is invalid")]
    SignatureInvalid,

    /// Counter did not advance; the authenticator secret may have been duplicated
    #[error("possible cloned authenticator (stored counter {stored}, reported {reported})")]
    PossibleCloneDetected { stored: u32, reported: u32 },
}

impl VerificationError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub(crate) fn attestation(msg: impl Into<String>) -> Self {
        Self::AttestationInvalid(msg.into())
    }
}

/// Invalid relying party configuration, detected once at startup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);
