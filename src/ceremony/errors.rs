//! Ceremony outcomes surfaced to callers

use crate::store::StoreError;
use crate::webauthn::{ConfigurationError, VerificationError};

/// Why a Begin or Finish call failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CeremonyError {
    /// The response was rejected; the session is already consumed
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Session expired, never existed, or was already consumed. Restart from Begin.
    #[error("challenge session expired or unknown")]
    SessionExpiredOrUnknown,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CeremonyError {
    /// Whether repeating the same call may succeed. A retried Finish whose
    /// session was already consumed will get `SessionExpiredOrUnknown`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Whether operations should be alerted, not just the user
    #[must_use]
    pub fn is_security_incident(&self) -> bool {
        matches!(
            self,
            Self::Verification(VerificationError::PossibleCloneDetected { .. })
        )
    }

    /// Whether the failure is attributable to the client's response or session
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Verification(_) | Self::SessionExpiredOrUnknown)
    }
}

impl From<StoreError> for CeremonyError {
    fn from(error: StoreError) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

impl From<ConfigurationError> for CeremonyError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let clone: CeremonyError = VerificationError::PossibleCloneDetected {
            stored: 5,
            reported: 5,
        }
        .into();
        assert!(clone.is_security_incident());
        assert!(clone.is_client_error());
        assert!(!clone.is_retryable());

        let storage: CeremonyError = StoreError::Unavailable("connection reset".to_string()).into();
        assert!(storage.is_retryable());
        assert!(!storage.is_client_error());

        assert!(CeremonyError::SessionExpiredOrUnknown.is_client_error());
        assert!(!CeremonyError::Verification(VerificationError::SignatureInvalid).is_security_incident());
    }

    #[test]
    fn test_verification_error_surfaces_unchanged() {
        let error = CeremonyError::from(VerificationError::OriginMismatch);
        assert_eq!(error.to_string(), VerificationError::OriginMismatch.to_string());
    }
}
