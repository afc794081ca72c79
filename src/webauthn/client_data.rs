//! Collected client data
//!
//! The JSON the browser signs over: ceremony type, challenge and origin.

use serde::Deserialize;

use super::errors::VerificationError;
use super::settings::RelyingParty;
use crate::utils::encoding;

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

/// Parsed `clientDataJSON`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub type_: String,
    /// Base64URL challenge as echoed by the client
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

impl CollectedClientData {
    /// Parse raw `clientDataJSON` bytes
    ///
    /// # Errors
    /// Returns `MalformedResponse` if the bytes aren't the expected JSON object
    pub fn parse(bytes: &[u8]) -> Result<Self, VerificationError> {
        serde_json::from_slice(bytes)
            .map_err(|e| VerificationError::malformed(format!("invalid client data JSON: {e}")))
    }

    /// Check ceremony type, challenge and origin
    ///
    /// # Errors
    /// - `MalformedResponse` if the type doesn't match or the challenge isn't Base64URL
    /// - `ChallengeMismatch` if the challenge differs from the issued one
    /// - `OriginMismatch` if the origin isn't allowed or the request was cross-origin
    pub fn verify(
        &self,
        expected_type: &str,
        expected_challenge: &[u8],
        relying_party: &RelyingParty,
    ) -> Result<(), VerificationError> {
        if self.type_ != expected_type {
            return Err(VerificationError::malformed(format!(
                "client data type '{}', expected '{expected_type}'",
                self.type_
            )));
        }

        let challenge = encoding::decode(&self.challenge)
            .map_err(|_| VerificationError::malformed("client data challenge is not base64url"))?;
        if challenge != expected_challenge {
            return Err(VerificationError::ChallengeMismatch);
        }

        if self.cross_origin || !relying_party.is_allowed_origin(&self.origin) {
            return Err(VerificationError::OriginMismatch);
        }

        Ok(())
    }
}
