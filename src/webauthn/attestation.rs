//! `WebAuthn` attestation processing
//!
//! Checks the attestation statement returned with a new credential. Formats that
//! chain to a vendor certificate are only accepted, unverified, when policy allows.

use ciborium::value::Value;

use super::cbor::map_get;
use super::crypto::CoseKey;
use super::errors::VerificationError;

/// Certificate-based formats this crate can't validate without a trust store
const CERTIFICATE_FORMATS: [&str; 6] = [
    "fido-u2f",
    "tpm",
    "android-key",
    "android-safetynet",
    "apple",
    "compound",
];

/// What the attestation statement proved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationType {
    /// `none`: the authenticator made no claim
    None,
    /// `packed` signed by the credential key itself
    SelfAttestation,
    /// Certificate-based statement accepted without chain validation
    Unverified,
}

/// Inputs for checking one attestation statement
#[derive(Debug, Clone, Copy)]
pub struct AttestationStatement<'a> {
    pub format: &'a str,
    pub statement: &'a [(Value, Value)],
    /// Raw authenticator data as signed by the authenticator
    pub auth_data: &'a [u8],
    pub client_data_hash: &'a [u8; 32],
    /// Public key of the credential being registered
    pub credential_key: &'a CoseKey,
}

impl AttestationStatement<'_> {
    fn signed_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.auth_data.len() + 32);
        data.extend_from_slice(self.auth_data);
        data.extend_from_slice(self.client_data_hash);
        data
    }
}

/// Validates attestation statements at registration
pub trait AttestationVerifier: Send + Sync {
    /// # Errors
    /// Returns `AttestationInvalid` if the statement doesn't verify or its
    /// format isn't accepted
    fn verify(&self, statement: &AttestationStatement<'_>) -> Result<AttestationType, VerificationError>;
}

/// Verifies `none` and `packed` self attestation
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAttestationVerifier {
    allow_unverifiable: bool,
}

impl StandardAttestationVerifier {
    #[must_use]
    pub fn new(allow_unverifiable: bool) -> Self {
        Self { allow_unverifiable }
    }

    fn unverifiable(&self, format: &str) -> Result<AttestationType, VerificationError> {
        if self.allow_unverifiable {
            log::debug!("Accepting '{format}' attestation without chain validation");
            Ok(AttestationType::Unverified)
        } else {
            Err(VerificationError::attestation(format!(
                "'{format}' attestation requires certificate validation"
            )))
        }
    }

    fn verify_packed(&self, statement: &AttestationStatement<'_>) -> Result<AttestationType, VerificationError> {
        if map_get(statement.statement, &Value::Text("x5c".to_string())).is_some() {
            return self.unverifiable("packed");
        }

        let alg = match map_get(statement.statement, &Value::Text("alg".to_string())) {
            Some(Value::Integer(alg)) => i128::from(*alg),
            _ => return Err(VerificationError::attestation("packed statement has no alg")),
        };
        if alg != i128::from(statement.credential_key.alg.id()) {
            return Err(VerificationError::attestation(
                "packed self attestation algorithm differs from credential key",
            ));
        }

        let Some(Value::Bytes(signature)) =
            map_get(statement.statement, &Value::Text("sig".to_string()))
        else {
            return Err(VerificationError::attestation("packed statement has no sig"));
        };

        statement
            .credential_key
            .verify_signature(&statement.signed_data(), signature)
            .map_err(|_| VerificationError::attestation("packed self attestation signature invalid"))?;

        Ok(AttestationType::SelfAttestation)
    }
}

impl AttestationVerifier for StandardAttestationVerifier {
    fn verify(&self, statement: &AttestationStatement<'_>) -> Result<AttestationType, VerificationError> {
        match statement.format {
            "none" => {
                if statement.statement.is_empty() {
                    Ok(AttestationType::None)
                } else {
                    Err(VerificationError::attestation(
                        "'none' attestation must have an empty statement",
                    ))
                }
            }
            "packed" => self.verify_packed(statement),
            format if CERTIFICATE_FORMATS.contains(&format) => self.unverifiable(format),
            format => Err(VerificationError::attestation(format!(
                "unknown attestation format '{format}'"
            ))),
        }
    }
}
