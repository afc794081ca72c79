//! Ceremony verification
//!
//! Structural and cryptographic checks of one client response against the
//! challenge session it answers. No I/O: credential lookups and writes happen in
//! the orchestrator.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::attestation::{AttestationStatement, AttestationVerifier};
use super::cbor::{self, AuthenticatorData};
use super::client_data::{CollectedClientData, TYPE_CREATE, TYPE_GET};
use super::crypto::{self, CoseKey, CoseKeyError};
use super::errors::VerificationError;
use super::settings::RelyingParty;
use super::types::{AuthenticationCredential, RegistrationCredential};
use crate::models::{
    user_id_from_handle, ChallengeSession, Credential, CredentialId, UserId,
    UserVerificationRequirement,
};

/// Result of a successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAssertion {
    /// Credential with counter, backup state and last use refreshed
    pub credential: Credential,
    pub user_id: UserId,
    pub user_verified: bool,
}

/// Verifies registration and authentication responses for one relying party
#[derive(Clone)]
pub struct CeremonyVerifier {
    relying_party: RelyingParty,
    attestation: Arc<dyn AttestationVerifier>,
}

impl std::fmt::Debug for CeremonyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyVerifier")
            .field("relying_party", &self.relying_party)
            .finish_non_exhaustive()
    }
}

impl CeremonyVerifier {
    #[must_use]
    pub fn new(relying_party: RelyingParty, attestation: Arc<dyn AttestationVerifier>) -> Self {
        Self {
            relying_party,
            attestation,
        }
    }

    #[must_use]
    pub fn relying_party(&self) -> &RelyingParty {
        &self.relying_party
    }

    /// Verify a registration response and build the new credential
    ///
    /// Uniqueness of the credential id across users is enforced by the store's
    /// insert-if-absent; here only the session's exclusion list is checked.
    ///
    /// # Errors
    /// Returns the [`VerificationError`] of the first failed check
    pub fn verify_registration(
        &self,
        response: &RegistrationCredential,
        session: &ChallengeSession,
        now: DateTime<Utc>,
    ) -> Result<Credential, VerificationError> {
        let client_data = CollectedClientData::parse(&response.client_data_json)?;
        let attestation = cbor::parse_attestation_object(&response.attestation_object)?;

        client_data.verify(TYPE_CREATE, &session.challenge, &self.relying_party)?;
        self.check_rp_id_hash(&attestation.auth_data)?;
        check_user_flags(&attestation.auth_data, session.user_verification)?;

        let Some(attested) = attestation.auth_data.attested_credential.as_ref() else {
            return Err(VerificationError::malformed(
                "registration has no attested credential data",
            ));
        };
        if attested.credential_id != response.id.as_bytes() {
            return Err(VerificationError::malformed(
                "attested credential id differs from response id",
            ));
        }

        let credential_key = CoseKey::from_cbor(&attested.public_key).map_err(|e| match e {
            CoseKeyError::Malformed(msg) => VerificationError::MalformedResponse(msg),
            CoseKeyError::Unsupported(msg) => VerificationError::AttestationInvalid(msg),
        })?;

        let client_data_hash = crypto::sha256(&response.client_data_json);
        self.attestation.verify(&AttestationStatement {
            format: &attestation.format,
            statement: &attestation.statement,
            auth_data: &attestation.auth_data_bytes,
            client_data_hash: &client_data_hash,
            credential_key: &credential_key,
        })?;

        if session.allowed_credential_ids.contains(&response.id) {
            return Err(VerificationError::CredentialAlreadyRegistered);
        }

        let Some(owner_user_id) = session.user_id else {
            return Err(VerificationError::UserNotFound);
        };

        let flags = attestation.auth_data.flags;
        Ok(Credential {
            id: response.id.clone(),
            owner_user_id,
            public_key: attested.public_key.clone(),
            sign_counter: attestation.auth_data.sign_count,
            transports: response.transports.clone(),
            backup_eligible: flags.backup_eligible(),
            backup_state: flags.backup_state(),
            aaguid: attested.aaguid,
            attestation_format: attestation.format.clone(),
            display_name: None,
            created_at: now,
            last_used_at: None,
        })
    }

    /// Verify an assertion made with `credential`, already resolved by the caller
    ///
    /// # Errors
    /// Returns the [`VerificationError`] of the first failed check
    pub fn verify_authentication(
        &self,
        response: &AuthenticationCredential,
        session: &ChallengeSession,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<VerifiedAssertion, VerificationError> {
        let client_data = CollectedClientData::parse(&response.client_data_json)?;
        let auth_data = cbor::parse_authenticator_data(&response.authenticator_data)?;

        check_resolution(response, session, credential)?;

        client_data.verify(TYPE_GET, &session.challenge, &self.relying_party)?;
        self.check_rp_id_hash(&auth_data)?;
        check_user_flags(&auth_data, session.user_verification)?;

        let key = CoseKey::from_cbor(&credential.public_key)
            .map_err(|_| VerificationError::SignatureInvalid)?;
        let mut signed = response.authenticator_data.clone();
        signed.extend_from_slice(&crypto::sha256(&response.client_data_json));
        key.verify_signature(&signed, &response.signature)
            .map_err(|_| VerificationError::SignatureInvalid)?;

        let reported = auth_data.sign_count;
        if !credential.accepts_counter(reported) {
            return Err(VerificationError::PossibleCloneDetected {
                stored: credential.sign_counter,
                reported,
            });
        }

        let mut updated = credential.clone();
        updated.sign_counter = reported;
        updated.backup_eligible = auth_data.flags.backup_eligible();
        updated.backup_state = auth_data.flags.backup_state();
        updated.last_used_at = Some(now);

        Ok(VerifiedAssertion {
            user_id: updated.owner_user_id,
            user_verified: auth_data.flags.user_verified(),
            credential: updated,
        })
    }

    fn check_rp_id_hash(&self, auth_data: &AuthenticatorData) -> Result<(), VerificationError> {
        if &auth_data.rp_id_hash == self.relying_party.rp_id_hash() {
            Ok(())
        } else {
            Err(VerificationError::RpIdMismatch)
        }
    }
}

fn check_user_flags(
    auth_data: &AuthenticatorData,
    requirement: UserVerificationRequirement,
) -> Result<(), VerificationError> {
    if !auth_data.flags.user_present() {
        return Err(VerificationError::UserVerificationFailed);
    }
    if requirement == UserVerificationRequirement::Required && !auth_data.flags.user_verified() {
        return Err(VerificationError::UserVerificationFailed);
    }
    Ok(())
}

// The caller resolved `credential`; make sure it is the one this session and
// response actually refer to before any cryptographic work.
fn check_resolution(
    response: &AuthenticationCredential,
    session: &ChallengeSession,
    credential: &Credential,
) -> Result<(), VerificationError> {
    if credential.id != response.id {
        return Err(VerificationError::CredentialNotFound);
    }

    let handle_owner = response.user_handle.as_deref().map(user_id_from_handle);

    match session.user_id {
        Some(user_id) => {
            if !is_allowed(&session.allowed_credential_ids, &response.id)
                || credential.owner_user_id != user_id
            {
                return Err(VerificationError::CredentialNotAllowed);
            }
            if let Some(owner) = handle_owner {
                if owner != Some(user_id) {
                    return Err(VerificationError::UserNotFound);
                }
            }
        }
        None => {
            if handle_owner.flatten() != Some(credential.owner_user_id) {
                return Err(VerificationError::UserNotFound);
            }
        }
    }
    Ok(())
}

fn is_allowed(allowed: &[CredentialId], id: &CredentialId) -> bool {
    allowed.iter().any(|candidate| candidate == id)
}
