//! Client-facing ceremony options
//!
//! JSON accepted by `PublicKeyCredential.parseCreationOptionsFromJSON()` and
//! `parseRequestOptionsFromJSON()`, wrapped with the session id the client
//! echoes back on Finish.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AuthenticatorTransport, Credential, CredentialId, ResidentKeyRequirement,
    UserVerificationRequirement,
};
use crate::webauthn::CoseAlgorithm;

const PUBLIC_KEY: &str = "public-key";

/// Returned by `begin_registration`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationChallengeResponse {
    pub session_id: Uuid,
    pub public_key: PublicKeyCredentialCreationOptions,
}

/// Returned by `begin_authentication`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestChallengeResponse {
    pub session_id: Uuid,
    pub public_key: PublicKeyCredentialRequestOptions,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    /// Base64URL-encoded random challenge
    pub challenge: String,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    /// Timeout in milliseconds
    pub timeout: u64,
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    pub attestation: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    /// Base64URL-encoded random challenge
    pub challenge: String,
    /// Timeout in milliseconds
    pub timeout: u64,
    pub rp_id: String,
    /// Empty for discoverable login
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub user_verification: UserVerificationRequirement,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Base64URL-encoded user handle
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: i64,
}

impl From<CoseAlgorithm> for PublicKeyCredentialParameters {
    fn from(alg: CoseAlgorithm) -> Self {
        Self {
            type_: PUBLIC_KEY.to_string(),
            alg: alg.id(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: CredentialId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

impl PublicKeyCredentialDescriptor {
    #[must_use]
    pub fn new(id: CredentialId) -> Self {
        Self {
            type_: PUBLIC_KEY.to_string(),
            id,
            transports: Vec::new(),
        }
    }
}

impl From<&Credential> for PublicKeyCredentialDescriptor {
    fn from(credential: &Credential) -> Self {
        Self {
            transports: credential.transports.iter().copied().collect(),
            ..Self::new(credential.id.clone())
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    pub resident_key: ResidentKeyRequirement,
    /// Level 1 clients only understand this flag
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}
