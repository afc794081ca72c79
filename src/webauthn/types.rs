//! `WebAuthn` response types
//!
//! JSON shapes posted by the browser (`PublicKeyCredential.toJSON()`), and the
//! decoded byte-level forms the verifier works on.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::errors::VerificationError;
use crate::models::{parse_transports, AuthenticatorTransport, CredentialId};
use crate::utils::encoding;

const PUBLIC_KEY_CREDENTIAL_TYPE: &str = "public-key";

/// Registration response from client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponseJson {
    pub id: String,
    pub raw_id: String,
    pub response: AttestationResponseJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub type_: String,
}

/// Authenticator attestation response during registration
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponseJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Authentication response from client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponseJson {
    pub id: String,
    pub raw_id: String,
    pub response: AssertionResponseJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_extension_results: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub type_: String,
}

/// Authenticator assertion response during authentication
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponseJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Decoded registration response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationCredential {
    pub id: CredentialId,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub transports: BTreeSet<AuthenticatorTransport>,
}

/// Decoded authentication response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationCredential {
    pub id: CredentialId,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    /// Present for discoverable credentials
    pub user_handle: Option<Vec<u8>>,
}

impl TryFrom<RegistrationResponseJson> for RegistrationCredential {
    type Error = VerificationError;

    fn try_from(json: RegistrationResponseJson) -> Result<Self, Self::Error> {
        let id = decode_credential_id(&json.type_, &json.id, &json.raw_id)?;
        Ok(Self {
            id,
            client_data_json: decode_field("clientDataJSON", &json.response.client_data_json)?,
            attestation_object: decode_field(
                "attestationObject",
                &json.response.attestation_object,
            )?,
            transports: parse_transports(&json.response.transports),
        })
    }
}

impl TryFrom<AuthenticationResponseJson> for AuthenticationCredential {
    type Error = VerificationError;

    fn try_from(json: AuthenticationResponseJson) -> Result<Self, Self::Error> {
        let id = decode_credential_id(&json.type_, &json.id, &json.raw_id)?;
        let user_handle = match json.response.user_handle.as_deref() {
            None | Some("") => None,
            Some(handle) => Some(decode_field("userHandle", handle)?),
        };
        Ok(Self {
            id,
            client_data_json: decode_field("clientDataJSON", &json.response.client_data_json)?,
            authenticator_data: decode_field(
                "authenticatorData",
                &json.response.authenticator_data,
            )?,
            signature: decode_field("signature", &json.response.signature)?,
            user_handle,
        })
    }
}

fn decode_credential_id(
    type_: &str,
    id: &str,
    raw_id: &str,
) -> Result<CredentialId, VerificationError> {
    if type_ != PUBLIC_KEY_CREDENTIAL_TYPE {
        return Err(VerificationError::malformed(format!(
            "unexpected credential type '{type_}'"
        )));
    }
    let raw = decode_field("rawId", raw_id)?;
    if decode_field("id", id)? != raw {
        return Err(VerificationError::malformed("id and rawId differ"));
    }
    if raw.is_empty() {
        return Err(VerificationError::malformed("empty credential id"));
    }
    Ok(CredentialId::new(raw))
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, VerificationError> {
    encoding::decode(value)
        .map_err(|_| VerificationError::malformed(format!("{name} is not valid base64url")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assertion_json() -> serde_json::Value {
        serde_json::json!({
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "authenticatorData": "AAAA",
                "signature": "BAUG",
                "userHandle": ""
            },
            "clientExtensionResults": {}
        })
    }

    #[test]
    fn test_authentication_json_decodes() {
        let json: AuthenticationResponseJson = serde_json::from_value(assertion_json()).unwrap();
        let credential = AuthenticationCredential::try_from(json).unwrap();
        assert_eq!(credential.id, CredentialId::new(vec![1, 2, 3]));
        assert_eq!(credential.client_data_json, b"{}".to_vec());
        assert_eq!(credential.signature, vec![4, 5, 6]);
        assert_eq!(credential.user_handle, None);
    }

    #[test]
    fn test_padded_base64_accepted() {
        let mut value = assertion_json();
        value["response"]["userHandle"] = serde_json::json!("AQI=");
        let json: AuthenticationResponseJson = serde_json::from_value(value).unwrap();
        let credential = AuthenticationCredential::try_from(json).unwrap();
        assert_eq!(credential.user_handle, Some(vec![1, 2]));
    }

    #[test]
    fn test_id_must_match_raw_id() {
        let mut value = assertion_json();
        value["rawId"] = serde_json::json!("BAUG");
        let json: AuthenticationResponseJson = serde_json::from_value(value).unwrap();
        assert!(matches!(
            AuthenticationCredential::try_from(json),
            Err(VerificationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_credential_type_checked() {
        let mut value = assertion_json();
        value["type"] = serde_json::json!("password");
        let json: AuthenticationResponseJson = serde_json::from_value(value).unwrap();
        assert!(AuthenticationCredential::try_from(json).is_err());
    }

    #[test]
    fn test_registration_json_decodes_transports() {
        let json: RegistrationResponseJson = serde_json::from_value(serde_json::json!({
            "id": "AQID",
            "rawId": "AQID",
            "type": "public-key",
            "response": {
                "clientDataJSON": "e30",
                "attestationObject": "oA",
                "transports": ["internal", "hybrid", "unknown"]
            }
        }))
        .unwrap();
        let credential = RegistrationCredential::try_from(json).unwrap();
        assert_eq!(credential.attestation_object, vec![0xa0]);
        assert_eq!(credential.transports.len(), 2);
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let mut value = assertion_json();
        value["response"]["signature"] = serde_json::json!("not base64!");
        let json: AuthenticationResponseJson = serde_json::from_value(value).unwrap();
        assert!(matches!(
            AuthenticationCredential::try_from(json),
            Err(VerificationError::MalformedResponse(_))
        ));
    }
}
