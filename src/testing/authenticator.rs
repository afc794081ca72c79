//! Software authenticator
//!
//! Generates a real key pair and builds registration and assertion responses
//! the way a browser and platform authenticator would, so ceremonies can be
//! exercised end to end without hardware.

use std::collections::BTreeSet;
use std::sync::Arc;

use ciborium::Value;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
};
use uuid::Uuid;

use super::constants::TEST_RP_ID;
use crate::models::{AuthenticatorTransport, CredentialId};
use crate::utils::encoding;
use crate::webauthn::{
    sha256, AssertionResponseJson, AttestationResponseJson, AuthenticationCredential,
    AuthenticationResponseJson, RegistrationCredential, RegistrationResponseJson,
    FLAG_ATTESTED_CREDENTIAL_DATA, FLAG_BACKUP_ELIGIBLE, FLAG_BACKUP_STATE, FLAG_USER_PRESENT,
    FLAG_USER_VERIFIED, TYPE_CREATE, TYPE_GET,
};

const AAGUID: [u8; 16] = *b"softauthn-aaguid";

enum SigningKey {
    Es256(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
}

/// Authenticator backed by an in-memory key pair
///
/// The `with_*` methods return a modified copy sharing the same key and
/// credential id, so one registered authenticator can produce assertions with
/// different counters or flags.
#[derive(Clone)]
pub struct SoftAuthenticator {
    key: Arc<SigningKey>,
    credential_id: CredentialId,
    rp_id: String,
    counter: u32,
    user_present: bool,
    user_verified: bool,
    backup_eligible: bool,
    backup_state: bool,
    packed_attestation: bool,
}

impl SoftAuthenticator {
    /// ECDSA P-256 authenticator
    ///
    /// # Panics
    ///
    /// Panics if the system random source fails during key generation.
    #[must_use]
    pub fn es256() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("generate P-256 key");
        let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
            .expect("load P-256 key");
        Self::with_key(SigningKey::Es256(key))
    }

    /// Ed25519 authenticator
    ///
    /// # Panics
    ///
    /// Panics if the system random source fails during key generation.
    #[must_use]
    pub fn ed25519() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate Ed25519 key");
        let key = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("load Ed25519 key");
        Self::with_key(SigningKey::Ed25519(key))
    }

    fn with_key(key: SigningKey) -> Self {
        Self {
            key: Arc::new(key),
            credential_id: CredentialId::new(Uuid::new_v4().as_bytes().to_vec()),
            rp_id: TEST_RP_ID.to_string(),
            counter: 0,
            user_present: true,
            user_verified: true,
            backup_eligible: false,
            backup_state: false,
            packed_attestation: false,
        }
    }

    #[must_use]
    pub fn with_counter(&self, counter: u32) -> Self {
        Self {
            counter,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_user_present(&self, user_present: bool) -> Self {
        Self {
            user_present,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_user_verified(&self, user_verified: bool) -> Self {
        Self {
            user_verified,
            ..self.clone()
        }
    }

    /// Scope responses to a different relying party id
    #[must_use]
    pub fn with_rp_id(&self, rp_id: &str) -> Self {
        Self {
            rp_id: rp_id.to_string(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_backup(&self, eligible: bool, state: bool) -> Self {
        Self {
            backup_eligible: eligible,
            backup_state: state,
            ..self.clone()
        }
    }

    /// Attest with a packed self-attestation instead of `none`
    #[must_use]
    pub fn with_packed_attestation(&self) -> Self {
        Self {
            packed_attestation: true,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn credential_id(&self) -> CredentialId {
        self.credential_id.clone()
    }

    /// COSE_Key encoding of the public key
    ///
    /// # Panics
    ///
    /// Panics if CBOR encoding fails.
    #[must_use]
    pub fn cose_public_key(&self) -> Vec<u8> {
        let map = match self.key.as_ref() {
            SigningKey::Es256(key) => {
                // Uncompressed point: 0x04 || x || y
                let point = key.public_key().as_ref();
                vec![
                    (int(1), int(2)),
                    (int(3), int(-7)),
                    (int(-1), int(1)),
                    (int(-2), Value::Bytes(point[1..33].to_vec())),
                    (int(-3), Value::Bytes(point[33..65].to_vec())),
                ]
            }
            SigningKey::Ed25519(key) => vec![
                (int(1), int(1)),
                (int(3), int(-8)),
                (int(-1), int(6)),
                (int(-2), Value::Bytes(key.public_key().as_ref().to_vec())),
            ],
        };
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Value::Map(map), &mut bytes).expect("encode COSE key");
        bytes
    }

    /// Sign `message` with the credential key
    ///
    /// # Panics
    ///
    /// Panics if the system random source fails while signing.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self.key.as_ref() {
            SigningKey::Es256(key) => key
                .sign(&SystemRandom::new(), message)
                .expect("sign message")
                .as_ref()
                .to_vec(),
            SigningKey::Ed25519(key) => key.sign(message).as_ref().to_vec(),
        }
    }

    /// Build a `navigator.credentials.create()` response for `challenge`
    ///
    /// # Panics
    ///
    /// Panics if CBOR encoding fails.
    #[must_use]
    pub fn register(&self, challenge: &[u8], origin: &str) -> RegistrationCredential {
        let client_data_json = client_data(TYPE_CREATE, challenge, origin);
        let auth_data = self.authenticator_data(true);

        let statement = if self.packed_attestation {
            let mut signed = auth_data.clone();
            signed.extend_from_slice(&sha256(&client_data_json));
            let alg = match self.key.as_ref() {
                SigningKey::Es256(_) => -7,
                SigningKey::Ed25519(_) => -8,
            };
            vec![
                (text("alg"), int(alg)),
                (text("sig"), Value::Bytes(self.sign(&signed))),
            ]
        } else {
            Vec::new()
        };
        let format = if self.packed_attestation { "packed" } else { "none" };

        let object = Value::Map(vec![
            (text("fmt"), text(format)),
            (text("attStmt"), Value::Map(statement)),
            (text("authData"), Value::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::ser::into_writer(&object, &mut attestation_object)
            .expect("encode attestation object");

        RegistrationCredential {
            id: self.credential_id(),
            client_data_json,
            attestation_object,
            transports: BTreeSet::from([AuthenticatorTransport::Internal]),
        }
    }

    /// Build a `navigator.credentials.get()` response for `challenge`
    #[must_use]
    pub fn assert(
        &self,
        challenge: &[u8],
        origin: &str,
        user_handle: Option<&[u8]>,
    ) -> AuthenticationCredential {
        let client_data_json = client_data(TYPE_GET, challenge, origin);
        let authenticator_data = self.authenticator_data(false);
        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));

        AuthenticationCredential {
            id: self.credential_id(),
            signature: self.sign(&signed),
            client_data_json,
            authenticator_data,
            user_handle: user_handle.map(<[u8]>::to_vec),
        }
    }

    /// [`Self::register`] in the JSON form a browser posts
    #[must_use]
    pub fn registration_json(&self, challenge: &[u8], origin: &str) -> RegistrationResponseJson {
        let credential = self.register(challenge, origin);
        let id = credential.id.to_base64url();
        RegistrationResponseJson {
            raw_id: id.clone(),
            id,
            response: AttestationResponseJson {
                client_data_json: encoding::encode(&credential.client_data_json),
                attestation_object: encoding::encode(&credential.attestation_object),
                transports: vec!["internal".to_string()],
            },
            authenticator_attachment: Some("platform".to_string()),
            client_extension_results: Some(serde_json::json!({})),
            type_: "public-key".to_string(),
        }
    }

    /// [`Self::assert`] in the JSON form a browser posts
    #[must_use]
    pub fn assertion_json(
        &self,
        challenge: &[u8],
        origin: &str,
        user_handle: Option<&[u8]>,
    ) -> AuthenticationResponseJson {
        let credential = self.assert(challenge, origin, user_handle);
        let id = credential.id.to_base64url();
        AuthenticationResponseJson {
            raw_id: id.clone(),
            id,
            response: AssertionResponseJson {
                client_data_json: encoding::encode(&credential.client_data_json),
                authenticator_data: encoding::encode(&credential.authenticator_data),
                signature: encoding::encode(&credential.signature),
                user_handle: credential.user_handle.map(encoding::encode),
            },
            authenticator_attachment: Some("platform".to_string()),
            client_extension_results: None,
            type_: "public-key".to_string(),
        }
    }

    fn flags(&self, attested: bool) -> u8 {
        let mut flags = 0;
        if self.user_present {
            flags |= FLAG_USER_PRESENT;
        }
        if self.user_verified {
            flags |= FLAG_USER_VERIFIED;
        }
        if self.backup_eligible {
            flags |= FLAG_BACKUP_ELIGIBLE;
        }
        if self.backup_state {
            flags |= FLAG_BACKUP_STATE;
        }
        if attested {
            flags |= FLAG_ATTESTED_CREDENTIAL_DATA;
        }
        flags
    }

    fn authenticator_data(&self, attested: bool) -> Vec<u8> {
        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&sha256(self.rp_id.as_bytes()));
        data.push(self.flags(attested));
        data.extend_from_slice(&self.counter.to_be_bytes());
        if attested {
            let id = self.credential_id.as_bytes();
            let id_len = u16::try_from(id.len()).unwrap_or(u16::MAX);
            data.extend_from_slice(&AAGUID);
            data.extend_from_slice(&id_len.to_be_bytes());
            data.extend_from_slice(id);
            data.extend_from_slice(&self.cose_public_key());
        }
        data
    }
}

fn client_data(type_: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    serde_json::json!({
        "type": type_,
        "challenge": encoding::encode(challenge),
        "origin": origin,
        "crossOrigin": false,
    })
    .to_string()
    .into_bytes()
}

fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}
