//! `WebAuthn` cryptography operations
//!
//! Challenge generation, hashing, and COSE public keys with the signature
//! verification each supported algorithm needs.

use ciborium::value::Value;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use super::cbor::map_get;

/// Challenge length in bytes (256 bits)
pub const CHALLENGE_LENGTH: usize = 32;

/// Generate a secure random challenge
///
/// # Errors
/// Returns an error if the system random source fails
pub fn generate_challenge() -> Result<Vec<u8>, ring::error::Unspecified> {
    let mut bytes = vec![0u8; CHALLENGE_LENGTH];
    SystemRandom::new().fill(&mut bytes)?;
    Ok(bytes)
}

/// Hash data using SHA-256
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let hash = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_ref());
    out
}

// COSE labels (RFC 9052 / RFC 9053)
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV_OR_N: i64 = -1;
const LABEL_X_OR_E: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_P256: i64 = 1;
const CRV_P384: i64 = 2;
const CRV_ED25519: i64 = 6;

/// Signature algorithms accepted for credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    /// ECDSA P-256 with SHA-256
    Es256,
    /// ECDSA P-384 with SHA-384
    Es384,
    /// Ed25519
    EdDsa,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
}

impl CoseAlgorithm {
    /// Preference order advertised in `pubKeyCredParams`
    pub const ALL: [CoseAlgorithm; 4] = [Self::Es256, Self::EdDsa, Self::Es384, Self::Rs256];

    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::EdDsa => -8,
            Self::Rs256 => -257,
        }
    }

    #[must_use]
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -35 => Some(Self::Es384),
            -8 => Some(Self::EdDsa),
            -257 => Some(Self::Rs256),
            _ => None,
        }
    }
}

/// Why a COSE key could not be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoseKeyError {
    #[error("malformed COSE key: {0}")]
    Malformed(String),
    #[error("unsupported COSE key: {0}")]
    Unsupported(String),
}

/// Key material by key type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKeyParams {
    Ec2 { x: Vec<u8>, y: Vec<u8> },
    Okp { x: Vec<u8> },
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

/// Parsed COSE public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseKey {
    pub alg: CoseAlgorithm,
    pub params: CoseKeyParams,
}

impl CoseKey {
    /// Parse a CBOR-encoded COSE key
    ///
    /// # Errors
    /// Returns an error if the bytes aren't a CBOR map, a required label is
    /// missing, or the key type, curve and algorithm aren't a supported combination
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CoseKeyError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| CoseKeyError::Malformed(format!("invalid CBOR: {e}")))?;
        Self::from_value(&value)
    }

    /// Parse an already decoded COSE key
    ///
    /// # Errors
    /// See [`CoseKey::from_cbor`]
    pub fn from_value(value: &Value) -> Result<Self, CoseKeyError> {
        let Value::Map(map) = value else {
            return Err(CoseKeyError::Malformed("COSE key is not a map".to_string()));
        };

        let kty = int_label(map, LABEL_KTY)?;
        let alg_id = int_label(map, LABEL_ALG)?;
        let alg = CoseAlgorithm::from_id(alg_id)
            .ok_or_else(|| CoseKeyError::Unsupported(format!("algorithm {alg_id}")))?;

        let params = match (kty, alg) {
            (KTY_EC2, CoseAlgorithm::Es256 | CoseAlgorithm::Es384) => {
                let (expected_crv, coord_len) = if alg == CoseAlgorithm::Es256 {
                    (CRV_P256, 32)
                } else {
                    (CRV_P384, 48)
                };
                let crv = int_label(map, LABEL_CRV_OR_N)?;
                if crv != expected_crv {
                    return Err(CoseKeyError::Unsupported(format!(
                        "curve {crv} for algorithm {alg_id}"
                    )));
                }
                let x = bytes_label(map, LABEL_X_OR_E)?;
                let y = bytes_label(map, LABEL_Y)?;
                if x.len() != coord_len || y.len() != coord_len {
                    return Err(CoseKeyError::Malformed(
                        "EC2 coordinate has wrong length".to_string(),
                    ));
                }
                CoseKeyParams::Ec2 { x, y }
            }
            (KTY_OKP, CoseAlgorithm::EdDsa) => {
                let crv = int_label(map, LABEL_CRV_OR_N)?;
                if crv != CRV_ED25519 {
                    return Err(CoseKeyError::Unsupported(format!("OKP curve {crv}")));
                }
                let x = bytes_label(map, LABEL_X_OR_E)?;
                if x.len() != 32 {
                    return Err(CoseKeyError::Malformed(
                        "Ed25519 key has wrong length".to_string(),
                    ));
                }
                CoseKeyParams::Okp { x }
            }
            (KTY_RSA, CoseAlgorithm::Rs256) => CoseKeyParams::Rsa {
                n: bytes_label(map, LABEL_CRV_OR_N)?,
                e: bytes_label(map, LABEL_X_OR_E)?,
            },
            _ => {
                return Err(CoseKeyError::Unsupported(format!(
                    "key type {kty} with algorithm {alg_id}"
                )))
            }
        };

        Ok(Self { alg, params })
    }

    /// Verify `signature` over `message` with this key
    ///
    /// # Errors
    /// Returns an error if the signature doesn't verify
    pub fn verify_signature(
        &self,
        message: &[u8],
        signature_bytes: &[u8],
    ) -> Result<(), ring::error::Unspecified> {
        match (&self.params, self.alg) {
            (CoseKeyParams::Ec2 { x, y }, alg) => {
                // Uncompressed SEC1 point: 0x04 || x || y
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);

                let algorithm = if alg == CoseAlgorithm::Es384 {
                    &signature::ECDSA_P384_SHA384_ASN1
                } else {
                    &signature::ECDSA_P256_SHA256_ASN1
                };
                UnparsedPublicKey::new(algorithm, &point).verify(message, signature_bytes)
            }
            (CoseKeyParams::Okp { x }, _) => {
                UnparsedPublicKey::new(&signature::ED25519, x).verify(message, signature_bytes)
            }
            (CoseKeyParams::Rsa { n, e }, _) => RsaPublicKeyComponents { n, e }.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                message,
                signature_bytes,
            ),
        }
    }
}

fn int_label(map: &[(Value, Value)], label: i64) -> Result<i64, CoseKeyError> {
    match map_get(map, &Value::Integer(label.into())) {
        Some(Value::Integer(value)) => i64::try_from(i128::from(*value))
            .map_err(|_| CoseKeyError::Malformed(format!("label {label} out of range"))),
        Some(_) => Err(CoseKeyError::Malformed(format!(
            "label {label} is not an integer"
        ))),
        None => Err(CoseKeyError::Malformed(format!("missing label {label}"))),
    }
}

fn bytes_label(map: &[(Value, Value)], label: i64) -> Result<Vec<u8>, CoseKeyError> {
    match map_get(map, &Value::Integer(label.into())) {
        Some(Value::Bytes(bytes)) => Ok(bytes.clone()),
        Some(_) => Err(CoseKeyError::Malformed(format!(
            "label {label} is not a byte string"
        ))),
        None => Err(CoseKeyError::Malformed(format!("missing label {label}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SoftAuthenticator;

    fn encode(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(value, &mut out).unwrap();
        out
    }

    #[test]
    fn test_generate_challenge_is_random() {
        let a = generate_challenge().unwrap();
        let b = generate_challenge().unwrap();
        assert_eq!(a.len(), CHALLENGE_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn test_es256_signature_round_trip() {
        let authenticator = SoftAuthenticator::es256();
        let key = CoseKey::from_cbor(&authenticator.cose_public_key()).unwrap();
        assert_eq!(key.alg, CoseAlgorithm::Es256);

        let signature = authenticator.sign(b"message");
        assert!(key.verify_signature(b"message", &signature).is_ok());
        assert!(key.verify_signature(b"tampered", &signature).is_err());
    }

    #[test]
    fn test_ed25519_signature_round_trip() {
        let authenticator = SoftAuthenticator::ed25519();
        let key = CoseKey::from_cbor(&authenticator.cose_public_key()).unwrap();
        assert_eq!(key.alg, CoseAlgorithm::EdDsa);

        let signature = authenticator.sign(b"message");
        assert!(key.verify_signature(b"message", &signature).is_ok());
    }

    #[test]
    fn test_unsupported_algorithm_rejected() {
        let key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-36).into())),
        ]);
        assert!(matches!(
            CoseKey::from_cbor(&encode(&key)),
            Err(CoseKeyError::Unsupported(_))
        ));
    }

    #[test]
    fn test_curve_must_match_algorithm() {
        let key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(2.into())),
            (Value::Integer((-2).into()), Value::Bytes(vec![0; 32])),
            (Value::Integer((-3).into()), Value::Bytes(vec![0; 32])),
        ]);
        assert!(matches!(
            CoseKey::from_cbor(&encode(&key)),
            Err(CoseKeyError::Unsupported(_))
        ));
    }

    #[test]
    fn test_missing_coordinate_is_malformed() {
        let key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (Value::Integer((-2).into()), Value::Bytes(vec![0; 32])),
        ]);
        assert!(matches!(
            CoseKey::from_cbor(&encode(&key)),
            Err(CoseKeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_rsa_key_parses() {
        let key = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(3.into())),
            (Value::Integer(3.into()), Value::Integer((-257).into())),
            (Value::Integer((-1).into()), Value::Bytes(vec![0xc5; 256])),
            (Value::Integer((-2).into()), Value::Bytes(vec![0x01, 0x00, 0x01])),
        ]);
        let parsed = CoseKey::from_cbor(&encode(&key)).unwrap();
        assert_eq!(parsed.alg, CoseAlgorithm::Rs256);
        assert!(parsed.verify_signature(b"message", &[0u8; 256]).is_err());
    }
}
