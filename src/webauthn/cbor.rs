//! CBOR processing for `WebAuthn`
//!
//! Parses the attestation object and the binary authenticator data carried in
//! both ceremonies.

use ciborium::de::from_reader;
use ciborium::value::Value;

use super::errors::VerificationError;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_BACKUP_ELIGIBLE: u8 = 0x08;
pub const FLAG_BACKUP_STATE: u8 = 0x10;
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

/// Upper bound on credential id length
pub const MAX_CREDENTIAL_ID_LENGTH: usize = 1023;

// rpIdHash (32) + flags (1) + signCount (4)
const AUTH_DATA_HEADER_LENGTH: usize = 37;

/// Authenticator data flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatorFlags(pub u8);

impl AuthenticatorFlags {
    #[must_use]
    pub fn user_present(self) -> bool {
        self.0 & FLAG_USER_PRESENT != 0
    }

    #[must_use]
    pub fn user_verified(self) -> bool {
        self.0 & FLAG_USER_VERIFIED != 0
    }

    #[must_use]
    pub fn backup_eligible(self) -> bool {
        self.0 & FLAG_BACKUP_ELIGIBLE != 0
    }

    #[must_use]
    pub fn backup_state(self) -> bool {
        self.0 & FLAG_BACKUP_STATE != 0
    }

    #[must_use]
    pub fn attested_credential_data(self) -> bool {
        self.0 & FLAG_ATTESTED_CREDENTIAL_DATA != 0
    }

    #[must_use]
    pub fn extension_data(self) -> bool {
        self.0 & FLAG_EXTENSION_DATA != 0
    }
}

/// Credential data present in registration authenticator data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE key exactly as encoded by the authenticator
    pub public_key: Vec<u8>,
}

/// Parsed authenticator data
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: AuthenticatorFlags,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
    pub extensions: Option<Value>,
}

/// Parse binary authenticator data
///
/// Layout:
/// - 32 bytes: RP ID hash
/// - 1 byte: flags
/// - 4 bytes: signature counter (big-endian)
/// - if AT: 16 bytes AAGUID, 2 bytes id length (L), L bytes id, COSE key
/// - if ED: CBOR extensions map
///
/// # Errors
/// Returns `MalformedResponse` if the data is truncated, has trailing bytes, or
/// reports backup state without backup eligibility
pub fn parse_authenticator_data(data: &[u8]) -> Result<AuthenticatorData, VerificationError> {
    if data.len() < AUTH_DATA_HEADER_LENGTH {
        return Err(VerificationError::malformed("authenticator data too short"));
    }

    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&data[..32]);
    let flags = AuthenticatorFlags(data[32]);
    let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

    if flags.backup_state() && !flags.backup_eligible() {
        return Err(VerificationError::malformed(
            "backup state set on a credential that is not backup eligible",
        ));
    }

    let mut rest = &data[AUTH_DATA_HEADER_LENGTH..];

    let attested_credential = if flags.attested_credential_data() {
        Some(parse_attested_credential(&mut rest)?)
    } else {
        None
    };

    let extensions = if flags.extension_data() {
        let value: Value = from_reader(&mut rest)
            .map_err(|_| VerificationError::malformed("invalid extension data"))?;
        if value.as_map().is_none() {
            return Err(VerificationError::malformed("extension data is not a map"));
        }
        Some(value)
    } else {
        None
    };

    if !rest.is_empty() {
        return Err(VerificationError::malformed(
            "trailing bytes after authenticator data",
        ));
    }

    Ok(AuthenticatorData {
        rp_id_hash,
        flags,
        sign_count,
        attested_credential,
        extensions,
    })
}

fn parse_attested_credential(rest: &mut &[u8]) -> Result<AttestedCredentialData, VerificationError> {
    if rest.len() < 18 {
        return Err(VerificationError::malformed(
            "authenticator data too short for attested credential",
        ));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&rest[..16]);
    let id_len = usize::from(u16::from_be_bytes([rest[16], rest[17]]));
    *rest = &rest[18..];

    if id_len == 0 || id_len > MAX_CREDENTIAL_ID_LENGTH {
        return Err(VerificationError::malformed("invalid credential id length"));
    }
    if rest.len() < id_len {
        return Err(VerificationError::malformed(
            "authenticator data too short for credential id",
        ));
    }
    let credential_id = rest[..id_len].to_vec();
    *rest = &rest[id_len..];

    // Decode through the slice reader so the COSE key's encoded length is known
    let before = *rest;
    let _: Value = from_reader(&mut *rest)
        .map_err(|_| VerificationError::malformed("invalid credential public key"))?;
    let consumed = before.len() - rest.len();
    let public_key = before[..consumed].to_vec();

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key,
    })
}

/// Decoded attestation object
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub format: String,
    pub statement: Vec<(Value, Value)>,
    /// Raw authenticator data, needed verbatim for attestation signatures
    pub auth_data_bytes: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

/// Parse a CBOR attestation object (`fmt`, `attStmt`, `authData`)
///
/// # Errors
/// Returns `MalformedResponse` if the object isn't a CBOR map with the three
/// members, or if the embedded authenticator data is malformed
pub fn parse_attestation_object(bytes: &[u8]) -> Result<AttestationObject, VerificationError> {
    let value: Value = from_reader(bytes)
        .map_err(|_| VerificationError::malformed("invalid CBOR attestation object"))?;
    let Some(map) = value.as_map() else {
        return Err(VerificationError::malformed("attestation object is not a map"));
    };

    let format = match map_get(map, &Value::Text("fmt".to_string())) {
        Some(Value::Text(fmt)) => fmt.clone(),
        _ => return Err(VerificationError::malformed("missing attestation format")),
    };
    let statement = match map_get(map, &Value::Text("attStmt".to_string())) {
        Some(Value::Map(stmt)) => stmt.clone(),
        _ => return Err(VerificationError::malformed("missing attestation statement")),
    };
    let auth_data_bytes = match map_get(map, &Value::Text("authData".to_string())) {
        Some(Value::Bytes(data)) => data.clone(),
        _ => return Err(VerificationError::malformed("missing authData in attestation")),
    };

    let auth_data = parse_authenticator_data(&auth_data_bytes)?;

    Ok(AttestationObject {
        format,
        statement,
        auth_data_bytes,
        auth_data,
    })
}

/// Look up a key in a decoded CBOR map
#[must_use]
pub fn map_get<'a>(map: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    map.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SoftAuthenticator;

    fn header(flags: u8, counter: u32) -> Vec<u8> {
        let mut data = vec![0xaa; 32];
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    #[test]
    fn test_parse_assertion_auth_data() {
        let parsed =
            parse_authenticator_data(&header(FLAG_USER_PRESENT | FLAG_USER_VERIFIED, 7)).unwrap();
        assert_eq!(parsed.rp_id_hash, [0xaa; 32]);
        assert!(parsed.flags.user_present());
        assert!(parsed.flags.user_verified());
        assert_eq!(parsed.sign_count, 7);
        assert!(parsed.attested_credential.is_none());
    }

    #[test]
    fn test_too_short_is_malformed() {
        let err = parse_authenticator_data(&[0u8; 36]).unwrap_err();
        assert!(matches!(err, VerificationError::MalformedResponse(_)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut data = header(FLAG_USER_PRESENT, 1);
        data.push(0);
        assert!(parse_authenticator_data(&data).is_err());
    }

    #[test]
    fn test_backup_state_requires_eligibility() {
        let data = header(FLAG_USER_PRESENT | FLAG_BACKUP_STATE, 0);
        assert!(parse_authenticator_data(&data).is_err());

        let data = header(FLAG_USER_PRESENT | FLAG_BACKUP_STATE | FLAG_BACKUP_ELIGIBLE, 0);
        let parsed = parse_authenticator_data(&data).unwrap();
        assert!(parsed.flags.backup_state());
    }

    #[test]
    fn test_attested_credential_data_parsed() {
        let authenticator = SoftAuthenticator::es256();
        let cose_key = authenticator.cose_public_key();
        let credential_id = vec![9u8; 20];

        let mut data = header(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL_DATA, 0);
        data.extend_from_slice(&[1u8; 16]);
        data.extend_from_slice(&20u16.to_be_bytes());
        data.extend_from_slice(&credential_id);
        data.extend_from_slice(&cose_key);

        let parsed = parse_authenticator_data(&data).unwrap();
        let attested = parsed.attested_credential.unwrap();
        assert_eq!(attested.aaguid, [1u8; 16]);
        assert_eq!(attested.credential_id, credential_id);
        assert_eq!(attested.public_key, cose_key);
    }

    #[test]
    fn test_extensions_follow_public_key() {
        let authenticator = SoftAuthenticator::es256();
        let mut data = header(
            FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL_DATA | FLAG_EXTENSION_DATA,
            0,
        );
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(&authenticator.cose_public_key());
        let extensions = Value::Map(vec![(
            Value::Text("credProtect".to_string()),
            Value::Integer(1.into()),
        )]);
        ciborium::ser::into_writer(&extensions, &mut data).unwrap();

        let parsed = parse_authenticator_data(&data).unwrap();
        assert_eq!(parsed.extensions, Some(extensions));
        assert_eq!(
            parsed.attested_credential.unwrap().public_key,
            authenticator.cose_public_key()
        );
    }

    #[test]
    fn test_credential_id_length_overflow() {
        let mut data = header(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL_DATA, 0);
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&100u16.to_be_bytes());
        data.extend_from_slice(&[1u8; 10]);
        assert!(parse_authenticator_data(&data).is_err());
    }

    #[test]
    fn test_attestation_object_requires_members() {
        let object = Value::Map(vec![(
            Value::Text("fmt".to_string()),
            Value::Text("none".to_string()),
        )]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&object, &mut bytes).unwrap();
        assert!(matches!(
            parse_attestation_object(&bytes),
            Err(VerificationError::MalformedResponse(_))
        ));
        assert!(parse_attestation_object(b"not cbor").is_err());
    }
}
