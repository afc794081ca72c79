//! Ceremony data model
//!
//! Credentials owned by users and the challenge sessions that bind a Begin call
//! to its matching Finish call.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::utils::encoding;

/// Identifier of a user account. Its 16 raw bytes are the `WebAuthn` user handle.
pub type UserId = Uuid;

/// `WebAuthn` user handle for a user id
#[must_use]
pub fn user_handle(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Resolve a user handle reported by an authenticator back to a user id
#[must_use]
pub fn user_id_from_handle(handle: &[u8]) -> Option<UserId> {
    Uuid::from_slice(handle).ok()
}

/// Opaque credential identifier assigned by the authenticator
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialId(Vec<u8>);

impl CredentialId {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Base64URL form used at the transport boundary and in logs
    #[must_use]
    pub fn to_base64url(&self) -> String {
        encoding::encode(&self.0)
    }

    /// Parse a Base64URL credential id (padding optional)
    ///
    /// # Errors
    /// Returns the decoding error if the input is not valid Base64URL
    pub fn from_base64url(value: &str) -> Result<Self, base64::DecodeError> {
        encoding::decode(value).map(Self)
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", self.to_base64url())
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

impl AsRef<[u8]> for CredentialId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for CredentialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for CredentialId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_base64url(&value).map_err(serde::de::Error::custom)
    }
}

/// Error for requirement strings that don't name a known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

/// User verification requirement echoed back during verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl UserVerificationRequirement {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        }
    }
}

impl FromStr for UserVerificationRequirement {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Resident key (discoverable credential) requirement sent at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    #[default]
    Required,
    Preferred,
    Discouraged,
}

impl FromStr for ResidentKeyRequirement {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Transport hints reported by the authenticator. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    SmartCard,
    Hybrid,
    Internal,
}

impl FromStr for AuthenticatorTransport {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Self::Usb),
            "nfc" => Ok(Self::Nfc),
            "ble" => Ok(Self::Ble),
            "smart-card" => Ok(Self::SmartCard),
            "hybrid" => Ok(Self::Hybrid),
            "internal" => Ok(Self::Internal),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Parse transport hints, dropping values this crate doesn't know
#[must_use]
pub fn parse_transports<S: AsRef<str>>(values: &[S]) -> BTreeSet<AuthenticatorTransport> {
    values
        .iter()
        .filter_map(|value| value.as_ref().parse().ok())
        .collect()
}

/// One registered authenticator credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub owner_user_id: UserId,
    /// COSE-encoded public key
    pub public_key: Vec<u8>,
    pub sign_counter: u32,
    pub transports: BTreeSet<AuthenticatorTransport>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub aaguid: [u8; 16],
    pub attestation_format: String,
    /// User-chosen label, managed outside the ceremony engine
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether an authenticator-reported counter may replace the stored one.
    ///
    /// Authenticators that never increment (both zero) are tolerated; any other
    /// report that doesn't strictly exceed the stored value is a clone signal.
    #[must_use]
    pub fn accepts_counter(&self, reported: u32) -> bool {
        counter_advances(self.sign_counter, reported)
    }
}

/// Counter rule shared by verification and the store's conditional write
#[must_use]
pub fn counter_advances(stored: u32, reported: u32) -> bool {
    (reported == 0 && stored == 0) || reported > stored
}

/// Which ceremony a challenge session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authentication => "authentication",
        }
    }
}

impl FromStr for CeremonyKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "authentication" => Ok(Self::Authentication),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// One in-flight ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSession {
    pub id: Uuid,
    pub ceremony: CeremonyKind,
    /// Absent for discoverable login, where the user is resolved from the response
    pub user_id: Option<UserId>,
    pub challenge: Vec<u8>,
    /// Authentication: credentials the client may answer with.
    /// Registration: credentials the user already owns (exclusions).
    pub allowed_credential_ids: Vec<CredentialId>,
    pub user_verification: UserVerificationRequirement,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ChallengeSession {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_discoverable(&self) -> bool {
        self.user_id.is_none()
    }
}

/// Capability a user type exposes to take part in a ceremony
pub trait PasskeyUser: Send + Sync {
    fn user_id(&self) -> UserId;

    /// Account name shown by the authenticator (usually an email)
    fn user_name(&self) -> &str;

    fn display_name(&self) -> &str {
        self.user_name()
    }

    /// Credentials already bound to this user
    fn credential_ids(&self) -> Vec<CredentialId>;
}

/// Plain user record implementing [`PasskeyUser`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub name: String,
    pub display_name: Option<String>,
    pub credential_ids: Vec<CredentialId>,
}

impl UserAccount {
    #[must_use]
    pub fn new(id: UserId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            display_name: None,
            credential_ids: Vec::new(),
        }
    }
}

impl PasskeyUser for UserAccount {
    fn user_id(&self) -> UserId {
        self.id
    }

    fn user_name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    fn credential_ids(&self) -> Vec<CredentialId> {
        self.credential_ids.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_rule() {
        assert!(counter_advances(0, 0));
        assert!(counter_advances(0, 1));
        assert!(counter_advances(5, 6));
        assert!(!counter_advances(5, 5));
        assert!(!counter_advances(5, 4));
        assert!(!counter_advances(5, 0));
    }

    #[test]
    fn test_user_handle_round_trip() {
        let user_id = Uuid::new_v4();
        let handle = user_handle(&user_id);
        assert_eq!(handle.len(), 16);
        assert_eq!(user_id_from_handle(&handle), Some(user_id));
        assert_eq!(user_id_from_handle(b"not-a-uuid"), None);
    }

    #[test]
    fn test_credential_id_serde_uses_base64url() {
        let id = CredentialId::new(vec![0xfb, 0xff, 0x01]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"-_8B\"");
        let back: CredentialId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_parse_transports_drops_unknown() {
        let transports = parse_transports(&["usb", "internal", "carrier-pigeon"]);
        assert_eq!(transports.len(), 2);
        assert!(transports.contains(&AuthenticatorTransport::Usb));
        assert!(transports.contains(&AuthenticatorTransport::Internal));
    }

    #[test]
    fn test_user_verification_parse() {
        assert_eq!(
            "Required".parse::<UserVerificationRequirement>(),
            Ok(UserVerificationRequirement::Required)
        );
        assert!("sometimes".parse::<UserVerificationRequirement>().is_err());
    }

    #[test]
    fn test_user_account_display_name_fallback() {
        let mut account = UserAccount::new(Uuid::new_v4(), "ada@example.com");
        assert_eq!(account.display_name(), "ada@example.com");
        account.display_name = Some("Ada".to_string());
        assert_eq!(account.display_name(), "Ada");
    }
}
