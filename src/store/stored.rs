//! Store-boundary form of a challenge session
//!
//! Byte fields are Base64URL strings and enums are their wire names, so the
//! record can live in any key/value or JSON column store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;
use crate::models::{CeremonyKind, ChallengeSession, CredentialId, UserId};
use crate::utils::encoding;

/// Persisted challenge session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredSession {
    pub id: Uuid,
    pub ceremony: String,
    pub user_id: Option<UserId>,
    pub challenge: String,
    pub allowed_credential_ids: Vec<String>,
    pub user_verification: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StoredSession {
    /// Serialize for a JSON column or value
    ///
    /// # Errors
    /// Returns an error if JSON serialization fails
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// # Errors
    /// Returns an error if the JSON doesn't describe a stored session
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// User index key, if the session was issued for a known user
    #[must_use]
    pub fn user_key(&self) -> Option<(UserId, CeremonyKind)> {
        let ceremony = self.ceremony.parse().ok()?;
        self.user_id.map(|user_id| (user_id, ceremony))
    }
}

impl From<&ChallengeSession> for StoredSession {
    fn from(session: &ChallengeSession) -> Self {
        Self {
            id: session.id,
            ceremony: session.ceremony.as_str().to_string(),
            user_id: session.user_id,
            challenge: encoding::encode(&session.challenge),
            allowed_credential_ids: session
                .allowed_credential_ids
                .iter()
                .map(CredentialId::to_base64url)
                .collect(),
            user_verification: session.user_verification.as_str().to_string(),
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}

impl TryFrom<StoredSession> for ChallengeSession {
    type Error = StoreError;

    fn try_from(stored: StoredSession) -> Result<Self, Self::Error> {
        Ok(Self {
            id: stored.id,
            ceremony: stored.ceremony.parse().map_err(serialization)?,
            user_id: stored.user_id,
            challenge: encoding::decode(&stored.challenge).map_err(serialization)?,
            allowed_credential_ids: stored
                .allowed_credential_ids
                .iter()
                .map(|id| CredentialId::from_base64url(id))
                .collect::<Result<_, _>>()
                .map_err(serialization)?,
            user_verification: stored
                .user_verification
                .parse()
                .map_err(serialization)?,
            expires_at: stored.expires_at,
            created_at: stored.created_at,
        })
    }
}

fn serialization(e: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(e.to_string())
}
