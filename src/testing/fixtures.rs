//! Test fixtures and common test data
//!
//! Pre-built test objects for the ceremony engine.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::constants::{TEST_DISPLAY_NAME, TEST_ORIGIN, TEST_RP_ID, TEST_USER_NAME};
use crate::models::{
    AuthenticatorTransport, CeremonyKind, ChallengeSession, Credential, CredentialId, UserAccount,
    UserId, UserVerificationRequirement,
};
use crate::settings::{CeremonySettings, RelyingPartySettings};
use crate::webauthn::RelyingParty;

/// Pre-built test fixtures for common testing scenarios
pub struct TestFixtures;

impl TestFixtures {
    pub const RP_ID: &'static str = TEST_RP_ID;
    pub const ORIGIN: &'static str = TEST_ORIGIN;

    /// Create standard test settings for `example.com`
    #[must_use]
    pub fn settings() -> CeremonySettings {
        CeremonySettings {
            relying_party: RelyingPartySettings {
                id: TEST_RP_ID.to_string(),
                name: "Example".to_string(),
                origins: vec![TEST_ORIGIN.to_string()],
            },
            ..Default::default()
        }
    }

    /// # Panics
    ///
    /// Panics if the test relying party is rejected, which would be a bug in
    /// the fixture constants.
    #[must_use]
    pub fn relying_party() -> RelyingParty {
        RelyingParty::new(TEST_RP_ID, "Example", &[TEST_ORIGIN]).expect("valid test relying party")
    }

    /// A fresh user with a random id and no credentials
    #[must_use]
    pub fn user() -> UserAccount {
        UserAccount {
            display_name: Some(TEST_DISPLAY_NAME.to_string()),
            ..UserAccount::new(Uuid::new_v4(), TEST_USER_NAME)
        }
    }

    /// A stored credential with a placeholder key; fine for store tests, not
    /// for signature verification
    #[must_use]
    pub fn credential(owner_user_id: UserId, id: Vec<u8>, sign_counter: u32) -> Credential {
        Credential {
            id: CredentialId::new(id),
            owner_user_id,
            public_key: vec![0xa0],
            sign_counter,
            transports: BTreeSet::from([AuthenticatorTransport::Internal]),
            backup_eligible: false,
            backup_state: false,
            aaguid: [0; 16],
            attestation_format: "none".to_string(),
            display_name: None,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// A session created at `now` that expires five minutes later
    #[must_use]
    pub fn session(
        ceremony: CeremonyKind,
        user_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> ChallengeSession {
        ChallengeSession {
            id: Uuid::new_v4(),
            ceremony,
            user_id,
            challenge: Uuid::new_v4()
                .as_bytes()
                .iter()
                .chain(Uuid::new_v4().as_bytes())
                .copied()
                .collect(),
            allowed_credential_ids: Vec::new(),
            user_verification: UserVerificationRequirement::Preferred,
            expires_at: now + Duration::minutes(5),
            created_at: now,
        }
    }
}
