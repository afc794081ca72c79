//! Ceremony orchestration
//!
//! Drives registration and authentication end to end: issues challenges, binds
//! them to sessions, verifies responses and records the resulting credential
//! state. It has no knowledge of HTTP or of the bearer session issued afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::directory::{DirectoryLookup, UserDirectory};
use super::errors::CeremonyError;
use super::options::{
    AuthenticatorSelectionCriteria, CreationChallengeResponse, PublicKeyCredentialCreationOptions,
    PublicKeyCredentialDescriptor, PublicKeyCredentialRequestOptions, RelyingPartyEntity,
    RequestChallengeResponse, UserEntity,
};
use crate::models::{
    user_handle, CeremonyKind, ChallengeSession, Credential, CredentialId, PasskeyUser,
    ResidentKeyRequirement, UserId,
};
use crate::settings::{CeremonyPolicy, CeremonySettings};
use crate::store::{
    spawn_session_sweeper, ChallengeSessionStore, ConsumeOutcome, CounterUpdate, CredentialStore,
    InsertOutcome, SessionSelector,
};
use crate::utils::logging::LoggingHelper;
use crate::utils::{encoding, Clock, SystemClock};
use crate::webauthn::{
    generate_challenge, AttestationVerifier, AuthenticationCredential, CeremonyVerifier,
    CoseAlgorithm, RegistrationCredential, StandardAttestationVerifier, VerificationError,
    VerifiedAssertion,
};

/// Options to send to the client, and the session they are bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge<O> {
    pub options: O,
    pub session: ChallengeSession,
}

/// The two passkey ceremonies
///
/// `CeremonyService` verifies responses itself; a hosted passkey provider can
/// implement the same trait so callers can swap between them.
#[async_trait]
pub trait PasskeyCeremonies: Send + Sync {
    /// Issue a registration challenge. The user's existing credentials become
    /// exclusions, and any registration already in flight for the user is
    /// superseded.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the session can't be stored
    async fn begin_registration(
        &self,
        user: &dyn PasskeyUser,
    ) -> Result<IssuedChallenge<CreationChallengeResponse>, CeremonyError>;

    /// Consume the user's registration session, verify the response and store
    /// the new credential
    ///
    /// # Errors
    /// - `SessionExpiredOrUnknown` if there is no live registration session
    /// - `Verification` with the reason the response was rejected
    /// - `StorageUnavailable` if a store call failed
    async fn finish_registration(
        &self,
        user_id: &UserId,
        response: &RegistrationCredential,
    ) -> Result<Credential, CeremonyError>;

    /// Issue an authentication challenge. With a user id the client may only
    /// answer with that user's credentials; without one the login is
    /// discoverable.
    ///
    /// # Errors
    /// - `Verification(CredentialNotFound)` if a known user has no credentials
    /// - `StorageUnavailable` if a store call failed
    async fn begin_authentication(
        &self,
        user_id: Option<&UserId>,
    ) -> Result<IssuedChallenge<RequestChallengeResponse>, CeremonyError>;

    /// Consume the selected session, verify the assertion and record the new
    /// counter. `directory` resolves discoverable responses.
    ///
    /// # Errors
    /// - `SessionExpiredOrUnknown` if there is no live authentication session
    /// - `Verification` with the reason the response was rejected
    /// - `StorageUnavailable` if a store call failed
    async fn finish_authentication(
        &self,
        selector: &SessionSelector,
        response: &AuthenticationCredential,
        directory: &dyn UserDirectory,
    ) -> Result<VerifiedAssertion, CeremonyError>;

    /// Drop a session that will never be finished. Returns whether one existed.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the store call failed
    async fn cancel(&self, selector: &SessionSelector) -> Result<bool, CeremonyError>;
}

/// Ceremony orchestrator verifying responses with [`CeremonyVerifier`]
#[derive(Clone)]
pub struct CeremonyService {
    policy: CeremonyPolicy,
    verifier: CeremonyVerifier,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn ChallengeSessionStore>,
    clock: Arc<dyn Clock>,
}

impl CeremonyService {
    /// Create the service from validated settings
    ///
    /// # Errors
    /// Returns `Configuration` if the relying party or ceremony policy is invalid
    pub fn new(
        settings: &CeremonySettings,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn ChallengeSessionStore>,
    ) -> Result<Self, CeremonyError> {
        settings.ceremony.validate()?;
        let relying_party = settings.relying_party()?;
        let attestation = Arc::new(StandardAttestationVerifier::new(
            settings.ceremony.allow_unverifiable_attestation,
        ));

        Ok(Self {
            policy: settings.ceremony.clone(),
            verifier: CeremonyVerifier::new(relying_party, attestation),
            credentials,
            sessions,
            clock: Arc::new(SystemClock),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the attestation statement check, e.g. with one that validates
    /// certificate chains
    #[must_use]
    pub fn with_attestation_verifier(mut self, attestation: Arc<dyn AttestationVerifier>) -> Self {
        self.verifier = CeremonyVerifier::new(self.verifier.relying_party().clone(), attestation);
        self
    }

    #[must_use]
    pub fn verifier(&self) -> &CeremonyVerifier {
        &self.verifier
    }

    /// Start the background task evicting expired sessions
    #[must_use]
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        spawn_session_sweeper(
            Arc::clone(&self.sessions),
            Arc::clone(&self.clock),
            self.policy.sweep_interval(),
        )
    }

    fn new_session(
        &self,
        ceremony: CeremonyKind,
        user_id: Option<UserId>,
        allowed_credential_ids: Vec<CredentialId>,
    ) -> Result<ChallengeSession, CeremonyError> {
        let challenge = generate_challenge().map_err(|_| {
            CeremonyError::Configuration("system random source unavailable".to_string())
        })?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.policy.challenge_ttl())
            .ok_or_else(|| {
                CeremonyError::Configuration("challenge TTL overflows the clock".to_string())
            })?;
        Ok(ChallengeSession {
            id: Uuid::new_v4(),
            ceremony,
            user_id,
            challenge,
            allowed_credential_ids,
            user_verification: self.policy.user_verification,
            expires_at,
            created_at: now,
        })
    }

    async fn store_session(&self, session: &ChallengeSession) -> Result<(), CeremonyError> {
        let superseded = self.sessions.put_session(session.clone()).await?;
        if let (Some(previous), Some(user_id)) = (superseded, session.user_id.as_ref()) {
            LoggingHelper::log_session_superseded(session.ceremony, user_id, &previous);
        }
        LoggingHelper::log_ceremony_started(session.ceremony, &session.id, session.user_id.as_ref());
        Ok(())
    }

    async fn consume_session(
        &self,
        selector: &SessionSelector,
        ceremony: CeremonyKind,
    ) -> Result<ChallengeSession, CeremonyError> {
        match self
            .sessions
            .get_and_consume_session(selector, self.clock.now())
            .await?
        {
            ConsumeOutcome::Live(session) if session.ceremony == ceremony => Ok(session),
            ConsumeOutcome::Live(_) | ConsumeOutcome::NotFound | ConsumeOutcome::Expired => {
                LoggingHelper::log_session_unavailable(ceremony, selector);
                Err(CeremonyError::SessionExpiredOrUnknown)
            }
        }
    }

    fn reject(session: &ChallengeSession, error: VerificationError) -> CeremonyError {
        LoggingHelper::log_ceremony_rejected(session.ceremony, &session.id, &error);
        CeremonyError::Verification(error)
    }

    fn reject_clone(
        session: &ChallengeSession,
        credential: &Credential,
        stored: u32,
        reported: u32,
    ) -> CeremonyError {
        LoggingHelper::log_clone_detected(&credential.id, &credential.owner_user_id, stored, reported);
        Self::reject(
            session,
            VerificationError::PossibleCloneDetected { stored, reported },
        )
    }

    // Exclusion descriptors: stored credentials (with transports) plus any ids
    // the user record knows that the store doesn't
    async fn exclusions(
        &self,
        user: &dyn PasskeyUser,
    ) -> Result<Vec<PublicKeyCredentialDescriptor>, CeremonyError> {
        let mut descriptors: Vec<PublicKeyCredentialDescriptor> = self
            .credentials
            .get_credentials(&user.user_id())
            .await?
            .iter()
            .map(PublicKeyCredentialDescriptor::from)
            .collect();
        for id in user.credential_ids() {
            if !descriptors.iter().any(|d| d.id == id) {
                descriptors.push(PublicKeyCredentialDescriptor::new(id));
            }
        }
        Ok(descriptors)
    }

    async fn resolve_credential(
        &self,
        session: &ChallengeSession,
        response: &AuthenticationCredential,
        directory: &dyn UserDirectory,
    ) -> Result<Credential, CeremonyError> {
        if !session.is_discoverable() {
            if !session.allowed_credential_ids.contains(&response.id) {
                return Err(Self::reject(session, VerificationError::CredentialNotAllowed));
            }
            return match self.credentials.get_credential(&response.id).await? {
                Some(credential) => Ok(credential),
                None => Err(Self::reject(session, VerificationError::CredentialNotFound)),
            };
        }

        let Some(handle) = response.user_handle.as_deref() else {
            return Err(Self::reject(session, VerificationError::UserNotFound));
        };
        match directory.lookup_credential(&response.id, handle).await? {
            DirectoryLookup::Found(credential) => Ok(credential),
            DirectoryLookup::UnknownUser => Err(Self::reject(session, VerificationError::UserNotFound)),
            DirectoryLookup::UnknownCredential => {
                Err(Self::reject(session, VerificationError::CredentialNotFound))
            }
        }
    }
}

#[async_trait]
impl PasskeyCeremonies for CeremonyService {
    async fn begin_registration(
        &self,
        user: &dyn PasskeyUser,
    ) -> Result<IssuedChallenge<CreationChallengeResponse>, CeremonyError> {
        let user_id = user.user_id();
        let exclude_credentials = self.exclusions(user).await?;
        let session = self.new_session(
            CeremonyKind::Registration,
            Some(user_id),
            exclude_credentials.iter().map(|d| d.id.clone()).collect(),
        )?;
        self.store_session(&session).await?;

        let relying_party = self.verifier.relying_party();
        let options = CreationChallengeResponse {
            session_id: session.id,
            public_key: PublicKeyCredentialCreationOptions {
                rp: RelyingPartyEntity {
                    id: relying_party.id().to_string(),
                    name: relying_party.name().to_string(),
                },
                user: UserEntity {
                    id: encoding::encode(user_handle(&user_id)),
                    name: user.user_name().to_string(),
                    display_name: user.display_name().to_string(),
                },
                challenge: encoding::encode(&session.challenge),
                pub_key_cred_params: CoseAlgorithm::ALL.into_iter().map(Into::into).collect(),
                timeout: self.policy.timeout_millis(),
                exclude_credentials,
                authenticator_selection: AuthenticatorSelectionCriteria {
                    authenticator_attachment: self.policy.authenticator_attachment.clone(),
                    resident_key: self.policy.resident_key,
                    require_resident_key: self.policy.resident_key
                        == ResidentKeyRequirement::Required,
                    user_verification: self.policy.user_verification,
                },
                attestation: "none".to_string(),
            },
        };

        Ok(IssuedChallenge { options, session })
    }

    async fn finish_registration(
        &self,
        user_id: &UserId,
        response: &RegistrationCredential,
    ) -> Result<Credential, CeremonyError> {
        let session = self
            .consume_session(
                &SessionSelector::registration(*user_id),
                CeremonyKind::Registration,
            )
            .await?;

        let credential = self
            .verifier
            .verify_registration(response, &session, self.clock.now())
            .map_err(|e| Self::reject(&session, e))?;

        match self.credentials.insert_credential(credential.clone()).await? {
            InsertOutcome::Inserted => {
                LoggingHelper::log_registration_success(user_id, &credential.id);
                Ok(credential)
            }
            InsertOutcome::Duplicate => Err(Self::reject(
                &session,
                VerificationError::CredentialAlreadyRegistered,
            )),
        }
    }

    async fn begin_authentication(
        &self,
        user_id: Option<&UserId>,
    ) -> Result<IssuedChallenge<RequestChallengeResponse>, CeremonyError> {
        let allow_credentials: Vec<PublicKeyCredentialDescriptor> = match user_id {
            Some(user_id) => {
                let owned = self.credentials.get_credentials(user_id).await?;
                if owned.is_empty() {
                    return Err(VerificationError::CredentialNotFound.into());
                }
                owned.iter().map(PublicKeyCredentialDescriptor::from).collect()
            }
            None => Vec::new(),
        };

        let session = self.new_session(
            CeremonyKind::Authentication,
            user_id.copied(),
            allow_credentials.iter().map(|d| d.id.clone()).collect(),
        )?;
        self.store_session(&session).await?;

        let options = RequestChallengeResponse {
            session_id: session.id,
            public_key: PublicKeyCredentialRequestOptions {
                challenge: encoding::encode(&session.challenge),
                timeout: self.policy.timeout_millis(),
                rp_id: self.verifier.relying_party().id().to_string(),
                allow_credentials,
                user_verification: self.policy.user_verification,
            },
        };

        Ok(IssuedChallenge { options, session })
    }

    async fn finish_authentication(
        &self,
        selector: &SessionSelector,
        response: &AuthenticationCredential,
        directory: &dyn UserDirectory,
    ) -> Result<VerifiedAssertion, CeremonyError> {
        let session = self
            .consume_session(selector, CeremonyKind::Authentication)
            .await?;
        let credential = self.resolve_credential(&session, response, directory).await?;

        let verified = match self.verifier.verify_authentication(
            response,
            &session,
            &credential,
            self.clock.now(),
        ) {
            Ok(verified) => verified,
            Err(VerificationError::PossibleCloneDetected { stored, reported }) => {
                return Err(Self::reject_clone(&session, &credential, stored, reported));
            }
            Err(e) => return Err(Self::reject(&session, e)),
        };

        // A concurrent verification may have recorded a higher counter since
        // `credential` was read
        match self
            .credentials
            .update_credential_usage(&verified.credential)
            .await?
        {
            CounterUpdate::Applied => {
                LoggingHelper::log_authentication_success(
                    &verified.user_id,
                    &verified.credential.id,
                    verified.credential.sign_counter,
                );
                Ok(verified)
            }
            CounterUpdate::Stale { stored } => Err(Self::reject_clone(
                &session,
                &credential,
                stored,
                verified.credential.sign_counter,
            )),
            CounterUpdate::NotFound => {
                Err(Self::reject(&session, VerificationError::CredentialNotFound))
            }
        }
    }

    async fn cancel(&self, selector: &SessionSelector) -> Result<bool, CeremonyError> {
        Ok(self.sessions.delete_session(selector).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::CredentialStoreDirectory;
    use crate::models::UserAccount;
    use crate::store::{MemoryCredentialStore, MemorySessionStore};
    use crate::testing::{ManualClock, SoftAuthenticator, TestFixtures, UnavailableStore};

    struct Harness {
        service: CeremonyService,
        credentials: Arc<MemoryCredentialStore>,
        sessions: Arc<MemorySessionStore>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::default());
        let service = CeremonyService::new(
            &TestFixtures::settings(),
            credentials.clone(),
            sessions.clone(),
        )
        .unwrap()
        .with_clock(clock.clone());
        Harness {
            service,
            credentials,
            sessions,
            clock,
        }
    }

    async fn register(h: &Harness, authenticator: &SoftAuthenticator, user: &UserAccount) -> Credential {
        let issued = h.service.begin_registration(user).await.unwrap();
        let response = authenticator.register(&issued.session.challenge, TestFixtures::ORIGIN);
        h.service.finish_registration(&user.id, &response).await.unwrap()
    }

    #[tokio::test]
    async fn test_begin_registration_options() {
        let h = harness();
        let mut user = TestFixtures::user();
        user.credential_ids = vec![CredentialId::new(vec![5, 5])];

        let issued = h.service.begin_registration(&user).await.unwrap();
        let options = &issued.options.public_key;
        assert_eq!(issued.options.session_id, issued.session.id);
        assert_eq!(options.rp.id, TestFixtures::RP_ID);
        assert_eq!(options.user.id, encoding::encode(user_handle(&user.id)));
        assert_eq!(options.challenge, encoding::encode(&issued.session.challenge));
        assert_eq!(options.exclude_credentials.len(), 1);
        assert!(options.authenticator_selection.require_resident_key);
        assert_eq!(options.timeout, 300_000);
        assert_eq!(issued.session.challenge.len(), 32);
        assert_eq!(
            issued.session.expires_at - issued.session.created_at,
            chrono::Duration::minutes(5)
        );
        assert_eq!(h.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_registration_then_login() {
        let h = harness();
        let user = TestFixtures::user();
        let authenticator = SoftAuthenticator::es256();
        let credential = register(&h, &authenticator, &user).await;
        assert_eq!(credential.owner_user_id, user.id);
        assert_eq!(h.credentials.len(), 1);

        let issued = h.service.begin_authentication(Some(&user.id)).await.unwrap();
        assert_eq!(
            issued.options.public_key.allow_credentials[0].id,
            credential.id
        );
        let response = authenticator
            .with_counter(1)
            .assert(&issued.session.challenge, TestFixtures::ORIGIN, None);
        let directory = CredentialStoreDirectory::new(h.credentials.clone());
        let verified = h
            .service
            .finish_authentication(&SessionSelector::authentication(user.id), &response, &directory)
            .await
            .unwrap();
        assert_eq!(verified.user_id, user.id);
        assert_eq!(verified.credential.sign_counter, 1);
    }

    #[tokio::test]
    async fn test_second_registration_of_same_key_rejected() {
        let h = harness();
        let authenticator = SoftAuthenticator::es256();
        register(&h, &authenticator, &TestFixtures::user()).await;

        let other = TestFixtures::user();
        let issued = h.service.begin_registration(&other).await.unwrap();
        let response = authenticator.register(&issued.session.challenge, TestFixtures::ORIGIN);
        assert_eq!(
            h.service.finish_registration(&other.id, &response).await,
            Err(CeremonyError::Verification(
                VerificationError::CredentialAlreadyRegistered
            ))
        );
    }

    #[tokio::test]
    async fn test_begin_authentication_unknown_user() {
        let h = harness();
        let user = TestFixtures::user();
        assert_eq!(
            h.service.begin_authentication(Some(&user.id)).await,
            Err(CeremonyError::Verification(VerificationError::CredentialNotFound))
        );
    }

    #[tokio::test]
    async fn test_rejection_consumes_session() {
        let h = harness();
        let user = TestFixtures::user();
        let authenticator = SoftAuthenticator::es256();
        let issued = h.service.begin_registration(&user).await.unwrap();

        let bad = authenticator.register(&[0u8; 32], TestFixtures::ORIGIN);
        assert_eq!(
            h.service.finish_registration(&user.id, &bad).await,
            Err(CeremonyError::Verification(VerificationError::ChallengeMismatch))
        );

        let good = authenticator.register(&issued.session.challenge, TestFixtures::ORIGIN);
        assert_eq!(
            h.service.finish_registration(&user.id, &good).await,
            Err(CeremonyError::SessionExpiredOrUnknown)
        );
    }

    #[tokio::test]
    async fn test_session_id_of_other_ceremony_is_unknown() {
        let h = harness();
        let user = TestFixtures::user();
        let authenticator = SoftAuthenticator::es256();
        let issued = h.service.begin_registration(&user).await.unwrap();

        let response = authenticator.assert(&issued.session.challenge, TestFixtures::ORIGIN, None);
        let directory = CredentialStoreDirectory::new(h.credentials.clone());
        assert_eq!(
            h.service
                .finish_authentication(&SessionSelector::Id(issued.session.id), &response, &directory)
                .await,
            Err(CeremonyError::SessionExpiredOrUnknown)
        );
    }

    #[tokio::test]
    async fn test_cancel() {
        let h = harness();
        let issued = h.service.begin_authentication(None).await.unwrap();
        let selector = SessionSelector::Id(issued.session.id);
        assert!(h.service.cancel(&selector).await.unwrap());
        assert!(!h.service.cancel(&selector).await.unwrap());
        assert!(h.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session() {
        let h = harness();
        let user = TestFixtures::user();
        let issued = h.service.begin_registration(&user).await.unwrap();
        h.clock.advance(chrono::Duration::minutes(10));

        let response =
            SoftAuthenticator::es256().register(&issued.session.challenge, TestFixtures::ORIGIN);
        assert_eq!(
            h.service.finish_registration(&user.id, &response).await,
            Err(CeremonyError::SessionExpiredOrUnknown)
        );
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable() {
        let service = CeremonyService::new(
            &TestFixtures::settings(),
            Arc::new(UnavailableStore),
            Arc::new(UnavailableStore),
        )
        .unwrap();
        let error = service
            .begin_registration(&TestFixtures::user())
            .await
            .unwrap_err();
        assert!(matches!(error, CeremonyError::StorageUnavailable(_)));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = TestFixtures::settings();
        settings.relying_party.origins.clear();
        let result = CeremonyService::new(
            &settings,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySessionStore::new()),
        );
        assert!(matches!(result, Err(CeremonyError::Configuration(_))));
    }

    #[test]
    fn test_oversized_challenge_ttl_rejected() {
        let mut settings = TestFixtures::settings();
        settings.ceremony.challenge_ttl_seconds = u64::MAX;
        let result = CeremonyService::new(
            &settings,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySessionStore::new()),
        );
        assert!(matches!(result, Err(CeremonyError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_expiry_overflow_is_an_error() {
        let h = harness();
        h.clock.set(chrono::DateTime::<chrono::Utc>::MAX_UTC);
        assert!(matches!(
            h.service.begin_authentication(None).await,
            Err(CeremonyError::Configuration(_))
        ));
        assert!(h.sessions.is_empty());
    }
}
