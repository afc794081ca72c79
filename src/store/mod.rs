//! Credential and challenge session storage
//!
//! Provides storage for:
//! - **Credentials**: durable, keyed by credential id with a per-user index.
//! - **Challenge sessions**: short-lived, consumed exactly once by the Finish
//!   call they belong to.
//!
//! The in-memory implementations back tests and single-node deployments; a
//! database backend implements the same traits.

mod memory;
mod stored;

pub use memory::{MemoryCredentialStore, MemorySessionStore};
pub use stored::StoredSession;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::models::{CeremonyKind, ChallengeSession, Credential, CredentialId, UserId};
use crate::utils::logging::LoggingHelper;
use crate::utils::Clock;

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Outcome of an insert-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A credential with the same id already exists (for any user)
    Duplicate,
}

/// Outcome of a conditional counter write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    Applied,
    /// Stored counter already moved past the value being written
    Stale { stored: u32 },
    NotFound,
}

/// Credential persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials owned by `user_id`; empty if there are none
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn get_credentials(&self, user_id: &UserId) -> Result<Vec<Credential>, StoreError>;

    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError>;

    /// Insert or replace, keyed by credential id
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn put_credential(&self, credential: Credential) -> Result<(), StoreError>;

    /// Insert only if no credential with this id exists yet
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn insert_credential(&self, credential: Credential) -> Result<InsertOutcome, StoreError>;

    /// Write counter, backup state and last use only if the new counter
    /// advances the stored one (or both are zero)
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn update_credential_usage(&self, credential: &Credential) -> Result<CounterUpdate, StoreError>;
}

/// Which session a Finish call refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionSelector {
    /// Discoverable flow: the session id echoed by the client
    Id(Uuid),
    /// Flows where the user is known up front
    User { user_id: UserId, ceremony: CeremonyKind },
}

impl SessionSelector {
    #[must_use]
    pub fn registration(user_id: UserId) -> Self {
        Self::User {
            user_id,
            ceremony: CeremonyKind::Registration,
        }
    }

    #[must_use]
    pub fn authentication(user_id: UserId) -> Self {
        Self::User {
            user_id,
            ceremony: CeremonyKind::Authentication,
        }
    }
}

impl fmt::Display for SessionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "session {id}"),
            Self::User { user_id, ceremony } => write!(f, "{} of user {user_id}", ceremony.as_str()),
        }
    }
}

/// Result of an atomic fetch-and-consume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Live(ChallengeSession),
    NotFound,
    /// Existed but was past `expires_at`; consumed all the same
    Expired,
}

/// Challenge session persistence
#[async_trait]
pub trait ChallengeSessionStore: Send + Sync {
    /// Store a session. When it carries a user id, it supersedes any session for
    /// the same user and ceremony; the superseded session id is returned if it
    /// was still live.
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn put_session(&self, session: ChallengeSession) -> Result<Option<Uuid>, StoreError>;

    /// Fetch and remove in one step. Exactly one concurrent caller observes a
    /// given session as `Live`.
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached or the stored record
    /// can't be decoded
    async fn get_and_consume_session(
        &self,
        selector: &SessionSelector,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError>;

    /// Remove a session without using it. Returns whether one was removed.
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn delete_session(&self, selector: &SessionSelector) -> Result<bool, StoreError>;

    /// Evict sessions past their expiry, returning how many were removed
    ///
    /// # Errors
    /// Returns an error if the backend can't be reached
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Spawn a task that periodically evicts expired sessions
#[must_use]
pub fn spawn_session_sweeper(
    store: Arc<dyn ChallengeSessionStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired(clock.now()).await {
                Ok(count) => LoggingHelper::log_sessions_purged(count),
                Err(e) => warn!("Challenge session sweep failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, TestFixtures};

    #[test]
    fn test_selector_display() {
        let user_id = Uuid::nil();
        assert_eq!(
            SessionSelector::registration(user_id).to_string(),
            format!("registration of user {user_id}")
        );
        assert_eq!(
            SessionSelector::Id(user_id).to_string(),
            format!("session {user_id}")
        );
    }

    #[tokio::test]
    async fn test_sweeper_evicts_expired_sessions() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemorySessionStore::new());
        let session = TestFixtures::session(CeremonyKind::Authentication, None, clock.now());
        store.put_session(session.clone()).await.unwrap();

        clock.advance(chrono::Duration::minutes(10));
        let handle = spawn_session_sweeper(store.clone(), clock.clone(), Duration::from_secs(1));
        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert_eq!(store.len(), 0);
    }
}
