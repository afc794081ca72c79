//! Mock implementations for testing

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{ChallengeSession, Credential, CredentialId, UserId};
use crate::store::{
    ChallengeSessionStore, ConsumeOutcome, CounterUpdate, CredentialStore, InsertOutcome,
    SessionSelector, StoreError,
};
use crate::utils::Clock;

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Store whose backend is always down
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl CredentialStore for UnavailableStore {
    async fn get_credentials(&self, _user_id: &UserId) -> Result<Vec<Credential>, StoreError> {
        unavailable()
    }

    async fn get_credential(&self, _id: &CredentialId) -> Result<Option<Credential>, StoreError> {
        unavailable()
    }

    async fn put_credential(&self, _credential: Credential) -> Result<(), StoreError> {
        unavailable()
    }

    async fn insert_credential(&self, _credential: Credential) -> Result<InsertOutcome, StoreError> {
        unavailable()
    }

    async fn update_credential_usage(&self, _credential: &Credential) -> Result<CounterUpdate, StoreError> {
        unavailable()
    }
}

#[async_trait]
impl ChallengeSessionStore for UnavailableStore {
    async fn put_session(&self, _session: ChallengeSession) -> Result<Option<Uuid>, StoreError> {
        unavailable()
    }

    async fn get_and_consume_session(
        &self,
        _selector: &SessionSelector,
        _now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        unavailable()
    }

    async fn delete_session(&self, _selector: &SessionSelector) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        unavailable()
    }
}
