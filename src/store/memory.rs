//! In-memory credential and challenge session stores
//!
//! `DashMap` gives per-key locking: `remove` is the exactly-once consume for
//! sessions and `get_mut` the per-row compare-and-set for credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    ChallengeSessionStore, ConsumeOutcome, CounterUpdate, CredentialStore, InsertOutcome,
    SessionSelector, StoreError, StoredSession,
};
use crate::models::{
    counter_advances, CeremonyKind, ChallengeSession, Credential, CredentialId, UserId,
};

/// In-memory credential storage
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<CredentialId, Credential>,
    /// `user_id` -> credential ids, in registration order
    by_user: DashMap<UserId, Vec<CredentialId>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    fn index(&self, credential: &Credential) {
        let mut ids = self.by_user.entry(credential.owner_user_id).or_default();
        if !ids.contains(&credential.id) {
            ids.push(credential.id.clone());
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_credentials(&self, user_id: &UserId) -> Result<Vec<Credential>, StoreError> {
        let ids = self
            .by_user
            .get(user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.credentials.get(id).map(|c| c.clone()))
            .collect())
    }

    async fn get_credential(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.get(id).map(|c| c.clone()))
    }

    async fn put_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.index(&credential);
        self.credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    async fn insert_credential(&self, credential: Credential) -> Result<InsertOutcome, StoreError> {
        match self.credentials.entry(credential.id.clone()) {
            Entry::Occupied(_) => return Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
            }
        }
        self.index(&credential);
        Ok(InsertOutcome::Inserted)
    }

    async fn update_credential_usage(&self, credential: &Credential) -> Result<CounterUpdate, StoreError> {
        let Some(mut stored) = self.credentials.get_mut(&credential.id) else {
            return Ok(CounterUpdate::NotFound);
        };
        if !counter_advances(stored.sign_counter, credential.sign_counter) {
            return Ok(CounterUpdate::Stale {
                stored: stored.sign_counter,
            });
        }
        stored.sign_counter = credential.sign_counter;
        stored.backup_eligible = credential.backup_eligible;
        stored.backup_state = credential.backup_state;
        stored.last_used_at = credential.last_used_at;
        Ok(CounterUpdate::Applied)
    }
}

/// In-memory challenge session storage
///
/// Sessions are kept in their stored form, the same records a database backend
/// would hold.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, StoredSession>,
    /// (user, ceremony) -> live session id
    by_user: DashMap<(UserId, CeremonyKind), Uuid>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions currently held, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // Whoever removes the record owns it; the index entry is dropped only if it
    // still points at this session.
    fn remove_by_id(&self, id: &Uuid) -> Option<StoredSession> {
        let (_, stored) = self.sessions.remove(id)?;
        if let Some(key) = stored.user_key() {
            self.by_user.remove_if(&key, |_, current| current == id);
        }
        Some(stored)
    }

    fn remove_by_selector(&self, selector: &SessionSelector) -> Option<StoredSession> {
        match selector {
            SessionSelector::Id(id) => self.remove_by_id(id),
            SessionSelector::User { user_id, ceremony } => {
                let (_, id) = self.by_user.remove(&(*user_id, *ceremony))?;
                self.sessions.remove(&id).map(|(_, stored)| stored)
            }
        }
    }
}

#[async_trait]
impl ChallengeSessionStore for MemorySessionStore {
    async fn put_session(&self, session: ChallengeSession) -> Result<Option<Uuid>, StoreError> {
        let stored = StoredSession::from(&session);
        let key = stored.user_key();
        let created_at = session.created_at;
        self.sessions.insert(session.id, stored);

        let Some(key) = key else {
            return Ok(None);
        };
        let Some(previous) = self.by_user.insert(key, session.id) else {
            return Ok(None);
        };
        if previous == session.id {
            return Ok(None);
        }
        Ok(self
            .sessions
            .remove(&previous)
            .filter(|(_, old)| !old.is_expired(created_at))
            .map(|(id, _)| id))
    }

    async fn get_and_consume_session(
        &self,
        selector: &SessionSelector,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        let Some(stored) = self.remove_by_selector(selector) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        if stored.is_expired(now) {
            return Ok(ConsumeOutcome::Expired);
        }
        Ok(ConsumeOutcome::Live(ChallengeSession::try_from(stored)?))
    }

    async fn delete_session(&self, selector: &SessionSelector) -> Result<bool, StoreError> {
        Ok(self.remove_by_selector(selector).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        let mut purged = 0;
        for id in expired {
            if let Some((_, stored)) = self.sessions.remove_if(&id, |_, s| s.is_expired(now)) {
                if let Some(key) = stored.user_key() {
                    self.by_user.remove_if(&key, |_, current| *current == id);
                }
                purged += 1;
            }
        }
        Ok(purged)
    }
}
