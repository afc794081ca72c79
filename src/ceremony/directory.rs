//! User directory collaborator
//!
//! Resolves discoverable-login responses (credential id plus user handle) to a
//! stored credential.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{user_id_from_handle, Credential, CredentialId};
use crate::store::{CredentialStore, StoreError};

/// Result of resolving a credential by id and user handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryLookup {
    Found(Credential),
    UnknownUser,
    /// The user exists but doesn't own a credential with this id
    UnknownCredential,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// # Errors
    /// Returns an error if the backing store can't be reached
    async fn lookup_credential(
        &self,
        credential_id: &CredentialId,
        user_handle: &[u8],
    ) -> Result<DirectoryLookup, StoreError>;
}

/// Directory backed by a credential store, where a user exists once it owns a
/// credential and the user handle is the 16 bytes of the user id
#[derive(Clone)]
pub struct CredentialStoreDirectory {
    credentials: Arc<dyn CredentialStore>,
}

impl CredentialStoreDirectory {
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl UserDirectory for CredentialStoreDirectory {
    async fn lookup_credential(
        &self,
        credential_id: &CredentialId,
        user_handle: &[u8],
    ) -> Result<DirectoryLookup, StoreError> {
        let Some(user_id) = user_id_from_handle(user_handle) else {
            return Ok(DirectoryLookup::UnknownUser);
        };
        let owned = self.credentials.get_credentials(&user_id).await?;
        if owned.is_empty() {
            return Ok(DirectoryLookup::UnknownUser);
        }
        Ok(owned
            .into_iter()
            .find(|credential| &credential.id == credential_id)
            .map_or(DirectoryLookup::UnknownCredential, DirectoryLookup::Found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user_handle;
    use crate::store::MemoryCredentialStore;
    use crate::testing::TestFixtures;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_lookup_outcomes() {
        let store = Arc::new(MemoryCredentialStore::new());
        let user_id = Uuid::new_v4();
        let credential = TestFixtures::credential(user_id, vec![1, 2], 0);
        store.put_credential(credential.clone()).await.unwrap();
        let directory = CredentialStoreDirectory::new(store);

        assert_eq!(
            directory
                .lookup_credential(&credential.id, &user_handle(&user_id))
                .await
                .unwrap(),
            DirectoryLookup::Found(credential.clone())
        );
        assert_eq!(
            directory
                .lookup_credential(&CredentialId::new(vec![9]), &user_handle(&user_id))
                .await
                .unwrap(),
            DirectoryLookup::UnknownCredential
        );
        assert_eq!(
            directory
                .lookup_credential(&credential.id, &user_handle(&Uuid::new_v4()))
                .await
                .unwrap(),
            DirectoryLookup::UnknownUser
        );
        assert_eq!(
            directory
                .lookup_credential(&credential.id, b"short")
                .await
                .unwrap(),
            DirectoryLookup::UnknownUser
        );
    }
}
