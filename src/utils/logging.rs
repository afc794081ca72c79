// Centralized logging for ceremony events. Challenges, keys and signatures are never logged.
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{CeremonyKind, CredentialId, UserId};

/// Log target for events that need operational alerting rather than user support
pub const SECURITY_LOG_TARGET: &str = "passkey_ceremony::security";

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log challenge issuance
    pub fn log_ceremony_started(kind: CeremonyKind, session_id: &Uuid, user_id: Option<&UserId>) {
        match user_id {
            Some(user_id) => debug!(
                "Issued {} challenge (session {session_id}) for user {user_id}",
                kind.as_str()
            ),
            None => debug!(
                "Issued discoverable {} challenge (session {session_id})",
                kind.as_str()
            ),
        }
    }

    /// Log that a new registration replaced a live one for the same user
    pub fn log_session_superseded(kind: CeremonyKind, user_id: &UserId, previous: &Uuid) {
        warn!(
            "Superseded live {} session {previous} for user {user_id}",
            kind.as_str()
        );
    }

    /// Log a successful registration
    pub fn log_registration_success(user_id: &UserId, credential_id: &CredentialId) {
        info!("Registered passkey {credential_id} for user {user_id}");
    }

    /// Log a successful authentication
    pub fn log_authentication_success(user_id: &UserId, credential_id: &CredentialId, counter: u32) {
        info!("Authenticated user {user_id} with passkey {credential_id} (counter {counter})");
    }

    /// Log a rejected ceremony
    pub fn log_ceremony_rejected(kind: CeremonyKind, session_id: &Uuid, reason: &dyn std::fmt::Display) {
        warn!("Rejected {} for session {session_id}: {reason}", kind.as_str());
    }

    /// Log a Finish call that found no live session
    pub fn log_session_unavailable(kind: CeremonyKind, selector: &dyn std::fmt::Display) {
        warn!("No live {} session for {selector}", kind.as_str());
    }

    /// Raise the clone-detection alert
    pub fn log_clone_detected(credential_id: &CredentialId, owner: &UserId, stored: u32, reported: u32) {
        error!(
            target: SECURITY_LOG_TARGET,
            "Possible cloned authenticator: credential {credential_id} of user {owner} reported counter {reported}, stored counter is {stored}"
        );
    }

    /// Log a sweeper pass
    pub fn log_sessions_purged(count: usize) {
        if count > 0 {
            debug!("Purged {count} expired challenge sessions");
        }
    }
}
