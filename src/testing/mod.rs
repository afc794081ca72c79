//! Testing utilities for the ceremony engine
//!
//! ## Organization
//!
//! - [`authenticator`] - A software authenticator producing real signed responses
//! - [`fixtures`] - Pre-built test data (settings, users, credentials, sessions)
//! - [`mock`] - Fake store implementations and a manual clock
//!
//! ## Usage
//!
//! ```rust
//! use passkey_ceremony::testing::{SoftAuthenticator, TestFixtures};
//!
//! let authenticator = SoftAuthenticator::es256();
//! let challenge = vec![7u8; 32];
//! let response = authenticator.register(&challenge, TestFixtures::ORIGIN);
//! assert_eq!(response.id, authenticator.credential_id());
//! ```

pub mod authenticator;
pub mod fixtures;
pub mod mock;

pub use authenticator::SoftAuthenticator;
pub use fixtures::TestFixtures;
pub use mock::{ManualClock, UnavailableStore};

/// Common test constants
pub mod constants {
    /// Relying party id used across tests
    pub const TEST_RP_ID: &str = "example.com";

    /// Origin allowed for [`TEST_RP_ID`]
    pub const TEST_ORIGIN: &str = "https://example.com";

    /// Default test user name
    pub const TEST_USER_NAME: &str = "ada@example.com";

    /// Default test display name
    pub const TEST_DISPLAY_NAME: &str = "Ada Lovelace";
}
