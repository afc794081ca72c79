use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::models::{ResidentKeyRequirement, UserVerificationRequirement};
pub use crate::webauthn::ConfigurationError;
use crate::webauthn::RelyingParty;

/// Environment variable naming a directory whose `Settings.toml` replaces the local one
pub const SETTINGS_DIR_ENV: &str = "CEREMONY_SETTINGS_DIR";

const SETTINGS_FILE: &str = "Settings.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CeremonySettings {
    pub relying_party: RelyingPartySettings,
    pub ceremony: CeremonyPolicy,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelyingPartySettings {
    /// RP ID: the registrable domain credentials are scoped to
    pub id: String,
    pub name: String,
    /// Web origins clients may run on
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeremonyPolicy {
    pub challenge_ttl_seconds: u64,
    /// Client-side timeout hint sent with the options
    pub timeout_seconds: u64,
    pub user_verification: UserVerificationRequirement,
    pub resident_key: ResidentKeyRequirement,
    /// `platform` or `cross-platform`; unset lets the client choose
    pub authenticator_attachment: Option<String>,
    /// Accept certificate-based attestation formats without chain validation
    pub allow_unverifiable_attestation: bool,
    pub session_sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            id: "localhost".to_string(),
            name: "Passkey Ceremony".to_string(),
            origins: vec!["http://localhost:8080".to_string()],
        }
    }
}

impl Default for CeremonyPolicy {
    fn default() -> Self {
        Self {
            challenge_ttl_seconds: 300,
            timeout_seconds: 300,
            user_verification: UserVerificationRequirement::Preferred,
            resident_key: ResidentKeyRequirement::Required,
            authenticator_attachment: None,
            allow_unverifiable_attestation: false,
            session_sweep_interval_seconds: 60,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Upper bound for `challenge_ttl_seconds` (one day)
pub const MAX_CHALLENGE_TTL_SECONDS: u64 = 86_400;

impl CeremonyPolicy {
    #[must_use]
    pub fn challenge_ttl(&self) -> chrono::Duration {
        i64::try_from(self.challenge_ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Client timeout hint in milliseconds
    #[must_use]
    pub fn timeout_millis(&self) -> u64 {
        self.timeout_seconds.saturating_mul(1000)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_sweep_interval_seconds)
    }

    /// # Errors
    /// Returns an error for a TTL outside 1..=86400 seconds, a zero sweep
    /// interval, or an unknown authenticator attachment
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.challenge_ttl_seconds == 0 {
            return Err(ConfigurationError(
                "challenge_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.challenge_ttl_seconds > MAX_CHALLENGE_TTL_SECONDS {
            return Err(ConfigurationError(format!(
                "challenge_ttl_seconds must be at most {MAX_CHALLENGE_TTL_SECONDS}"
            )));
        }
        if self.session_sweep_interval_seconds == 0 {
            return Err(ConfigurationError(
                "session_sweep_interval_seconds must be greater than zero".to_string(),
            ));
        }
        match self.authenticator_attachment.as_deref() {
            None | Some("platform" | "cross-platform") => Ok(()),
            Some(other) => Err(ConfigurationError(format!(
                "Unknown authenticator attachment '{other}'"
            ))),
        }
    }
}

impl CeremonySettings {
    /// Load settings from configuration files and environment variables, then
    /// initialise logging
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    pub fn load() -> anyhow::Result<Self> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.init_logging();
        Ok(settings)
    }

    /// Parse one settings file
    ///
    /// # Errors
    /// Returns an error if the file can't be read or isn't valid TOML
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        basic_toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `CEREMONY_SETTINGS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    fn load_base_settings() -> anyhow::Result<Self> {
        let mut settings = Self::default();

        let local_path = PathBuf::from(SETTINGS_FILE);
        if local_path.exists() {
            settings = Self::from_file(&local_path)?;
            info!("Loaded base settings from {}", local_path.display());
        }

        if let Ok(settings_dir) = std::env::var(SETTINGS_DIR_ENV) {
            let dir_path = Path::new(&settings_dir).join(SETTINGS_FILE);
            if dir_path.exists() {
                settings = Self::from_file(&dir_path)?;
                info!("Overriding settings from {}", dir_path.display());
            } else {
                warn!(
                    "{SETTINGS_DIR_ENV} set but no {SETTINGS_FILE} found at: {}",
                    dir_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_ceremony_env_overrides(&mut settings.ceremony);
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            settings.logging.level = level;
        }
    }

    fn apply_relying_party_env_overrides(rp: &mut RelyingPartySettings) {
        if let Ok(id) = std::env::var("PASSKEY_RP_ID") {
            rp.id = id;
        }
        if let Ok(name) = std::env::var("PASSKEY_RP_NAME") {
            rp.name = name;
        }
        if let Ok(origins) = std::env::var("PASSKEY_RP_ORIGINS") {
            rp.origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect();
        }
    }

    fn apply_ceremony_env_overrides(policy: &mut CeremonyPolicy) {
        Self::apply_parsed_env_override(
            "PASSKEY_CHALLENGE_TTL_SECONDS",
            &mut policy.challenge_ttl_seconds,
        );
        Self::apply_parsed_env_override("PASSKEY_TIMEOUT_SECONDS", &mut policy.timeout_seconds);
        Self::apply_parsed_env_override(
            "PASSKEY_SWEEP_INTERVAL_SECONDS",
            &mut policy.session_sweep_interval_seconds,
        );
        Self::apply_parsed_env_override("PASSKEY_USER_VERIFICATION", &mut policy.user_verification);
        Self::apply_parsed_env_override("PASSKEY_RESIDENT_KEY", &mut policy.resident_key);
        Self::apply_parsed_env_override(
            "PASSKEY_ALLOW_UNVERIFIABLE_ATTESTATION",
            &mut policy.allow_unverifiable_attestation,
        );
        if let Ok(attachment) = std::env::var("PASSKEY_AUTHENTICATOR_ATTACHMENT") {
            policy.authenticator_attachment = Some(attachment).filter(|a| !a.is_empty());
        }
    }

    /// Helper function to apply parsed environment variable overrides; values
    /// that don't parse leave the target unchanged
    fn apply_parsed_env_override<T: std::str::FromStr>(env_var: &str, target: &mut T) {
        if let Ok(value_str) = std::env::var(env_var) {
            match value_str.parse::<T>() {
                Ok(value) => *target = value,
                Err(_) => warn!("Ignoring invalid value for {env_var}: '{value_str}'"),
            }
        }
    }

    /// Initialise `env_logger` with the configured level; `RUST_LOG` still wins
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(self.logging.level.as_str());
        if env_logger::Builder::from_env(env).try_init().is_err() {
            debug!("Logger already initialised");
        }
    }

    /// Validate relying party settings into the immutable runtime form
    ///
    /// # Errors
    /// Returns an error if the RP ID or origins are invalid
    pub fn relying_party(&self) -> Result<RelyingParty, ConfigurationError> {
        RelyingParty::new(
            &self.relying_party.id,
            &self.relying_party.name,
            &self.relying_party.origins,
        )
    }
}
