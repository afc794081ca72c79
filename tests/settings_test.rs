// Settings loading from files and environment
use std::fs;

use passkey_ceremony::models::UserVerificationRequirement;
use passkey_ceremony::settings::{CeremonySettings, SETTINGS_DIR_ENV};
use serial_test::serial;
use tempfile::TempDir;

const ENV_VARS: [&str; 6] = [
    SETTINGS_DIR_ENV,
    "PASSKEY_RP_ID",
    "PASSKEY_RP_ORIGINS",
    "PASSKEY_TIMEOUT_SECONDS",
    "PASSKEY_ALLOW_UNVERIFIABLE_ATTESTATION",
    "LOG_LEVEL",
];

fn clean_env_vars() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn settings_dir(contents: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    fs::write(dir.path().join("Settings.toml"), contents).expect("Should write settings");
    dir
}

#[test]
#[serial]
fn test_load_from_settings_dir() {
    clean_env_vars();
    let dir = settings_dir(
        r#"
        [relying_party]
        id = "login.example.org"
        name = "Example Org"
        origins = ["https://login.example.org"]

        [ceremony]
        challenge_ttl_seconds = 90
        user_verification = "discouraged"

        [logging]
        level = "debug"
        "#,
    );
    std::env::set_var(SETTINGS_DIR_ENV, dir.path());

    let settings = CeremonySettings::load().expect("Should load settings");

    assert_eq!(settings.relying_party.id, "login.example.org");
    assert_eq!(settings.relying_party.name, "Example Org");
    assert_eq!(settings.ceremony.challenge_ttl_seconds, 90);
    assert_eq!(
        settings.ceremony.user_verification,
        UserVerificationRequirement::Discouraged
    );
    assert_eq!(settings.ceremony.timeout_seconds, 300);
    assert_eq!(settings.logging.level, "debug");
    assert!(settings.relying_party().is_ok());

    clean_env_vars();
}

#[test]
#[serial]
fn test_env_overrides_win_over_file() {
    clean_env_vars();
    let dir = settings_dir(
        r#"
        [relying_party]
        id = "example.org"
        origins = ["https://example.org"]
        "#,
    );
    std::env::set_var(SETTINGS_DIR_ENV, dir.path());
    std::env::set_var("PASSKEY_RP_ID", "example.com");
    std::env::set_var("PASSKEY_RP_ORIGINS", "https://example.com");
    std::env::set_var("PASSKEY_TIMEOUT_SECONDS", "60");
    std::env::set_var("PASSKEY_ALLOW_UNVERIFIABLE_ATTESTATION", "true");
    std::env::set_var("LOG_LEVEL", "warn");

    let settings = CeremonySettings::load().expect("Should load settings");

    assert_eq!(settings.relying_party.id, "example.com");
    assert_eq!(settings.relying_party.origins, vec!["https://example.com"]);
    assert_eq!(settings.ceremony.timeout_millis(), 60_000);
    assert!(settings.ceremony.allow_unverifiable_attestation);
    assert_eq!(settings.logging.level, "warn");

    clean_env_vars();
}

#[test]
#[serial]
fn test_invalid_toml_is_an_error() {
    clean_env_vars();
    let dir = settings_dir("[relying_party\nid = ");
    std::env::set_var(SETTINGS_DIR_ENV, dir.path());

    assert!(CeremonySettings::load().is_err());

    clean_env_vars();
}

#[test]
#[serial]
fn test_missing_settings_dir_falls_back_to_defaults() {
    clean_env_vars();
    let dir = tempfile::tempdir().expect("Should create temp dir");
    std::env::set_var(SETTINGS_DIR_ENV, dir.path().join("absent"));

    let settings = CeremonySettings::load().expect("Should load defaults");
    assert_eq!(settings, CeremonySettings::default());

    clean_env_vars();
}

#[test]
fn test_rejects_insecure_origin() {
    let mut settings = CeremonySettings::default();
    settings.relying_party.id = "example.com".to_string();
    settings.relying_party.origins = vec!["http://example.com".to_string()];
    assert!(settings.relying_party().is_err());
}
