use std::fs;

use anyhow::{Context, Result};
use portal_config::{AppConfig, StorageConfig, UiConfig};
use portal_runtime::PortalServices;
use portal_session::{DisplayName, Language, Session, StudentPin, StudentProfile};
use tempfile::TempDir;

fn build_config(temp_dir: &TempDir, language: &str) -> AppConfig {
    AppConfig {
        storage: StorageConfig {
            path: temp_dir
                .path()
                .join("state/session.json")
                .to_string_lossy()
                .into_owned(),
        },
        ui: UiConfig {
            default_language: language.to_string(),
        },
        ..AppConfig::default()
    }
}

fn initialise(config: &AppConfig) -> Result<PortalServices> {
    PortalServices::initialise(config).context("failed to initialise portal services")
}

fn student() -> StudentProfile {
    StudentProfile {
        id: "stu-1".into(),
        user_id: None,
        name: DisplayName {
            primary: "Sara Ali".into(),
            arabic: None,
        },
        student_code: "S-100".into(),
        grade_level: None,
        division: None,
    }
}

#[test]
fn initialise_starts_signed_out_with_configured_language() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let services = initialise(&build_config(&temp_dir, "ar"))?;

    assert_eq!(Language::Arabic, services.store.language());
    assert!(services.store.read()?.is_none());
    assert_eq!(
        AppConfig::default().backend.base_url,
        services.backend.base_url()
    );
    Ok(())
}

#[test]
fn initialise_falls_back_to_english_for_unknown_language() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let services = initialise(&build_config(&temp_dir, "klingon"))?;

    assert_eq!(Language::English, services.store.language());
    Ok(())
}

#[test]
fn session_state_survives_a_restart() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(&temp_dir, "en");

    let first = initialise(&config)?;
    first.store.persist(&Session::Student(student()))?;
    first.store.set_language(Language::Arabic)?;
    first
        .store
        .remember_pin(&StudentPin::new("2468").context("pin should be accepted")?)?;
    drop(first);

    let second = initialise(&config)?;
    assert_eq!(Some(Session::Student(student())), second.store.read()?);
    assert_eq!(Language::Arabic, second.store.language());
    assert!(second.store.cached_pin()?.is_some());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn sign_out_clears_persisted_student_state() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(&temp_dir, "en");

    let services = initialise(&config)?;
    services.store.persist(&Session::Student(student()))?;
    services
        .store
        .remember_pin(&StudentPin::new("2468").context("pin should be accepted")?)?;

    services.authenticator.sign_out().await?;

    let restarted = initialise(&config)?;
    assert!(restarted.store.read()?.is_none());
    assert!(restarted.store.cached_pin()?.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_session_storage_recovers_through_sign_out() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(&temp_dir, "en");
    fs::create_dir_all(temp_dir.path().join("state"))?;
    fs::write(&config.storage.path, "{ not json")?;

    let services = initialise(&config)?;
    assert!(services.store.read()?.is_none());
    assert_eq!(Language::English, services.store.language());

    services.authenticator.sign_out().await?;
    services.store.persist(&Session::Student(student()))?;

    let restarted = initialise(&config)?;
    assert_eq!(Some(Session::Student(student())), restarted.store.read()?);
    Ok(())
}
