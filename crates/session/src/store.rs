//! The session store: sole owner of the current session and its persistence.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::StoreResult;
use crate::language::Language;
use crate::model::{Profile, Session, StaffSession, StudentPin};
use crate::storage::KeyValueStorage;

/// Fixed entry names in client storage.
pub mod keys {
    pub const STUDENT_PROFILE: &str = "studentProfile";
    pub const STUDENT_PIN: &str = "student_pin";
    pub const LANGUAGE: &str = "language";
    pub const AUTH_TOKEN: &str = "auth_token";
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    default_language: Language,
    language: watch::Sender<Language>,
}

impl SessionStore {
    /// Opens the store and restores the remembered language, if any.
    pub fn open(storage: Arc<dyn KeyValueStorage>, default_language: Language) -> StoreResult<Self> {
        let remembered = storage
            .get(keys::LANGUAGE)?
            .and_then(|code| match code.parse::<Language>() {
                Ok(language) => Some(language),
                Err(error) => {
                    warn!(%error, "ignoring unreadable language preference");
                    None
                }
            })
            .unwrap_or(default_language);

        let (language, _) = watch::channel(remembered);

        Ok(Self {
            storage,
            default_language,
            language,
        })
    }

    pub fn persist(&self, session: &Session) -> StoreResult<()> {
        match session {
            Session::Staff(staff) => {
                self.storage.remove(keys::STUDENT_PROFILE)?;
                self.storage
                    .set(keys::AUTH_TOKEN, &serde_json::to_string(staff)?)?;
                info!(identity = %staff.identity.id, "staff session persisted");
            }
            Session::Student(student) => {
                self.storage.remove(keys::AUTH_TOKEN)?;
                let profile = Profile::Student(student.clone());
                self.storage
                    .set(keys::STUDENT_PROFILE, &serde_json::to_string(&profile)?)?;
                info!(profile = %student.id, "student session persisted");
            }
        }
        Ok(())
    }

    /// Returns the current session. A staff token takes precedence over a
    /// cached student profile.
    pub fn read(&self) -> StoreResult<Option<Session>> {
        if let Some(staff) = self.read_entry::<StaffSession>(keys::AUTH_TOKEN)? {
            return Ok(Some(Session::Staff(staff)));
        }

        let student = self
            .read_entry::<Profile>(keys::STUDENT_PROFILE)?
            .and_then(|profile| match profile {
                Profile::Student(student) => Some(student),
                other => {
                    warn!(role = %other.role(), "cached student profile has a non-student role");
                    None
                }
            });

        Ok(student.map(Session::Student))
    }

    /// Removes every cached entry: profile, PIN, token and language.
    pub fn clear(&self) -> StoreResult<()> {
        self.storage.clear()?;
        self.language.send_replace(self.default_language);
        info!("session store cleared");
        Ok(())
    }

    pub fn remember_pin(&self, pin: &StudentPin) -> StoreResult<()> {
        self.storage.set(keys::STUDENT_PIN, pin.expose())
    }

    pub fn cached_pin(&self) -> StoreResult<Option<StudentPin>> {
        Ok(self
            .storage
            .get(keys::STUDENT_PIN)?
            .and_then(StudentPin::new))
    }

    pub fn forget_pin(&self) -> StoreResult<()> {
        self.storage.remove(keys::STUDENT_PIN)
    }

    pub fn language(&self) -> Language {
        *self.language.borrow()
    }

    /// Stores the preference and notifies every subscriber.
    pub fn set_language(&self, language: Language) -> StoreResult<()> {
        self.storage.set(keys::LANGUAGE, language.code())?;
        self.language.send_replace(language);
        debug!(%language, direction = language.direction().as_str(), "language preference applied");
        Ok(())
    }

    pub fn subscribe_language(&self) -> watch::Receiver<Language> {
        self.language.subscribe()
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                warn!(key, %error, "discarding unreadable session entry");
                Ok(None)
            }
        }
    }
}
