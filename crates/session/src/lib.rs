//! # Portal Session Crate
//!
//! Data model and client-side session store for the school portal.
//!
//! ## Architecture
//!
//! - **Model**: identities, role profiles, staff/student sessions, student PINs
//! - **Language**: UI language preference and its display direction
//! - **Storage**: key-value persistence adapters (memory, JSON file)
//! - **Store**: the `SessionStore`, the only place sessions are serialized
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use portal_session::{Language, MemoryStorage, SessionStore};
//!
//! let store = SessionStore::open(Arc::new(MemoryStorage::default()), Language::English).unwrap();
//! assert!(store.read().unwrap().is_none());
//! ```

pub mod error;
pub mod language;
pub mod model;
pub mod storage;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use language::{Language, TextDirection};
pub use model::{
    AccessToken, DisplayName, Identity, Profile, ProfileError, ProfileRecord, Role, Session,
    StaffProfile, StaffSession, StudentPin, StudentProfile,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{keys, SessionStore};
