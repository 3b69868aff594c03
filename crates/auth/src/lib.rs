//! Staff and student sign-in, the staff second-factor gate, role resolution
//! and the view guard that turns a stored session into an authorized context.

pub mod guard;
pub mod resolver;
pub mod second_factor;

use std::sync::Arc;

use chrono::Utc;
use portal_backend::{functions, BackendClient, BackendError};
use portal_config::AuthConfig;
use portal_session::{
    AccessToken, Identity, Profile, Session, SessionStore, StaffSession, StoreError,
    StudentProfile,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use guard::{entry_path, Redirect, StaffContext, StudentContext, ViewAccess, ViewGuard};
pub use resolver::RoleResolver;
pub use second_factor::{CodeVerifier, GateState, PlaceholderVerifier, SecondFactorGate};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials are required")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("verification code must be 6 characters")]
    MalformedSecondFactor,
    #[error("invalid verification code")]
    InvalidSecondFactor,
    #[error("no sign-in is awaiting verification")]
    NoPendingSignIn,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("session storage error: {0}")]
    Store(#[from] StoreError),
}

/// Staff identity that passed the credential exchange but not the second
/// factor. It is never written to the session store.
#[derive(Debug, Clone)]
pub struct PendingStaffSession {
    session: StaffSession,
}

impl PendingStaffSession {
    pub fn identity(&self) -> &Identity {
        &self.session.identity
    }

    fn into_session(self) -> StaffSession {
        self.session
    }
}

#[derive(Serialize)]
struct StudentPinRequest<'a> {
    student_code: &'a str,
    student_pin: &'a str,
}

/// The verification function answers with either the bare profile or the
/// same `{profiles: [...]}` envelope the profile lookup uses.
#[derive(Deserialize)]
#[serde(untagged)]
enum StudentPinResponse {
    Envelope { profiles: Vec<Profile> },
    Bare(Profile),
}

impl StudentPinResponse {
    fn into_profile(self) -> Option<Profile> {
        match self {
            StudentPinResponse::Envelope { profiles } => profiles.into_iter().next(),
            StudentPinResponse::Bare(profile) => Some(profile),
        }
    }
}

#[derive(Clone)]
pub struct Authenticator {
    backend: BackendClient,
    store: Arc<SessionStore>,
    resolver: RoleResolver,
}

impl Authenticator {
    pub fn new(backend: BackendClient, store: Arc<SessionStore>, config: &AuthConfig) -> Self {
        let resolver = RoleResolver::new(backend.clone(), config);
        Self {
            backend,
            store,
            resolver,
        }
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    pub fn guard(&self) -> ViewGuard {
        ViewGuard::new(self.clone())
    }

    pub fn second_factor(&self, verifier: Arc<dyn CodeVerifier>) -> SecondFactorGate {
        SecondFactorGate::new(self.clone(), verifier)
    }

    /// Exchanges an email and password for a pending staff session.
    ///
    /// All locally cached state is cleared before the exchange is attempted,
    /// so a failed attempt also leaves the client signed out.
    pub async fn sign_in_staff(
        &self,
        email: &str,
        password: &str,
    ) -> Result<PendingStaffSession, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        self.store.clear()?;
        self.resolver.invalidate();

        let grant = self
            .backend
            .password_grant(email, password)
            .await
            .map_err(|error| {
                if error.is_rejection() {
                    debug!(%error, "staff credential exchange rejected");
                    AuthError::InvalidCredentials
                } else {
                    AuthError::Backend(error)
                }
            })?;

        let expires_at = grant.expires_at(Utc::now());
        info!(identity = %grant.user.id, "staff credentials accepted");

        Ok(PendingStaffSession {
            session: StaffSession {
                identity: Identity {
                    id: grant.user.id,
                    email: grant.user.email.or_else(|| Some(email.to_string())),
                },
                token: AccessToken {
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token,
                    expires_at,
                },
                profile: None,
            },
        })
    }

    /// Verifies a student code and PIN and persists the returned profile as
    /// the current session.
    ///
    /// Like the staff exchange, every cached entry (including another
    /// student's PIN) is cleared before verification.
    pub async fn sign_in_student(&self, code: &str, pin: &str) -> Result<StudentProfile, AuthError> {
        let code = code.trim();
        let pin = pin.trim();
        if code.is_empty() || pin.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        self.store.clear()?;
        self.resolver.invalidate();

        let request = StudentPinRequest {
            student_code: code,
            student_pin: pin,
        };
        let response: StudentPinResponse = self
            .backend
            .invoke(functions::VERIFY_STUDENT_PIN, &request, None)
            .await
            .map_err(|error| match error {
                BackendError::Status { .. } => {
                    debug!(%error, "student verification rejected");
                    AuthError::InvalidCredentials
                }
                other => AuthError::Backend(other),
            })?;

        let Some(student) = response.into_profile().and_then(Profile::into_student) else {
            warn!("student verification returned a non-student profile");
            return Err(AuthError::InvalidCredentials);
        };

        self.store.persist(&Session::Student(student.clone()))?;
        info!(profile = %student.id, "student signed in");
        Ok(student)
    }

    /// Ends the current session: revokes the staff token when there is one,
    /// clears every stored entry and drops memoized profiles.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        match self.store.read() {
            Ok(Some(Session::Staff(staff))) => {
                if let Err(error) = self.backend.sign_out(staff.token.bearer()).await {
                    warn!(%error, identity = %staff.identity.id, "token revocation failed");
                }
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "session unreadable; clearing without revocation"),
        }

        self.store.clear()?;
        self.resolver.invalidate();
        info!("signed out");
        Ok(())
    }

    /// Persists a staff session once the second factor has been accepted.
    fn finalize(&self, pending: PendingStaffSession) -> Result<StaffSession, AuthError> {
        let session = pending.into_session();
        self.store.persist(&Session::Staff(session.clone()))?;
        Ok(session)
    }
}
