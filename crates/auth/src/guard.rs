//! Routing-boundary authorization for portal views.

use portal_session::{Profile, Role, Session, StaffProfile, StaffSession, StudentProfile};
use tracing::{debug, info, warn};

use crate::{AuthError, Authenticator};

/// Entry point a view falls back to when its role check fails.
pub fn entry_path(role: Role) -> &'static str {
    match role {
        Role::Student => "/students",
        Role::Teacher => "/teachers",
        Role::Admin => "/administration",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    role: Role,
}

impl Redirect {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn path(&self) -> &'static str {
        entry_path(self.role)
    }
}

/// Authorized student context. Only the guard can produce one.
#[derive(Debug, Clone)]
pub struct StudentContext {
    profile: StudentProfile,
}

impl StudentContext {
    pub fn profile(&self) -> &StudentProfile {
        &self.profile
    }
}

/// Authorized staff context carrying the bearer token for privileged calls.
#[derive(Debug, Clone)]
pub struct StaffContext {
    role: Role,
    session: StaffSession,
    profile: StaffProfile,
}

impl StaffContext {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn profile(&self) -> &StaffProfile {
        &self.profile
    }

    pub fn identity_id(&self) -> &str {
        &self.session.identity.id
    }

    pub fn bearer(&self) -> &str {
        self.session.token.bearer()
    }
}

#[derive(Debug, Clone)]
pub enum ViewAccess {
    Student(StudentContext),
    Staff(StaffContext),
    Redirect(Redirect),
}

impl ViewAccess {
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            ViewAccess::Redirect(redirect) => Some(*redirect),
            _ => None,
        }
    }
}

pub struct ViewGuard {
    auth: Authenticator,
}

impl ViewGuard {
    pub(crate) fn new(auth: Authenticator) -> Self {
        Self { auth }
    }

    /// Authorizes a view that requires `required`.
    ///
    /// Student views authorize from the cached profile. Staff views re-resolve
    /// the profile remotely; any mismatch, missing profile or lookup failure
    /// signs out and redirects.
    pub async fn enter(&self, required: Role) -> Result<ViewAccess, AuthError> {
        let session = self.auth.store().read()?;

        match required {
            Role::Student => match session {
                Some(Session::Student(profile)) => {
                    debug!(profile = %profile.id, "student view authorized");
                    Ok(ViewAccess::Student(StudentContext { profile }))
                }
                _ => Ok(ViewAccess::Redirect(Redirect { role: required })),
            },
            Role::Teacher | Role::Admin => {
                let Some(Session::Staff(session)) = session else {
                    return self.reject(required).await;
                };
                self.enter_staff(required, session).await
            }
        }
    }

    async fn enter_staff(
        &self,
        required: Role,
        mut session: StaffSession,
    ) -> Result<ViewAccess, AuthError> {
        let resolved = self
            .auth
            .resolver()
            .resolve(&session.identity.id, Some(session.token.bearer()))
            .await;

        let profile = match resolved {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                info!(identity = %session.identity.id, "no profile linked to identity");
                return self.reject(required).await;
            }
            Err(error) => {
                warn!(%error, identity = %session.identity.id, "role check failed");
                return self.reject(required).await;
            }
        };

        let staff = match (required, &profile) {
            (Role::Teacher, Profile::Teacher(staff)) | (Role::Admin, Profile::Admin(staff)) => {
                staff.clone()
            }
            (_, other) => {
                info!(
                    identity = %session.identity.id,
                    required = %required,
                    actual = %other.role(),
                    "role mismatch"
                );
                return self.reject(required).await;
            }
        };

        if session.profile.as_ref() != Some(&profile) {
            session.profile = Some(profile);
            self.auth.store().persist(&Session::Staff(session.clone()))?;
        }

        debug!(identity = %session.identity.id, role = %required, "staff view authorized");
        Ok(ViewAccess::Staff(StaffContext {
            role: required,
            session,
            profile: staff,
        }))
    }

    async fn reject(&self, required: Role) -> Result<ViewAccess, AuthError> {
        self.auth.sign_out().await?;
        Ok(ViewAccess::Redirect(Redirect { role: required }))
    }
}
