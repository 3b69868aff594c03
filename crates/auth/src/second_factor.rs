//! Six-digit code check that finalizes a staff sign-in.

use std::sync::Arc;

use async_trait::async_trait;
use portal_session::{Identity, Session, StaffSession};
use tracing::{info, warn};

use crate::{AuthError, Authenticator, PendingStaffSession};

pub const CODE_LENGTH: usize = 6;

/// Checks a second-factor code for an identity.
#[async_trait]
pub trait CodeVerifier: Send + Sync {
    async fn verify(&self, identity: &Identity, code: &str) -> Result<bool, AuthError>;
}

/// Accepts any six ASCII digits. No shared secret is provisioned for staff
/// accounts yet, so this only enforces the code shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderVerifier;

#[async_trait]
impl CodeVerifier for PlaceholderVerifier {
    async fn verify(&self, identity: &Identity, code: &str) -> Result<bool, AuthError> {
        warn!(
            identity = %identity.id,
            "second factor checked by placeholder verifier; code shape only"
        );
        Ok(code.len() == CODE_LENGTH && code.bytes().all(|byte| byte.is_ascii_digit()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Credentials,
    Totp,
    Authorized,
}

/// Staff sign-in state machine: `Credentials -> Totp -> Authorized`.
pub struct SecondFactorGate {
    auth: Authenticator,
    verifier: Arc<dyn CodeVerifier>,
    state: GateState,
    pending: Option<PendingStaffSession>,
}

impl SecondFactorGate {
    pub(crate) fn new(auth: Authenticator, verifier: Arc<dyn CodeVerifier>) -> Self {
        Self {
            auth,
            verifier,
            state: GateState::Credentials,
            pending: None,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn pending_identity(&self) -> Option<&Identity> {
        self.pending.as_ref().map(PendingStaffSession::identity)
    }

    /// Runs the credential exchange. Only a success moves the gate to `Totp`.
    pub async fn submit_credentials(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        if self.state != GateState::Credentials {
            self.back();
        }

        let pending = self.auth.sign_in_staff(email, password).await?;
        self.pending = Some(pending);
        self.state = GateState::Totp;
        Ok(())
    }

    /// Checks the code. On success the staff session is persisted, its
    /// profile resolved and snapshotted, and the gate becomes `Authorized`.
    /// A wrong code leaves the gate in `Totp`.
    pub async fn verify(&mut self, code: &str) -> Result<StaffSession, AuthError> {
        let Some(pending) = self.pending.as_ref().filter(|_| self.state == GateState::Totp) else {
            return Err(AuthError::NoPendingSignIn);
        };

        if code.chars().count() != CODE_LENGTH {
            return Err(AuthError::MalformedSecondFactor);
        }
        if !self.verifier.verify(pending.identity(), code).await? {
            return Err(AuthError::InvalidSecondFactor);
        }

        let pending = self.pending.take().ok_or(AuthError::NoPendingSignIn)?;
        let mut session = self.auth.finalize(pending)?;
        self.state = GateState::Authorized;
        info!(identity = %session.identity.id, "staff session authorized");

        match self
            .auth
            .resolver()
            .resolve(&session.identity.id, Some(session.token.bearer()))
            .await
        {
            Ok(Some(profile)) => {
                session.profile = Some(profile);
                self.auth.store().persist(&Session::Staff(session.clone()))?;
            }
            Ok(None) => warn!(identity = %session.identity.id, "no profile linked to identity"),
            Err(error) => warn!(%error, identity = %session.identity.id, "profile lookup failed"),
        }

        Ok(session)
    }

    /// Returns to the credentials step and discards the pending sign-in.
    pub fn back(&mut self) {
        self.pending = None;
        self.state = GateState::Credentials;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            id: "auth-1".into(),
            email: None,
        }
    }

    #[tokio::test]
    async fn placeholder_accepts_any_six_ascii_digits() {
        let verifier = PlaceholderVerifier;
        for code in ["000000", "123456", "999999"] {
            assert!(verifier.verify(&identity(), code).await.unwrap(), "{code}");
        }
    }

    #[tokio::test]
    async fn placeholder_rejects_other_shapes() {
        let verifier = PlaceholderVerifier;
        for code in ["", "12345", "1234567", "12 456", "abcdef", "١٢٣٤٥٦"] {
            assert!(!verifier.verify(&identity(), code).await.unwrap(), "{code}");
        }
    }
}
