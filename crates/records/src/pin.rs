//! PIN re-proof for sensitive student operations.

use std::sync::Arc;

use async_trait::async_trait;
use portal_backend::BackendError;
use portal_session::{SessionStore, StudentPin};
use tracing::{debug, info};

use crate::error::{RecordsError, RecordsResult};

/// Asks the student for their PIN. `None` or a blank answer aborts the operation.
#[async_trait]
pub trait PinPrompt: Send + Sync {
    async fn ask_pin(&self) -> Option<String>;
}

/// Supplies the cached PIN, or a freshly prompted one, to a sensitive call.
#[derive(Clone)]
pub struct PinGate {
    store: Arc<SessionStore>,
}

impl PinGate {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Returns the cached PIN, prompting when none is cached. A confirmed
    /// answer is cached before it is used.
    pub async fn obtain(&self, prompt: &dyn PinPrompt) -> RecordsResult<StudentPin> {
        if let Some(pin) = self.store.cached_pin()? {
            debug!("using cached student PIN");
            return Ok(pin);
        }

        let pin = prompt
            .ask_pin()
            .await
            .and_then(StudentPin::new)
            .ok_or(RecordsError::PinRequired)?;
        self.store.remember_pin(&pin)?;
        Ok(pin)
    }

    /// Maps the outcome of a PIN-protected call. A rejection forgets the
    /// cached PIN so the next attempt prompts again.
    pub fn settle<T>(&self, outcome: Result<T, BackendError>) -> RecordsResult<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(error) if matches!(error.status(), Some(401 | 403)) => {
                info!(%error, "student PIN rejected; clearing cached PIN");
                self.store.forget_pin()?;
                Err(RecordsError::PinRejected)
            }
            Err(error) => Err(error.into()),
        }
    }
}
