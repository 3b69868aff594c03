//! Identity-to-profile lookup with an optional short-lived memo.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use portal_backend::{functions, BackendClient};
use portal_config::AuthConfig;
use portal_session::Profile;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AuthError;

#[derive(Serialize)]
struct ProfileLookup<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct ProfileLookupResponse {
    #[serde(default)]
    profiles: Vec<Profile>,
}

struct CachedProfile {
    profile: Option<Profile>,
    fetched_at: Instant,
}

/// Resolves the profile linked to an identity.
///
/// With a zero TTL every call goes to the backend. Otherwise results are kept
/// per identity until they age out or [`RoleResolver::invalidate`] runs.
#[derive(Clone)]
pub struct RoleResolver {
    backend: BackendClient,
    ttl: Duration,
    cache: Arc<Mutex<HashMap<String, CachedProfile>>>,
}

impl RoleResolver {
    pub fn new(backend: BackendClient, config: &AuthConfig) -> Self {
        Self {
            backend,
            ttl: Duration::from_secs(config.profile_cache_ttl_seconds),
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_memoized(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Returns the first profile linked to `identity_id`, if any.
    pub async fn resolve(
        &self,
        identity_id: &str,
        bearer: Option<&str>,
    ) -> Result<Option<Profile>, AuthError> {
        if let Some(profile) = self.cached(identity_id) {
            debug!(identity = %identity_id, "profile served from memo");
            return Ok(profile);
        }

        let response: ProfileLookupResponse = self
            .backend
            .invoke(
                functions::GET_PROFILES,
                &ProfileLookup {
                    user_id: identity_id,
                },
                bearer,
            )
            .await?;
        let profile = response.profiles.into_iter().next();
        debug!(
            identity = %identity_id,
            role = ?profile.as_ref().map(Profile::role),
            "profile resolved"
        );

        if self.is_memoized() {
            self.cache.lock().insert(
                identity_id.to_string(),
                CachedProfile {
                    profile: profile.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }

        Ok(profile)
    }

    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    fn cached(&self, identity_id: &str) -> Option<Option<Profile>> {
        if !self.is_memoized() {
            return None;
        }

        let mut cache = self.cache.lock();
        match cache.get(identity_id) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.profile.clone()),
            Some(_) => {
                cache.remove(identity_id);
                None
            }
            None => None,
        }
    }
}
