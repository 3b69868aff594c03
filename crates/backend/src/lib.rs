use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use portal_config::BackendConfig;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Names of the serverless functions the portal calls.
pub mod functions {
    pub const GET_PROFILES: &str = "get-profiles";
    pub const VERIFY_STUDENT_PIN: &str = "verify-student-pin";
    pub const FETCH_COMPLAINTS: &str = "fetch-complaints";
    pub const CREATE_COMPLAINT: &str = "create-complaint";
    pub const GET_SUGGESTIONS: &str = "get-suggestions";
    pub const FETCH_STUDENT_GRADES: &str = "fetch-student-grades";
    pub const FETCH_FINAL_GRADES: &str = "fetch-final-grades";
    pub const FETCH_SUBJECTS: &str = "fetch-subjects";
    pub const TEACHER_ASSIGNMENTS: &str = "teacher-assignments";
    pub const TEACHER_SUBJECTS: &str = "teacher-subjects";
    pub const FETCH_STUDENTS_BY_DIVISION: &str = "fetch-students-by-division";
    pub const TEACHER_ADD_GRADES: &str = "teacher_add_grades";
    pub const TEACHER_GRADES: &str = "teacher-grades";
    pub const TEACHER_DELETE_GRADE: &str = "teacher_delete_grade";
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            BackendError::Http(error) => error.status().map(|status| status.as_u16()),
            BackendError::Decode(_) => None,
        }
    }

    /// Whether the collaborator refused the caller rather than failing.
    pub fn is_rejection(&self) -> bool {
        matches!(self.status(), Some(400 | 401 | 403))
    }

    fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| body.chars().take(200).collect());
        BackendError::Status { status, message }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or_else(|| match self.error {
                Some(serde_json::Value::String(text)) => Some(text),
                Some(other) if !other.is_null() => Some(other.to_string()),
                _ => None,
            })
    }
}

/// User record returned by the password grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

impl TokenGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let seconds = self.expires_in?;
        chrono::TimeDelta::try_seconds(seconds).and_then(|lifetime| now.checked_add_signed(lifetime))
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("user", &self.user)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct PasswordGrantRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Thin client over the hosted backend: identity endpoints, serverless
/// functions and the table REST interface.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    anon_key: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .user_agent("school-portal")
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST {base}/functions/v1/{function}` with a JSON body.
    pub async fn invoke<B, R>(&self, function: &str, body: &B, bearer: Option<&str>) -> BackendResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(function, "invoking backend function");
        let request = self
            .request(Method::POST, &format!("functions/v1/{function}"), bearer)
            .json(body);
        self.execute(request).await
    }

    /// `GET {base}/functions/v1/{function}` for functions that take no input.
    pub async fn invoke_get<R>(&self, function: &str, bearer: Option<&str>) -> BackendResult<R>
    where
        R: DeserializeOwned,
    {
        debug!(function, "invoking backend function");
        let request = self.request(Method::GET, &format!("functions/v1/{function}"), bearer);
        self.execute(request).await
    }

    /// Exchanges staff credentials for a bearer token.
    pub async fn password_grant(&self, email: &str, password: &str) -> BackendResult<TokenGrant> {
        let request = self
            .request(Method::POST, "auth/v1/token?grant_type=password", None)
            .json(&PasswordGrantRequest { email, password });
        self.execute(request).await
    }

    pub async fn sign_out(&self, access_token: &str) -> BackendResult<()> {
        let request = self.request(Method::POST, "auth/v1/logout", Some(access_token));
        self.execute(request).await
    }

    /// Reads rows from `table` using REST filter parameters such as `("id", "eq.42")`.
    pub async fn select<R>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        bearer: Option<&str>,
    ) -> BackendResult<Vec<R>>
    where
        R: DeserializeOwned,
    {
        debug!(table, "selecting rows");
        let request = self
            .request(Method::GET, &format!("rest/v1/{table}"), bearer)
            .query(filters);
        self.execute(request).await
    }

    /// Patches the row of `table` whose `id` equals `id`.
    pub async fn update<B>(&self, table: &str, id: &str, body: &B, bearer: Option<&str>) -> BackendResult<()>
    where
        B: Serialize + ?Sized,
    {
        debug!(table, id, "updating row");
        let request = self
            .request(Method::PATCH, &format!("rest/v1/{table}"), bearer)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(body);
        self.execute(request).await
    }

    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.http.request(method, url);

        if let Some(key) = &self.anon_key {
            request = request.header("apikey", key);
        }
        if let Some(token) = bearer.or(self.anon_key.as_deref()) {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn execute<R>(&self, request: RequestBuilder) -> BackendResult<R>
    where
        R: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "backend call rejected");
            return Err(BackendError::from_body(status.as_u16(), &body));
        }

        if body.trim().is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_str(&body)?)
    }
}
