//! Administration portal: complaint review and dashboard counters.

use std::fmt;
use std::str::FromStr;

use portal_auth::StaffContext;
use portal_backend::{functions, BackendClient};
use portal_session::{Role, StaffProfile};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RecordsError, RecordsResult};
use crate::model::{Complaint, ComplaintFlags, ComplaintStatus, DashboardStats};

/// Complaints fetched per page.
pub const PAGE_SIZE: u32 = 20;

const COMPLAINTS_TABLE: &str = "complaints";
const PROFILES_TABLE: &str = "profiles";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SuggestionFilter {
    #[default]
    All,
    Priority,
    Pending,
}

impl SuggestionFilter {
    pub fn matches(self, complaint: &Complaint) -> bool {
        match self {
            SuggestionFilter::All => true,
            SuggestionFilter::Priority => complaint.is_priority,
            SuggestionFilter::Pending => complaint.status.is_open(),
        }
    }
}

impl FromStr for SuggestionFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SuggestionFilter::All),
            "priority" => Ok(SuggestionFilter::Priority),
            "pending" => Ok(SuggestionFilter::Pending),
            other => Err(format!("unknown filter `{other}`")),
        }
    }
}

impl fmt::Display for SuggestionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SuggestionFilter::All => "all",
            SuggestionFilter::Priority => "priority",
            SuggestionFilter::Pending => "pending",
        })
    }
}

/// Outcome an administrator records on a complaint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDecision {
    pub status: ComplaintStatus,
    pub response: Option<String>,
}

#[derive(Serialize)]
struct PageQuery {
    take: u32,
    skip: u32,
}

#[derive(Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Option<Vec<Complaint>>,
}

#[derive(Serialize)]
struct ReviewUpdate<'a> {
    status: ComplaintStatus,
    admin_response: Option<&'a str>,
    admin_id: &'a str,
}

pub struct AdminPortal {
    backend: BackendClient,
    context: StaffContext,
}

impl AdminPortal {
    pub fn new(backend: BackendClient, context: StaffContext) -> RecordsResult<Self> {
        if context.role() != Role::Admin {
            return Err(RecordsError::WrongRole(Role::Admin));
        }
        Ok(Self { backend, context })
    }

    pub fn profile(&self) -> &StaffProfile {
        self.context.profile()
    }

    fn bearer(&self) -> Option<&str> {
        Some(self.context.bearer())
    }

    /// One page of complaints (`page` is zero-based), filtered client-side.
    pub async fn suggestions(
        &self,
        page: u32,
        filter: SuggestionFilter,
    ) -> RecordsResult<Vec<Complaint>> {
        let query = PageQuery {
            take: PAGE_SIZE,
            skip: page.saturating_mul(PAGE_SIZE),
        };
        let response: SuggestionsResponse = self
            .backend
            .invoke(functions::GET_SUGGESTIONS, &query, self.bearer())
            .await?;

        let complaints: Vec<Complaint> = response
            .suggestions
            .unwrap_or_default()
            .into_iter()
            .filter(|complaint| filter.matches(complaint))
            .collect();
        debug!(page, %filter, count = complaints.len(), "suggestions loaded");
        Ok(complaints)
    }

    /// Records a status and optional response. A blank response is stored as null.
    pub async fn review(&self, complaint_id: &str, decision: &ReviewDecision) -> RecordsResult<()> {
        let complaint_id = complaint_id.trim();
        if complaint_id.is_empty() {
            return Err(RecordsError::MissingField("complaint"));
        }

        let update = ReviewUpdate {
            status: decision.status,
            admin_response: decision
                .response
                .as_deref()
                .map(str::trim)
                .filter(|response| !response.is_empty()),
            admin_id: &self.profile().id,
        };
        self.backend
            .update(COMPLAINTS_TABLE, complaint_id, &update, self.bearer())
            .await?;
        info!(
            admin = %self.profile().id,
            complaint = %complaint_id,
            status = %decision.status,
            "complaint reviewed"
        );
        Ok(())
    }

    pub async fn stats(&self) -> RecordsResult<DashboardStats> {
        let columns = [("select", "id,is_priority,status".to_string())];
        let complaints =
            self.backend
                .select::<ComplaintFlags>(COMPLAINTS_TABLE, &columns, self.bearer());
        let students = self.count_profiles(Role::Student);
        let teachers = self.count_profiles(Role::Teacher);

        let (complaints, students, teachers) = tokio::try_join!(complaints, students, teachers)?;
        Ok(DashboardStats::tally(&complaints, students, teachers))
    }

    async fn count_profiles(&self, role: Role) -> Result<usize, portal_backend::BackendError> {
        let rows: Vec<IgnoredAny> = self
            .backend
            .select(
                PROFILES_TABLE,
                &[
                    ("select", "id".to_string()),
                    ("role", format!("eq.{role}")),
                ],
                self.bearer(),
            )
            .await?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complaint(is_priority: bool, status: ComplaintStatus) -> Complaint {
        Complaint {
            id: "c".into(),
            title: None,
            reason: None,
            description: String::new(),
            teacher_name: None,
            is_priority,
            status,
            admin_response: None,
            created_at: None,
            student: None,
        }
    }

    #[test]
    fn filters_select_expected_complaints() {
        let urgent = complaint(true, ComplaintStatus::Resolved);
        let open = complaint(false, ComplaintStatus::UnderReview);

        assert!(SuggestionFilter::All.matches(&urgent));
        assert!(SuggestionFilter::Priority.matches(&urgent));
        assert!(!SuggestionFilter::Priority.matches(&open));
        assert!(SuggestionFilter::Pending.matches(&open));
        assert!(!SuggestionFilter::Pending.matches(&urgent));
    }

    #[test]
    fn filter_parses_case_insensitively() {
        assert_eq!("Priority".parse::<SuggestionFilter>(), Ok(SuggestionFilter::Priority));
        assert!("urgent".parse::<SuggestionFilter>().is_err());
    }
}
