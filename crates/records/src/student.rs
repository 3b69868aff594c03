//! Student portal: grades, final grades, subjects and complaints.

use std::sync::Arc;

use portal_auth::StudentContext;
use portal_backend::{functions, BackendClient};
use portal_session::{SessionStore, StudentProfile};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RecordsError, RecordsResult};
use crate::model::{Complaint, ComplaintDraft, FinalGrades, FinalTerm, Grade, Subject};
use crate::pin::{PinGate, PinPrompt};

#[derive(Serialize)]
struct GradesQuery<'a> {
    user_id: &'a str,
    subject_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    grade_type: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FinalGradesResponse {
    Grades(Vec<Grade>),
    Failed { error: serde_json::Value },
}

#[derive(Serialize)]
struct ComplaintsQuery<'a> {
    student_id: &'a str,
    student_pin: String,
}

#[derive(Deserialize)]
struct ComplaintsResponse {
    #[serde(default)]
    complaints: Option<Vec<Complaint>>,
}

#[derive(Serialize)]
struct NewComplaint<'a> {
    student_id: &'a str,
    title: &'a str,
    description: &'a str,
    student_pin: String,
}

pub struct StudentPortal {
    backend: BackendClient,
    pins: PinGate,
    context: StudentContext,
}

impl StudentPortal {
    pub fn new(backend: BackendClient, store: Arc<SessionStore>, context: StudentContext) -> Self {
        Self {
            backend,
            pins: PinGate::new(store),
            context,
        }
    }

    pub fn profile(&self) -> &StudentProfile {
        self.context.profile()
    }

    pub async fn subjects(&self) -> RecordsResult<Vec<Subject>> {
        let subjects: Option<Vec<Subject>> = self
            .backend
            .invoke_get(functions::FETCH_SUBJECTS, None)
            .await?;
        Ok(subjects.unwrap_or_default())
    }

    /// Grades recorded for one subject.
    pub async fn grades(&self, subject_id: &str) -> RecordsResult<Vec<Grade>> {
        let query = GradesQuery {
            user_id: &self.profile().id,
            subject_id,
            grade_type: None,
        };
        let grades: Option<Vec<Grade>> = self
            .backend
            .invoke(functions::FETCH_STUDENT_GRADES, &query, None)
            .await?;
        Ok(grades.unwrap_or_default())
    }

    /// Final grades of one term across all subjects.
    pub async fn final_grades(&self, term: FinalTerm) -> RecordsResult<FinalGrades> {
        let kind = term.kind();
        let query = GradesQuery {
            user_id: &self.profile().id,
            subject_id: "",
            grade_type: Some(kind.as_str()),
        };
        let response: Option<FinalGradesResponse> = self
            .backend
            .invoke(functions::FETCH_FINAL_GRADES, &query, None)
            .await?;

        match response {
            Some(FinalGradesResponse::Grades(grades)) => Ok(FinalGrades { term, grades }),
            None => Ok(FinalGrades {
                term,
                grades: Vec::new(),
            }),
            Some(FinalGradesResponse::Failed { error }) => {
                Err(RecordsError::Refused(error_text(error)))
            }
        }
    }

    /// Complaint history. Requires the PIN to be re-proven.
    pub async fn complaints(&self, prompt: &dyn PinPrompt) -> RecordsResult<Vec<Complaint>> {
        let pin = self.pins.obtain(prompt).await?;
        let query = ComplaintsQuery {
            student_id: &self.profile().id,
            student_pin: pin.encoded(),
        };
        let response: ComplaintsResponse = self.pins.settle(
            self.backend
                .invoke(functions::FETCH_COMPLAINTS, &query, None)
                .await,
        )?;
        let complaints = response.complaints.unwrap_or_default();
        debug!(count = complaints.len(), "complaints loaded");
        Ok(complaints)
    }

    /// Files a complaint. The create call is only issued once a non-empty
    /// PIN is available.
    pub async fn submit_complaint(
        &self,
        draft: &ComplaintDraft,
        prompt: &dyn PinPrompt,
    ) -> RecordsResult<()> {
        let pin = self.pins.obtain(prompt).await?;
        let body = NewComplaint {
            student_id: &self.profile().id,
            title: draft.title(),
            description: draft.description(),
            student_pin: pin.encoded(),
        };
        let _: serde_json::Value = self.pins.settle(
            self.backend
                .invoke(functions::CREATE_COMPLAINT, &body, None)
                .await,
        )?;
        info!(profile = %self.profile().id, "complaint submitted");
        Ok(())
    }
}

pub(crate) fn error_text(error: serde_json::Value) -> String {
    match error {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}
