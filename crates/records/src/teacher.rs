//! Teacher portal: assignments, grade entry and grade maintenance.

use portal_auth::StaffContext;
use portal_backend::{functions, BackendClient};
use portal_session::{Role, StaffProfile};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RecordsError, RecordsResult};
use crate::model::{Grade, GradeBatch, GradeEdit, GradeKind, NewGrade, StudentSummary, Subject};
use crate::student::error_text;

const GRADES_TABLE: &str = "student_grades";

#[derive(Serialize)]
struct AssignmentsQuery<'a> {
    teacher_id: &'a str,
    grade_level: &'a str,
}

#[derive(Deserialize)]
struct AssignmentsResponse {
    #[serde(default)]
    divisions: Option<Vec<String>>,
}

#[derive(Serialize)]
struct SubjectsQuery<'a> {
    user_id: &'a str,
    grade_type: &'a str,
    grade_level: &'a str,
}

#[derive(Deserialize)]
struct SubjectsResponse {
    #[serde(default)]
    subjects: Option<Vec<Subject>>,
}

#[derive(Serialize)]
struct DivisionQuery<'a> {
    grade_level: &'a str,
    division: &'a str,
}

#[derive(Deserialize)]
struct DivisionResponse {
    #[serde(default)]
    data: Option<Vec<StudentSummary>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct InsertGrades<'a> {
    data: &'a [NewGrade],
}

#[derive(Serialize)]
struct TeacherGradesQuery<'a> {
    grade_level: &'a str,
    division: &'a str,
    grade_type: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteGrades<'a> {
    ids: &'a [String],
}

pub struct TeacherPortal {
    backend: BackendClient,
    context: StaffContext,
}

impl TeacherPortal {
    pub fn new(backend: BackendClient, context: StaffContext) -> RecordsResult<Self> {
        if context.role() != Role::Teacher {
            return Err(RecordsError::WrongRole(Role::Teacher));
        }
        Ok(Self { backend, context })
    }

    pub fn profile(&self) -> &StaffProfile {
        self.context.profile()
    }

    fn bearer(&self) -> Option<&str> {
        Some(self.context.bearer())
    }

    /// Divisions of `grade_level` assigned to this teacher.
    pub async fn divisions(&self, grade_level: &str) -> RecordsResult<Vec<String>> {
        let query = AssignmentsQuery {
            teacher_id: &self.profile().id,
            grade_level: required("grade level", grade_level)?,
        };
        let response: AssignmentsResponse = self
            .backend
            .invoke(functions::TEACHER_ASSIGNMENTS, &query, self.bearer())
            .await?;
        Ok(response.divisions.unwrap_or_default())
    }

    /// Subjects this teacher may grade for `kind` in `grade_level`.
    pub async fn subjects(&self, kind: &GradeKind, grade_level: &str) -> RecordsResult<Vec<Subject>> {
        let query = SubjectsQuery {
            user_id: &self.profile().id,
            grade_type: kind.as_str(),
            grade_level,
        };
        let response: SubjectsResponse = self
            .backend
            .invoke(functions::TEACHER_SUBJECTS, &query, self.bearer())
            .await?;
        Ok(response.subjects.unwrap_or_default())
    }

    pub async fn students(&self, grade_level: &str, division: &str) -> RecordsResult<Vec<StudentSummary>> {
        let query = DivisionQuery {
            grade_level: required("grade level", grade_level)?,
            division: required("division", division)?,
        };
        let response: DivisionResponse = self
            .backend
            .invoke(functions::FETCH_STUDENTS_BY_DIVISION, &query, self.bearer())
            .await?;

        if let Some(error) = response.error.filter(|error| !error.is_null()) {
            return Err(RecordsError::Refused(error_text(error)));
        }
        Ok(response.data.unwrap_or_default())
    }

    /// Validates and inserts a grade sheet. Returns the number of rows sent.
    pub async fn add_grades(&self, batch: &GradeBatch) -> RecordsResult<usize> {
        let rows = batch.rows(&self.profile().id)?;
        let response: serde_json::Value = self
            .backend
            .invoke(
                functions::TEACHER_ADD_GRADES,
                &InsertGrades { data: &rows },
                self.bearer(),
            )
            .await?;

        if let Some(error) = response.get("error").filter(|error| !error.is_null()) {
            return Err(RecordsError::Refused(error_text(error.clone())));
        }
        info!(
            teacher = %self.profile().id,
            subject = %batch.subject_id,
            kind = %batch.kind,
            rows = rows.len(),
            "grades recorded"
        );
        Ok(rows.len())
    }

    /// Grades of one class, optionally narrowed to one assessment kind.
    pub async fn grades(
        &self,
        grade_level: &str,
        division: &str,
        kind: Option<&GradeKind>,
    ) -> RecordsResult<Vec<Grade>> {
        let query = TeacherGradesQuery {
            grade_level: required("grade level", grade_level)?,
            division: required("division", division)?,
            grade_type: kind.map(GradeKind::as_str),
        };
        let grades: Option<Vec<Grade>> = self
            .backend
            .invoke(functions::TEACHER_GRADES, &query, self.bearer())
            .await?;
        let grades = grades.unwrap_or_default();
        debug!(count = grades.len(), "class grades loaded");
        Ok(grades)
    }

    pub async fn delete_grades(&self, ids: &[String]) -> RecordsResult<()> {
        if ids.is_empty() {
            return Err(RecordsError::MissingField("grade selection"));
        }
        let _: serde_json::Value = self
            .backend
            .invoke(
                functions::TEACHER_DELETE_GRADE,
                &DeleteGrades { ids },
                self.bearer(),
            )
            .await?;
        info!(teacher = %self.profile().id, count = ids.len(), "grades deleted");
        Ok(())
    }

    pub async fn grade(&self, id: &str) -> RecordsResult<GradeEdit> {
        let rows: Vec<GradeEdit> = self
            .backend
            .select(
                GRADES_TABLE,
                &[
                    ("select", "grade,max_grade,notes".to_string()),
                    ("id", format!("eq.{id}")),
                ],
                self.bearer(),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RecordsError::NotFound(id.to_string()))
    }

    pub async fn update_grade(&self, id: &str, edit: &GradeEdit) -> RecordsResult<()> {
        if !edit.grade.is_finite() || !edit.max_grade.is_finite() {
            return Err(RecordsError::InvalidGrade(edit.grade.to_string()));
        }
        self.backend
            .update(GRADES_TABLE, id, edit, self.bearer())
            .await?;
        info!(teacher = %self.profile().id, grade = %id, "grade updated");
        Ok(())
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> RecordsResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(RecordsError::MissingField(field))
    } else {
        Ok(value)
    }
}
