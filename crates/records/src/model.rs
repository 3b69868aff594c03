//! Grade, subject and complaint records exchanged with the backend.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use portal_session::{DisplayName, Language};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_MAX_GRADE: f64 = 100.0;

/// Lenient decoders for columns that arrive as numbers, numeric strings or null.
mod lenient {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Float(f64),
        Text(String),
    }

    impl Number {
        fn value<E: serde::de::Error>(self) -> Result<f64, E> {
            match self {
                Number::Float(value) => Ok(value),
                Number::Text(text) => text
                    .trim()
                    .parse()
                    .map_err(|_| E::custom(format!("`{text}` is not a number"))),
            }
        }
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Number::deserialize(deserializer)?.value()
    }

    pub fn max_grade<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Option::<Number>::deserialize(deserializer)? {
            Some(number) => number.value(),
            None => Ok(DEFAULT_MAX_GRADE),
        }
    }

    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}

fn default_max_grade() -> f64 {
    DEFAULT_MAX_GRADE
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    #[default]
    Pending,
    UnderReview,
    Resolved,
    Dismissed,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 4] = [
        ComplaintStatus::Pending,
        ComplaintStatus::UnderReview,
        ComplaintStatus::Resolved,
        ComplaintStatus::Dismissed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComplaintStatus::Pending => "pending",
            ComplaintStatus::UnderReview => "under_review",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Dismissed => "dismissed",
        }
    }

    /// Still waiting on an administrator.
    pub fn is_open(self) -> bool {
        matches!(self, ComplaintStatus::Pending | ComplaintStatus::UnderReview)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ComplaintStatus::Resolved | ComplaintStatus::Dismissed)
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| format!("unknown complaint status `{value}`"))
    }
}

/// Student fields joined onto teacher and admin listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub full_name_ar: Option<String>,
    #[serde(default)]
    pub student_code: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
}

impl StudentSummary {
    pub fn name(&self) -> DisplayName {
        DisplayName {
            primary: self.full_name.clone(),
            arabic: self.full_name_ar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub description: String,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub is_priority: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: ComplaintStatus,
    #[serde(default)]
    pub admin_response: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub student: Option<StudentSummary>,
}

impl Complaint {
    /// Title for display; older records only carry a reason code.
    pub fn headline(&self) -> &str {
        self.title
            .as_deref()
            .or(self.reason.as_deref())
            .unwrap_or_default()
    }
}

/// What a student files. Both fields are trimmed and required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintDraft {
    title: String,
    description: String,
}

impl ComplaintDraft {
    pub fn new(title: &str, description: &str) -> Result<Self, crate::RecordsError> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() {
            return Err(crate::RecordsError::MissingField("title"));
        }
        if description.is_empty() {
            return Err(crate::RecordsError::MissingField("description"));
        }
        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub name_ar: Option<String>,
}

impl Subject {
    pub fn localized(&self, language: Language) -> &str {
        match language {
            Language::Arabic => self
                .name_ar
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(&self.name),
            Language::English => &self.name,
        }
    }
}

/// Kind of assessment a grade belongs to. Unknown kinds are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GradeKind {
    #[default]
    FirstMonthExam,
    SecondMonthExam,
    Quiz,
    FirstSemester,
    MidYear,
    SecondSemester,
    Finals,
    Other(String),
}

impl GradeKind {
    /// Kinds a teacher records during the term.
    pub const TERM_WORK: [GradeKind; 3] = [
        GradeKind::FirstMonthExam,
        GradeKind::SecondMonthExam,
        GradeKind::Quiz,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            GradeKind::FirstMonthExam => "fmexam",
            GradeKind::SecondMonthExam => "smexam",
            GradeKind::Quiz => "quiz",
            GradeKind::FirstSemester => "first_semester",
            GradeKind::MidYear => "mid_year",
            GradeKind::SecondSemester => "second_semester",
            GradeKind::Finals => "finals",
            GradeKind::Other(kind) => kind,
        }
    }

    pub fn is_final(&self) -> bool {
        FinalTerm::from_kind(self).is_some()
    }
}

impl From<String> for GradeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "fmexam" => GradeKind::FirstMonthExam,
            "smexam" => GradeKind::SecondMonthExam,
            "quiz" => GradeKind::Quiz,
            "first_semester" => GradeKind::FirstSemester,
            "mid_year" => GradeKind::MidYear,
            "second_semester" => GradeKind::SecondSemester,
            "finals" => GradeKind::Finals,
            _ => GradeKind::Other(value),
        }
    }
}

impl From<GradeKind> for String {
    fn from(kind: GradeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for GradeKind {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(GradeKind::from(value.trim().to_string()))
    }
}

impl fmt::Display for GradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Term whose final grades a student can view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FinalTerm {
    #[default]
    FirstSemester,
    MidYear,
    SecondSemester,
    Finals,
}

impl FinalTerm {
    pub const ALL: [FinalTerm; 4] = [
        FinalTerm::FirstSemester,
        FinalTerm::MidYear,
        FinalTerm::SecondSemester,
        FinalTerm::Finals,
    ];

    pub fn kind(self) -> GradeKind {
        match self {
            FinalTerm::FirstSemester => GradeKind::FirstSemester,
            FinalTerm::MidYear => GradeKind::MidYear,
            FinalTerm::SecondSemester => GradeKind::SecondSemester,
            FinalTerm::Finals => GradeKind::Finals,
        }
    }

    pub fn from_kind(kind: &GradeKind) -> Option<Self> {
        Self::ALL.into_iter().find(|term| &term.kind() == kind)
    }
}

impl FromStr for FinalTerm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let kind = GradeKind::from(value.trim().to_string());
        Self::from_kind(&kind).ok_or_else(|| format!("unknown final term `{value}`"))
    }
}

impl fmt::Display for FinalTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub grade: f64,
    #[serde(default = "default_max_grade", deserialize_with = "lenient::max_grade")]
    pub max_grade: f64,
    #[serde(default)]
    pub grade_type: Option<GradeKind>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub student: Option<StudentSummary>,
}

/// Final grades of one term together with their summary figures.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalGrades {
    pub term: FinalTerm,
    pub grades: Vec<Grade>,
}

impl FinalGrades {
    /// Arithmetic mean of every grade, two decimals, `"0"` when empty.
    pub fn average(&self) -> String {
        if self.grades.is_empty() {
            return "0".to_string();
        }
        let total: f64 = self.grades.iter().map(|grade| grade.grade).sum();
        format!("{:.2}", total / self.grades.len() as f64)
    }

    /// Sum of obtained and maximum marks for one subject.
    pub fn subject_total(&self, subject_id: &str) -> (f64, f64) {
        self.grades
            .iter()
            .filter(|grade| grade.subject_id.as_deref() == Some(subject_id))
            .fold((0.0, 0.0), |(total, max), grade| {
                (total + grade.grade, max + grade.max_grade)
            })
    }
}

/// Editable columns of a single grade row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeEdit {
    #[serde(deserialize_with = "lenient::number")]
    pub grade: f64,
    #[serde(default = "default_max_grade", deserialize_with = "lenient::max_grade")]
    pub max_grade: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One row of the grade-entry sheet as typed by the teacher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeEntry {
    pub student_id: String,
    pub grade: String,
    pub notes: String,
}

/// A grade-entry submission for one subject and assessment kind.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeBatch {
    pub subject_id: String,
    pub kind: GradeKind,
    pub max_grade: f64,
    pub entries: Vec<GradeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewGrade {
    pub student_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    pub grade: f64,
    pub max_grade: f64,
    pub notes: Option<String>,
    pub grade_type: GradeKind,
}

impl GradeBatch {
    /// Rows to insert. Entries with a blank grade are skipped; a subject and
    /// at least one filled entry are required.
    pub fn rows(&self, teacher_id: &str) -> Result<Vec<NewGrade>, crate::RecordsError> {
        if self.subject_id.trim().is_empty() {
            return Err(crate::RecordsError::MissingField("subject"));
        }

        let rows = self
            .entries
            .iter()
            .filter(|entry| !entry.grade.trim().is_empty())
            .map(|entry| {
                let grade = entry
                    .grade
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| crate::RecordsError::InvalidGrade(entry.grade.clone()))?;
                let notes = entry.notes.trim();
                Ok(NewGrade {
                    student_id: entry.student_id.clone(),
                    subject_id: self.subject_id.trim().to_string(),
                    teacher_id: teacher_id.to_string(),
                    grade,
                    max_grade: self.max_grade,
                    notes: (!notes.is_empty()).then(|| notes.to_string()),
                    grade_type: self.kind.clone(),
                })
            })
            .collect::<Result<Vec<_>, crate::RecordsError>>()?;

        if rows.is_empty() {
            return Err(crate::RecordsError::NoGrades);
        }
        Ok(rows)
    }
}

/// Counters on the administration dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_complaints: usize,
    pub pending_complaints: usize,
    pub priority_complaints: usize,
    pub total_students: usize,
    pub total_teachers: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplaintFlags {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub is_priority: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: ComplaintStatus,
}

impl DashboardStats {
    /// Pending counts open complaints. Priority counts flagged complaints
    /// that are not yet resolved or dismissed.
    pub fn tally(complaints: &[ComplaintFlags], students: usize, teachers: usize) -> Self {
        Self {
            total_complaints: complaints.len(),
            pending_complaints: complaints.iter().filter(|c| c.status.is_open()).count(),
            priority_complaints: complaints
                .iter()
                .filter(|c| c.is_priority && !c.status.is_closed())
                .count(),
            total_students: students,
            total_teachers: teachers,
        }
    }
}
