//! # Portal Records Crate
//!
//! Per-role views over grades and complaints. Each portal is built from the
//! authorized context returned by [`portal_auth::ViewGuard`], so a view's role
//! check always completes before any privileged call is issued.
//!
//! - **Student**: grades, final grades with their average, complaint history
//!   and submission (PIN re-proof through [`PinGate`])
//! - **Teacher**: assigned divisions and subjects, grade entry, listing,
//!   deletion and single-grade edits
//! - **Admin**: paged complaint review and dashboard counters

pub mod admin;
pub mod error;
pub mod model;
pub mod pin;
pub mod student;
pub mod teacher;

pub use admin::{AdminPortal, ReviewDecision, SuggestionFilter, PAGE_SIZE};
pub use error::{RecordsError, RecordsResult};
pub use model::{
    Complaint, ComplaintDraft, ComplaintStatus, DashboardStats, FinalGrades, FinalTerm, Grade,
    GradeBatch, GradeEdit, GradeEntry, GradeKind, StudentSummary, Subject, DEFAULT_MAX_GRADE,
};
pub use pin::{PinGate, PinPrompt};
pub use student::StudentPortal;
pub use teacher::TeacherPortal;
