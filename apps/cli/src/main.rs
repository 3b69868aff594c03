mod prompt;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use portal_auth::{AuthError, PlaceholderVerifier, StaffContext, StudentContext, ViewAccess};
use portal_config::load as load_config;
use portal_records::{
    AdminPortal, ComplaintDraft, ComplaintStatus, FinalTerm, GradeBatch, GradeEntry, GradeKind,
    ReviewDecision, StudentPortal, SuggestionFilter, TeacherPortal, DEFAULT_MAX_GRADE,
};
use portal_runtime::{shutdown_signal, telemetry, PortalServices};
use portal_session::{Language, Role, Session};
use tracing::info;

use crate::prompt::Terminal;

const CODE_ATTEMPTS: usize = 3;

#[derive(Parser)]
#[command(name = "school-portal")]
#[command(about = "Student, teacher and administration portal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a student code; the PIN is read from stdin
    StudentLogin {
        #[arg(long)]
        code: String,
    },
    /// Sign in as staff; password and authenticator code are read from stdin
    StaffLogin {
        #[arg(long)]
        email: String,
    },
    /// Show the signed-in profile
    Whoami,
    /// Sign out and clear local session state
    Logout,
    /// Show or change the interface language
    Language { language: Option<Language> },
    /// List subjects
    Subjects,
    /// Grades for one subject
    Grades {
        #[arg(long)]
        subject: String,
    },
    /// Final grades of a term with their average
    FinalGrades {
        #[arg(long, default_value = "first_semester")]
        term: FinalTerm,
    },
    /// Complaint history (asks for the PIN when none is cached)
    Complaints,
    /// File a complaint (asks for the PIN when none is cached)
    Complain {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
    },
    /// Divisions assigned to the signed-in teacher
    TeacherDivisions {
        #[arg(long)]
        grade_level: String,
    },
    /// Subjects the signed-in teacher may grade
    TeacherSubjects {
        #[arg(long)]
        grade_level: String,
        #[arg(long, default_value = "fmexam")]
        kind: GradeKind,
    },
    /// Students of one division
    TeacherStudents {
        #[arg(long)]
        grade_level: String,
        #[arg(long)]
        division: String,
    },
    /// Grades recorded for one division
    TeacherGrades {
        #[arg(long)]
        grade_level: String,
        #[arg(long)]
        division: String,
        #[arg(long)]
        kind: Option<GradeKind>,
    },
    /// Record grades, one `--entry STUDENT=GRADE[:NOTES]` per student
    AddGrades {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "fmexam")]
        kind: GradeKind,
        #[arg(long, default_value_t = DEFAULT_MAX_GRADE)]
        max_grade: f64,
        #[arg(long = "entry", value_parser = parse_entry)]
        entries: Vec<GradeEntry>,
    },
    /// Delete grades by id
    DeleteGrades {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Change one grade; omitted fields keep their current value
    EditGrade {
        id: String,
        #[arg(long)]
        grade: Option<f64>,
        #[arg(long)]
        max_grade: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Page through submitted complaints
    Suggestions {
        #[arg(long, default_value = "all")]
        filter: SuggestionFilter,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },
    /// Record a decision on a complaint
    Review {
        id: String,
        #[arg(long)]
        status: ComplaintStatus,
        #[arg(long)]
        response: Option<String>,
    },
    /// Administration dashboard counters
    Stats,
}

fn parse_entry(raw: &str) -> Result<GradeEntry, String> {
    let (student_id, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected STUDENT=GRADE[:NOTES], got `{raw}`"))?;
    let (grade, notes) = rest.split_once(':').unwrap_or((rest, ""));
    if student_id.trim().is_empty() {
        return Err(format!("missing student id in `{raw}`"));
    }
    Ok(GradeEntry {
        student_id: student_id.trim().to_string(),
        grade: grade.to_string(),
        notes: notes.to_string(),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands) -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    let services =
        PortalServices::initialise(&config).context("failed to initialise portal services")?;
    let terminal = Terminal::new();

    tokio::select! {
        result = run(command, &services, &terminal) => result,
        _ = shutdown_signal() => Err(anyhow!("interrupted")),
    }
}

async fn run(command: Commands, services: &PortalServices, terminal: &Terminal) -> anyhow::Result<()> {
    let language = services.store.language();

    match command {
        Commands::StudentLogin { code } => {
            let pin = terminal.require("PIN").await?;
            let profile = services.authenticator.sign_in_student(&code, &pin).await?;
            println!(
                "{} {}",
                "signed in as".green(),
                profile.name.localized(language).bold()
            );
        }
        Commands::StaffLogin { email } => staff_login(services, terminal, &email).await?,
        Commands::Whoami => match services.store.read()? {
            None => println!("signed out"),
            Some(Session::Student(student)) => println!(
                "{} ({}) student {}",
                student.name.localized(language),
                student.student_code,
                student.division.as_deref().unwrap_or("-")
            ),
            Some(Session::Staff(staff)) => match staff.profile {
                Some(profile) => println!(
                    "{} {}",
                    profile.name().localized(language),
                    profile.role()
                ),
                None => println!(
                    "{} (profile not resolved)",
                    staff.identity.email.as_deref().unwrap_or(&staff.identity.id)
                ),
            },
        },
        Commands::Logout => {
            services.authenticator.sign_out().await?;
            println!("signed out");
        }
        Commands::Language { language: None } => {
            println!("{language} ({})", language.direction().as_str());
        }
        Commands::Language { language: Some(next) } => {
            services.store.set_language(next)?;
            println!("{next} ({})", next.direction().as_str());
        }
        Commands::Subjects => {
            let portal = student_portal(services).await?;
            for subject in portal.subjects().await? {
                println!("{:<24} {}", subject.id, subject.localized(language));
            }
        }
        Commands::Grades { subject } => {
            let portal = student_portal(services).await?;
            let grades = portal.grades(&subject).await?;
            if grades.is_empty() {
                println!("no grades recorded");
            }
            for grade in grades {
                println!(
                    "{:<16} {:>6}/{:<6} {}",
                    grade.grade_type.as_ref().map(GradeKind::as_str).unwrap_or("-"),
                    grade.grade,
                    grade.max_grade,
                    grade.notes.as_deref().unwrap_or("")
                );
            }
        }
        Commands::FinalGrades { term } => {
            let portal = student_portal(services).await?;
            let finals = portal.final_grades(term).await?;
            for grade in &finals.grades {
                println!(
                    "{:<24} {:>6}/{}",
                    grade.subject_id.as_deref().unwrap_or("-"),
                    grade.grade,
                    grade.max_grade
                );
            }
            println!("{} {}", "average".bold(), finals.average());
        }
        Commands::Complaints => {
            let portal = student_portal(services).await?;
            let complaints = portal.complaints(terminal).await?;
            if complaints.is_empty() {
                println!("no complaints filed");
            }
            for complaint in complaints {
                println!(
                    "{:<12} {:<14} {}",
                    complaint
                        .created_at
                        .map(|at| at.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                    complaint.status,
                    complaint.headline()
                );
                if let Some(response) = complaint.admin_response.as_deref() {
                    println!("{:<12} {}", "", response.dimmed());
                }
            }
        }
        Commands::Complain { title, description } => {
            let draft = ComplaintDraft::new(&title, &description)?;
            let portal = student_portal(services).await?;
            portal.submit_complaint(&draft, terminal).await?;
            println!("{}", "complaint submitted".green());
        }
        Commands::TeacherDivisions { grade_level } => {
            let portal = teacher_portal(services).await?;
            for division in portal.divisions(&grade_level).await? {
                println!("{division}");
            }
        }
        Commands::TeacherSubjects { grade_level, kind } => {
            let portal = teacher_portal(services).await?;
            for subject in portal.subjects(&kind, &grade_level).await? {
                println!("{:<24} {}", subject.id, subject.localized(language));
            }
        }
        Commands::TeacherStudents {
            grade_level,
            division,
        } => {
            let portal = teacher_portal(services).await?;
            for student in portal.students(&grade_level, &division).await? {
                println!(
                    "{:<24} {}",
                    student.id.as_deref().unwrap_or("-"),
                    student.name().localized(language)
                );
            }
        }
        Commands::TeacherGrades {
            grade_level,
            division,
            kind,
        } => {
            let portal = teacher_portal(services).await?;
            for grade in portal.grades(&grade_level, &division, kind.as_ref()).await? {
                let student = grade
                    .student
                    .as_ref()
                    .map(|student| student.name().localized(language).to_string())
                    .unwrap_or_default();
                println!(
                    "{:<24} {:<24} {:>6}/{:<6} {}",
                    grade.id,
                    student,
                    grade.grade,
                    grade.max_grade,
                    grade.grade_type.as_ref().map(GradeKind::as_str).unwrap_or("-")
                );
            }
        }
        Commands::AddGrades {
            subject,
            kind,
            max_grade,
            entries,
        } => {
            let portal = teacher_portal(services).await?;
            let batch = GradeBatch {
                subject_id: subject,
                kind,
                max_grade,
                entries,
            };
            let recorded = portal.add_grades(&batch).await?;
            println!("{} {recorded} grades", "recorded".green());
        }
        Commands::DeleteGrades { ids } => {
            let portal = teacher_portal(services).await?;
            portal.delete_grades(&ids).await?;
            println!("deleted {} grades", ids.len());
        }
        Commands::EditGrade {
            id,
            grade,
            max_grade,
            notes,
        } => {
            let portal = teacher_portal(services).await?;
            let mut edit = portal.grade(&id).await?;
            if let Some(grade) = grade {
                edit.grade = grade;
            }
            if let Some(max_grade) = max_grade {
                edit.max_grade = max_grade;
            }
            if let Some(notes) = notes {
                edit.notes = Some(notes).filter(|notes| !notes.trim().is_empty());
            }
            portal.update_grade(&id, &edit).await?;
            println!("grade {id} is now {}/{}", edit.grade, edit.max_grade);
        }
        Commands::Suggestions { filter, page } => {
            let portal = admin_portal(services).await?;
            let complaints = portal.suggestions(page, filter).await?;
            if complaints.is_empty() {
                println!("no complaints on page {page}");
            }
            for complaint in complaints {
                let marker = if complaint.is_priority { "!" } else { " " };
                let student = complaint
                    .student
                    .as_ref()
                    .map(|student| student.name().localized(language).to_string())
                    .unwrap_or_default();
                println!(
                    "{} {:<24} {:<14} {:<24} {}",
                    marker.red().bold(),
                    complaint.id,
                    complaint.status,
                    student,
                    complaint.headline()
                );
            }
        }
        Commands::Review {
            id,
            status,
            response,
        } => {
            let portal = admin_portal(services).await?;
            portal
                .review(&id, &ReviewDecision { status, response })
                .await?;
            println!("complaint {id} marked {status}");
        }
        Commands::Stats => {
            let portal = admin_portal(services).await?;
            let stats = portal.stats().await?;
            println!("complaints          {}", stats.total_complaints);
            println!("pending             {}", stats.pending_complaints);
            println!("priority            {}", stats.priority_complaints);
            println!("students            {}", stats.total_students);
            println!("teachers            {}", stats.total_teachers);
        }
    }

    Ok(())
}

async fn staff_login(services: &PortalServices, terminal: &Terminal, email: &str) -> anyhow::Result<()> {
    let mut gate = services
        .authenticator
        .second_factor(Arc::new(PlaceholderVerifier));

    let password = terminal.secret("Password").await?;
    gate.submit_credentials(email, &password).await?;

    for _ in 0..CODE_ATTEMPTS {
        let Some(code) = terminal.ask("Authenticator code").await? else {
            break;
        };
        match gate.verify(&code).await {
            Ok(session) => {
                let name = session
                    .profile
                    .as_ref()
                    .map(|profile| profile.name().localized(services.store.language()).to_string())
                    .unwrap_or_else(|| email.to_string());
                info!(identity = %session.identity.id, "staff sign-in complete");
                println!("{} {}", "signed in as".green(), name.bold());
                return Ok(());
            }
            Err(error @ (AuthError::MalformedSecondFactor | AuthError::InvalidSecondFactor)) => {
                eprintln!("{} {error}", "warning:".yellow());
            }
            Err(error) => return Err(error.into()),
        }
    }

    gate.back();
    bail!("sign-in abandoned before the second factor was verified")
}

async fn student_portal(services: &PortalServices) -> anyhow::Result<StudentPortal> {
    let context = student_context(services).await?;
    Ok(StudentPortal::new(
        services.backend.clone(),
        services.store.clone(),
        context,
    ))
}

async fn teacher_portal(services: &PortalServices) -> anyhow::Result<TeacherPortal> {
    let context = staff_context(services, Role::Teacher).await?;
    Ok(TeacherPortal::new(services.backend.clone(), context)?)
}

async fn admin_portal(services: &PortalServices) -> anyhow::Result<AdminPortal> {
    let context = staff_context(services, Role::Admin).await?;
    Ok(AdminPortal::new(services.backend.clone(), context)?)
}

async fn student_context(services: &PortalServices) -> anyhow::Result<StudentContext> {
    match services.authenticator.guard().enter(Role::Student).await? {
        ViewAccess::Student(context) => Ok(context),
        access => Err(denied(&access)),
    }
}

async fn staff_context(services: &PortalServices, role: Role) -> anyhow::Result<StaffContext> {
    match services.authenticator.guard().enter(role).await? {
        ViewAccess::Staff(context) => Ok(context),
        access => Err(denied(&access)),
    }
}

fn denied(access: &ViewAccess) -> anyhow::Error {
    match access.redirect() {
        Some(redirect) => anyhow!(
            "not signed in as {}; redirected to {}",
            redirect.role(),
            redirect.path()
        ),
        None => anyhow!("this view is not available for the current session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_argument_splits_grade_and_notes() {
        let entry = parse_entry("stu-1=17.5:late submission").unwrap();
        assert_eq!(entry.student_id, "stu-1");
        assert_eq!(entry.grade, "17.5");
        assert_eq!(entry.notes, "late submission");

        let bare = parse_entry("stu-2=12").unwrap();
        assert_eq!(bare.notes, "");
        assert!(parse_entry("12").is_err());
        assert!(parse_entry(" =12").is_err());
    }

    #[test]
    fn command_line_parses_portal_arguments() {
        let cli = Cli::try_parse_from([
            "school-portal",
            "final-grades",
            "--term",
            "mid_year",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::FinalGrades { term: FinalTerm::MidYear }));

        let cli = Cli::try_parse_from([
            "school-portal",
            "suggestions",
            "--filter",
            "Priority",
            "--page",
            "2",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Suggestions {
                filter: SuggestionFilter::Priority,
                page: 2
            }
        ));

        assert!(Cli::try_parse_from(["school-portal", "language", "fr"]).is_err());
        assert!(Cli::try_parse_from(["school-portal", "delete-grades"]).is_err());
    }
}
