//! Identities, role profiles and sessions.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::language::Language;

/// Role assigned to a profile by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat profile row as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub role: Role,
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

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProfileError {
    #[error("student profile {0} has no student code")]
    MissingStudentCode(String),
}

/// Name shown in the UI, with an optional Arabic variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName {
    pub primary: String,
    pub arabic: Option<String>,
}

impl DisplayName {
    /// Arabic falls back to the primary name when no variant was recorded.
    pub fn localized(&self, language: Language) -> &str {
        match language {
            Language::Arabic => self
                .arabic
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(&self.primary),
            Language::English => &self.primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub id: String,
    pub user_id: Option<String>,
    pub name: DisplayName,
    pub student_code: String,
    pub grade_level: Option<String>,
    pub division: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffProfile {
    pub id: String,
    pub user_id: Option<String>,
    pub name: DisplayName,
}

/// A profile narrowed to its role. Role-specific attributes only exist on the
/// variant that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRecord", into = "ProfileRecord")]
pub enum Profile {
    Student(StudentProfile),
    Teacher(StaffProfile),
    Admin(StaffProfile),
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Profile::Student(_) => Role::Student,
            Profile::Teacher(_) => Role::Teacher,
            Profile::Admin(_) => Role::Admin,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Profile::Student(student) => &student.id,
            Profile::Teacher(staff) | Profile::Admin(staff) => &staff.id,
        }
    }

    pub fn name(&self) -> &DisplayName {
        match self {
            Profile::Student(student) => &student.name,
            Profile::Teacher(staff) | Profile::Admin(staff) => &staff.name,
        }
    }

    pub fn into_student(self) -> Option<StudentProfile> {
        match self {
            Profile::Student(student) => Some(student),
            _ => None,
        }
    }
}

impl TryFrom<ProfileRecord> for Profile {
    type Error = ProfileError;

    fn try_from(record: ProfileRecord) -> Result<Self, Self::Error> {
        let name = DisplayName {
            primary: record.full_name,
            arabic: record.full_name_ar,
        };

        match record.role {
            Role::Student => {
                let student_code = record
                    .student_code
                    .filter(|code| !code.trim().is_empty())
                    .ok_or_else(|| ProfileError::MissingStudentCode(record.id.clone()))?;
                Ok(Profile::Student(StudentProfile {
                    id: record.id,
                    user_id: record.user_id,
                    name,
                    student_code,
                    grade_level: record.grade_level,
                    division: record.division,
                }))
            }
            Role::Teacher => Ok(Profile::Teacher(StaffProfile {
                id: record.id,
                user_id: record.user_id,
                name,
            })),
            Role::Admin => Ok(Profile::Admin(StaffProfile {
                id: record.id,
                user_id: record.user_id,
                name,
            })),
        }
    }
}

impl From<Profile> for ProfileRecord {
    fn from(profile: Profile) -> Self {
        let role = profile.role();
        match profile {
            Profile::Student(student) => ProfileRecord {
                id: student.id,
                user_id: student.user_id,
                role,
                full_name: student.name.primary,
                full_name_ar: student.name.arabic,
                student_code: Some(student.student_code),
                grade_level: student.grade_level,
                division: student.division,
            },
            Profile::Teacher(staff) | Profile::Admin(staff) => ProfileRecord {
                id: staff.id,
                user_id: staff.user_id,
                role,
                full_name: staff.name.primary,
                full_name_ar: staff.name.arabic,
                student_code: None,
                grade_level: None,
                division: None,
            },
        }
    }
}

/// Authenticated-user handle issued by the hosted identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn bearer(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffSession {
    pub identity: Identity,
    pub token: AccessToken,
    /// Profile snapshot taken when the session was last authorized.
    #[serde(default)]
    pub profile: Option<Profile>,
}

/// The current authenticated context. Students have no backing identity; their
/// session is the cached profile itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Staff(StaffSession),
    Student(StudentProfile),
}

impl Session {
    pub fn profile(&self) -> Option<Profile> {
        match self {
            Session::Staff(staff) => staff.profile.clone(),
            Session::Student(student) => Some(Profile::Student(student.clone())),
        }
    }
}

/// Student PIN kept for re-proving possession before sensitive calls.
#[derive(Clone, PartialEq, Eq)]
pub struct StudentPin(String);

impl StudentPin {
    /// Returns `None` for blank input so an empty PIN never reaches the wire.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Base64 form expected by the complaint functions.
    pub fn encoded(&self) -> String {
        STANDARD.encode(self.0.as_bytes())
    }
}

impl fmt::Debug for StudentPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StudentPin(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn student_json() -> serde_json::Value {
        json!({
            "id": "p-1",
            "user_id": null,
            "role": "student",
            "full_name": "Sara Ali",
            "full_name_ar": "سارة علي",
            "student_code": "S-100",
            "grade_level": "10",
            "division": "B",
            "student_pin": "ignored"
        })
    }

    #[test]
    fn decodes_student_record_into_student_variant() {
        let profile: Profile = serde_json::from_value(student_json()).unwrap();
        assert_eq!(profile.role(), Role::Student);
        let student = profile.into_student().expect("student variant");
        assert_eq!(student.student_code, "S-100");
        assert_eq!(student.division.as_deref(), Some("B"));
    }

    #[test]
    fn student_without_code_is_rejected() {
        let mut value = student_json();
        value["student_code"] = serde_json::Value::Null;
        let result = serde_json::from_value::<Profile>(value);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let mut value = student_json();
        value["role"] = json!("janitor");
        assert!(serde_json::from_value::<Profile>(value).is_err());
    }

    #[test]
    fn staff_profile_round_trips_through_flat_record() {
        let profile = Profile::Admin(StaffProfile {
            id: "a-1".into(),
            user_id: Some("u-1".into()),
            name: DisplayName {
                primary: "Head Office".into(),
                arabic: None,
            },
        });
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["role"], "admin");
        assert!(value["student_code"].is_null());
        let back: Profile = serde_json::from_value(value).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn arabic_name_falls_back_to_primary() {
        let name = DisplayName {
            primary: "Omar".into(),
            arabic: Some("  ".into()),
        };
        assert_eq!(name.localized(Language::Arabic), "Omar");
        let name = DisplayName {
            primary: "Omar".into(),
            arabic: Some("عمر".into()),
        };
        assert_eq!(name.localized(Language::Arabic), "عمر");
        assert_eq!(name.localized(Language::English), "Omar");
    }

    #[test]
    fn pin_is_trimmed_encoded_and_redacted() {
        assert!(StudentPin::new("   ").is_none());
        let pin = StudentPin::new(" 1234 ").unwrap();
        assert_eq!(pin.expose(), "1234");
        assert_eq!(pin.encoded(), "MTIzNA==");
        assert!(!format!("{pin:?}").contains("1234"));
    }

    #[test]
    fn access_token_debug_hides_secret() {
        let token = AccessToken {
            access_token: "secret-jwt".into(),
            refresh_token: Some("refresh".into()),
            expires_at: None,
        };
        assert!(!format!("{token:?}").contains("secret-jwt"));
    }
}
