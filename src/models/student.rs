//! Student model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Holiday, Parent};

/// Student entity.
///
/// Students are never removed; `status == false` marks a soft-deleted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Active flag
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Create a new active student. The password must already be hashed.
    pub fn new(first_name: String, last_name: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            first_name,
            last_name,
            email,
            password_hash,
            status: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status
    }
}

/// A subject as seen from a student's enrollment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSubject {
    pub subject_id: i64,
    pub name: String,
    pub marks: i64,
}

/// Student with enrolled subjects and marks
#[derive(Debug, Clone, Serialize)]
pub struct StudentWithSubjects {
    #[serde(flatten)]
    pub student: Student,
    pub subjects: Vec<StudentSubject>,
}

/// Student with the holidays assigned to them
#[derive(Debug, Clone, Serialize)]
pub struct StudentWithHolidays {
    #[serde(flatten)]
    pub student: Student,
    pub holidays: Vec<Holiday>,
}

/// Student with the parent they are linked to
#[derive(Debug, Clone, Serialize)]
pub struct StudentWithParent {
    #[serde(flatten)]
    pub student: Student,
    pub parent: Parent,
}
