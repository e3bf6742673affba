//! Parent model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Student;

/// Parent (guardian) entity. A parent links to at most one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parent {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Parent {
    /// Create a new parent. The password must already be hashed.
    pub fn new(first_name: String, last_name: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            first_name,
            last_name,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Parent with the linked student, if any
#[derive(Debug, Clone, Serialize)]
pub struct ParentWithStudent {
    #[serde(flatten)]
    pub parent: Parent,
    pub student: Option<Student>,
}
