//! Parent service
//!
//! Parents register, sign in and link themselves to a single student.

use crate::db::is_unique_violation;
use crate::db::repositories::{ParentChanges, ParentRepository, StudentRepository};
use crate::models::{Parent, ParentWithStudent};
use crate::services::password::{hash_password, verify_password};
use crate::services::token::{TokenError, TokenIssuer};
use crate::services::validation;
use anyhow::Context;
use std::sync::Arc;

/// Error types for parent service operations
#[derive(Debug, thiserror::Error)]
pub enum ParentServiceError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    /// The authenticated parent no longer exists
    #[error("Parent not found. Sign in again!")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<Vec<String>> for ParentServiceError {
    fn from(errors: Vec<String>) -> Self {
        Self::Validation(errors)
    }
}

type Result<T> = std::result::Result<T, ParentServiceError>;

#[derive(Debug, Clone)]
pub struct RegisterParentInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateParentInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

pub struct ParentService {
    parents: Arc<dyn ParentRepository>,
    students: Arc<dyn StudentRepository>,
    issuer: Arc<TokenIssuer>,
}

impl ParentService {
    pub fn new(
        parents: Arc<dyn ParentRepository>,
        students: Arc<dyn StudentRepository>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            parents,
            students,
            issuer,
        }
    }

    pub async fn register(&self, input: RegisterParentInput) -> Result<Parent> {
        validation::validate_registration(
            &input.first_name,
            &input.last_name,
            &input.email,
            &input.password,
        )?;

        let email = input.email.trim().to_string();
        if self.parents.get_by_email(&email).await?.is_some() {
            return Err(ParentServiceError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let new_parent = Parent::new(
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            email,
            password_hash,
        );
        let parent = match self.parents.create(&new_parent).await {
            Ok(parent) => parent,
            Err(e) if is_unique_violation(&e) => {
                return Err(ParentServiceError::Conflict(format!(
                    "Email '{}' is already registered",
                    new_parent.email
                )))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(parent_id = parent.id, "Registered parent");
        Ok(parent)
    }

    /// Check credentials and issue a session token.
    ///
    /// Any credential failure is a plain bad request.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        validation::validate_login(email, password)?;

        let parent = match self.parents.get_by_email(email.trim()).await? {
            Some(p) => p,
            None => {
                tracing::warn!("Parent login with unknown email");
                return Err(invalid_credential());
            }
        };
        if !verify_password(password, &parent.password_hash)? {
            tracing::warn!(parent_id = parent.id, "Parent login with wrong password");
            return Err(invalid_credential());
        }

        Ok(self.issuer.issue(parent.id)?)
    }

    /// Link the parent to an active student. Both sides may have one link only.
    pub async fn link_student(&self, parent_id: i64, student_id: i64) -> Result<ParentWithStudent> {
        let parent = self
            .parents
            .get_by_id(parent_id)
            .await?
            .ok_or(ParentServiceError::Unauthorized)?;

        let student = match self.students.get_by_id(student_id).await? {
            Some(s) if s.is_active() => s,
            _ => return Err(ParentServiceError::NotFound("Student not found".to_string())),
        };

        if self.parents.has_link(parent.id, student.id).await? {
            return Err(ParentServiceError::Conflict(
                "Parent or student is already linked".to_string(),
            ));
        }

        self.parents.link(parent.id, student.id).await?;
        tracing::info!(parent_id = parent.id, student_id = student.id, "Linked parent to student");
        Ok(ParentWithStudent {
            parent,
            student: Some(student),
        })
    }

    /// The parent with the linked student, if any.
    pub async fn details(&self, parent_id: i64) -> Result<ParentWithStudent> {
        let parent = self
            .parents
            .get_by_id(parent_id)
            .await?
            .ok_or(ParentServiceError::Unauthorized)?;
        let student = self.parents.linked_student(parent.id).await?;
        Ok(ParentWithStudent { parent, student })
    }

    pub async fn update(&self, parent_id: i64, input: UpdateParentInput) -> Result<Parent> {
        validation::validate_profile_changes(
            input.first_name.as_deref(),
            input.last_name.as_deref(),
            input.email.as_deref(),
        )?;

        let parent = self
            .parents
            .get_by_id(parent_id)
            .await?
            .ok_or(ParentServiceError::Unauthorized)?;

        let changes = ParentChanges {
            first_name: input.first_name.map(|v| v.trim().to_string()),
            last_name: input.last_name.map(|v| v.trim().to_string()),
            email: input.email.map(|v| v.trim().to_string()),
        };

        let unchanged = changes.first_name.as_ref() == Some(&parent.first_name)
            || changes.last_name.as_ref() == Some(&parent.last_name)
            || changes.email.as_ref() == Some(&parent.email);
        if unchanged {
            return Err(ParentServiceError::BadRequest(
                "Given data is already present".to_string(),
            ));
        }

        if let Some(ref email) = changes.email {
            if self.parents.get_by_email(email).await?.is_some() {
                return Err(ParentServiceError::BadRequest(
                    "Email is already taken".to_string(),
                ));
            }
        }

        Ok(self.parents.update(parent.id, &changes).await?)
    }
}

fn invalid_credential() -> ParentServiceError {
    ParentServiceError::BadRequest("Invalid credential".to_string())
}
