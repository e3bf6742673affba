//! Student service
//!
//! Registration, login and profile management for students, plus their
//! subject enrollments and marks.

use crate::db::is_unique_violation;
use crate::db::repositories::{StudentChanges, StudentRepository, SubjectRepository};
use crate::models::{Student, StudentWithParent, StudentWithSubjects};
use crate::services::password::{hash_password, verify_password};
use crate::services::token::{TokenError, TokenIssuer};
use crate::services::validation;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 5;

/// Error types for student service operations
#[derive(Debug, thiserror::Error)]
pub enum StudentServiceError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<Vec<String>> for StudentServiceError {
    fn from(errors: Vec<String>) -> Self {
        Self::Validation(errors)
    }
}

type Result<T> = std::result::Result<T, StudentServiceError>;

fn email_taken(email: &str) -> StudentServiceError {
    StudentServiceError::Conflict(format!("Email '{}' is already registered", email))
}

/// Input for student registration
#[derive(Debug, Clone)]
pub struct RegisterStudentInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub subject_names: Vec<String>,
}

/// Profile changes for the student identified by `email`
#[derive(Debug, Clone, Default)]
pub struct UpdateStudentInput {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub new_email: Option<String>,
}

/// One page of active students
#[derive(Debug, Clone, Serialize)]
pub struct StudentPage {
    pub students: Vec<StudentWithSubjects>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total_students: i64,
}

pub struct StudentService {
    students: Arc<dyn StudentRepository>,
    subjects: Arc<dyn SubjectRepository>,
    issuer: Arc<TokenIssuer>,
}

impl StudentService {
    pub fn new(
        students: Arc<dyn StudentRepository>,
        subjects: Arc<dyn SubjectRepository>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            students,
            subjects,
            issuer,
        }
    }

    /// Register a student and enroll them in each named subject with zero marks.
    pub async fn register(&self, input: RegisterStudentInput) -> Result<StudentWithSubjects> {
        let registration = validation::validate_registration(
            &input.first_name,
            &input.last_name,
            &input.email,
            &input.password,
        );
        let subjects = validation::validate_subject_names(&input.subject_names);
        let subject_names = match (registration, subjects) {
            (Ok(()), Ok(names)) => names,
            (r, s) => {
                let mut errors = r.err().unwrap_or_default();
                errors.extend(s.err().unwrap_or_default());
                return Err(StudentServiceError::Validation(errors));
            }
        };

        let email = input.email.trim().to_string();
        if self.students.get_by_email(&email).await?.is_some() {
            return Err(email_taken(&email));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let new_student = Student::new(
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            email,
            password_hash,
        );
        // A concurrent registration can still claim the email after the check
        let student = match self
            .students
            .create_with_subjects(&new_student, &subject_names)
            .await
        {
            Ok(student) => student,
            Err(e) if is_unique_violation(&e) => return Err(email_taken(&new_student.email)),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(student_id = student.id, "Registered student");
        self.with_subjects(student).await
    }

    /// Check credentials and issue a session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        validation::validate_login(email, password)?;

        let student = match self.students.get_by_email(email.trim()).await? {
            Some(s) if s.is_active() => s,
            _ => {
                tracing::warn!("Student login with unknown or inactive email");
                return Err(StudentServiceError::InvalidCredentials);
            }
        };

        if !verify_password(password, &student.password_hash)? {
            tracing::warn!(student_id = student.id, "Student login with wrong password");
            return Err(StudentServiceError::InvalidCredentials);
        }

        Ok(self.issuer.issue(student.id)?)
    }

    /// Page through active students with their subjects.
    pub async fn list(&self, page: Option<i64>, limit: Option<i64>) -> Result<StudentPage> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut errors = Vec::new();
        if page < 1 {
            errors.push("page must be at least 1".to_string());
        }
        if limit < 1 {
            errors.push("limit must be at least 1".to_string());
        }
        if !errors.is_empty() {
            return Err(StudentServiceError::Validation(errors));
        }

        let total_students = self.students.count_active().await?;
        let offset = (page - 1).saturating_mul(limit);
        let page_students = self.students.list_active(offset, limit).await?;

        let mut students = Vec::with_capacity(page_students.len());
        for student in page_students {
            students.push(self.with_subjects(student).await?);
        }

        Ok(StudentPage {
            students,
            current_page: page,
            total_pages: (total_students + limit - 1) / limit,
            total_students,
        })
    }

    /// An active student with subjects and marks.
    pub async fn details(&self, email: &str) -> Result<StudentWithSubjects> {
        validation::validate_email(email)?;
        let student = self.active_by_email(email).await?;
        self.with_subjects(student).await
    }

    pub async fn update(&self, input: UpdateStudentInput) -> Result<StudentWithSubjects> {
        validation::validate_email(&input.email)?;
        validation::validate_profile_changes(
            input.first_name.as_deref(),
            input.last_name.as_deref(),
            input.new_email.as_deref(),
        )?;

        let student = self.active_by_email(&input.email).await?;

        let new_email = input.new_email.map(|e| e.trim().to_string());
        if let Some(ref new_email) = new_email {
            if *new_email == student.email {
                return Err(StudentServiceError::BadRequest(
                    "New email must differ from the current email".to_string(),
                ));
            }
            if self.students.get_by_email(new_email).await?.is_some() {
                return Err(email_taken(new_email));
            }
        }

        let changes = StudentChanges {
            first_name: input.first_name.map(|v| v.trim().to_string()),
            last_name: input.last_name.map(|v| v.trim().to_string()),
            email: new_email,
        };
        let updated = match self.students.update(student.id, &changes).await {
            Ok(updated) => updated,
            Err(e) if is_unique_violation(&e) => {
                return Err(email_taken(changes.email.as_deref().unwrap_or_default()))
            }
            Err(e) => return Err(e.into()),
        };
        self.with_subjects(updated).await
    }

    /// Mark the student inactive.
    pub async fn soft_delete(&self, email: &str) -> Result<()> {
        validation::validate_email(email)?;
        let student = self
            .students
            .get_by_email(email.trim())
            .await?
            .ok_or_else(|| StudentServiceError::NotFound("Student not found".to_string()))?;

        self.students.set_status(student.id, false).await?;
        tracing::info!(student_id = student.id, "Deactivated student");
        Ok(())
    }

    pub async fn update_marks(
        &self,
        email: &str,
        subject_id: i64,
        marks: i64,
    ) -> Result<StudentWithSubjects> {
        validation::validate_email(email)?;
        validation::validate_marks(marks)?;

        let student = self.active_by_email(email).await?;
        if self.subjects.get_by_id(subject_id).await?.is_none() {
            return Err(StudentServiceError::NotFound("Subject not found".to_string()));
        }
        let enrollment = self
            .subjects
            .get_enrollment(student.id, subject_id)
            .await?
            .ok_or_else(|| {
                StudentServiceError::NotFound("Student is not enrolled in this subject".to_string())
            })?;

        self.subjects.update_marks(enrollment.id, marks).await?;
        self.with_subjects(student).await
    }

    /// Enroll the student in each named subject, keeping existing marks.
    pub async fn update_subjects(
        &self,
        email: &str,
        subject_names: &[String],
    ) -> Result<StudentWithSubjects> {
        validation::validate_email(email)?;
        let names = validation::validate_subject_names(subject_names)?;

        let student = self.active_by_email(email).await?;
        for name in &names {
            let subject = self.subjects.get_or_create(name).await?;
            self.subjects.enroll(student.id, subject.id).await?;
        }
        self.with_subjects(student).await
    }

    pub async fn remove_subject(&self, email: &str, subject_id: i64) -> Result<StudentWithSubjects> {
        validation::validate_email(email)?;
        let student = self.active_by_email(email).await?;

        if !self.subjects.remove_enrollment(student.id, subject_id).await? {
            return Err(StudentServiceError::BadRequest(
                "Association not found".to_string(),
            ));
        }
        self.with_subjects(student).await
    }

    /// Students with a parent link. Empty is reported as not found.
    pub async fn linked_to_parent(&self) -> Result<Vec<StudentWithParent>> {
        let students = self.students.list_linked_to_parent().await?;
        if students.is_empty() {
            return Err(StudentServiceError::NotFound(
                "No students are linked to a parent".to_string(),
            ));
        }
        Ok(students)
    }

    /// Students without a parent link. Empty is reported as not found.
    pub async fn not_linked_to_parent(&self) -> Result<Vec<Student>> {
        let students = self.students.list_not_linked_to_parent().await?;
        if students.is_empty() {
            return Err(StudentServiceError::NotFound(
                "Every student is linked to a parent".to_string(),
            ));
        }
        Ok(students)
    }

    async fn active_by_email(&self, email: &str) -> Result<Student> {
        match self.students.get_by_email(email.trim()).await? {
            Some(s) if s.is_active() => Ok(s),
            _ => Err(StudentServiceError::NotFound("Student not found".to_string())),
        }
    }

    async fn with_subjects(&self, student: Student) -> Result<StudentWithSubjects> {
        let subjects = self.subjects.list_for_student(student.id).await?;
        Ok(StudentWithSubjects { student, subjects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ParentRepository, SqlxParentRepository, SqlxStudentRepository, SqlxSubjectRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::Parent;

    struct Fixture {
        service: StudentService,
        parents: SqlxParentRepository,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let service = StudentService::new(
            SqlxStudentRepository::boxed(pool.clone()),
            SqlxSubjectRepository::boxed(pool.clone()),
            Arc::new(TokenIssuer::new(Some("student-secret"), 86_400)),
        );
        Fixture {
            service,
            parents: SqlxParentRepository::new(pool),
        }
    }

    fn input(email: &str, subjects: &[&str]) -> RegisterStudentInput {
        RegisterStudentInput {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: email.to_string(),
            password: "cobol1959".to_string(),
            subject_names: subjects.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_register_enrolls_subjects() {
        let f = setup().await;
        let created = f
            .service
            .register(input("grace@example.com", &["Math", "Physics"]))
            .await
            .unwrap();

        assert_eq!(created.student.email, "grace@example.com");
        let names: Vec<_> = created.subjects.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Math", "Physics"]);
        assert!(created.subjects.iter().all(|s| s.marks == 0));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let f = setup().await;
        f.service.register(input("dup@example.com", &["Math"])).await.unwrap();

        let err = f
            .service
            .register(input("dup@example.com", &["Math"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StudentServiceError::Conflict(_)));
    }

    /// Student lookups that never see an existing email, as if another
    /// registration committed between the check and the insert.
    struct StaleEmailLookup(Arc<dyn StudentRepository>);

    #[async_trait::async_trait]
    impl StudentRepository for StaleEmailLookup {
        async fn create_with_subjects(
            &self,
            student: &Student,
            subject_names: &[String],
        ) -> anyhow::Result<Student> {
            self.0.create_with_subjects(student, subject_names).await
        }
        async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<Student>> {
            self.0.get_by_id(id).await
        }
        async fn get_by_email(&self, _email: &str) -> anyhow::Result<Option<Student>> {
            Ok(None)
        }
        async fn list_active(&self, offset: i64, limit: i64) -> anyhow::Result<Vec<Student>> {
            self.0.list_active(offset, limit).await
        }
        async fn count_active(&self) -> anyhow::Result<i64> {
            self.0.count_active().await
        }
        async fn update(&self, id: i64, changes: &StudentChanges) -> anyhow::Result<Student> {
            self.0.update(id, changes).await
        }
        async fn set_status(&self, id: i64, active: bool) -> anyhow::Result<()> {
            self.0.set_status(id, active).await
        }
        async fn find_active_ids(&self, ids: &[i64]) -> anyhow::Result<Vec<i64>> {
            self.0.find_active_ids(ids).await
        }
        async fn list_linked_to_parent(&self) -> anyhow::Result<Vec<StudentWithParent>> {
            self.0.list_linked_to_parent().await
        }
        async fn list_not_linked_to_parent(&self) -> anyhow::Result<Vec<Student>> {
            self.0.list_not_linked_to_parent().await
        }
    }

    #[tokio::test]
    async fn test_register_race_on_email_conflicts_and_writes_nothing() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let students = SqlxStudentRepository::boxed(pool.clone());
        let subjects = SqlxSubjectRepository::boxed(pool.clone());
        let service = StudentService::new(
            Arc::new(StaleEmailLookup(students.clone())),
            subjects,
            Arc::new(TokenIssuer::new(Some("student-secret"), 86_400)),
        );

        service.register(input("race@example.com", &["Math"])).await.unwrap();
        let err = service
            .register(input("race@example.com", &["Chemistry"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StudentServiceError::Conflict(_)));

        // The losing registration left no subject behind
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects WHERE name = ?")
            .bind("Chemistry")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(stored, 0);
        assert_eq!(students.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_register_reports_all_validation_errors() {
        let f = setup().await;
        let mut bad = input("nope", &[]);
        bad.password = "short".to_string();

        match f.service.register(bad).await.unwrap_err() {
            StudentServiceError::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login() {
        let f = setup().await;
        f.service.register(input("login@example.com", &["Math"])).await.unwrap();

        assert!(f.service.login("login@example.com", "cobol1959").await.is_ok());
        assert!(matches!(
            f.service.login("login@example.com", "wrongpass").await,
            Err(StudentServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            f.service.login("ghost@example.com", "cobol1959").await,
            Err(StudentServiceError::InvalidCredentials)
        ));

        f.service.soft_delete("login@example.com").await.unwrap();
        assert!(matches!(
            f.service.login("login@example.com", "cobol1959").await,
            Err(StudentServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let f = setup().await;
        for i in 0..4 {
            f.service
                .register(input(&format!("s{}@example.com", i), &["Art"]))
                .await
                .unwrap();
        }
        f.service.soft_delete("s0@example.com").await.unwrap();

        let first = f.service.list(None, Some(2)).await.unwrap();
        assert_eq!(first.current_page, 1);
        assert_eq!(first.total_students, 3);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.students.len(), 2);
        assert_eq!(first.students[0].subjects[0].name, "Art");

        let second = f.service.list(Some(2), Some(2)).await.unwrap();
        assert_eq!(second.students.len(), 1);

        let defaults = f.service.list(None, None).await.unwrap();
        assert_eq!(defaults.students.len(), 3);
        assert_eq!(defaults.total_pages, 1);

        assert!(matches!(
            f.service.list(Some(0), Some(5)).await,
            Err(StudentServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_email_rules() {
        let f = setup().await;
        f.service.register(input("one@example.com", &["Art"])).await.unwrap();
        f.service.register(input("two@example.com", &["Art"])).await.unwrap();

        let same = UpdateStudentInput {
            email: "one@example.com".to_string(),
            new_email: Some("one@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update(same).await,
            Err(StudentServiceError::BadRequest(_))
        ));

        let taken = UpdateStudentInput {
            email: "one@example.com".to_string(),
            new_email: Some("two@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update(taken).await,
            Err(StudentServiceError::Conflict(_))
        ));

        let renamed = UpdateStudentInput {
            email: "one@example.com".to_string(),
            first_name: Some("Amazing".to_string()),
            new_email: Some("three@example.com".to_string()),
            ..Default::default()
        };
        let updated = f.service.update(renamed).await.unwrap();
        assert_eq!(updated.student.first_name, "Amazing");
        assert_eq!(updated.student.email, "three@example.com");
    }

    #[tokio::test]
    async fn test_marks_and_subjects() {
        let f = setup().await;
        let created = f
            .service
            .register(input("marks@example.com", &["Math"]))
            .await
            .unwrap();
        let math = created.subjects[0].subject_id;

        let updated = f.service.update_marks("marks@example.com", math, 88).await.unwrap();
        assert_eq!(updated.subjects[0].marks, 88);

        assert!(matches!(
            f.service.update_marks("marks@example.com", math, -1).await,
            Err(StudentServiceError::Validation(_))
        ));
        assert!(matches!(
            f.service.update_marks("marks@example.com", math + 100, 5).await,
            Err(StudentServiceError::NotFound(_))
        ));

        // Existing marks survive a subject update
        let names = vec!["Math".to_string(), "Chemistry".to_string()];
        let updated = f.service.update_subjects("marks@example.com", &names).await.unwrap();
        assert_eq!(updated.subjects.len(), 2);
        let math_row = updated.subjects.iter().find(|s| s.name == "Math").unwrap();
        assert_eq!(math_row.marks, 88);

        let removed = f.service.remove_subject("marks@example.com", math).await.unwrap();
        assert_eq!(removed.subjects.len(), 1);
        match f.service.remove_subject("marks@example.com", math).await.unwrap_err() {
            StudentServiceError::BadRequest(message) => assert_eq!(message, "Association not found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parent_link_listings() {
        let f = setup().await;
        assert!(matches!(
            f.service.not_linked_to_parent().await,
            Err(StudentServiceError::NotFound(_))
        ));

        let created = f.service.register(input("kid@example.com", &["Art"])).await.unwrap();
        assert!(matches!(
            f.service.linked_to_parent().await,
            Err(StudentServiceError::NotFound(_))
        ));
        assert_eq!(f.service.not_linked_to_parent().await.unwrap().len(), 1);

        let parent = f
            .parents
            .create(&Parent::new(
                "Mary".to_string(),
                "Hopper".to_string(),
                "mary@example.com".to_string(),
                "hash".to_string(),
            ))
            .await
            .unwrap();
        f.parents.link(parent.id, created.student.id).await.unwrap();

        let linked = f.service.linked_to_parent().await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].parent.id, parent.id);
    }
}
