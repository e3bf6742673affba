//! Subject repository
//!
//! Subjects and the enrollments linking them to students.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Enrollment, StudentSubject, Subject};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Subject repository trait
#[async_trait]
pub trait SubjectRepository: Send + Sync {
    /// Get subject by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Subject>>;

    /// Return the subject with this name, creating it when missing
    async fn get_or_create(&self, name: &str) -> Result<Subject>;

    /// Enroll a student in a subject with zero marks. Existing enrollments are kept.
    async fn enroll(&self, student_id: i64, subject_id: i64) -> Result<()>;

    /// Get the enrollment of a student in a subject
    async fn get_enrollment(&self, student_id: i64, subject_id: i64)
        -> Result<Option<Enrollment>>;

    /// Set the marks of an enrollment
    async fn update_marks(&self, enrollment_id: i64, marks: i64) -> Result<()>;

    /// Remove an enrollment; returns whether one existed
    async fn remove_enrollment(&self, student_id: i64, subject_id: i64) -> Result<bool>;

    /// Subjects and marks for a student, ordered by subject name
    async fn list_for_student(&self, student_id: i64) -> Result<Vec<StudentSubject>>;
}

/// SQLx-based subject repository implementation
pub struct SqlxSubjectRepository {
    pool: DynDatabasePool,
}

impl SqlxSubjectRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubjectRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SubjectRepository for SqlxSubjectRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Subject>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_subject_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_subject_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_or_create(&self, name: &str) -> Result<Subject> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_or_create_subject_sqlite(self.pool.sqlite()?, name).await,
            DatabaseDriver::Mysql => get_or_create_subject_mysql(self.pool.mysql()?, name).await,
        }
    }

    async fn enroll(&self, student_id: i64, subject_id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO enrollments (student_id, subject_id, marks) VALUES (?, ?, 0)",
                )
                .bind(student_id)
                .bind(subject_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to enroll student")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO enrollments (student_id, subject_id, marks) VALUES (?, ?, 0)",
                )
                .bind(student_id)
                .bind(subject_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to enroll student")?;
            }
        }
        Ok(())
    }

    async fn get_enrollment(
        &self,
        student_id: i64,
        subject_id: i64,
    ) -> Result<Option<Enrollment>> {
        let sql = "SELECT id, student_id, subject_id, marks FROM enrollments WHERE student_id = ? AND subject_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(sql)
                    .bind(student_id)
                    .bind(subject_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get enrollment")?;
                row.map(|row| -> Result<Enrollment> {
                    Ok(Enrollment {
                        id: row.try_get("id")?,
                        student_id: row.try_get("student_id")?,
                        subject_id: row.try_get("subject_id")?,
                        marks: row.try_get("marks")?,
                    })
                })
                .transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(student_id)
                    .bind(subject_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get enrollment")?;
                row.map(|row| -> Result<Enrollment> {
                    Ok(Enrollment {
                        id: row.try_get("id")?,
                        student_id: row.try_get("student_id")?,
                        subject_id: row.try_get("subject_id")?,
                        marks: row.try_get("marks")?,
                    })
                })
                .transpose()
            }
        }
    }

    async fn update_marks(&self, enrollment_id: i64, marks: i64) -> Result<()> {
        let sql = "UPDATE enrollments SET marks = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(marks)
                .bind(enrollment_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(marks)
                .bind(enrollment_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update marks")
    }

    async fn remove_enrollment(&self, student_id: i64, subject_id: i64) -> Result<bool> {
        let sql = "DELETE FROM enrollments WHERE student_id = ? AND subject_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(student_id)
                .bind(subject_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(student_id)
                .bind(subject_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to remove enrollment")?;
        Ok(affected > 0)
    }

    async fn list_for_student(&self, student_id: i64) -> Result<Vec<StudentSubject>> {
        let sql = r#"
            SELECT sub.id AS subject_id, sub.name, e.marks
            FROM enrollments e
            JOIN subjects sub ON sub.id = e.subject_id
            WHERE e.student_id = ?
            ORDER BY sub.name
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(student_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list student subjects")?;
                rows.iter()
                    .map(|row| -> Result<StudentSubject> {
                        Ok(StudentSubject {
                            subject_id: row.try_get("subject_id")?,
                            name: row.try_get("name")?,
                            marks: row.try_get("marks")?,
                        })
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(student_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list student subjects")?;
                rows.iter()
                    .map(|row| -> Result<StudentSubject> {
                        Ok(StudentSubject {
                            subject_id: row.try_get("subject_id")?,
                            name: row.try_get("name")?,
                            marks: row.try_get("marks")?,
                        })
                    })
                    .collect()
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_subject_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Subject>> {
    let row = sqlx::query("SELECT id, name FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get subject by ID")?;

    match row {
        Some(row) => Ok(Some(Subject {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })),
        None => Ok(None),
    }
}

async fn get_or_create_subject_sqlite(pool: &SqlitePool, name: &str) -> Result<Subject> {
    sqlx::query("INSERT OR IGNORE INTO subjects (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to create subject")?;

    let row = sqlx::query("SELECT id, name FROM subjects WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .context("Failed to load subject")?;

    Ok(Subject {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_subject_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Subject>> {
    let row = sqlx::query("SELECT id, name FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get subject by ID")?;

    match row {
        Some(row) => Ok(Some(Subject {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })),
        None => Ok(None),
    }
}

async fn get_or_create_subject_mysql(pool: &MySqlPool, name: &str) -> Result<Subject> {
    sqlx::query("INSERT IGNORE INTO subjects (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to create subject")?;

    let row = sqlx::query("SELECT id, name FROM subjects WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .context("Failed to load subject")?;

    Ok(Subject {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}
