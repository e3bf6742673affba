//! Student repository
//!
//! Database operations for students and their parent links.
//!
//! - `StudentRepository` trait defining the interface for student data access
//! - `SqlxStudentRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Parent, Student, StudentWithParent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Fields that may change on a student profile update. `None` keeps the value.
#[derive(Debug, Clone, Default)]
pub struct StudentChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Student repository trait
#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Insert a new student
    async fn create(&self, student: &Student) -> Result<Student> {
        self.create_with_subjects(student, &[]).await
    }

    /// Insert a new student and enroll them, with zero marks, in each named
    /// subject. Missing subjects are created. Nothing is written on failure.
    async fn create_with_subjects(
        &self,
        student: &Student,
        subject_names: &[String],
    ) -> Result<Student>;

    /// Get student by ID regardless of status
    async fn get_by_id(&self, id: i64) -> Result<Option<Student>>;

    /// Get student by email regardless of status
    async fn get_by_email(&self, email: &str) -> Result<Option<Student>>;

    /// Page through active students ordered by ID
    async fn list_active(&self, offset: i64, limit: i64) -> Result<Vec<Student>>;

    /// Number of active students
    async fn count_active(&self) -> Result<i64>;

    /// Apply profile changes and return the updated record
    async fn update(&self, id: i64, changes: &StudentChanges) -> Result<Student>;

    /// Set the active flag (soft delete when `false`)
    async fn set_status(&self, id: i64, active: bool) -> Result<()>;

    /// Subset of `ids` that belong to active students
    async fn find_active_ids(&self, ids: &[i64]) -> Result<Vec<i64>>;

    /// Students that are linked to a parent, with that parent
    async fn list_linked_to_parent(&self) -> Result<Vec<StudentWithParent>>;

    /// Students without a parent link
    async fn list_not_linked_to_parent(&self) -> Result<Vec<Student>>;
}

/// SQLx-based student repository implementation
pub struct SqlxStudentRepository {
    pool: DynDatabasePool,
}

impl SqlxStudentRepository {
    /// Create a new SQLx student repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn StudentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl StudentRepository for SqlxStudentRepository {
    async fn create_with_subjects(
        &self,
        student: &Student,
        subject_names: &[String],
    ) -> Result<Student> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_student_sqlite(self.pool.sqlite()?, student, subject_names).await
            }
            DatabaseDriver::Mysql => {
                create_student_mysql(self.pool.mysql()?, student, subject_names).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Student>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_student_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_student_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Student>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_student_by_email_sqlite(self.pool.sqlite()?, email).await
            }
            DatabaseDriver::Mysql => get_student_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn list_active(&self, offset: i64, limit: i64) -> Result<Vec<Student>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_active_students_sqlite(self.pool.sqlite()?, offset, limit).await
            }
            DatabaseDriver::Mysql => {
                list_active_students_mysql(self.pool.mysql()?, offset, limit).await
            }
        }
    }

    async fn count_active(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS total FROM students WHERE status = TRUE";
        let total: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count students")?
                .try_get("total")?,
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count students")?
                .try_get("total")?,
        };
        Ok(total)
    }

    async fn update(&self, id: i64, changes: &StudentChanges) -> Result<Student> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_student_sqlite(self.pool.sqlite()?, id, changes).await,
            DatabaseDriver::Mysql => update_student_mysql(self.pool.mysql()?, id, changes).await,
        }
    }

    async fn set_status(&self, id: i64, active: bool) -> Result<()> {
        let sql = "UPDATE students SET status = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(active)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(active)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update student status")
    }

    async fn find_active_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id FROM students WHERE status = TRUE AND id IN ({})",
            placeholders(ids.len())
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                let rows = query
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to look up student ids")?;
                rows.iter()
                    .map(|r| r.try_get::<i64, _>("id").context("Failed to read student id"))
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                let rows = query
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to look up student ids")?;
                rows.iter()
                    .map(|r| r.try_get::<i64, _>("id").context("Failed to read student id"))
                    .collect()
            }
        }
    }

    async fn list_linked_to_parent(&self) -> Result<Vec<StudentWithParent>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_linked_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_linked_mysql(self.pool.mysql()?).await,
        }
    }

    async fn list_not_linked_to_parent(&self) -> Result<Vec<Student>> {
        let sql = format!(
            "SELECT {} FROM students s \
             WHERE NOT EXISTS (SELECT 1 FROM parent_students ps WHERE ps.student_id = s.id) \
             ORDER BY s.id",
            STUDENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list unlinked students")?;
                rows.iter().map(row_to_student_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list unlinked students")?;
                rows.iter().map(row_to_student_mysql).collect()
            }
        }
    }
}

/// Column list shared by every student SELECT (aliased table `s`)
pub(crate) const STUDENT_COLUMNS: &str =
    "s.id, s.first_name, s.last_name, s.email, s.password_hash, s.status, s.created_at, s.updated_at";

/// `?, ?, ?` with `n` placeholders
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_student_sqlite(
    pool: &SqlitePool,
    student: &Student,
    subject_names: &[String],
) -> Result<Student> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO students (first_name, last_name, email, password_hash, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&student.first_name)
    .bind(&student.last_name)
    .bind(&student.email)
    .bind(&student.password_hash)
    .bind(student.status)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create student")?;
    let id = result.last_insert_rowid();

    for name in subject_names {
        sqlx::query("INSERT OR IGNORE INTO subjects (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await
            .context("Failed to create subject")?;
        sqlx::query(
            "INSERT OR IGNORE INTO enrollments (student_id, subject_id, marks) \
             SELECT ?, id, 0 FROM subjects WHERE name = ?",
        )
        .bind(id)
        .bind(name)
        .execute(&mut *tx)
        .await
        .context("Failed to enroll student")?;
    }

    tx.commit().await.context("Failed to commit student")?;

    Ok(Student {
        id,
        created_at: now,
        updated_at: now,
        ..student.clone()
    })
}

async fn get_student_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students s WHERE s.id = ?", STUDENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get student by ID")?;

    row.as_ref().map(row_to_student_sqlite).transpose()
}

async fn get_student_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students s WHERE s.email = ?", STUDENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get student by email")?;

    row.as_ref().map(row_to_student_sqlite).transpose()
}

async fn list_active_students_sqlite(
    pool: &SqlitePool,
    offset: i64,
    limit: i64,
) -> Result<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students s WHERE s.status = TRUE ORDER BY s.id LIMIT ? OFFSET ?",
        STUDENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list students")?;

    rows.iter().map(row_to_student_sqlite).collect()
}

async fn update_student_sqlite(
    pool: &SqlitePool,
    id: i64,
    changes: &StudentChanges,
) -> Result<Student> {
    sqlx::query(
        r#"
        UPDATE students
        SET first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            email = COALESCE(?, email),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&changes.first_name)
    .bind(&changes.last_name)
    .bind(&changes.email)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update student")?;

    get_student_by_id_sqlite(pool, id)
        .await?
        .context("Student disappeared during update")
}

async fn list_linked_sqlite(pool: &SqlitePool) -> Result<Vec<StudentWithParent>> {
    let rows = sqlx::query(LINKED_STUDENTS_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to list students linked to parents")?;

    rows.iter()
        .map(|row| -> Result<StudentWithParent> {
            Ok(StudentWithParent {
                student: row_to_student_sqlite(row)?,
                parent: Parent {
                    id: row.try_get("p_id")?,
                    first_name: row.try_get("p_first_name")?,
                    last_name: row.try_get("p_last_name")?,
                    email: row.try_get("p_email")?,
                    password_hash: String::new(),
                    created_at: row.try_get("p_created_at")?,
                    updated_at: row.try_get("p_updated_at")?,
                },
            })
        })
        .collect()
}

pub(crate) fn row_to_student_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_student_mysql(
    pool: &MySqlPool,
    student: &Student,
    subject_names: &[String],
) -> Result<Student> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO students (first_name, last_name, email, password_hash, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&student.first_name)
    .bind(&student.last_name)
    .bind(&student.email)
    .bind(&student.password_hash)
    .bind(student.status)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create student")?;
    let id = result.last_insert_id() as i64;

    for name in subject_names {
        sqlx::query("INSERT IGNORE INTO subjects (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await
            .context("Failed to create subject")?;
        sqlx::query(
            "INSERT IGNORE INTO enrollments (student_id, subject_id, marks) \
             SELECT ?, id, 0 FROM subjects WHERE name = ?",
        )
        .bind(id)
        .bind(name)
        .execute(&mut *tx)
        .await
        .context("Failed to enroll student")?;
    }

    tx.commit().await.context("Failed to commit student")?;

    Ok(Student {
        id,
        created_at: now,
        updated_at: now,
        ..student.clone()
    })
}

async fn get_student_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students s WHERE s.id = ?", STUDENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get student by ID")?;

    row.as_ref().map(row_to_student_mysql).transpose()
}

async fn get_student_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<Student>> {
    let sql = format!("SELECT {} FROM students s WHERE s.email = ?", STUDENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get student by email")?;

    row.as_ref().map(row_to_student_mysql).transpose()
}

async fn list_active_students_mysql(
    pool: &MySqlPool,
    offset: i64,
    limit: i64,
) -> Result<Vec<Student>> {
    let sql = format!(
        "SELECT {} FROM students s WHERE s.status = TRUE ORDER BY s.id LIMIT ? OFFSET ?",
        STUDENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list students")?;

    rows.iter().map(row_to_student_mysql).collect()
}

async fn update_student_mysql(
    pool: &MySqlPool,
    id: i64,
    changes: &StudentChanges,
) -> Result<Student> {
    sqlx::query(
        r#"
        UPDATE students
        SET first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            email = COALESCE(?, email),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&changes.first_name)
    .bind(&changes.last_name)
    .bind(&changes.email)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update student")?;

    get_student_by_id_mysql(pool, id)
        .await?
        .context("Student disappeared during update")
}

async fn list_linked_mysql(pool: &MySqlPool) -> Result<Vec<StudentWithParent>> {
    let rows = sqlx::query(LINKED_STUDENTS_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to list students linked to parents")?;

    rows.iter()
        .map(|row| -> Result<StudentWithParent> {
            Ok(StudentWithParent {
                student: row_to_student_mysql(row)?,
                parent: Parent {
                    id: row.try_get("p_id")?,
                    first_name: row.try_get("p_first_name")?,
                    last_name: row.try_get("p_last_name")?,
                    email: row.try_get("p_email")?,
                    password_hash: String::new(),
                    created_at: row.try_get("p_created_at")?,
                    updated_at: row.try_get("p_updated_at")?,
                },
            })
        })
        .collect()
}

pub(crate) fn row_to_student_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const LINKED_STUDENTS_SQL: &str = r#"
    SELECT s.id, s.first_name, s.last_name, s.email, s.password_hash, s.status,
           s.created_at, s.updated_at,
           p.id AS p_id, p.first_name AS p_first_name, p.last_name AS p_last_name,
           p.email AS p_email, p.created_at AS p_created_at, p.updated_at AS p_updated_at
    FROM students s
    JOIN parent_students ps ON ps.student_id = s.id
    JOIN parents p ON p.id = ps.parent_id
    ORDER BY s.id
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxStudentRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxStudentRepository::new(pool.clone());
        (pool, repo)
    }

    fn test_student(email: &str) -> Student {
        Student::new(
            "Grace".to_string(),
            "Hopper".to_string(),
            email.to_string(),
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_student() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo.create(&test_student("grace@example.com")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "grace@example.com");
        assert!(by_id.status);

        let by_email = repo.get_by_email("grace@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_student("dup@example.com")).await.unwrap();
        let err = repo.create(&test_student("dup@example.com")).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_create_with_subjects_is_all_or_nothing() {
        let (pool, repo) = setup_test_repo().await;
        let subjects = vec!["Math".to_string(), "Art".to_string()];
        let created = repo
            .create_with_subjects(&test_student("whole@example.com"), &subjects)
            .await
            .unwrap();

        let count_rows = |sql: &'static str| {
            let pool = pool.clone();
            async move {
                sqlx::query_scalar::<_, i64>(sql)
                    .fetch_one(pool.sqlite().unwrap())
                    .await
                    .unwrap()
            }
        };
        assert_eq!(count_rows("SELECT COUNT(*) FROM enrollments WHERE marks = 0").await, 2);
        assert!(created.id > 0);

        let err = repo
            .create_with_subjects(
                &test_student("whole@example.com"),
                &["History".to_string()],
            )
            .await
            .unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
        assert_eq!(count_rows("SELECT COUNT(*) FROM subjects").await, 2);
        assert_eq!(count_rows("SELECT COUNT(*) FROM enrollments").await, 2);
        assert_eq!(count_rows("SELECT COUNT(*) FROM students").await, 1);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_active_queries() {
        let (_pool, repo) = setup_test_repo().await;
        let a = repo.create(&test_student("a@example.com")).await.unwrap();
        let b = repo.create(&test_student("b@example.com")).await.unwrap();

        repo.set_status(a.id, false).await.unwrap();

        assert_eq!(repo.count_active().await.unwrap(), 1);
        let active = repo.list_active(0, 10).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);

        let ids = repo.find_active_ids(&[a.id, b.id, 999]).await.unwrap();
        assert_eq!(ids, vec![b.id]);

        // The record itself is kept
        let stored = repo.get_by_id(a.id).await.unwrap().unwrap();
        assert!(!stored.status);
    }

    #[tokio::test]
    async fn test_list_active_paginates() {
        let (_pool, repo) = setup_test_repo().await;
        for i in 0..7 {
            repo.create(&test_student(&format!("s{}@example.com", i)))
                .await
                .unwrap();
        }

        let first = repo.list_active(0, 5).await.unwrap();
        let second = repo.list_active(5, 5).await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 2);
        assert!(first.last().unwrap().id < second[0].id);
    }

    #[tokio::test]
    async fn test_update_keeps_unspecified_fields() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&test_student("old@example.com")).await.unwrap();

        let updated = repo
            .update(
                created.id,
                &StudentChanges {
                    first_name: Some("Amazing".to_string()),
                    last_name: None,
                    email: Some("new@example.com".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Amazing");
        assert_eq!(updated.last_name, "Hopper");
        assert_eq!(updated.email, "new@example.com");
    }

    #[tokio::test]
    async fn test_parent_link_listings() {
        let (pool, repo) = setup_test_repo().await;
        let linked = repo.create(&test_student("linked@example.com")).await.unwrap();
        let lonely = repo.create(&test_student("lonely@example.com")).await.unwrap();

        let sqlite = pool.sqlite().unwrap();
        sqlx::query(
            "INSERT INTO parents (first_name, last_name, email, password_hash) VALUES ('Mum', 'Hopper', 'mum@example.com', 'x')",
        )
        .execute(sqlite)
        .await
        .unwrap();
        sqlx::query("INSERT INTO parent_students (parent_id, student_id) VALUES (1, ?)")
            .bind(linked.id)
            .execute(sqlite)
            .await
            .unwrap();

        let with_parent = repo.list_linked_to_parent().await.unwrap();
        assert_eq!(with_parent.len(), 1);
        assert_eq!(with_parent[0].student.id, linked.id);
        assert_eq!(with_parent[0].parent.email, "mum@example.com");

        let without = repo.list_not_linked_to_parent().await.unwrap();
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].id, lonely.id);
    }
}
