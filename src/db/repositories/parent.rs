//! Parent repository
//!
//! Database operations for parents and the parent-student link.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Parent, Student};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::student::{row_to_student_mysql, row_to_student_sqlite, STUDENT_COLUMNS};

/// Fields that may change on a parent profile update. `None` keeps the value.
#[derive(Debug, Clone, Default)]
pub struct ParentChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Parent repository trait
#[async_trait]
pub trait ParentRepository: Send + Sync {
    /// Insert a new parent
    async fn create(&self, parent: &Parent) -> Result<Parent>;

    /// Get parent by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Parent>>;

    /// Get parent by email
    async fn get_by_email(&self, email: &str) -> Result<Option<Parent>>;

    /// Apply profile changes and return the updated record
    async fn update(&self, id: i64, changes: &ParentChanges) -> Result<Parent>;

    /// Whether either the parent or the student already has a link
    async fn has_link(&self, parent_id: i64, student_id: i64) -> Result<bool>;

    /// Link a parent to a student
    async fn link(&self, parent_id: i64, student_id: i64) -> Result<()>;

    /// The student linked to a parent, if any
    async fn linked_student(&self, parent_id: i64) -> Result<Option<Student>>;
}

/// SQLx-based parent repository implementation
pub struct SqlxParentRepository {
    pool: DynDatabasePool,
}

impl SqlxParentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ParentRepository> {
        Arc::new(Self::new(pool))
    }
}

const PARENT_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, created_at, updated_at";

#[async_trait]
impl ParentRepository for SqlxParentRepository {
    async fn create(&self, parent: &Parent) -> Result<Parent> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_parent_sqlite(self.pool.sqlite()?, parent).await,
            DatabaseDriver::Mysql => create_parent_mysql(self.pool.mysql()?, parent).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Parent>> {
        let sql = format!("SELECT {} FROM parents WHERE id = ?", PARENT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get parent by ID")?
                .as_ref()
                .map(row_to_parent_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get parent by ID")?
                .as_ref()
                .map(row_to_parent_mysql)
                .transpose(),
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Parent>> {
        let sql = format!("SELECT {} FROM parents WHERE email = ?", PARENT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(email)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get parent by email")?
                .as_ref()
                .map(row_to_parent_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(email)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get parent by email")?
                .as_ref()
                .map(row_to_parent_mysql)
                .transpose(),
        }
    }

    async fn update(&self, id: i64, changes: &ParentChanges) -> Result<Parent> {
        let sql = r#"
            UPDATE parents
            SET first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                email = COALESCE(?, email),
                updated_at = ?
            WHERE id = ?
        "#;
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&changes.first_name)
                .bind(&changes.last_name)
                .bind(&changes.email)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&changes.first_name)
                .bind(&changes.last_name)
                .bind(&changes.email)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to update parent")?;

        self.get_by_id(id)
            .await?
            .context("Parent disappeared during update")
    }

    async fn has_link(&self, parent_id: i64, student_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS links FROM parent_students WHERE parent_id = ? OR student_id = ?";
        let links: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(parent_id)
                .bind(student_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check parent link")?
                .try_get("links")?,
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(parent_id)
                .bind(student_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check parent link")?
                .try_get("links")?,
        };
        Ok(links > 0)
    }

    async fn link(&self, parent_id: i64, student_id: i64) -> Result<()> {
        let sql = "INSERT INTO parent_students (parent_id, student_id) VALUES (?, ?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(parent_id)
                .bind(student_id)
                .execute(self.pool.sqlite()?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(parent_id)
                .bind(student_id)
                .execute(self.pool.mysql()?)
                .await
                .map(|_| ()),
        }
        .context("Failed to link parent and student")
    }

    async fn linked_student(&self, parent_id: i64) -> Result<Option<Student>> {
        let sql = format!(
            "SELECT {} FROM students s JOIN parent_students ps ON ps.student_id = s.id WHERE ps.parent_id = ?",
            STUDENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(parent_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to load linked student")?
                .as_ref()
                .map(row_to_student_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(parent_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to load linked student")?
                .as_ref()
                .map(row_to_student_mysql)
                .transpose(),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_parent_sqlite(pool: &SqlitePool, parent: &Parent) -> Result<Parent> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO parents (first_name, last_name, email, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&parent.first_name)
    .bind(&parent.last_name)
    .bind(&parent.email)
    .bind(&parent.password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create parent")?;

    Ok(Parent {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..parent.clone()
    })
}

fn row_to_parent_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Parent> {
    Ok(Parent {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_parent_mysql(pool: &MySqlPool, parent: &Parent) -> Result<Parent> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO parents (first_name, last_name, email, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&parent.first_name)
    .bind(&parent.last_name)
    .bind(&parent.email)
    .bind(&parent.password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create parent")?;

    Ok(Parent {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..parent.clone()
    })
}

fn row_to_parent_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Parent> {
    Ok(Parent {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxStudentRepository, StudentRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (SqlxParentRepository, SqlxStudentRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (
            SqlxParentRepository::new(pool.clone()),
            SqlxStudentRepository::new(pool),
        )
    }

    fn parent(email: &str) -> Parent {
        Parent::new(
            "Marie".to_string(),
            "Curie".to_string(),
            email.to_string(),
            "hash".to_string(),
        )
    }

    fn student(email: &str) -> Student {
        Student::new(
            "Irene".to_string(),
            "Curie".to_string(),
            email.to_string(),
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup_parent() {
        let (parents, _) = setup().await;
        let created = parents.create(&parent("marie@example.com")).await.unwrap();

        let by_email = parents
            .get_by_email("marie@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, created.id);
        assert!(parents.get_by_id(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_and_has_link() {
        let (parents, students) = setup().await;
        let p1 = parents.create(&parent("p1@example.com")).await.unwrap();
        let p2 = parents.create(&parent("p2@example.com")).await.unwrap();
        let s1 = students.create(&student("s1@example.com")).await.unwrap();
        let s2 = students.create(&student("s2@example.com")).await.unwrap();

        assert!(!parents.has_link(p1.id, s1.id).await.unwrap());
        parents.link(p1.id, s1.id).await.unwrap();

        // Either side being linked counts
        assert!(parents.has_link(p1.id, s2.id).await.unwrap());
        assert!(parents.has_link(p2.id, s1.id).await.unwrap());
        assert!(!parents.has_link(p2.id, s2.id).await.unwrap());

        let linked = parents.linked_student(p1.id).await.unwrap().unwrap();
        assert_eq!(linked.id, s1.id);
        assert!(parents.linked_student(p2.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_parent() {
        let (parents, _) = setup().await;
        let created = parents.create(&parent("old@example.com")).await.unwrap();

        let updated = parents
            .update(
                created.id,
                &ParentChanges {
                    last_name: Some("Sklodowska".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Marie");
        assert_eq!(updated.last_name, "Sklodowska");
        assert_eq!(updated.email, "old@example.com");
    }
}
