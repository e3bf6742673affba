//! Holiday repository
//!
//! Holidays, their student assignments and the range queries over both.
//! Creation and deletion each run inside a single transaction.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{DateRange, Holiday, HolidayWithStudents, Student, StudentWithHolidays};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use super::student::{placeholders, row_to_student_mysql, row_to_student_sqlite, STUDENT_COLUMNS};

/// Result of an attempted holiday insert
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Holiday),
    /// An existing holiday blocked the insert
    Conflict(Holiday),
}

/// Holiday repository trait
#[async_trait]
pub trait HolidayRepository: Send + Sync {
    /// Insert `holiday` unless an existing one shares its start date or overlaps it
    async fn create_unless_conflicting(&self, holiday: &Holiday) -> Result<CreateOutcome>;

    /// Get holiday by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Holiday>>;

    /// Holidays overlapping `range`, each with its assigned students
    async fn list_overlapping(&self, range: &DateRange) -> Result<Vec<HolidayWithStudents>>;

    /// Every active student with all of their assigned holidays
    async fn list_active_students_with_holidays(&self) -> Result<Vec<StudentWithHolidays>>;

    /// Subset of `student_ids` already assigned to the holiday
    async fn assigned_student_ids(&self, holiday_id: i64, student_ids: &[i64])
        -> Result<Vec<i64>>;

    /// Assign students to a holiday, skipping existing pairs.
    ///
    /// Returns the ids that were newly assigned.
    async fn assign(&self, holiday_id: i64, student_ids: &[i64]) -> Result<Vec<i64>>;

    /// Remove a holiday and its assignments. Returns `false` if it did not exist.
    async fn delete_with_assignments(&self, id: i64) -> Result<bool>;
}

/// SQLx-based holiday repository implementation
pub struct SqlxHolidayRepository {
    pool: DynDatabasePool,
}

impl SqlxHolidayRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn HolidayRepository> {
        Arc::new(Self::new(pool))
    }
}

const HOLIDAY_COLUMNS: &str = "h.id, h.name, h.start_date, h.end_date, h.created_at";

/// Rows that may block `range`: same start, or overlapping with open ends as infinity.
const CONFLICT_FILTER: &str = "h.start_date = ? OR ((h.end_date IS NULL OR h.end_date >= ?) AND (? IS NULL OR h.start_date <= ?))";

/// Rows overlapping a query range
const OVERLAP_FILTER: &str = "(h.end_date IS NULL OR h.end_date >= ?) AND (? IS NULL OR h.start_date <= ?)";

#[async_trait]
impl HolidayRepository for SqlxHolidayRepository {
    async fn create_unless_conflicting(&self, holiday: &Holiday) -> Result<CreateOutcome> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_holiday_sqlite(self.pool.sqlite()?, holiday).await,
            DatabaseDriver::Mysql => create_holiday_mysql(self.pool.mysql()?, holiday).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Holiday>> {
        let sql = format!("SELECT {} FROM holidays h WHERE h.id = ?", HOLIDAY_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get holiday by ID")?
                .as_ref()
                .map(row_to_holiday_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get holiday by ID")?
                .as_ref()
                .map(row_to_holiday_mysql)
                .transpose(),
        }
    }

    async fn list_overlapping(&self, range: &DateRange) -> Result<Vec<HolidayWithStudents>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_overlapping_sqlite(self.pool.sqlite()?, range).await,
            DatabaseDriver::Mysql => list_overlapping_mysql(self.pool.mysql()?, range).await,
        }
    }

    async fn list_active_students_with_holidays(&self) -> Result<Vec<StudentWithHolidays>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => students_with_holidays_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => students_with_holidays_mysql(self.pool.mysql()?).await,
        }
    }

    async fn assigned_student_ids(
        &self,
        holiday_id: i64,
        student_ids: &[i64],
    ) -> Result<Vec<i64>> {
        if student_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT student_id FROM student_holidays WHERE holiday_id = ? AND student_id IN ({})",
            placeholders(student_ids.len())
        );

        let assigned: Vec<i64> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql).bind(holiday_id);
                for id in student_ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to load holiday assignments")?
                    .iter()
                    .map(|r| r.try_get::<i64, _>("student_id").context("Bad student_id column"))
                    .collect::<Result<_>>()?
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql).bind(holiday_id);
                for id in student_ids {
                    query = query.bind(*id);
                }
                query
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to load holiday assignments")?
                    .iter()
                    .map(|r| r.try_get::<i64, _>("student_id").context("Bad student_id column"))
                    .collect::<Result<_>>()?
            }
        };

        Ok(student_ids
            .iter()
            .copied()
            .filter(|id| assigned.contains(id))
            .collect())
    }

    async fn assign(&self, holiday_id: i64, student_ids: &[i64]) -> Result<Vec<i64>> {
        let mut inserted = Vec::new();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                for id in student_ids {
                    let result = sqlx::query(
                        "INSERT OR IGNORE INTO student_holidays (student_id, holiday_id) VALUES (?, ?)",
                    )
                    .bind(*id)
                    .bind(holiday_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to assign holiday")?;
                    if result.rows_affected() > 0 {
                        inserted.push(*id);
                    }
                }
                tx.commit().await.context("Failed to commit assignment")?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                for id in student_ids {
                    let result = sqlx::query(
                        "INSERT IGNORE INTO student_holidays (student_id, holiday_id) VALUES (?, ?)",
                    )
                    .bind(*id)
                    .bind(holiday_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to assign holiday")?;
                    if result.rows_affected() > 0 {
                        inserted.push(*id);
                    }
                }
                tx.commit().await.context("Failed to commit assignment")?;
            }
        }
        Ok(inserted)
    }

    async fn delete_with_assignments(&self, id: i64) -> Result<bool> {
        let removed = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                sqlx::query("DELETE FROM student_holidays WHERE holiday_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete holiday assignments")?;
                let result = sqlx::query("DELETE FROM holidays WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete holiday")?;
                tx.commit().await.context("Failed to commit holiday delete")?;
                result.rows_affected()
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                sqlx::query("DELETE FROM student_holidays WHERE holiday_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete holiday assignments")?;
                let result = sqlx::query("DELETE FROM holidays WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete holiday")?;
                tx.commit().await.context("Failed to commit holiday delete")?;
                result.rows_affected()
            }
        };
        Ok(removed > 0)
    }
}

/// Attach students to their holidays, keeping holiday order.
fn attach_students(
    holidays: Vec<Holiday>,
    mut by_holiday: HashMap<i64, Vec<Student>>,
) -> Vec<HolidayWithStudents> {
    holidays
        .into_iter()
        .map(|holiday| {
            let students = by_holiday.remove(&holiday.id).unwrap_or_default();
            HolidayWithStudents { holiday, students }
        })
        .collect()
}

fn attach_holidays(
    students: Vec<Student>,
    mut by_student: HashMap<i64, Vec<Holiday>>,
) -> Vec<StudentWithHolidays> {
    students
        .into_iter()
        .map(|student| {
            let holidays = by_student.remove(&student.id).unwrap_or_default();
            StudentWithHolidays { student, holidays }
        })
        .collect()
}

fn assigned_students_sql(holiday_count: usize) -> String {
    format!(
        "SELECT sh.holiday_id, {} FROM student_holidays sh JOIN students s ON s.id = sh.student_id WHERE sh.holiday_id IN ({}) ORDER BY s.id",
        STUDENT_COLUMNS,
        placeholders(holiday_count)
    )
}

fn active_students_sql() -> String {
    format!(
        "SELECT {} FROM students s WHERE s.status = TRUE ORDER BY s.id",
        STUDENT_COLUMNS
    )
}

fn active_assignments_sql() -> String {
    format!(
        "SELECT sh.student_id, {} FROM student_holidays sh JOIN holidays h ON h.id = sh.holiday_id JOIN students s ON s.id = sh.student_id WHERE s.status = TRUE ORDER BY h.start_date, h.id",
        HOLIDAY_COLUMNS
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_holiday_sqlite(pool: &SqlitePool, holiday: &Holiday) -> Result<CreateOutcome> {
    let range = holiday.range();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let sql = format!("SELECT {} FROM holidays h WHERE {}", HOLIDAY_COLUMNS, CONFLICT_FILTER);
    let candidates = sqlx::query(&sql)
        .bind(range.start)
        .bind(range.start)
        .bind(range.end)
        .bind(range.end)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to check holiday conflicts")?;

    for row in &candidates {
        let existing = row_to_holiday_sqlite(row)?;
        if existing.conflicts_with(&range) {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(CreateOutcome::Conflict(existing));
        }
    }

    let result = sqlx::query(
        "INSERT INTO holidays (name, start_date, end_date, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&holiday.name)
    .bind(holiday.start_date)
    .bind(holiday.end_date)
    .bind(holiday.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create holiday")?;
    tx.commit().await.context("Failed to commit holiday")?;

    Ok(CreateOutcome::Created(Holiday {
        id: result.last_insert_rowid(),
        ..holiday.clone()
    }))
}

async fn list_overlapping_sqlite(
    pool: &SqlitePool,
    range: &DateRange,
) -> Result<Vec<HolidayWithStudents>> {
    let sql = format!(
        "SELECT {} FROM holidays h WHERE {} ORDER BY h.start_date, h.id",
        HOLIDAY_COLUMNS, OVERLAP_FILTER
    );
    let holidays = sqlx::query(&sql)
        .bind(range.start)
        .bind(range.end)
        .bind(range.end)
        .fetch_all(pool)
        .await
        .context("Failed to list holidays in range")?
        .iter()
        .map(row_to_holiday_sqlite)
        .collect::<Result<Vec<_>>>()?;

    if holidays.is_empty() {
        return Ok(Vec::new());
    }

    let sql = assigned_students_sql(holidays.len());
    let mut query = sqlx::query(&sql);
    for holiday in &holidays {
        query = query.bind(holiday.id);
    }
    let mut by_holiday: HashMap<i64, Vec<Student>> = HashMap::new();
    for row in query
        .fetch_all(pool)
        .await
        .context("Failed to load holiday students")?
    {
        let holiday_id: i64 = row.try_get("holiday_id")?;
        by_holiday
            .entry(holiday_id)
            .or_default()
            .push(row_to_student_sqlite(&row)?);
    }

    Ok(attach_students(holidays, by_holiday))
}

async fn students_with_holidays_sqlite(pool: &SqlitePool) -> Result<Vec<StudentWithHolidays>> {
    let students = sqlx::query(&active_students_sql())
        .fetch_all(pool)
        .await
        .context("Failed to list active students")?
        .iter()
        .map(row_to_student_sqlite)
        .collect::<Result<Vec<_>>>()?;

    let mut by_student: HashMap<i64, Vec<Holiday>> = HashMap::new();
    for row in sqlx::query(&active_assignments_sql())
        .fetch_all(pool)
        .await
        .context("Failed to load student holidays")?
    {
        let student_id: i64 = row.try_get("student_id")?;
        by_student
            .entry(student_id)
            .or_default()
            .push(row_to_holiday_sqlite(&row)?);
    }

    Ok(attach_holidays(students, by_student))
}

fn row_to_holiday_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Holiday> {
    Ok(Holiday {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_holiday_mysql(pool: &MySqlPool, holiday: &Holiday) -> Result<CreateOutcome> {
    let range = holiday.range();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let sql = format!(
        "SELECT {} FROM holidays h WHERE {} FOR UPDATE",
        HOLIDAY_COLUMNS, CONFLICT_FILTER
    );
    let candidates = sqlx::query(&sql)
        .bind(range.start)
        .bind(range.start)
        .bind(range.end)
        .bind(range.end)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to check holiday conflicts")?;

    for row in &candidates {
        let existing = row_to_holiday_mysql(row)?;
        if existing.conflicts_with(&range) {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(CreateOutcome::Conflict(existing));
        }
    }

    let result = sqlx::query(
        "INSERT INTO holidays (name, start_date, end_date, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&holiday.name)
    .bind(holiday.start_date)
    .bind(holiday.end_date)
    .bind(holiday.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create holiday")?;
    tx.commit().await.context("Failed to commit holiday")?;

    Ok(CreateOutcome::Created(Holiday {
        id: result.last_insert_id() as i64,
        ..holiday.clone()
    }))
}

async fn list_overlapping_mysql(
    pool: &MySqlPool,
    range: &DateRange,
) -> Result<Vec<HolidayWithStudents>> {
    let sql = format!(
        "SELECT {} FROM holidays h WHERE {} ORDER BY h.start_date, h.id",
        HOLIDAY_COLUMNS, OVERLAP_FILTER
    );
    let holidays = sqlx::query(&sql)
        .bind(range.start)
        .bind(range.end)
        .bind(range.end)
        .fetch_all(pool)
        .await
        .context("Failed to list holidays in range")?
        .iter()
        .map(row_to_holiday_mysql)
        .collect::<Result<Vec<_>>>()?;

    if holidays.is_empty() {
        return Ok(Vec::new());
    }

    let sql = assigned_students_sql(holidays.len());
    let mut query = sqlx::query(&sql);
    for holiday in &holidays {
        query = query.bind(holiday.id);
    }
    let mut by_holiday: HashMap<i64, Vec<Student>> = HashMap::new();
    for row in query
        .fetch_all(pool)
        .await
        .context("Failed to load holiday students")?
    {
        let holiday_id: i64 = row.try_get("holiday_id")?;
        by_holiday
            .entry(holiday_id)
            .or_default()
            .push(row_to_student_mysql(&row)?);
    }

    Ok(attach_students(holidays, by_holiday))
}

async fn students_with_holidays_mysql(pool: &MySqlPool) -> Result<Vec<StudentWithHolidays>> {
    let students = sqlx::query(&active_students_sql())
        .fetch_all(pool)
        .await
        .context("Failed to list active students")?
        .iter()
        .map(row_to_student_mysql)
        .collect::<Result<Vec<_>>>()?;

    let mut by_student: HashMap<i64, Vec<Holiday>> = HashMap::new();
    for row in sqlx::query(&active_assignments_sql())
        .fetch_all(pool)
        .await
        .context("Failed to load student holidays")?
    {
        let student_id: i64 = row.try_get("student_id")?;
        by_student
            .entry(student_id)
            .or_default()
            .push(row_to_holiday_mysql(&row)?);
    }

    Ok(attach_holidays(students, by_student))
}

fn row_to_holiday_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Holiday> {
    Ok(Holiday {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        created_at: row.try_get("created_at")?,
    })
}
