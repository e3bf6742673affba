//! Holiday service
//!
//! Creates holidays, assigns them to students and answers coverage queries
//! over date ranges. All overlap decisions go through [`DateRange::overlaps`].

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::db::repositories::{CreateOutcome, HolidayRepository, StudentRepository};
use crate::models::{DateRange, Holiday, HolidayWithStudents, StudentWithHolidays};
use crate::services::validation;

/// Error types for holiday service operations
#[derive(Debug, thiserror::Error)]
pub enum HolidayServiceError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    /// Requested ids that are not active students
    #[error("Some students were not found")]
    InvalidStudents(Vec<i64>),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<Vec<String>> for HolidayServiceError {
    fn from(errors: Vec<String>) -> Self {
        Self::Validation(errors)
    }
}

type Result<T> = std::result::Result<T, HolidayServiceError>;

pub struct HolidayService {
    holidays: Arc<dyn HolidayRepository>,
    students: Arc<dyn StudentRepository>,
    max_end_date: Option<NaiveDate>,
}

impl HolidayService {
    pub fn new(
        holidays: Arc<dyn HolidayRepository>,
        students: Arc<dyn StudentRepository>,
        max_end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            holidays,
            students,
            max_end_date,
        }
    }

    /// Create a holiday starting today or later. A missing end makes it open-ended.
    pub async fn create(&self, name: &str, start: &str, end: Option<&str>) -> Result<Holiday> {
        self.create_on(Utc::now().date_naive(), name, start, end).await
    }

    /// [`create`](Self::create) with an explicit "today".
    pub async fn create_on(
        &self,
        today: NaiveDate,
        name: &str,
        start: &str,
        end: Option<&str>,
    ) -> Result<Holiday> {
        let (name, range) =
            validation::validate_holiday(name, start, end, today, self.max_end_date)?;

        match self
            .holidays
            .create_unless_conflicting(&Holiday::new(name, range))
            .await?
        {
            CreateOutcome::Created(holiday) => {
                tracing::info!(holiday_id = holiday.id, "Created holiday");
                Ok(holiday)
            }
            CreateOutcome::Conflict(existing) => Err(HolidayServiceError::Conflict(format!(
                "Holiday '{}' already covers these dates",
                existing.name
            ))),
        }
    }

    /// Assign a holiday to students and return the newly assigned ids.
    ///
    /// Unknown students are reported before the holiday is looked up, and
    /// nothing is written unless every id is valid.
    pub async fn assign(&self, student_ids: &[i64], holiday_id: i64) -> Result<Vec<i64>> {
        validation::validate_assignment(student_ids, holiday_id)?;

        let mut requested: Vec<i64> = Vec::with_capacity(student_ids.len());
        for id in student_ids {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }

        let active = self.students.find_active_ids(&requested).await?;
        let invalid: Vec<i64> = requested
            .iter()
            .copied()
            .filter(|id| !active.contains(id))
            .collect();
        if !invalid.is_empty() {
            return Err(HolidayServiceError::InvalidStudents(invalid));
        }

        if self.holidays.get_by_id(holiday_id).await?.is_none() {
            return Err(HolidayServiceError::NotFound("Holiday not found".to_string()));
        }

        let already = self
            .holidays
            .assigned_student_ids(holiday_id, &requested)
            .await?;
        let pending: Vec<i64> = requested
            .into_iter()
            .filter(|id| !already.contains(id))
            .collect();
        if pending.is_empty() {
            return Err(HolidayServiceError::Conflict(
                "All students are already assigned to this holiday".to_string(),
            ));
        }

        let assigned = self.holidays.assign(holiday_id, &pending).await?;
        tracing::info!(holiday_id, count = assigned.len(), "Assigned holiday");
        Ok(assigned)
    }

    /// Holidays overlapping the range, each with its students.
    pub async fn find_by_range(
        &self,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<HolidayWithStudents>> {
        let range = validation::validate_range_query(start, end, self.max_end_date)?;
        Ok(self.holidays.list_overlapping(&range).await?)
    }

    /// Active students with an assigned holiday in the range. Only the
    /// overlapping holidays are listed.
    pub async fn find_students_covered(
        &self,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<StudentWithHolidays>> {
        let range = validation::validate_range_query(start, end, self.max_end_date)?;
        let students = self.holidays.list_active_students_with_holidays().await?;
        Ok(covered(students, &range))
    }

    /// Active students without any assigned holiday in the range.
    pub async fn find_students_uncovered(
        &self,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<StudentWithHolidays>> {
        let range = validation::validate_range_query(start, end, self.max_end_date)?;
        let students = self.holidays.list_active_students_with_holidays().await?;
        Ok(uncovered(students, &range))
    }

    /// Delete a holiday and its assignments.
    pub async fn delete(&self, holiday_id: i64) -> Result<()> {
        validation::validate_holiday_id(holiday_id)?;
        if !self.holidays.delete_with_assignments(holiday_id).await? {
            return Err(HolidayServiceError::NotFound("Holiday not found".to_string()));
        }
        tracing::info!(holiday_id, "Deleted holiday");
        Ok(())
    }
}

fn covered(students: Vec<StudentWithHolidays>, range: &DateRange) -> Vec<StudentWithHolidays> {
    students
        .into_iter()
        .filter_map(|mut entry| {
            entry.holidays.retain(|h| h.range().overlaps(range));
            (!entry.holidays.is_empty()).then_some(entry)
        })
        .collect()
}

fn uncovered(students: Vec<StudentWithHolidays>, range: &DateRange) -> Vec<StudentWithHolidays> {
    students
        .into_iter()
        .filter(|entry| !entry.holidays.iter().any(|h| h.range().overlaps(range)))
        .collect()
}
