//! Holiday API endpoints
//!
//! Every route here requires a session.

use axum::{extract::State, response::IntoResponse, Router};
use serde::{Deserialize, Serialize};

use super::common::{ApiResponse, DateRangeRequest, JsonBody};
use super::middleware::{ApiError, AppState, RotatedToken};
use crate::models::{Holiday, HolidayWithStudents, StudentWithHolidays};
use crate::services::HolidayServiceError;

impl From<HolidayServiceError> for ApiError {
    fn from(err: HolidayServiceError) -> Self {
        match err {
            HolidayServiceError::Validation(errors) => ApiError::validation_failed(errors),
            HolidayServiceError::InvalidStudents(ids) => ApiError::with_details(
                "VALIDATION_ERROR",
                "Some students were not found",
                serde_json::json!({ "invalidIds": ids }),
            ),
            HolidayServiceError::NotFound(msg) => ApiError::not_found(msg),
            HolidayServiceError::Conflict(msg) => ApiError::conflict(msg),
            HolidayServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_date: String,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    #[serde(rename = "studentIds", default)]
    pub student_ids: Vec<i64>,
    #[serde(rename = "holidayId", default)]
    pub holiday_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "holidayId", default)]
    pub holiday_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CreatedHoliday {
    pub holiday: Holiday,
}

#[derive(Debug, Serialize)]
pub struct AssignedStudents {
    #[serde(rename = "assignedStudents")]
    pub assigned_students: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct HolidayList {
    pub length: usize,
    pub holiday_list: Vec<HolidayWithStudents>,
}

#[derive(Debug, Serialize)]
pub struct StudentList {
    pub students: Vec<StudentWithHolidays>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/holiday/create", axum::routing::post(create))
        .route("/holiday/assign-holiday", axum::routing::post(assign))
        .route(
            "/holiday/holiday-list-by-date",
            axum::routing::post(list_by_date),
        )
        .route(
            "/holiday/no-holiday-students",
            axum::routing::post(students_without_holiday),
        )
        .route(
            "/holiday/holiday-students",
            axum::routing::post(students_with_holiday),
        )
        .route("/holiday/delete-holiday", axum::routing::post(delete))
}

/// POST /api/v1/holiday/create
async fn create(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<CreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let holiday = state
        .holiday_service
        .create(&body.name, &body.start_date, body.end_date.as_deref())
        .await?;
    Ok(ApiResponse::new("Holiday created successfully", CreatedHoliday { holiday })
        .with_token(rotated)
        .created())
}

/// POST /api/v1/holiday/assign-holiday
async fn assign(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let assigned_students = state
        .holiday_service
        .assign(&body.student_ids, body.holiday_id)
        .await?;
    Ok(
        ApiResponse::new("Holiday assigned successfully", AssignedStudents { assigned_students })
            .with_token(rotated)
            .created(),
    )
}

/// POST /api/v1/holiday/holiday-list-by-date
async fn list_by_date(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<DateRangeRequest>,
) -> Result<ApiResponse<HolidayList>, ApiError> {
    let holiday_list = state
        .holiday_service
        .find_by_range(&body.start_date, body.end_date.as_deref())
        .await?;
    let list = HolidayList {
        length: holiday_list.len(),
        holiday_list,
    };
    Ok(ApiResponse::new("Holidays fetched successfully", list).with_token(rotated))
}

/// POST /api/v1/holiday/no-holiday-students
async fn students_without_holiday(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<DateRangeRequest>,
) -> Result<ApiResponse<StudentList>, ApiError> {
    let students = state
        .holiday_service
        .find_students_uncovered(&body.start_date, body.end_date.as_deref())
        .await?;
    Ok(
        ApiResponse::new("Students without a holiday fetched successfully", StudentList { students })
            .with_token(rotated),
    )
}

/// POST /api/v1/holiday/holiday-students
async fn students_with_holiday(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<DateRangeRequest>,
) -> Result<ApiResponse<StudentList>, ApiError> {
    let students = state
        .holiday_service
        .find_students_covered(&body.start_date, body.end_date.as_deref())
        .await?;
    Ok(
        ApiResponse::new("Students on holiday fetched successfully", StudentList { students })
            .with_token(rotated),
    )
}

/// POST /api/v1/holiday/delete-holiday
async fn delete(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<DeleteRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state.holiday_service.delete(body.holiday_id).await?;
    Ok(ApiResponse::message("Holiday deleted successfully").with_token(rotated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_invalid_students_listed_in_details() {
        let error = ApiError::from(HolidayServiceError::InvalidStudents(vec![4, 9]));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.error.details,
            Some(serde_json::json!({ "invalidIds": [4, 9] }))
        );
    }

    #[test]
    fn test_assign_request_field_names() {
        let body: AssignRequest =
            serde_json::from_str(r#"{"studentIds":[1,2,2],"holidayId":5}"#).unwrap();
        assert_eq!(body.student_ids, vec![1, 2, 2]);
        assert_eq!(body.holiday_id, 5);
    }
}
