//! Student API endpoints
//!
//! Registration and login are public; everything else runs behind
//! [`require_auth`](super::middleware::require_auth).

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Router,
};
use serde::Deserialize;

use super::common::{ApiResponse, EmailRequest, JsonBody, LoginRequest};
use super::middleware::{set_session_cookie, ApiError, AppState, RotatedToken};
use crate::models::{Student, StudentWithParent, StudentWithSubjects};
use crate::services::{
    RegisterStudentInput, StudentPage, StudentServiceError, UpdateStudentInput,
};

impl From<StudentServiceError> for ApiError {
    fn from(err: StudentServiceError) -> Self {
        match err {
            StudentServiceError::Validation(errors) => ApiError::validation_failed(errors),
            StudentServiceError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            StudentServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            StudentServiceError::NotFound(msg) => ApiError::not_found(msg),
            StudentServiceError::Conflict(msg) => ApiError::conflict(msg),
            StudentServiceError::Token(e) => ApiError::internal(e),
            StudentServiceError::Internal(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub subject_names: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub new_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarksRequest {
    #[serde(default)]
    pub email: String,
    #[serde(rename = "subjectId")]
    pub subject_id: i64,
    pub marks: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubjectsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveSubjectRequest {
    #[serde(default)]
    pub email: String,
    #[serde(rename = "subjectId")]
    pub subject_id: i64,
}

/// Public student routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/student", axum::routing::post(register))
        .route("/student/", axum::routing::post(register))
        .route("/student/login", axum::routing::post(login))
}

/// Student routes that need a session
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/student/all", axum::routing::post(list))
        .route("/student/update-student", axum::routing::post(update))
        .route("/student/details", axum::routing::post(details))
        .route("/student/delete", axum::routing::post(soft_delete))
        .route("/student/update-marks", axum::routing::post(update_marks))
        .route("/student/update-subjects", axum::routing::post(update_subjects))
        .route("/student/delete-subject", axum::routing::post(remove_subject))
        .route(
            "/student/details-linked-parent",
            axum::routing::post(linked_to_parent),
        )
        .route(
            "/student/details-not-linked-parent",
            axum::routing::post(not_linked_to_parent),
        )
}

/// POST /api/v1/student/
async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let student = state
        .student_service
        .register(RegisterStudentInput {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            password: body.password,
            subject_names: body.subject_names,
        })
        .await?;

    Ok(ApiResponse::new("Student registered successfully", student).created())
}

/// POST /api/v1/student/login
///
/// The token is returned in the body and set as the session cookie.
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Response, ApiError> {
    let token = state
        .student_service
        .login(&body.email, &body.password)
        .await?;

    let mut response = ApiResponse::message("Login successful")
        .with_token(RotatedToken(Some(token.clone())))
        .into_response();
    set_session_cookie(&mut response, &token, state.cookie_secure);
    Ok(response)
}

/// POST /api/v1/student/all
async fn list(
    State(state): State<AppState>,
    rotated: RotatedToken,
    body: Option<JsonBody<ListRequest>>,
) -> Result<ApiResponse<StudentPage>, ApiError> {
    let body = body.map(|JsonBody(b)| b).unwrap_or_default();
    let page = state.student_service.list(body.page, body.limit).await?;
    Ok(ApiResponse::new("Students fetched successfully", page).with_token(rotated))
}

/// POST /api/v1/student/update-student
async fn update(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<UpdateRequest>,
) -> Result<ApiResponse<StudentWithSubjects>, ApiError> {
    let student = state
        .student_service
        .update(UpdateStudentInput {
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
            new_email: body.new_email,
        })
        .await?;
    Ok(ApiResponse::new("Student updated successfully", student).with_token(rotated))
}

/// POST /api/v1/student/details
async fn details(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<EmailRequest>,
) -> Result<ApiResponse<StudentWithSubjects>, ApiError> {
    let student = state.student_service.details(&body.email).await?;
    Ok(ApiResponse::new("Student details fetched successfully", student).with_token(rotated))
}

/// POST /api/v1/student/delete
async fn soft_delete(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<EmailRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state.student_service.soft_delete(&body.email).await?;
    Ok(ApiResponse::message("Student deleted successfully").with_token(rotated))
}

/// POST /api/v1/student/update-marks
async fn update_marks(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<MarksRequest>,
) -> Result<ApiResponse<StudentWithSubjects>, ApiError> {
    let student = state
        .student_service
        .update_marks(&body.email, body.subject_id, body.marks)
        .await?;
    Ok(ApiResponse::new("Marks updated successfully", student).with_token(rotated))
}

/// POST /api/v1/student/update-subjects
async fn update_subjects(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<SubjectsRequest>,
) -> Result<ApiResponse<StudentWithSubjects>, ApiError> {
    let student = state
        .student_service
        .update_subjects(&body.email, &body.subject_names)
        .await?;
    Ok(ApiResponse::new("Subjects updated successfully", student).with_token(rotated))
}

/// POST /api/v1/student/delete-subject
async fn remove_subject(
    State(state): State<AppState>,
    rotated: RotatedToken,
    JsonBody(body): JsonBody<RemoveSubjectRequest>,
) -> Result<ApiResponse<StudentWithSubjects>, ApiError> {
    let student = state
        .student_service
        .remove_subject(&body.email, body.subject_id)
        .await?;
    Ok(ApiResponse::new("Subject removed successfully", student).with_token(rotated))
}

/// POST /api/v1/student/details-linked-parent
async fn linked_to_parent(
    State(state): State<AppState>,
    rotated: RotatedToken,
) -> Result<ApiResponse<Vec<StudentWithParent>>, ApiError> {
    let students = state.student_service.linked_to_parent().await?;
    Ok(ApiResponse::new("Students with a parent fetched successfully", students)
        .with_token(rotated))
}

/// POST /api/v1/student/details-not-linked-parent
async fn not_linked_to_parent(
    State(state): State<AppState>,
    rotated: RotatedToken,
) -> Result<ApiResponse<Vec<Student>>, ApiError> {
    let students = state.student_service.not_linked_to_parent().await?;
    Ok(ApiResponse::new("Students without a parent fetched successfully", students)
        .with_token(rotated))
}
