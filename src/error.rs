use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::db::{Violation, violation};

/// Every handler error ends up as `{"error": "..."}` with the matching status.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    BadRequest(String),
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Conflict(String),
    #[display(fmt = "{}", _0)]
    PayloadTooLarge(String),
    #[display(fmt = "{}", _0)]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }
}

impl std::error::Error for ApiError {}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match violation(&e) {
            Some(Violation::Unique) => ApiError::conflict("Record already exists"),
            Some(Violation::ForeignKey) => ApiError::bad_request("Referenced record does not exist"),
            Some(Violation::NotNull) => ApiError::bad_request("A required field is missing"),
            Some(Violation::TooLong) => ApiError::bad_request("A field value is too long"),
            None => match e {
                sqlx::Error::RowNotFound => ApiError::not_found("Record not found"),
                other => {
                    error!(error = %other, "Database error");
                    ApiError::Internal(other.to_string())
                }
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = %format!("{e:#}"), "Internal error");
        ApiError::Internal(format!("{e:#}"))
    }
}

impl From<actix_multipart::MultipartError> for ApiError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart payload: {e}"))
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        error!(error = %e, "Blocking task failed");
        ApiError::Internal(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `200 {"success": true, "data": ...}`
pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

/// `201 {"success": true, "data": ...}`
pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn error_body_carries_message() {
        let resp = ApiError::not_found("Employee not found").error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "error": "Employee not found" }));
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_errors_map_by_kind() {
        use crate::db::testing::db_error;

        let dup: ApiError = db_error(1062, "Duplicate entry 'E-1' for key 'employees.uq_employees_emp_id'").into();
        assert_eq!(dup.status_code(), StatusCode::CONFLICT);
        assert_eq!(dup.to_string(), "Record already exists");

        let null: ApiError = db_error(1048, "Column 'name' cannot be null").into();
        assert_eq!(null.status_code(), StatusCode::BAD_REQUEST);

        let fk: ApiError = db_error(1452, "Cannot add or update a child row").into();
        assert_eq!(fk.status_code(), StatusCode::BAD_REQUEST);

        let long: ApiError = db_error(1406, "Data too long for column 'phone' at row 1").into();
        assert_eq!(long.status_code(), StatusCode::BAD_REQUEST);

        let other: ApiError = db_error(1213, "Deadlock found").into();
        assert_eq!(other.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn anyhow_maps_to_500_with_context() {
        let err: ApiError = anyhow::anyhow!("disk full").context("writing workbook").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "writing workbook: disk full");
    }

    #[actix_web::test]
    async fn success_envelope() {
        let resp = ok(json!({ "total": 3 }));
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "success": true, "data": { "total": 3 } }));
    }
}
