//! Maps `manager_api::Error` onto the status codes spec.md §6 lists,
//! following `RegistryError`'s `IntoResponse` shape in the device-
//! registry reference rather than hand-rolling a body format per route.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use manager_api::Error;
use serde::Serialize;

pub struct ApiError(pub Error);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
