use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::iperf3::Iperf3Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Measurement(#[from] Iperf3Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Measurement(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = json!({ "success": false, "data": self.to_string() });
        // Samples gathered before an abnormal exit are still returned.
        if let AppError::Measurement(err) = &self {
            if let Some(partial) = err.partial_result() {
                body["partial"] = json!(partial);
            }
        }
        (status, Json(body)).into_response()
    }
}
