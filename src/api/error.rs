use crate::services::analyzer::AnalyzerError;
use crate::services::stager::StageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No image file uploaded")]
    MissingFile,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Staging error: {0}")]
    Stage(#[from] StageError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalyzerError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::MissingFile => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "No image file uploaded" })),
            )
                .into_response(),

            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }

            AppError::Stage(err) => stage_error_response(err),

            AppError::Analysis(err) => analysis_failure_response(err),
        }
    }
}

fn stage_error_response(err: StageError) -> Response {
    match err {
        StageError::UnsupportedMediaType(_) => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),

        StageError::PayloadTooLarge { .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),

        // Disk trouble is a server fault, not a client one.
        StageError::Io(e) => {
            tracing::error!("failed to stage upload: {}", e);
            failure_envelope("failed to store uploaded image")
        }
    }
}

/// The fixed envelope for every analyzer-side failure. Diagnostics (stderr,
/// raw stdout) stay in the server logs; the client only gets a short message.
fn analysis_failure_response(err: AnalyzerError) -> Response {
    match &err {
        AnalyzerError::Spawn(e) => {
            tracing::error!("analyzer failed to start: {}", e);
        }
        AnalyzerError::Wait(e) => {
            tracing::error!("analyzer failed while running: {}", e);
        }
        AnalyzerError::ExitStatus { status } => {
            tracing::error!("analyzer exited abnormally: {}", status);
        }
        AnalyzerError::Parse { source, raw_stdout } => {
            tracing::error!("failed to parse analyzer output: {}", source);
            tracing::error!("raw analyzer output: {}", raw_stdout);
        }
        AnalyzerError::Timeout(limit) => {
            tracing::error!("analyzer exceeded the {:?} time limit", limit);
        }
    }

    failure_envelope(&err.to_string())
}

fn failure_envelope(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Failed to process image",
            "message": message,
            "defects": [],
            "analysis": "Failed to analyze the PCB image due to a server error."
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    #[tokio::test]
    async fn test_wait_failure_uses_fixed_envelope() {
        let err = AppError::Analysis(AnalyzerError::Wait(std::io::Error::other("pipe closed")));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Failed to process image");
        assert_eq!(body["message"], "analyzer failed while running: pipe closed");
        assert_eq!(body["defects"], json!([]));
        assert_eq!(
            body["analysis"],
            "Failed to analyze the PCB image due to a server error."
        );
    }
}
