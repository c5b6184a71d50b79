use crate::api::error::AppError;
use crate::services::stager::StageError;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::info;

/// `POST /api/analyze` — stage the uploaded image, run the external
/// analyzer on it, relay the analyzer's JSON verbatim.
pub async fn analyze_image(
    State(state): State<crate::AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let max_bytes = state.config.max_upload_bytes;
    let mut staged = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let original_filename = field.file_name().unwrap_or("upload").to_string();

        let body_with_io_error = field.map_err(std::io::Error::other);
        let reader = StreamReader::new(body_with_io_error);

        staged = Some(
            state
                .stager
                .stage(reader, &content_type, &original_filename)
                .await
                .map_err(|e| remap_transport_limit(e, max_bytes))?,
        );
        break;
    }

    let asset = staged.ok_or(AppError::MissingFile)?;

    info!(
        "Processing image: {} ({}, {} bytes)",
        asset.path.display(),
        asset.content_type,
        asset.size
    );

    let result = state.analyzer.analyze(&asset.path).await?;

    // The staged file is kept after analysis on purpose.
    Ok(Json(result))
}

/// A body cut off by the transport limit is reported as 413, same as the
/// stager's own ceiling; everything else multipart complains about is a 400.
fn multipart_error(err: MultipartError, max_bytes: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Stage(StageError::PayloadTooLarge { max_bytes })
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// The transport limit can also trip mid-field, surfacing inside the staged
/// stream as an I/O error wrapping the multipart error.
fn remap_transport_limit(err: StageError, max_bytes: u64) -> AppError {
    match err {
        StageError::Io(ref io_err)
            if io_err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<MultipartError>())
                .is_some_and(|m| m.status() == StatusCode::PAYLOAD_TOO_LARGE) =>
        {
            AppError::Stage(StageError::PayloadTooLarge { max_bytes })
        }
        other => AppError::Stage(other),
    }
}
