use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app_state::AppState;
use crate::services::inference::ImageInput;

/// POST /api/v1/analyze - upload a vegetable photo (multipart field `image`).
///
/// A photo the model rejects as not a vegetable comes back as 400 with the
/// verdict as body; every other outcome, degraded included, is 200.
pub async fn analyze_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, StatusCode> {
    let mut upload: Option<ImageInput> = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        if field.name() == Some("image") {
            let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

            let format =
                image::guess_format(&data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;

            upload = Some(ImageInput::new(data.to_vec(), format.to_mime_type()));
        }
    }

    let image = upload.ok_or(StatusCode::BAD_REQUEST)?;
    tracing::info!(
        size_bytes = image.bytes.len(),
        content_type = %image.content_type,
        "Analysis requested"
    );

    let verdict = state.orchestrator.analyze(&image).await;

    let status = if verdict.is_invalid_image() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(verdict)).into_response())
}
