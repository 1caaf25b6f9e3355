// Handlers for the pairing HTTP surface

use super::{AppState, MultipartExtractor, error::ApiError, models::UploadAck};
use crate::error::CaptureError;
use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::StatusCode,
    response::Html,
};
use axum_extra::{TypedHeader, typed_header::TypedHeaderRejection};
use headers::ContentType;
use mime::Mime;
use tracing::{debug, info, warn};
use uuid::Uuid;

// --- GET / ---
// Serves the self-contained capture page
pub async fn capture_page(State(state): State<AppState>) -> Html<Bytes> {
    Html(state.page.clone())
}

// --- POST / ---
// Accepts one photo as multipart/form-data and stores it in the relay slot
pub async fn upload_image(
    State(state): State<AppState>,
    content_type: Result<TypedHeader<ContentType>, TypedHeaderRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadAck>, ApiError> {
    let upload_id = Uuid::new_v4();

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let err = CaptureError::PayloadTooLarge {
                limit: state.max_upload_bytes,
            };
            warn!("Upload {} rejected: {}", upload_id, err);
            ApiError::from(err)
        } else {
            ApiError::BadRequest(format!(
                "Failed to read request body: {}",
                rejection.body_text()
            ))
        }
    })?;

    let TypedHeader(content_type) = content_type.map_err(|err| {
        ApiError::UnsupportedMediaType(format!("Missing or invalid Content-Type: {}", err))
    })?;
    let mime = Mime::from(content_type);

    debug!(
        "Upload {}: {} bytes with Content-Type {}",
        upload_id,
        body.len(),
        mime
    );

    let image = MultipartExtractor::from_content_type(&mime)
        .and_then(|extractor| extractor.extract(&body, &state.field_name))
        .map_err(|err| {
            warn!("Upload {} rejected: {}", upload_id, err);
            ApiError::from(CaptureError::from(err))
        })?;

    info!("Upload {} accepted: {} byte image", upload_id, image.len());
    state.relay.set(image);

    Ok(Json(UploadAck::success()))
}
