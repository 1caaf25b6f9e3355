// HTTP surface of the pairing server: capture page, CORS preflight and photo upload

mod app;
mod capture_page;
mod error;
mod handlers;
mod models;
mod multipart;

pub use app::create_app;
pub use capture_page::render_capture_page;
pub use error::ApiError;
pub use models::UploadAck;
pub use multipart::{MultipartError, MultipartExtractor};

use crate::relay_slot::RelaySlot;
use axum::body::Bytes;
use std::sync::Arc;

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelaySlot>,
    pub field_name: Arc<str>,
    pub max_upload_bytes: usize,
    page: Bytes,
}

impl AppState {
    pub fn new(relay: Arc<RelaySlot>, field_name: &str, max_upload_bytes: usize) -> Self {
        Self {
            relay,
            field_name: Arc::from(field_name),
            max_upload_bytes,
            page: Bytes::from(render_capture_page(field_name)),
        }
    }
}
