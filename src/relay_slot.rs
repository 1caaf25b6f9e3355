// Single-item mailbox shared between the upload handlers and the session controller

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use axum::body::Bytes;
use tokio::sync::Notify;

/// An upload that passed multipart extraction but has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bytes: Bytes,
    pub received_at: SystemTime,
}

/// Holds at most one pending image. A newer `set` replaces an unconsumed one.
#[derive(Debug, Default)]
pub struct RelaySlot {
    slot: Mutex<Option<UploadedImage>>,
    ready: Notify,
}

impl RelaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, bytes: impl Into<Bytes>) {
        let image = UploadedImage {
            bytes: bytes.into(),
            received_at: SystemTime::now(),
        };
        let replaced = self.lock().replace(image);
        if replaced.is_some() {
            tracing::debug!("Replaced an unconsumed upload in the relay slot");
        }
        self.ready.notify_one();
    }

    /// Removes and returns the pending image, leaving the slot empty.
    pub fn take(&self) -> Option<UploadedImage> {
        self.lock().take()
    }

    pub fn peek_ready(&self) -> bool {
        self.lock().is_some()
    }

    /// Resolves after the next `set`, or immediately if a `set` happened since the last wait.
    pub async fn wait_ready(&self) {
        self.ready.notified().await;
    }

    // The guarded value is a plain Option, so a panic elsewhere cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, Option<UploadedImage>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
