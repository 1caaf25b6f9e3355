// src/error.rs
// Error taxonomy for the capture relay. Every variant is recoverable by the
// hosting application, either by retrying an upload or by starting a new session.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::web::MultipartError;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// No active, non-loopback IPv4 interface could be found.
    #[error("no LAN-reachable IPv4 address found")]
    NoAddressFound,

    /// Enumerating interfaces failed at the OS level.
    #[error("failed to enumerate network interfaces: {0}")]
    InterfaceEnumeration(#[source] std::io::Error),

    #[error("failed to bind pairing server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The pairing URL does not fit in a QR symbol at the requested level.
    #[error("failed to encode pairing URL as QR code: {0}")]
    Encoding(#[from] qrcode::types::QrError),

    #[error("malformed multipart body: {0}")]
    MalformedMultipart(#[from] MultipartError),

    /// Rejected while buffering, before any multipart parsing.
    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// `proceed()` was called before an image arrived.
    #[error("no uploaded image is waiting in the relay slot")]
    EmptyRelay,

    #[error("failed to persist capture to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: PersistError,
    },

    #[error("no pairing session has been started")]
    NoActiveSession,

    /// A pairing server only ever listens once.
    #[error("pairing server was already started and cannot listen again")]
    SessionClosed,
}

/// Failures while turning uploaded bytes into a file on disk.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("uploaded bytes are not a decodable image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode capture as JPEG: {0}")]
    Encode(#[source] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persist worker failed: {0}")]
    Worker(String),
}

impl CaptureError {
    /// Whether the pairing session survives this failure and the phone can simply retry.
    pub fn keeps_session_listening(&self) -> bool {
        matches!(
            self,
            Self::Encoding(_)
                | Self::MalformedMultipart(_)
                | Self::PayloadTooLarge { .. }
                | Self::EmptyRelay
                | Self::Persist { .. }
        )
    }
}
