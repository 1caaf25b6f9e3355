// Session-level settings supplied by the hosting application.

/// Port the original desktop application listened on.
pub const DEFAULT_PORT: u16 = 8080;

/// Pixel edge length of the rendered QR code.
pub const DEFAULT_QR_SIZE: u32 = 250;

// Phone cameras produce 3-12MB JPEGs; leave headroom for HEIF-to-JPEG conversions
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024; // 32MB

/// Form field the capture page appends the photo under.
pub const DEFAULT_FIELD_NAME: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Port to listen on. `0` lets the OS pick a free port.
    pub port: u16,
    pub qr_size: u32,
    pub max_upload_bytes: usize,
    pub field_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            qr_size: DEFAULT_QR_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            field_name: DEFAULT_FIELD_NAME.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_qr_size(mut self, qr_size: u32) -> Self {
        self.qr_size = qr_size;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }
}
