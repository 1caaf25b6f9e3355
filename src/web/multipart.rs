// Minimal multipart/form-data reader for the single photo the capture page uploads.
// Framing must be complete: a body without its header terminator or closing
// boundary is rejected instead of being passed through as image data.

use axum::body::Bytes;
use mime::Mime;
use thiserror::Error;

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("request is not multipart/form-data with a boundary parameter")]
    MissingBoundary,
    #[error("part headers are not terminated by a blank line")]
    MissingHeaderTerminator,
    #[error("closing boundary marker not found")]
    MissingClosingBoundary,
    #[error("no part named '{0}'")]
    FieldNotFound(String),
    #[error("part '{0}' has no content")]
    EmptyPart(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartExtractor {
    boundary: String,
}

impl MultipartExtractor {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    pub fn from_content_type(content_type: &Mime) -> Result<Self, MultipartError> {
        if content_type.type_() != mime::MULTIPART || content_type.subtype() != mime::FORM_DATA {
            return Err(MultipartError::MissingBoundary);
        }

        content_type
            .get_param(mime::BOUNDARY)
            .map(|b| b.as_str().to_string())
            .filter(|b| !b.is_empty())
            .map(Self::new)
            .ok_or(MultipartError::MissingBoundary)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Returns the content of the part named `field_name`, framing stripped.
    ///
    /// The returned `Bytes` shares the request body's allocation.
    pub fn extract(&self, body: &Bytes, field_name: &str) -> Result<Bytes, MultipartError> {
        let delimiter = format!("--{}", self.boundary).into_bytes();
        let part_separator = [CRLF, delimiter.as_slice()].concat();
        let closing = [part_separator.as_slice(), b"--"].concat();

        let closing_at = rfind(body, &closing).ok_or(MultipartError::MissingClosingBoundary)?;
        let first = find(&body[..closing_at], &delimiter)
            .ok_or(MultipartError::MissingClosingBoundary)?;

        let mut cursor = first + delimiter.len();
        loop {
            let headers_start = cursor + skip_crlf(&body[cursor..closing_at]);
            let headers_len = find(&body[headers_start..closing_at], HEADER_TERMINATOR)
                .ok_or(MultipartError::MissingHeaderTerminator)?;
            let content_start = headers_start + headers_len + HEADER_TERMINATOR.len();

            // The closing marker starts with the part separator, so this always finds one
            let content_end = find(&body[content_start..], &part_separator)
                .map(|i| content_start + i)
                .unwrap_or(closing_at)
                .min(closing_at);

            let headers = &body[headers_start..headers_start + headers_len];
            if disposition_name(headers).as_deref() == Some(field_name) {
                if content_end == content_start {
                    return Err(MultipartError::EmptyPart(field_name.to_string()));
                }
                return Ok(body.slice(content_start..content_end));
            }

            if content_end >= closing_at {
                return Err(MultipartError::FieldNotFound(field_name.to_string()));
            }
            cursor = content_end + part_separator.len();
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn skip_crlf(bytes: &[u8]) -> usize {
    if bytes.starts_with(CRLF) { CRLF.len() } else { 0 }
}

// Reads the `name` parameter of a part's Content-Disposition header.
fn disposition_name(headers: &[u8]) -> Option<String> {
    let headers = String::from_utf8_lossy(headers);
    headers.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("content-disposition") {
            return None;
        }
        value.split(';').skip(1).find_map(|param| {
            let (key, val) = param.trim().split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("name")
                .then(|| val.trim().trim_matches('"').to_string())
        })
    })
}
