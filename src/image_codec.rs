// Decoding of uploaded photos and their persistence as JPEG captures

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

use crate::error::PersistError;

pub const CAPTURE_EXTENSION: &str = "jpg";
pub const JPEG_QUALITY: u8 = 90;

/// A capture written to the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCapture {
    pub file_path: PathBuf,
    pub file_name: String,
}

/// `captured_<epoch-millis>.jpg`. Two captures within the same millisecond
/// would collide; the session flow never produces that.
pub fn capture_file_name(at: SystemTime) -> String {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("captured_{}.{}", millis, CAPTURE_EXTENSION)
}

/// Decodes `bytes` in whatever format the phone sent and re-encodes them as JPEG.
pub fn reencode_as_jpeg(bytes: &[u8]) -> Result<Vec<u8>, PersistError> {
    let dyn_img = image::load_from_memory(bytes).map_err(PersistError::Decode)?;
    debug!(
        "Decoded upload: {}x{} {:?}",
        dyn_img.width(),
        dyn_img.height(),
        dyn_img.color()
    );

    // JPEG has no alpha channel
    let rgb = dyn_img.to_rgb8();

    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(PersistError::Encode)?;

    Ok(buffer.into_inner())
}

/// Validates `bytes` as an image and writes them to `storage_dir` as a new capture.
///
/// The JPEG is written to a `.part` sibling first and renamed into place, so the
/// final path never holds a partial file.
pub fn persist_capture(
    bytes: &[u8],
    storage_dir: &Path,
    at: SystemTime,
) -> Result<PersistedCapture, (PathBuf, PersistError)> {
    let file_name = capture_file_name(at);
    let target = storage_dir.join(&file_name);

    write_capture(bytes, storage_dir, &target)
        .map(|file_path| PersistedCapture {
            file_path,
            file_name,
        })
        .map_err(|err| (target, err))
}

fn write_capture(bytes: &[u8], storage_dir: &Path, target: &Path) -> Result<PathBuf, PersistError> {
    let jpeg = reencode_as_jpeg(bytes)?;

    fs::create_dir_all(storage_dir)?;
    write_via_partial(target, |file| file.write_all(&jpeg))?;

    if fs::metadata(target)?.len() == 0 {
        return Err(PersistError::Io(std::io::Error::other(
            "capture file is empty after write",
        )));
    }

    Ok(fs::canonicalize(target)?)
}

// Writes `target` through a `.part` sibling. On any failure the sibling is removed.
fn write_via_partial(
    target: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let partial = target.with_extension(format!("{}.part", CAPTURE_EXTENSION));
    let result = fs::File::create(&partial)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&partial, target));

    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}
