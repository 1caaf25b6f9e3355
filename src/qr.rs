// QR encoding of the pairing URL into a square monochrome bitmap

use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::CaptureError;

/// Light modules kept around the symbol so camera decoders can find it.
pub const QUIET_ZONE_MODULES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCorrection {
    Low,
    #[default]
    Medium,
    Quartile,
    High,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(value: ErrorCorrection) -> Self {
        match value {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        }
    }
}

/// Square grid of dark (`true`) and light (`false`) pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrBitmap {
    size: u32,
    pixels: Vec<bool>,
}

impl QrBitmap {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_dark(&self, x: u32, y: u32) -> bool {
        if x >= self.size || y >= self.size {
            return false;
        }
        self.pixels[(y * self.size + x) as usize]
    }

    /// Dark maps to black, light to white.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.size, self.size, |x, y| {
            if self.is_dark(x, y) {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        })
    }

    /// Renders two pixel rows per text line with half-block characters.
    ///
    /// Light pixels are drawn as filled blocks so the code reads correctly on
    /// the usual light-on-dark terminal.
    pub fn to_terminal_string(&self) -> String {
        let mut out = String::new();
        let mut y = 0;
        while y < self.size {
            for x in 0..self.size {
                let top = !self.is_dark(x, y);
                let bottom = y + 1 < self.size && !self.is_dark(x, y + 1);
                out.push(match (top, bottom) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                });
            }
            out.push('\n');
            y += 2;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QrEncoder;

impl QrEncoder {
    /// Encodes `text` into a bitmap of at least `size` x `size` pixels.
    ///
    /// Modules are scaled by the largest whole factor that fits and the symbol is
    /// centred. If `size` is smaller than the symbol plus quiet zone, the bitmap
    /// grows to one pixel per module instead of cropping.
    pub fn encode(
        text: &str,
        size: u32,
        level: ErrorCorrection,
    ) -> Result<QrBitmap, CaptureError> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), level.into())?;
        let modules = code.width();
        let total = (modules + 2 * QUIET_ZONE_MODULES) as u32;

        let scale = (size / total).max(1);
        let out_size = size.max(total * scale);
        let offset = (out_size - total * scale) / 2;

        let mut pixels = vec![false; (out_size * out_size) as usize];
        for y in 0..out_size {
            for x in 0..out_size {
                let Some(mx) = module_index(x, offset, scale) else {
                    continue;
                };
                let Some(my) = module_index(y, offset, scale) else {
                    continue;
                };
                if mx < modules && my < modules && code[(mx, my)] == Color::Dark {
                    pixels[(y * out_size + x) as usize] = true;
                }
            }
        }

        tracing::debug!(
            "Encoded {} bytes into {}x{} module QR code, {} px per module",
            text.len(),
            modules,
            modules,
            scale
        );

        Ok(QrBitmap {
            size: out_size,
            pixels,
        })
    }
}

// Maps a pixel coordinate to a symbol module, or None inside the quiet zone.
fn module_index(pixel: u32, offset: u32, scale: u32) -> Option<usize> {
    let shifted = pixel.checked_sub(offset)? / scale;
    (shifted as usize).checked_sub(QUIET_ZONE_MODULES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bitmap: &QrBitmap) -> String {
        let size = bitmap.size() as usize;
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(size, size, |x, y| {
            if bitmap.is_dark(x as u32, y as u32) { 0 } else { 255 }
        });
        let grids = prepared.detect_grids();
        assert_eq!(grids.len(), 1, "expected exactly one QR grid");
        let (_meta, content) = grids[0].decode().unwrap();
        content
    }

    fn url_of_len(len: usize) -> String {
        let prefix = "http://192.168.1.20:8080/";
        let mut url = prefix.to_string();
        let mut i = 0;
        while url.len() < len {
            url.push((b'a' + (i % 26) as u8) as char);
            i += 1;
        }
        url.truncate(len);
        url
    }

    #[test]
    fn test_round_trip_short_and_long_urls() {
        for len in [10, 25, 50, 100, 150, 200] {
            let url = url_of_len(len);
            assert_eq!(url.len(), len);
            let bitmap = QrEncoder::encode(&url, 400, ErrorCorrection::Medium).unwrap();
            assert_eq!(decode(&bitmap), url);
        }
    }

    #[test]
    fn test_round_trip_default_pairing_size() {
        let url = "http://192.168.1.20:8080";
        let bitmap = QrEncoder::encode(url, 250, ErrorCorrection::default()).unwrap();
        assert_eq!(bitmap.size(), 250);
        assert_eq!(decode(&bitmap), url);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let url = "http://10.0.0.4:8080";
        let a = QrEncoder::encode(url, 250, ErrorCorrection::Medium).unwrap();
        let b = QrEncoder::encode(url, 250, ErrorCorrection::Medium).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_long_text_fails() {
        let text = "x".repeat(4000);
        assert!(matches!(
            QrEncoder::encode(&text, 250, ErrorCorrection::Medium),
            Err(CaptureError::Encoding(_))
        ));
    }

    #[test]
    fn test_small_size_grows_to_fit_symbol() {
        let bitmap = QrEncoder::encode("http://10.0.0.4:8080", 0, ErrorCorrection::Medium).unwrap();
        // One pixel per module: a version N symbol is 17 + 4N modules wide.
        let modules = bitmap.size() - 2 * QUIET_ZONE_MODULES as u32;
        assert!(modules >= 21);
        assert_eq!((modules - 17) % 4, 0);
        assert!(!bitmap.is_dark(0, 0));
        assert!(bitmap.is_dark(QUIET_ZONE_MODULES as u32, QUIET_ZONE_MODULES as u32));
    }

    #[test]
    fn test_gray_image_maps_dark_to_black() {
        let bitmap = QrEncoder::encode("http://10.0.0.4:8080", 0, ErrorCorrection::Medium).unwrap();
        let image = bitmap.to_gray_image();
        let q = QUIET_ZONE_MODULES as u32;

        assert_eq!(image.dimensions(), (bitmap.size(), bitmap.size()));
        assert_eq!(image.get_pixel(0, 0), &Luma([255]));
        assert_eq!(image.get_pixel(q, q), &Luma([0]));
    }

    #[test]
    fn test_terminal_rendering_packs_two_rows_per_line() {
        let bitmap = QrEncoder::encode("http://10.0.0.4:8080", 0, ErrorCorrection::Medium).unwrap();
        let text = bitmap.to_terminal_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len() as u32, bitmap.size().div_ceil(2));
        assert!(lines.iter().all(|l| l.chars().count() as u32 == bitmap.size()));
        // Quiet zone is light, so the first line is all full blocks.
        assert!(lines[0].chars().all(|c| c == '█'));
    }
}
