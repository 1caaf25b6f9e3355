// Static page served to the phone after it scans the pairing QR code.
// It offers a camera capture input and a gallery picker, previews the photo and
// posts it back as multipart/form-data.

const CAPTURE_PAGE_TEMPLATE: &str = include_str!("capture_page.html");
const FIELD_NAME_PLACEHOLDER: &str = "__FIELD_NAME__";

/// Renders the page with the form field name the upload handler expects.
pub fn render_capture_page(field_name: &str) -> String {
    let escaped = field_name.replace('\\', "\\\\").replace('\'', "\\'");
    CAPTURE_PAGE_TEMPLATE.replace(FIELD_NAME_PLACEHOLDER, &escaped)
}
