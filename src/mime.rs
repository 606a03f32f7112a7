//! MIME detection for payloads that arrive without a usable content type.

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Sniffs the image format from magic bytes, falling back to JPEG.
pub fn detect_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        [0x47, 0x49, 0x46, 0x38, ..] => "image/gif",
        [_, _, _, _, 0x66, 0x74, 0x79, 0x70, 0x68, 0x65, 0x69, 0x63, ..] => "image/heic",
        _ => {
            tracing::debug!(
                "Unrecognized image format (first 4 bytes: {:02X?}), assuming {}",
                &bytes[..bytes.len().min(4)],
                DEFAULT_IMAGE_MIME
            );
            DEFAULT_IMAGE_MIME
        }
    }
}

/// Picks the MIME type from a `Content-Type` header value, ignoring parameters.
///
/// Generic binary types say nothing about the image, so the bytes decide.
pub fn mime_from_header(header: Option<&str>, bytes: &[u8]) -> String {
    let essence = header
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match essence {
        Some(mime) if mime != "application/octet-stream" && mime != "binary/octet-stream" => mime,
        _ => detect_image_mime(bytes).to_string(),
    }
}
