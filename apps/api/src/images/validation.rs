use crate::errors::AppError;

pub const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

pub const DEFAULT_MAX_BYTES: usize = 1536 * 1024;

/// Detects the content type from magic bytes, falling back to the type the
/// client declared when the bytes are not recognized.
pub fn detect_content_type(data: &[u8], declared: Option<&str>) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    declared
        .map(|d| d.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Checks an upload and returns its effective content type.
///
/// Rejects empty files, types outside [`ALLOWED_TYPES`] and files above
/// `max_bytes`.
pub fn validate_upload(data: &[u8], declared: Option<&str>, max_bytes: usize) -> Result<String, AppError> {
    if data.is_empty() {
        return Err(AppError::validation("No file provided"));
    }

    let content_type = detect_content_type(data, declared);
    if !ALLOWED_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::validation(format!(
            "Invalid file type. Allowed: {}",
            ALLOWED_TYPES.join(", ")
        )));
    }

    if data.len() > max_bytes {
        return Err(AppError::validation(format!(
            "File too large. Max size: {}",
            format_megabytes(max_bytes)
        )));
    }

    Ok(content_type)
}

/// File extension (with dot) for an allowed content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        _ => "",
    }
}

fn format_megabytes(bytes: usize) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}
