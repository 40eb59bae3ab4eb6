use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if total_seconds > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Get file extension (lowercase)
fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Input extensions mapped to the format name their header must sniff as
const INPUT_EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "jpeg"),
    ("jpeg", "jpeg"),
    ("png", "png"),
    ("gif", "gif"),
    ("bmp", "bmp"),
    ("tif", "tiff"),
    ("tiff", "tiff"),
    ("webp", "webp"),
    ("avif", "avif"),
];

// Longest header the sniffer looks at (ISO-BMFF `ftyp` brand ends at 12)
const HEADER_LEN: usize = 12;

/// Error types for image validation
#[derive(Debug, Error)]
pub enum ImageValidationError {
    #[error("Invalid file extension")]
    InvalidExtension,
    #[error("File not found")]
    FileNotFound,
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid image header")]
    InvalidHeader,
    #[error("File too small to be a valid image")]
    FileTooSmall,
}

/// Identify an encoded image by its magic number signature
pub fn detect_input_format(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.starts_with(b"BM") {
        Some("bmp")
    } else if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00])
        || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
    {
        Some("tiff")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else if bytes.len() >= 12
        && &bytes[4..8] == b"ftyp"
        && matches!(&bytes[8..12], b"avif" | b"avis")
    {
        Some("avif")
    } else {
        None
    }
}

/// Check if the path carries an extension the converter accepts as input
pub fn has_image_extension(path: &Path) -> bool {
    get_file_extension(path).is_some_and(|ext| expected_format(&ext).is_some())
}

fn expected_format(extension: &str) -> Option<&'static str> {
    INPUT_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, format)| *format)
}

/// Validate image file with detailed error information
pub fn validate_image_file(path: &Path) -> Result<(), ImageValidationError> {
    if !path.exists() {
        return Err(ImageValidationError::FileNotFound);
    }

    let extension = get_file_extension(path).ok_or(ImageValidationError::InvalidExtension)?;
    let expected = expected_format(&extension).ok_or(ImageValidationError::InvalidExtension)?;

    let mut header = Vec::with_capacity(HEADER_LEN);
    File::open(path)?
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)?;

    if header.len() < 2 {
        return Err(ImageValidationError::FileTooSmall);
    }

    match detect_input_format(&header) {
        Some(found) if found == expected => Ok(()),
        _ => Err(ImageValidationError::InvalidHeader),
    }
}
