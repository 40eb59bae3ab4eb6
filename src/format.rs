use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ConvertError;

/// Output formats the converter can encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
    Bmp,
    Gif,
}

impl OutputFormat {
    const ALL: [OutputFormat; 7] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Avif,
        OutputFormat::Tiff,
        OutputFormat::Bmp,
        OutputFormat::Gif,
    ];

    pub fn all() -> &'static [OutputFormat] {
        &Self::ALL
    }

    /// Parse a user supplied format token (`jpg`, `JPEG`, `webp`, ...)
    pub fn parse(token: &str) -> Result<Self, ConvertError> {
        let format = match token.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::Webp,
            "avif" => Self::Avif,
            "tif" | "tiff" => Self::Tiff,
            "bmp" => Self::Bmp,
            "gif" => Self::Gif,
            _ => return Err(ConvertError::UnsupportedFormat(token.trim().to_string())),
        };
        Ok(format)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Webp => "WEBP",
            Self::Avif => "AVIF",
            Self::Tiff => "TIFF",
            Self::Bmp => "BMP",
            Self::Gif => "GIF",
        }
    }

    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
        }
    }

    pub const fn canonical_extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
        }
    }

    /// Whether the quality setting changes the encoder output
    pub const fn supports_quality(self) -> bool {
        matches!(self, Self::Jpeg | Self::Webp | Self::Avif)
    }

    /// Whether an EXIF block from the source can be written into this format
    pub const fn carries_exif(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A parsed output format plus the file extension the caller asked for.
///
/// Output names keep the requested spelling, so `jpeg` produces `photo.jpeg`
/// while `jpg` produces `photo.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedFormat {
    pub format: OutputFormat,
    pub extension: String,
}

impl RequestedFormat {
    pub fn parse(token: &str) -> Result<Self, ConvertError> {
        let format = OutputFormat::parse(token)?;
        Ok(Self {
            format,
            extension: token.trim().to_ascii_lowercase(),
        })
    }
}

impl From<OutputFormat> for RequestedFormat {
    fn from(format: OutputFormat) -> Self {
        Self {
            format,
            extension: format.canonical_extension().to_string(),
        }
    }
}

/// Format description served by `GET /api/formats`
#[derive(Debug, Clone, Serialize)]
pub struct FormatInfo {
    pub format: OutputFormat,
    pub name: &'static str,
    pub extension: &'static str,
    pub mime_type: &'static str,
    pub supports_quality: bool,
}

impl From<OutputFormat> for FormatInfo {
    fn from(format: OutputFormat) -> Self {
        Self {
            format,
            name: format.name(),
            extension: format.canonical_extension(),
            mime_type: format.mime_type(),
            supports_quality: format.supports_quality(),
        }
    }
}
