use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::format::OutputFormat;

/// Errors produced while converting a single image
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("image exceeds decode limits: {0}")]
    Limits(#[source] image::ImageError),

    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("failed to encode {format}: {message}")]
    Encode { format: &'static str, message: String },

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub(crate) fn from_image(error: image::ImageError) -> Self {
        match error {
            image::ImageError::Limits(_) => Self::Limits(error),
            other => Self::Decode(other),
        }
    }

    pub(crate) fn encode(format: OutputFormat, error: impl std::fmt::Display) -> Self {
        Self::Encode {
            format: format.name(),
            message: error.to_string(),
        }
    }

    /// True when the failure is caused by the uploaded bytes rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::Decode(_)
                | Self::Limits(_)
                | Self::InvalidDimensions { .. }
        )
    }
}

/// Errors raised while turning form fields into conversion settings
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    #[error("No format specified")]
    MissingFormat,

    #[error("Unsupported format")]
    UnsupportedFormat(String),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image provided")]
    NoImage,

    #[error("No images provided")]
    NoImages,

    #[error("Too many images (limit is {limit})")]
    TooManyImages { limit: usize },

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{context}: {source}")]
    Conversion {
        context: &'static str,
        file: Option<String>,
        #[source]
        source: ConvertError,
    },

    #[error("{context}: {detail}")]
    Internal {
        context: &'static str,
        detail: String,
    },
}

impl ApiError {
    pub fn conversion(context: &'static str, file: Option<String>, source: ConvertError) -> Self {
        Self::Conversion {
            context,
            file,
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoImage | Self::NoImages | Self::TooManyImages { .. } | Self::Options(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Multipart(e) => e.status(),
            Self::Conversion { source, .. } if source.is_client_error() => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Conversion { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failed conversions and server faults log at error; malformed
    /// requests only at warn.
    pub fn log_level(&self) -> log::Level {
        match self {
            Self::Conversion { .. } | Self::Internal { .. } => log::Level::Error,
            _ if self.status().is_server_error() => log::Level::Error,
            _ => log::Level::Warn,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self.log_level() {
            log::Level::Error => log::error!("Error response: {} - {}", status, self),
            _ => log::warn!("Rejected request: {} - {}", status, self),
        }

        let body = match &self {
            Self::Multipart(e) => json!({ "error": "Invalid upload", "detail": e.body_text() }),
            Self::Conversion {
                context,
                file,
                source,
            } if status == StatusCode::UNPROCESSABLE_ENTITY => {
                let detail = match file {
                    Some(file) => format!("{file}: {source}"),
                    None => source.to_string(),
                };
                json!({ "error": context, "detail": detail })
            }
            Self::Conversion { context, .. } | Self::Internal { context, .. } => {
                json!({ "error": context })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_errors_are_kept_apart_from_decode_errors() {
        let limits = image::ImageError::Limits(image::error::LimitError::from_kind(
            image::error::LimitErrorKind::DimensionError,
        ));
        assert!(matches!(ConvertError::from_image(limits), ConvertError::Limits(_)));

        let io = image::ImageError::IoError(std::io::Error::other("truncated"));
        assert!(matches!(ConvertError::from_image(io), ConvertError::Decode(_)));
    }

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::NoImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(OptionsError::MissingFormat).status(),
            StatusCode::BAD_REQUEST
        );

        let bad_input = ApiError::conversion(
            "Failed to convert image",
            None,
            ConvertError::InvalidDimensions {
                width: 0,
                height: 3,
            },
        );
        assert_eq!(bad_input.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let encoder_failure = ApiError::conversion(
            "Failed to convert image",
            None,
            ConvertError::encode(OutputFormat::Avif, "out of memory"),
        );
        assert_eq!(encoder_failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conversion_failures_log_at_error() {
        let bad_input = ApiError::conversion(
            "Failed to convert image",
            Some("broken.png".into()),
            ConvertError::InvalidDimensions {
                width: 0,
                height: 3,
            },
        );
        assert_eq!(bad_input.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(bad_input.log_level(), log::Level::Error);

        let internal = ApiError::Internal {
            context: "Failed to convert image",
            detail: "worker panicked".into(),
        };
        assert_eq!(internal.log_level(), log::Level::Error);

        assert_eq!(ApiError::NoImages.log_level(), log::Level::Warn);
        assert_eq!(
            ApiError::from(OptionsError::MissingFormat).log_level(),
            log::Level::Warn
        );
    }

    #[test]
    fn options_errors_render_client_messages() {
        assert_eq!(OptionsError::MissingFormat.to_string(), "No format specified");
        assert_eq!(
            OptionsError::UnsupportedFormat("psd".into()).to_string(),
            "Unsupported format"
        );
    }
}
