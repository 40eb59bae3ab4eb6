//! # Convertly
//!
//! Image format conversion for the browser upload server and the local CLI.
//!
//! Uploaded or local images are decoded, optionally resized to fit a bounding
//! box, optionally stripped of metadata and re-encoded as JPEG, PNG, WebP,
//! AVIF, TIFF, BMP or GIF. Single results are returned as-is; batches are
//! bundled into a zip archive.

pub mod api;
pub mod archive;
pub mod config;
pub mod converter;
pub mod core;
pub mod error;
pub mod format;
pub mod naming;
pub mod progress;
pub mod request;
pub mod stats;
pub mod utils;

// Re-export commonly used types
pub use api::{create_router, AppState};
pub use config::{Config, ConversionDefaults, ProfileConfig, ServerOptions};
pub use converter::{ConversionSettings, ConvertedImage, DecodeLimits, ImageConverter};
pub use core::{BatchConverter, BatchOptions, BatchOutput};
pub use error::{ApiError, ConvertError, OptionsError};
pub use format::{OutputFormat, RequestedFormat};
pub use progress::ProgressReporter;
pub use stats::ConversionStats;
pub use utils::{format_duration, validate_image_file, ImageValidationError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of a local batch conversion
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    /// Output directory or archive path
    pub output: PathBuf,
    pub total_files: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub skipped_files: u64,
    pub original_size: u64,
    pub converted_size: u64,
    pub compression_ratio: f64,
    pub files_per_second: f64,
    pub thread_count: usize,
    pub quality: u8,
    pub format: String,
    pub format_stats: HashMap<String, u64>,
    pub errors: Vec<String>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.failed_files > 0
    }
}

/// Write the report as pretty JSON
pub fn write_report(report: &BatchReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}
