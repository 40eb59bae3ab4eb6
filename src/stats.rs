use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::format::OutputFormat;

const MAX_ERROR_RECORDS: usize = 100;

/// Process-wide conversion counters. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct ConversionStats {
    pub processed_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub skipped_count: Arc<AtomicU64>,
    pub original_size: Arc<AtomicU64>,
    pub converted_size: Arc<AtomicU64>,
    format_stats: Arc<Mutex<HashMap<String, u64>>>,
    errors: Arc<Mutex<VecDeque<ErrorRecord>>>,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub file_name: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

/// Serializable view returned by `GET /api/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub original_bytes: u64,
    pub converted_bytes: u64,
    pub compression_ratio: f64,
    pub formats: HashMap<String, u64>,
    pub recent_errors: Vec<ErrorRecord>,
}

impl ConversionStats {
    pub fn new() -> Self {
        Self {
            processed_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            skipped_count: Arc::new(AtomicU64::new(0)),
            original_size: Arc::new(AtomicU64::new(0)),
            converted_size: Arc::new(AtomicU64::new(0)),
            format_stats: Arc::new(Mutex::new(HashMap::new())),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            started_at: Utc::now(),
        }
    }

    pub fn record_success(&self, format: OutputFormat, original_size: u64, converted_size: u64) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        self.original_size.fetch_add(original_size, Ordering::Relaxed);
        self.converted_size.fetch_add(converted_size, Ordering::Relaxed);
        if let Ok(mut stats) = self.format_stats.lock() {
            *stats
                .entry(format.canonical_extension().to_string())
                .or_insert(0) += 1;
        }
    }

    pub fn record_error(&self, file_name: impl Into<String>, error: impl Into<String>) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut errors) = self.errors.lock() {
            if errors.len() == MAX_ERROR_RECORDS {
                errors.pop_front();
            }
            errors.push_back(ErrorRecord {
                file_name: file_name.into(),
                error_message: error.into(),
                timestamp: Utc::now(),
            });
        }
    }

    pub fn record_skip(&self) {
        self.skipped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Converted bytes over original bytes; 0 before anything was converted
    pub fn get_compression_ratio(&self) -> f64 {
        let original = self.original_size.load(Ordering::Relaxed) as f64;
        let converted = self.converted_size.load(Ordering::Relaxed) as f64;

        if original > 0.0 {
            converted / original
        } else {
            0.0
        }
    }

    pub fn get_format_stats(&self) -> HashMap<String, u64> {
        self.format_stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn get_errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .map(|errors| {
                errors
                    .iter()
                    .map(|e| format!("{}: {}", e.file_name, e.error_message))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let recent_errors = self
            .errors
            .lock()
            .map(|errors| errors.iter().cloned().collect())
            .unwrap_or_default();

        StatsSnapshot {
            started_at: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            processed: self.processed_count.load(Ordering::Relaxed),
            failed: self.error_count.load(Ordering::Relaxed),
            skipped: self.skipped_count.load(Ordering::Relaxed),
            original_bytes: self.original_size.load(Ordering::Relaxed),
            converted_bytes: self.converted_size.load(Ordering::Relaxed),
            compression_ratio: self.get_compression_ratio(),
            formats: self.get_format_stats(),
            recent_errors,
        }
    }
}

impl Default for ConversionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_formats() {
        let stats = ConversionStats::new();
        stats.record_success(OutputFormat::Webp, 1000, 250);
        stats.record_success(OutputFormat::Webp, 1000, 250);
        stats.record_success(OutputFormat::Jpeg, 2000, 1500);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.original_bytes, 4000);
        assert_eq!(snapshot.converted_bytes, 2000);
        assert!((snapshot.compression_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.formats["webp"], 2);
        assert_eq!(snapshot.formats["jpg"], 1);
    }

    #[test]
    fn ratio_is_zero_when_empty() {
        assert_eq!(ConversionStats::new().get_compression_ratio(), 0.0);
    }

    #[test]
    fn error_log_is_bounded() {
        let stats = ConversionStats::new();
        for i in 0..(MAX_ERROR_RECORDS + 5) {
            stats.record_error(format!("file{i}.png"), "bad header");
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed, (MAX_ERROR_RECORDS + 5) as u64);
        assert_eq!(snapshot.recent_errors.len(), MAX_ERROR_RECORDS);
        assert_eq!(snapshot.recent_errors[0].file_name, "file5.png");
        assert_eq!(stats.get_errors()[0], "file5.png: bad header");
    }

    #[test]
    fn clones_share_counters() {
        let stats = ConversionStats::new();
        let clone = stats.clone();
        clone.record_skip();
        clone.record_success(OutputFormat::Png, 10, 10);
        assert_eq!(stats.skipped_count.load(Ordering::Relaxed), 1);
        assert_eq!(stats.processed_count.load(Ordering::Relaxed), 1);
    }
}
