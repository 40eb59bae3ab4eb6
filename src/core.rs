use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use walkdir::WalkDir;

use crate::{
    archive::ZipBundle,
    config::ConversionDefaults,
    converter::{ConversionSettings, ConvertedImage, ImageConverter},
    naming::{output_file_name, NameDeduplicator},
    progress::ProgressReporter,
    stats::ConversionStats,
    utils::{has_image_extension, validate_image_file},
    BatchReport,
};

/// Where a local batch writes its results
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutput {
    /// One converted file per input inside this directory
    Directory(PathBuf),
    /// A single zip archive at this path
    Zip(PathBuf),
}

impl BatchOutput {
    pub fn path(&self) -> &Path {
        match self {
            Self::Directory(path) | Self::Zip(path) => path,
        }
    }
}

/// Options for converting local files
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub inputs: Vec<PathBuf>,
    pub output: BatchOutput,
    pub settings: ConversionSettings,
    pub defaults: ConversionDefaults,
    pub recursive: bool,
    pub overwrite: bool,
    pub threads: Option<usize>,
}

impl BatchOptions {
    pub fn new(inputs: Vec<PathBuf>, output: BatchOutput, settings: ConversionSettings) -> Self {
        Self {
            inputs,
            output,
            settings,
            defaults: ConversionDefaults::default(),
            recursive: false,
            overwrite: false,
            threads: None,
        }
    }

    pub fn with_defaults(mut self, defaults: ConversionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

/// Size the global rayon pool. Only the first call takes effect.
pub fn configure_thread_pool(threads: Option<usize>) {
    if let Some(threads) = threads {
        if rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .is_err()
        {
            log::debug!("Thread pool already initialized, using existing configuration");
        }
    }
}

/// Converts local files with the same pipeline the server uses
pub struct BatchConverter {
    options: BatchOptions,
    stats: ConversionStats,
    // Files handled in the current run; scan-time skips are not counted
    completed: AtomicUsize,
}

impl BatchConverter {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            stats: ConversionStats::new(),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn run(&self) -> Result<BatchReport> {
        self.run_with_progress(None)
    }

    pub fn run_with_progress(
        &self,
        progress_reporter: Option<Box<dyn ProgressReporter>>,
    ) -> Result<BatchReport> {
        let start_time = Instant::now();
        let start_time_utc = Utc::now();

        configure_thread_pool(self.options.threads);
        self.completed.store(0, Ordering::Relaxed);

        if let BatchOutput::Zip(path) = &self.options.output {
            if path.exists() && !self.options.overwrite {
                bail!(
                    "Archive already exists: {} (use --overwrite to replace it)",
                    path.display()
                );
            }
        }

        let files = self.scan_inputs()?;
        if files.is_empty() {
            let mut report = self.create_report(start_time_utc, start_time, 0);
            report
                .errors
                .push("No supported image files found in the given inputs".to_string());
            return Ok(report);
        }

        let reporter = progress_reporter.as_deref();
        if let Some(reporter) = reporter {
            reporter.set_total_files(files.len());
            reporter.start_conversion();
        }

        let converter = self
            .options
            .defaults
            .converter(self.options.settings.clone());
        let names = self.plan_output_names(&files);

        match &self.options.output {
            BatchOutput::Directory(dir) => {
                self.convert_to_directory(&converter, &files, &names, dir, reporter)?
            }
            BatchOutput::Zip(path) => self.convert_to_zip(&converter, &files, &names, path, reporter)?,
        }

        if let Some(reporter) = reporter {
            reporter.finish_conversion();
        }

        Ok(self.create_report(start_time_utc, start_time, files.len() as u64))
    }

    /// Collect input files; directories are filtered by extension and header
    fn scan_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };

        for input in &self.options.inputs {
            if input.is_file() {
                files.push(input.clone());
                continue;
            }
            if !input.is_dir() {
                bail!("Input path does not exist: {}", input.display());
            }

            for entry in WalkDir::new(input)
                .follow_links(false)
                .max_depth(max_depth)
                .sort_by_file_name()
            {
                let entry = entry.context("Failed to read directory entry")?;
                let path = entry.path();

                if !entry.file_type().is_file() || !has_image_extension(path) {
                    continue;
                }

                if let Err(e) = validate_image_file(path) {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    self.stats.record_skip();
                    continue;
                }

                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    fn plan_output_names(&self, files: &[PathBuf]) -> Vec<String> {
        let extension = &self.options.settings.target.extension;
        let mut names = NameDeduplicator::new();
        files
            .iter()
            .map(|path| {
                let original = path.file_name().and_then(|name| name.to_str());
                names.unique(&output_file_name(original, extension))
            })
            .collect()
    }

    fn convert_file(&self, converter: &ImageConverter, input: &Path) -> Result<(u64, ConvertedImage)> {
        let data = std::fs::read(input)
            .with_context(|| format!("Failed to read image: {}", input.display()))?;
        let converted = converter
            .convert(&data)
            .with_context(|| format!("Failed to convert: {}", input.display()))?;
        Ok((data.len() as u64, converted))
    }

    fn convert_to_directory(
        &self,
        converter: &ImageConverter,
        files: &[PathBuf],
        names: &[String],
        output_dir: &Path,
        reporter: Option<&dyn ProgressReporter>,
    ) -> Result<()> {
        std::fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        files.par_iter().zip(names.par_iter()).for_each(|(input, name)| {
            let output_path = output_dir.join(name);

            if output_path.exists() && !self.options.overwrite {
                log::debug!("Skipping existing file: {}", output_path.display());
                self.stats.record_skip();
            } else {
                let result = self.convert_file(converter, input).and_then(|(size, converted)| {
                    std::fs::write(&output_path, &converted.data).with_context(|| {
                        format!("Failed to write file: {}", output_path.display())
                    })?;
                    Ok((size, converted))
                });
                self.record_result(input, result, reporter);
            }

            self.update_progress(reporter);
        });

        Ok(())
    }

    fn convert_to_zip(
        &self,
        converter: &ImageConverter,
        files: &[PathBuf],
        names: &[String],
        archive_path: &Path,
        reporter: Option<&dyn ProgressReporter>,
    ) -> Result<()> {
        let results: Vec<_> = files
            .par_iter()
            .map(|input| {
                let result = self.convert_file(converter, input);
                if let Err(e) = &result {
                    self.record_failure(input, e, reporter);
                }
                self.update_progress(reporter);
                result
            })
            .collect();

        let mut bundle = ZipBundle::new();
        for ((input, name), result) in files.iter().zip(names).zip(results) {
            if let Ok((size, converted)) = result {
                bundle.add(name, &converted.data)?;
                self.record_success(input, size, &converted, reporter);
            }
        }

        if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        if bundle.is_empty() {
            log::warn!("No images converted; writing an empty archive");
        } else {
            log::info!("Writing {} entries to {}", bundle.len(), archive_path.display());
        }
        let bytes = bundle.finish()?;
        std::fs::write(archive_path, bytes)
            .with_context(|| format!("Failed to write archive: {}", archive_path.display()))?;

        Ok(())
    }

    fn record_result(
        &self,
        input: &Path,
        result: Result<(u64, ConvertedImage)>,
        reporter: Option<&dyn ProgressReporter>,
    ) {
        match result {
            Ok((size, converted)) => self.record_success(input, size, &converted, reporter),
            Err(e) => self.record_failure(input, &e, reporter),
        }
    }

    fn record_success(
        &self,
        input: &Path,
        original_size: u64,
        converted: &ConvertedImage,
        reporter: Option<&dyn ProgressReporter>,
    ) {
        let converted_size = converted.data.len() as u64;
        self.stats
            .record_success(converted.format, original_size, converted_size);
        if let Some(reporter) = reporter {
            reporter.report_success(&input.display().to_string(), original_size, converted_size);
        }
    }

    fn record_failure(
        &self,
        input: &Path,
        error: &anyhow::Error,
        reporter: Option<&dyn ProgressReporter>,
    ) {
        let message = format!("{error:#}");
        log::error!("{message}");
        if let Some(reporter) = reporter {
            reporter.report_error(&input.display().to_string(), &message);
        }
        self.stats.record_error(input.display().to_string(), message);
    }

    fn update_progress(&self, reporter: Option<&dyn ProgressReporter>) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(reporter) = reporter {
            reporter.update_progress(
                completed,
                self.stats.error_count.load(Ordering::Relaxed) as usize,
            );
        }
    }

    fn create_report(
        &self,
        start_time_utc: DateTime<Utc>,
        start_time: Instant,
        total_files: u64,
    ) -> BatchReport {
        let duration = start_time.elapsed();
        let processed = self.stats.processed_count.load(Ordering::Relaxed);
        let seconds = duration.as_secs_f64();

        BatchReport {
            start_time: start_time_utc,
            end_time: Utc::now(),
            duration,
            output: self.options.output.path().to_path_buf(),
            total_files,
            processed_files: processed,
            failed_files: self.stats.error_count.load(Ordering::Relaxed),
            skipped_files: self.stats.skipped_count.load(Ordering::Relaxed),
            original_size: self.stats.original_size.load(Ordering::Relaxed),
            converted_size: self.stats.converted_size.load(Ordering::Relaxed),
            compression_ratio: self.stats.get_compression_ratio(),
            files_per_second: if seconds > 0.0 { processed as f64 / seconds } else { 0.0 },
            thread_count: rayon::current_num_threads(),
            quality: self.options.settings.quality,
            format: self.options.settings.format().name().to_string(),
            format_stats: self.stats.get_format_stats(),
            errors: self.stats.get_errors(),
        }
    }

    /// Get current conversion statistics
    pub fn get_stats(&self) -> &ConversionStats {
        &self.stats
    }
}
