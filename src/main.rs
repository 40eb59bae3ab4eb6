use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use convertly::{
    api,
    config::{Config, ServerOptions},
    core::{configure_thread_pool, BatchConverter, BatchOptions, BatchOutput},
    request::{resolve_settings, FormFields},
    write_report, BatchReport, ConversionSettings,
};

#[cfg(feature = "cli")]
use convertly::progress::ConsoleProgressReporter;

/// Output directory used by `convert` when neither `--output` nor `--zip` is given
const DEFAULT_OUTPUT_DIR: &str = "converted";

/// convertly - image format conversion server and batch converter
///
/// Converts JPEG, PNG, WebP, AVIF, TIFF, BMP and GIF images between formats,
/// with optional resizing and EXIF preservation.
#[derive(Parser)]
#[command(name = "convertly")]
#[command(about = "convertly - image format conversion server and batch converter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Verbose output mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (warnings and results only)
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP conversion server
    Serve(ServeArgs),
    /// Convert local files or directories
    Convert(ConvertArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Directory with the front-end assets to serve
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Maximum request body size (MB)
    #[arg(long, value_name = "SIZE")]
    pub max_upload_mb: Option<u64>,

    /// Maximum number of images per batch request
    #[arg(long, value_name = "NUM")]
    pub max_files: Option<usize>,

    /// Number of conversion threads (defaults to CPU core count)
    #[arg(short, long, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Input files or directories
    #[arg(required = true, value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Target format (jpeg, jpg, png, webp, avif, tiff, tif, bmp, gif)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Output quality (1-100)
    #[arg(short, long, value_name = "QUALITY")]
    pub quality: Option<u8>,

    /// Maximum output width in pixels
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Maximum output height in pixels
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// Keep EXIF metadata (JPEG and PNG output only)
    #[arg(long)]
    pub preserve_exif: bool,

    /// Output directory
    #[arg(short, long, value_name = "DIR", conflicts_with = "zip")]
    pub output: Option<PathBuf>,

    /// Write all results into a single zip archive
    #[arg(long, value_name = "FILE")]
    pub zip: Option<PathBuf>,

    /// Scan directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Overwrite existing files
    #[arg(long)]
    pub overwrite: bool,

    /// Number of parallel threads (defaults to CPU core count)
    #[arg(short, long, value_name = "NUM")]
    pub threads: Option<usize>,

    /// Use a predefined configuration profile
    #[arg(long, value_name = "PROFILE")]
    pub profile: Option<String>,

    /// Save a JSON conversion report
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let (config, config_path) = Config::discover(cli.config.as_deref())?;
    match &config_path {
        Some(path) => log::info!("Loaded configuration from {}", path.display()),
        None => log::debug!("No configuration file found, using built-in defaults"),
    }

    match cli.command {
        Command::Serve(args) => run_server(&config, args),
        Command::Convert(args) => run_convert(&config, args, cli.quiet),
    }
}

fn run_server(config: &Config, args: ServeArgs) -> Result<()> {
    let mut options = ServerOptions::from_config(config);

    if let Some(bind) = args.bind {
        options = options.with_bind(bind);
    }
    if let Some(port) = args.port {
        options = options.with_port(port);
    }
    if let Some(static_dir) = args.static_dir {
        options = options.with_static_dir(static_dir);
    }
    if let Some(max_upload_mb) = args.max_upload_mb {
        options = options.with_max_upload_mb(max_upload_mb);
    }
    if let Some(max_files) = args.max_files {
        options = options.with_max_files(max_files);
    }
    if let Some(threads) = args.threads {
        options = options.with_threads(threads);
    }

    configure_thread_pool(Some(options.get_thread_count()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(api::serve(options))
}

fn run_convert(config: &Config, args: ConvertArgs, quiet: bool) -> Result<()> {
    let server_options = ServerOptions::from_config(config);
    let settings = cli_settings(&args, &server_options)?;

    let output = match (args.zip, args.output) {
        (Some(zip), _) => BatchOutput::Zip(zip),
        (None, Some(dir)) => BatchOutput::Directory(dir),
        (None, None) => BatchOutput::Directory(PathBuf::from(DEFAULT_OUTPUT_DIR)),
    };

    let mut options = BatchOptions::new(args.inputs, output, settings)
        .with_defaults(server_options.defaults.clone())
        .with_recursive(args.recursive)
        .with_overwrite(args.overwrite);
    if let Some(threads) = args.threads.or(server_options.threads) {
        options = options.with_threads(threads);
    }

    log::info!(
        "Converting to {} (quality {})",
        options.settings.format(),
        options.settings.quality
    );

    let converter = BatchConverter::new(options);

    #[cfg(feature = "cli")]
    let progress_reporter = if quiet {
        None
    } else {
        Some(Box::new(ConsoleProgressReporter::new()) as Box<dyn convertly::ProgressReporter>)
    };

    #[cfg(not(feature = "cli"))]
    let progress_reporter = None;

    let report = converter.run_with_progress(progress_reporter)?;

    if let Some(path) = &args.report {
        write_report(&report, path)?;
        println!("Report saved to: {}", path.display());
    }

    if !quiet {
        print_results_summary(&report);
    }

    if report.has_failures() {
        bail!("{} file(s) failed to convert", report.failed_files);
    }

    Ok(())
}

/// Resolve CLI flags the same way the server resolves form fields. Without a
/// format flag or a profile format, the configured default format is used.
fn cli_settings(args: &ConvertArgs, options: &ServerOptions) -> Result<ConversionSettings> {
    let fields = FormFields {
        format: args.format.clone(),
        quality: args.quality.map(|q| q.to_string()),
        width: args.width.map(|w| w.to_string()),
        height: args.height.map(|h| h.to_string()),
        preserve_exif: args.preserve_exif.then(|| "true".to_string()),
        profile: args.profile.clone(),
    };

    let profile_format = args
        .profile
        .as_ref()
        .and_then(|name| options.profiles.get(name))
        .and_then(|profile| profile.format.as_ref());
    let fields = if fields.format.is_none() && profile_format.is_none() {
        FormFields {
            format: Some(options.defaults.format.clone()),
            ..fields
        }
    } else {
        fields
    };

    resolve_settings(&fields, &options.defaults, &options.profiles)
        .context("Invalid conversion options")
}

fn print_results_summary(report: &BatchReport) {
    use humansize::{format_size, DECIMAL};

    println!("\n🎉 Conversion completed!");
    println!("📊 Results Summary:");
    println!("  ✅ Processed: {} files", report.processed_files);
    if report.failed_files > 0 {
        println!("  ❌ Failed: {} files", report.failed_files);
    }
    if report.skipped_files > 0 {
        println!("  ⏭️ Skipped: {} files", report.skipped_files);
    }

    if report.original_size > 0 {
        println!("\n💾 Size Analysis:");
        println!("  📦 Original size: {}", format_size(report.original_size, DECIMAL));
        println!("  🗜️ Converted size: {}", format_size(report.converted_size, DECIMAL));
        println!("  📐 Size ratio: {:.1}%", report.compression_ratio * 100.0);
    }

    println!("\n⏱️ Performance:");
    println!("  🕐 Duration: {}", convertly::format_duration(report.duration));
    println!("  🚀 Speed: {:.1} files/sec", report.files_per_second);
    println!("  🧵 Threads used: {}", report.thread_count);
    println!("  📁 Output: {}", report.output.display());

    if !report.errors.is_empty() && report.errors.len() <= 5 {
        println!("\n❌ Errors:");
        for error in &report.errors {
            println!("  • {error}");
        }
    } else if report.errors.len() > 5 {
        println!(
            "\n❌ {} errors occurred (use --report for full details)",
            report.errors.len()
        );
    }
}
