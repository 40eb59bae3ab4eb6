use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::converter::{ConversionSettings, DecodeLimits, ImageConverter};

/// File name looked up in the working directory when no `--config` is given
pub const LOCAL_CONFIG_FILE: &str = "convertly.toml";

/// Main configuration structure loaded from config files
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub conversion: Option<ConversionConfig>,
    pub profiles: Option<HashMap<String, ProfileConfig>>,
}

/// Named preset of conversion settings, selected with the `profile` form field
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ProfileConfig {
    pub description: Option<String>,
    pub format: Option<String>,
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preserve_exif: Option<bool>,
}

/// HTTP server configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub max_upload_mb: Option<u64>,
    pub max_files: Option<usize>,
    pub static_dir: Option<PathBuf>,
    pub cors: Option<bool>,
    pub threads: Option<usize>,
}

/// Conversion-related configuration
#[derive(Debug, Deserialize)]
pub struct ConversionConfig {
    pub default_quality: Option<u8>,
    pub default_format: Option<String>,
    pub avif_speed: Option<u8>,
    pub max_image_dimension: Option<u32>,
    pub max_decode_alloc_mb: Option<u64>,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load the explicit path, else `./convertly.toml`, else the user config
    /// directory, else built-in defaults. Returns the path that was used.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = std::iter::once(PathBuf::from(LOCAL_CONFIG_FILE)).chain(
            dirs::config_dir().map(|dir| dir.join("convertly").join("config.toml")),
        );

        for candidate in candidates {
            if candidate.is_file() {
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }
}

/// Defaults applied to every conversion request
#[derive(Debug, Clone)]
pub struct ConversionDefaults {
    pub quality: u8,
    pub format: String,
    pub avif_speed: u8,
    pub limits: DecodeLimits,
}

impl Default for ConversionDefaults {
    fn default() -> Self {
        Self {
            quality: 90,
            format: "webp".to_string(),
            avif_speed: 8,
            limits: DecodeLimits::default(),
        }
    }
}

impl ConversionDefaults {
    pub fn from_config(config: Option<&ConversionConfig>) -> Self {
        let mut defaults = Self::default();
        let Some(config) = config else {
            return defaults;
        };

        if let Some(quality) = config.default_quality {
            defaults.quality = quality.clamp(1, 100);
        }
        if let Some(format) = &config.default_format {
            defaults.format = format.clone();
        }
        if let Some(speed) = config.avif_speed {
            defaults.avif_speed = speed.clamp(1, 10);
        }
        if let Some(dimension) = config.max_image_dimension {
            defaults.limits.max_dimension = dimension;
        }
        if let Some(alloc_mb) = config.max_decode_alloc_mb {
            defaults.limits.max_alloc_bytes = alloc_mb.saturating_mul(1024 * 1024);
        }
        defaults
    }

    /// Build a converter for one request
    pub fn converter(&self, settings: ConversionSettings) -> ImageConverter {
        ImageConverter::new(settings)
            .with_limits(self.limits)
            .with_avif_speed(self.avif_speed)
    }
}

/// Resolved server options, built from the config file and CLI overrides
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub max_files: usize,
    pub static_dir: Option<PathBuf>,
    pub cors: bool,
    pub threads: Option<usize>,
    pub defaults: ConversionDefaults,
    pub profiles: HashMap<String, ProfileConfig>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            max_upload_bytes: 50 * 1024 * 1024,
            max_files: 100,
            static_dir: None,
            cors: true,
            threads: None,
            defaults: ConversionDefaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl ServerOptions {
    pub fn from_config(config: &Config) -> Self {
        let mut options = Self {
            defaults: ConversionDefaults::from_config(config.conversion.as_ref()),
            profiles: config.profiles.clone().unwrap_or_default(),
            ..Default::default()
        };

        if let Some(server) = &config.server {
            if let Some(bind) = &server.bind {
                options.bind = bind.clone();
            }
            if let Some(port) = server.port {
                options.port = port;
            }
            if let Some(max_upload_mb) = server.max_upload_mb {
                options = options.with_max_upload_mb(max_upload_mb);
            }
            if let Some(max_files) = server.max_files {
                options.max_files = max_files.max(1);
            }
            if let Some(cors) = server.cors {
                options.cors = cors;
            }
            options.static_dir = server.static_dir.clone();
            options.threads = server.threads;
        }

        options
    }

    /// Builder pattern for setting the bind address
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Builder pattern for setting the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern for setting the request body limit in MB
    pub fn with_max_upload_mb(mut self, max_upload_mb: u64) -> Self {
        self.max_upload_bytes = usize::try_from(max_upload_mb.saturating_mul(1024 * 1024))
            .unwrap_or(usize::MAX);
        self
    }

    /// Builder pattern for setting the static asset directory
    pub fn with_static_dir(mut self, static_dir: PathBuf) -> Self {
        self.static_dir = Some(static_dir);
        self
    }

    /// Builder pattern for setting the number of images per batch request
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.max(1);
        self
    }

    /// Builder pattern for setting thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Get the effective thread count (calculated if not set)
    pub fn get_thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
bind = "0.0.0.0"
port = 8080
max_upload_mb = 10
max_files = 20
cors = false

[conversion]
default_quality = 150
avif_speed = 6
max_image_dimension = 8000

[profiles.thumbnail]
description = "Small WebP previews"
format = "webp"
quality = 70
width = 320
height = 320

[profiles.archive]
format = "png"
preserve_exif = true
"#;

    #[test]
    fn parses_all_sections() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let options = ServerOptions::from_config(&config);

        assert_eq!(options.socket_addr(), "0.0.0.0:8080");
        assert_eq!(options.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(options.max_files, 20);
        assert!(!options.cors);
        assert_eq!(options.defaults.quality, 100);
        assert_eq!(options.defaults.avif_speed, 6);
        assert_eq!(options.defaults.limits.max_dimension, 8000);

        let thumbnail = &options.profiles["thumbnail"];
        assert_eq!(thumbnail.format.as_deref(), Some("webp"));
        assert_eq!(thumbnail.width, Some(320));
        assert_eq!(options.profiles["archive"].preserve_exif, Some(true));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let options = ServerOptions::from_config(&Config::from_toml_str("").unwrap());
        assert_eq!(options.socket_addr(), "127.0.0.1:3000");
        assert_eq!(options.defaults.quality, 90);
        assert!(options.profiles.is_empty());
        assert!(options.cors);
    }

    #[test]
    fn builders_override_file_values() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let options = ServerOptions::from_config(&config)
            .with_port(9000)
            .with_bind("127.0.0.1")
            .with_max_upload_mb(1)
            .with_max_files(0);
        assert_eq!(options.socket_addr(), "127.0.0.1:9000");
        assert_eq!(options.max_upload_bytes, 1024 * 1024);
        assert_eq!(options.max_files, 1);
    }

    #[test]
    fn huge_limits_saturate() {
        let config = Config::from_toml_str(
            "[server]\nmax_upload_mb = 9223372036854775807\n\n\
             [conversion]\nmax_decode_alloc_mb = 9223372036854775807\n",
        )
        .unwrap();
        let options = ServerOptions::from_config(&config);
        assert_eq!(options.defaults.limits.max_alloc_bytes, u64::MAX);
        assert_eq!(options.max_upload_bytes, usize::MAX);

        let config = Config::from_toml_str("[conversion]\nmax_decode_alloc_mb = 64\n").unwrap();
        let defaults = ConversionDefaults::from_config(config.conversion.as_ref());
        assert_eq!(defaults.limits.max_alloc_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::from_toml_str("[server\nport = 1").is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convertly.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let (config, used) = Config::discover(Some(&path)).unwrap();
        assert_eq!(used.as_deref(), Some(path.as_path()));
        assert!(config.profiles.unwrap().contains_key("thumbnail"));
    }
}
