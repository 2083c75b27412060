//! Configuration module
//!
//! Environment-driven configuration for storage, the thumbnail pipeline and
//! logging. `from_env` loads a `.env` file when present and then reads process
//! environment variables; `from_source` takes an arbitrary lookup so tests do
//! not have to mutate the process environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};
use crate::storage_types::StorageBackend;

// Common constants
const DEFAULT_STORAGE_ALIAS: &str = "default";
const DEFAULT_THUMBNAIL_SIZES: &str = "64,256";
const TOOL_TIMEOUT_SECS: u64 = 60;
const MAX_THUMBNAIL_CONCURRENCY: usize = 4;
const VIDEO_FRAME_INDEX: u32 = 1;
const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Variable lookup used by every `from_source` constructor
pub type EnvSource<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv() {
    // A missing .env file is the normal case outside development.
    let _ = dotenvy::dotenv();
}

fn parse_or<T: FromStr>(source: EnvSource<'_>, key: &str, default: T) -> T {
    source(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(source: EnvSource<'_>, key: &str) -> Option<String> {
    source(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Storage adapter configuration
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Alias the configured adapter is registered under
    pub alias: String,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// HMAC key for local signed URLs; without it the local adapter has no
    /// signed URL capability
    pub local_storage_signing_key: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers
}

impl StorageConfig {
    pub fn from_env() -> CoreResult<Self> {
        load_dotenv();
        Self::from_source(&process_env)
    }

    pub fn from_source(source: EnvSource<'_>) -> CoreResult<Self> {
        let backend = match non_empty(source, "STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::Local,
        };

        let config = Self {
            backend,
            alias: non_empty(source, "STORAGE_ALIAS")
                .unwrap_or_else(|| DEFAULT_STORAGE_ALIAS.to_string()),
            local_storage_path: non_empty(source, "LOCAL_STORAGE_PATH"),
            local_storage_base_url: non_empty(source, "LOCAL_STORAGE_BASE_URL"),
            local_storage_signing_key: non_empty(source, "LOCAL_STORAGE_SIGNING_KEY"),
            s3_bucket: non_empty(source, "S3_BUCKET"),
            s3_region: non_empty(source, "S3_REGION").or_else(|| non_empty(source, "AWS_REGION")),
            s3_endpoint: non_empty(source, "S3_ENDPOINT"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the selected backend has everything it needs
    pub fn validate(&self) -> CoreResult<()> {
        match self.backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(CoreError::Validation("S3_BUCKET not configured".to_string()));
                }
                if self.s3_region.is_none() {
                    return Err(CoreError::Validation(
                        "S3_REGION or AWS_REGION not configured".to_string(),
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(CoreError::Validation(
                        "LOCAL_STORAGE_PATH not configured".to_string(),
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(CoreError::Validation(
                        "LOCAL_STORAGE_BASE_URL not configured".to_string(),
                    ));
                }
            }
            StorageBackend::Memory => {}
        }
        Ok(())
    }
}

/// What a hung external tool brings down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Only the size whose tool timed out fails
    #[default]
    FailSize,
    /// The whole pipeline invocation fails and in-flight tools are killed
    FailPipeline,
}

impl FromStr for TimeoutPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "size" => Ok(TimeoutPolicy::FailSize),
            "pipeline" => Ok(TimeoutPolicy::FailPipeline),
            _ => Err(CoreError::Validation(format!("Invalid timeout policy: {}", s))),
        }
    }
}

/// Thumbnail pipeline configuration
#[derive(Clone, Debug)]
pub struct ThumbnailConfig {
    pub sizes: Vec<u32>,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// ImageMagick `convert`, used to rasterize documents
    pub convert_path: String,
    pub tool_timeout: Duration,
    pub pipeline_timeout: Option<Duration>,
    pub timeout_policy: TimeoutPolicy,
    pub max_concurrency: usize,
    /// Padding colour around resized images (RGB)
    pub background: [u8; 3],
    /// Parent directory for workspaces; the system temp dir when unset
    pub workspace_root: Option<PathBuf>,
    /// Frame index the video extractor selects from
    pub video_frame_index: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            sizes: vec![64, 256],
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            convert_path: "convert".to_string(),
            tool_timeout: Duration::from_secs(TOOL_TIMEOUT_SECS),
            pipeline_timeout: None,
            timeout_policy: TimeoutPolicy::FailSize,
            max_concurrency: MAX_THUMBNAIL_CONCURRENCY,
            background: DEFAULT_BACKGROUND,
            workspace_root: None,
            video_frame_index: VIDEO_FRAME_INDEX,
        }
    }
}

impl ThumbnailConfig {
    pub fn from_env() -> CoreResult<Self> {
        load_dotenv();
        Self::from_source(&process_env)
    }

    pub fn from_source(source: EnvSource<'_>) -> CoreResult<Self> {
        let defaults = Self::default();

        let sizes = parse_sizes(
            &non_empty(source, "THUMBNAIL_SIZES")
                .unwrap_or_else(|| DEFAULT_THUMBNAIL_SIZES.to_string()),
        )?;

        let timeout_policy = match non_empty(source, "THUMBNAIL_TIMEOUT_POLICY") {
            Some(value) => value.parse()?,
            None => defaults.timeout_policy,
        };

        let background = match non_empty(source, "THUMBNAIL_BACKGROUND") {
            Some(value) => parse_hex_color(&value)?,
            None => defaults.background,
        };

        let pipeline_timeout = non_empty(source, "THUMBNAIL_PIPELINE_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            sizes,
            ffmpeg_path: non_empty(source, "FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: non_empty(source, "FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            convert_path: non_empty(source, "CONVERT_PATH").unwrap_or(defaults.convert_path),
            tool_timeout: Duration::from_secs(parse_or(
                source,
                "THUMBNAIL_TOOL_TIMEOUT_SECS",
                TOOL_TIMEOUT_SECS,
            )),
            pipeline_timeout,
            timeout_policy,
            max_concurrency: parse_or(
                source,
                "THUMBNAIL_MAX_CONCURRENCY",
                MAX_THUMBNAIL_CONCURRENCY,
            )
            .max(1),
            background,
            workspace_root: non_empty(source, "THUMBNAIL_WORKSPACE_ROOT").map(PathBuf::from),
            video_frame_index: parse_or(source, "VIDEO_FRAME_INDEX", VIDEO_FRAME_INDEX),
        })
    }
}

fn parse_sizes(value: &str) -> CoreResult<Vec<u32>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u32>() {
            Ok(size) if size > 0 => Ok(size),
            _ => Err(CoreError::Validation(format!(
                "Invalid thumbnail size: {}",
                s
            ))),
        })
        .collect()
}

fn parse_hex_color(value: &str) -> CoreResult<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    let invalid = || CoreError::Validation(format!("Invalid background colour: {}", value));

    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Tracing subscriber configuration
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `stowage=debug`
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "stowage=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self::from_source(&process_env)
    }

    pub fn from_source(source: EnvSource<'_>) -> Self {
        let defaults = Self::default();
        Self {
            filter: non_empty(source, "RUST_LOG").unwrap_or(defaults.filter),
            format: match non_empty(source, "LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

/// All configuration sections
#[derive(Clone, Debug)]
pub struct Config {
    pub storage: StorageConfig,
    pub thumbnails: ThumbnailConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn from_env() -> CoreResult<Self> {
        load_dotenv();
        Self::from_source(&process_env)
    }

    pub fn from_source(source: EnvSource<'_>) -> CoreResult<Self> {
        Ok(Self {
            storage: StorageConfig::from_source(source)?,
            thumbnails: ThumbnailConfig::from_source(source)?,
            log: LogConfig::from_source(source),
        })
    }
}
