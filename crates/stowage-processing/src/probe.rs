//! Media metadata extraction
//!
//! Fills the media fields of a [`FileDescriptor`] from a staged local copy:
//! image dimensions from the file header, video stream details from
//! `ffprobe` JSON output.

use std::path::Path;

use anyhow::{anyhow, Context};
use stowage_core::FileDescriptor;

use crate::classify::MediaClass;
use crate::error::{ProcessingError, ProcessingResult};
#[cfg(feature = "image")]
use crate::raster;
use crate::tools::{Tool, ToolContext};

/// Video stream details reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub bitrate: Option<u64>,
    pub framerate: Option<f32>,
}

impl VideoMetadata {
    /// Parse `ffprobe -print_format json -show_format -show_streams` output
    pub fn from_ffprobe_json(stdout: &[u8]) -> anyhow::Result<Self> {
        let probe_data: serde_json::Value =
            serde_json::from_slice(stdout).context("Failed to parse ffprobe output")?;

        let stream = probe_data["streams"]
            .get(0)
            .ok_or_else(|| anyhow!("No video stream found"))?;

        let format = &probe_data["format"];

        let duration = format["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| anyhow!("Could not parse duration"))?;

        let width = stream["width"]
            .as_u64()
            .ok_or_else(|| anyhow!("Could not parse width"))? as u32;

        let height = stream["height"]
            .as_u64()
            .ok_or_else(|| anyhow!("Could not parse height"))? as u32;

        let codec = stream["codec_name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        let bitrate = format["bit_rate"]
            .as_str()
            .and_then(|b| b.parse::<u64>().ok());

        let framerate = stream["r_frame_rate"].as_str().and_then(|r| {
            let (num, den) = r.split_once('/')?;
            let num: f32 = num.parse().ok()?;
            let den: f32 = den.parse().ok()?;
            if den != 0.0 {
                Some(num / den)
            } else {
                None
            }
        });

        Ok(VideoMetadata {
            duration,
            width,
            height,
            codec,
            bitrate,
            framerate,
        })
    }

    pub fn apply_to(&self, descriptor: &mut FileDescriptor) {
        descriptor.width = Some(self.width);
        descriptor.height = Some(self.height);
        descriptor.duration = Some(self.duration);
        descriptor.framerate = self.framerate;
        descriptor.bitrate = self.bitrate;
    }
}

fn ffprobe_args(path: &Path) -> Vec<String> {
    [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        "-select_streams",
        "v:0",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .chain(std::iter::once(path.to_string_lossy().to_string()))
    .collect()
}

/// Reads media metadata from staged files
pub struct MediaProbe<'a> {
    tools: ToolContext<'a>,
}

impl<'a> MediaProbe<'a> {
    pub fn new(tools: ToolContext<'a>) -> Self {
        Self { tools }
    }

    #[tracing::instrument(skip(self, path), fields(process.command = "ffprobe", ffmpeg.operation = "probe"))]
    pub async fn video(&self, path: &Path) -> ProcessingResult<VideoMetadata> {
        let start = std::time::Instant::now();
        let output = self.tools.run(Tool::Ffprobe, ffprobe_args(path)).await?;
        let metadata =
            VideoMetadata::from_ffprobe_json(&output.stdout).map_err(ProcessingError::Probe)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            video_duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            codec = %metadata.codec,
            "Video probe completed"
        );

        Ok(metadata)
    }

    /// Fill the media fields of `descriptor` from the file at `path`.
    ///
    /// Documents and unrecognized files are returned unchanged.
    pub async fn describe(
        &self,
        descriptor: &FileDescriptor,
        path: &Path,
    ) -> ProcessingResult<FileDescriptor> {
        let mut described = descriptor.clone();

        match MediaClass::of(descriptor) {
            #[cfg(feature = "image")]
            MediaClass::Image => {
                let (width, height) = raster::dimensions(path)?;
                described.width = Some(width);
                described.height = Some(height);
            }
            MediaClass::Video => self.video(path).await?.apply_to(&mut described),
            _ => {}
        }

        Ok(described)
    }
}
