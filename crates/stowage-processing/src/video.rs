//! Video thumbnails: grab one frame with ffmpeg, then pad it like an image

use std::path::Path;

use crate::error::ProcessingResult;
use crate::raster;
use crate::tools::{Tool, ToolContext};

/// ffmpeg arguments that write frame `frame_index` (counted from the
/// one-second mark) of `source` to `destination` at `size`×`size`
pub fn frame_args(source: &Path, destination: &Path, size: u32, frame_index: u32) -> Vec<String> {
    vec![
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-vframes".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!("select=gte(n\\,{})", frame_index),
        "-s".to_string(),
        format!("{}x{}", size, size),
        "-ss".to_string(),
        "1".to_string(),
        destination.to_string_lossy().to_string(),
        "-y".to_string(),
    ]
}

/// Extract a frame into the workspace and render it to `destination`
#[tracing::instrument(skip(tools, source, destination, background), fields(ffmpeg.operation = "thumbnail"))]
pub async fn render(
    tools: &ToolContext<'_>,
    source: &Path,
    destination: &Path,
    size: u32,
    frame_index: u32,
    background: [u8; 3],
) -> ProcessingResult<()> {
    let frame = tools.working_dir.join(format!("frame{}.png", size));

    tools
        .produce(
            Tool::Ffmpeg,
            frame_args(source, &frame, size, frame_index),
            &frame,
        )
        .await?;

    raster::render_file(&frame, destination, size, background).await
}
