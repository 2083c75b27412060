//! Document thumbnails: rasterize the first page with ImageMagick

use std::path::Path;

use crate::error::ProcessingResult;
use crate::tools::{Tool, ToolContext};

const RASTER_DENSITY: u32 = 150;

/// `convert` arguments rendering page 0 of `source` at `width` pixels on
/// white, with transparency flattened
pub fn rasterize_args(source: &Path, destination: &Path, width: u32) -> Vec<String> {
    vec![
        format!("{}[0]", source.to_string_lossy()),
        "-thumbnail".to_string(),
        format!("{}x{}", width, width),
        "-background".to_string(),
        "white".to_string(),
        "-alpha".to_string(),
        "remove".to_string(),
        "-density".to_string(),
        RASTER_DENSITY.to_string(),
        destination.to_string_lossy().to_string(),
    ]
}

pub async fn render(
    tools: &ToolContext<'_>,
    source: &Path,
    destination: &Path,
    size: u32,
) -> ProcessingResult<()> {
    tools
        .produce(
            Tool::Convert,
            rasterize_args(source, destination, size),
            destination,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rasterize_args() {
        let args = rasterize_args(Path::new("/ws/source.pdf"), Path::new("/ws/thumb256.png"), 256);
        assert_eq!(
            args,
            vec![
                "/ws/source.pdf[0]",
                "-thumbnail",
                "256x256",
                "-background",
                "white",
                "-alpha",
                "remove",
                "-density",
                "150",
                "/ws/thumb256.png",
            ]
        );
    }
}
