//! Square thumbnail rendering with the `image` crate

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};

use crate::error::{ProcessingError, ProcessingResult};

/// Resize `data` to fit inside `size`×`size`, keeping the aspect ratio, and
/// centre it on a canvas filled with `background`. Returns PNG bytes.
pub fn fit_and_pad(data: &[u8], size: u32, background: [u8; 3]) -> ProcessingResult<Vec<u8>> {
    if size == 0 {
        return Err(ProcessingError::InvalidSize(size));
    }

    let img = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;

    let resized = img.resize(size, size, FilterType::Lanczos3);
    let (width, height) = resized.dimensions();

    let [r, g, b] = background;
    let mut canvas = RgbaImage::from_pixel(size, size, Rgba([r, g, b, 255]));
    let x = i64::from((size - width) / 2);
    let y = i64::from((size - height) / 2);
    imageops::overlay(&mut canvas, &resized.to_rgba8(), x, y);

    let flattened = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut buffer = Vec::with_capacity((size * size * 3) as usize);
    DynamicImage::ImageRgb8(flattened).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;

    Ok(buffer)
}

/// [`fit_and_pad`] from one file to another, off the async runtime
pub async fn render_file(
    source: &Path,
    destination: &Path,
    size: u32,
    background: [u8; 3],
) -> ProcessingResult<()> {
    let data = tokio::fs::read(source).await?;

    let png = tokio::task::spawn_blocking(move || fit_and_pad(&data, size, background))
        .await
        .map_err(|e| ProcessingError::Io(std::io::Error::other(e)))??;

    tokio::fs::write(destination, png).await?;
    Ok(())
}

/// Pixel dimensions read from the image header
pub fn dimensions(path: &Path) -> ProcessingResult<(u32, u32)> {
    Ok(image::image_dimensions(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb(color));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_wide_image_is_letterboxed() {
        let source = png(200, 100, [255, 0, 0]);
        let thumb = fit_and_pad(&source, 64, [255, 255, 255]).unwrap();

        let img = image::load_from_memory(&thumb).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (64, 64));
        // Top rows are padding, the middle is the red source.
        assert_eq!(img.get_pixel(32, 0).0, [255, 255, 255]);
        let [r, g, b] = img.get_pixel(32, 32).0;
        assert!(r > 240 && g < 15 && b < 15);
    }

    #[test]
    fn test_small_image_fills_canvas_size() {
        let source = png(10, 20, [0, 0, 255]);
        let thumb = fit_and_pad(&source, 256, [0, 0, 0]).unwrap();
        let img = image::load_from_memory(&thumb).unwrap();
        assert_eq!(img.dimensions(), (256, 256));
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            fit_and_pad(b"definitely not an image", 64, [0, 0, 0]),
            Err(ProcessingError::Image(_))
        ));
        assert!(matches!(
            fit_and_pad(&png(4, 4, [0, 0, 0]), 0, [0, 0, 0]),
            Err(ProcessingError::InvalidSize(0))
        ));
    }

    #[tokio::test]
    async fn test_render_file_and_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.png");
        let destination = dir.path().join("out.png");
        std::fs::write(&source, png(30, 60, [1, 2, 3])).unwrap();

        assert_eq!(dimensions(&source).unwrap(), (30, 60));
        render_file(&source, &destination, 48, [9, 9, 9]).await.unwrap();
        assert_eq!(dimensions(&destination).unwrap(), (48, 48));
    }
}
