use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use image::{DynamicImage, ImageFormat};

/// Decodes an image file. Animated GIFs yield their first frame.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    decode_image(&bytes).with_context(|| format!("Failed to decode image: {:?}", path))
}

/// Decodes in-memory image data, sniffing the format from its header.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        return match frames.next() {
            Some(frame) => {
                let frame = frame.context("Failed to decode GIF frame")?;
                Ok(DynamicImage::ImageRgba8(frame.into_buffer()))
            }
            None => Err(anyhow!("GIF has no frames")),
        };
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(bytes, fmt).map_err(Into::into),
        None => Err(anyhow!("Unrecognised image data ({} bytes)", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn encode(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let img = RgbaImage::from_pixel(5, 7, Rgba([1, 2, 3, 255]));
        let decoded = decode_image(&encode(&img, ImageFormat::Png)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 7));
    }

    #[test]
    fn test_decode_gif_first_frame() {
        let img = RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]));
        let decoded = decode_image(&encode(&img, ImageFormat::Gif)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn test_open_missing_file() {
        assert!(open_image(Path::new("/nonexistent/a.png")).is_err());
    }
}
