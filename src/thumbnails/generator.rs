//! Thumbnail rendering using the image crate.
//!
//! Images are scaled to fit a bounding box while preserving their aspect
//! ratio. Journal objects may carry their own preview, either raw PNG bytes or
//! base64 text, which is decoded instead of the backing file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use tracing::{debug, trace};

use crate::image_loader;
use crate::models::ImageRecord;

/// Grid cell thumbnails.
pub const GRID_BOX: ThumbBox = ThumbBox::new(320, 240);

/// Detail page image.
pub const VIEW_BOX: ThumbBox = ThumbBox::new(930, 700);

/// JPEG quality for thumbnail encoding (0-100).
const JPEG_QUALITY: u8 = 85;

/// Previews must be longer than this to be decoded.
const MIN_PREVIEW_LEN: usize = 4;

/// Bounding box a thumbnail must fit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbBox {
    pub width: u32,
    pub height: u32,
}

impl ThumbBox {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Where a record's thumbnail comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailSource {
    /// Scale the image file itself.
    File(PathBuf),
    /// Decode the preview stored with a Journal object.
    Preview(Vec<u8>),
    /// Nothing to show; the tile stays blank.
    Blank,
}

impl ThumbnailSource {
    pub fn for_record(record: &ImageRecord) -> Self {
        if !record.is_store_backed() {
            return match record.file_path() {
                Some(path) => Self::File(path.to_path_buf()),
                None => Self::Blank,
            };
        }

        let preview = record.preview().filter(|p| !is_empty_preview(p));
        match preview {
            None => match record.file_path() {
                Some(path) if record.is_image() => Self::File(path.to_path_buf()),
                _ => Self::Blank,
            },
            Some(bytes) if bytes.len() > MIN_PREVIEW_LEN => Self::Preview(bytes.to_vec()),
            Some(_) => Self::Blank,
        }
    }

    /// Source for the detail page, which prefers the backing file over any
    /// stored preview.
    pub fn for_viewer(record: &ImageRecord) -> Self {
        match record.file_path() {
            Some(path) => Self::File(path.to_path_buf()),
            None => Self::for_record(record),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }
}

fn is_empty_preview(bytes: &[u8]) -> bool {
    bytes.is_empty() || bytes == b"None"
}

pub struct ThumbnailGenerator;

impl ThumbnailGenerator {
    /// Largest size with the source aspect ratio that fits in `max_w` x `max_h`.
    ///
    /// Small images are scaled up. Neither side is ever zero.
    pub fn fit_within(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
        let max_w = max_w.max(1);
        let max_h = max_h.max(1);
        if src_w == 0 || src_h == 0 {
            return (max_w, max_h);
        }

        let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
        let width = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
        let height = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
        (width, height)
    }

    /// Loads `path` and scales it into `bbox`.
    pub fn load_scaled(path: &Path, bbox: ThumbBox) -> Result<RgbaImage> {
        trace!(?path, ?bbox, "Scaling image file");
        let img = image_loader::open_image(path)?;
        Ok(Self::scale(&img, bbox))
    }

    /// Decodes a stored preview. Data whose bytes 1..4 read `PNG` is used as
    /// is, anything else is treated as base64 text.
    pub fn decode_preview(bytes: &[u8], bbox: ThumbBox) -> Result<RgbaImage> {
        let raw = if bytes.len() > MIN_PREVIEW_LEN && &bytes[1..4] == b"PNG" {
            bytes.to_vec()
        } else {
            let text: Vec<u8> = bytes
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(text)
                .context("Preview is neither PNG nor base64")?
        };

        let img = image_loader::decode_image(&raw).context("Failed to decode preview")?;
        debug!(width = img.width(), height = img.height(), "Decoded stored preview");
        Ok(Self::scale(&img, bbox))
    }

    /// Renders any source; `Ok(None)` for a blank source.
    pub fn render(source: &ThumbnailSource, bbox: ThumbBox) -> Result<Option<RgbaImage>> {
        match source {
            ThumbnailSource::File(path) => Self::load_scaled(path, bbox).map(Some),
            ThumbnailSource::Preview(bytes) => Self::decode_preview(bytes, bbox).map(Some),
            ThumbnailSource::Blank => Ok(None),
        }
    }

    fn scale(img: &DynamicImage, bbox: ThumbBox) -> RgbaImage {
        let (src_w, src_h) = img.dimensions();
        let (w, h) = Self::fit_within(src_w, src_h, bbox.width, bbox.height);
        if (w, h) == (src_w, src_h) {
            return img.to_rgba8();
        }
        // CatmullRom keeps downscaled thumbnails sharp without Lanczos cost
        img.resize_exact(w, h, FilterType::CatmullRom).to_rgba8()
    }

    /// Writes a thumbnail as JPEG, creating parent directories.
    pub fn save_jpeg(img: &RgbaImage, dst: &Path) -> Result<()> {
        use image::codecs::jpeg::JpegEncoder;
        use std::fs::File;
        use std::io::BufWriter;

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create thumbnail directory: {:?}", parent))?;
        }

        let file = File::create(dst)
            .with_context(|| format!("Failed to create thumbnail file: {:?}", dst))?;
        let mut writer = BufWriter::new(file);

        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
        let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
        rgb.write_with_encoder(encoder)
            .with_context(|| format!("Failed to encode thumbnail: {:?}", dst))?;

        trace!(?dst, "Saved thumbnail");
        Ok(())
    }
}
