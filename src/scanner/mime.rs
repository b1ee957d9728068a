//! Mime type sniffing for candidate image files.
//!
//! The header is matched against known image magic numbers first; the file
//! extension is only consulted when the content is not recognised.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use image::ImageFormat;
use tracing::trace;

use crate::models::IMAGE_MIME_PREFIX;

/// Bytes read from the start of a file for sniffing.
const SNIFF_LEN: usize = 64;

/// Returns the mime type of `path`, or `None` when it is not a recognised image.
pub fn sniff(path: &Path) -> Result<Option<String>> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut header = [0u8; SNIFF_LEN];
    let read = read_header(&mut file, &mut header)
        .with_context(|| format!("Failed to read header of {:?}", path))?;

    let format = image::guess_format(&header[..read])
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok());

    let mime = format.map(|f| f.to_mime_type().to_string());
    trace!(?path, ?mime, "Sniffed mime type");
    Ok(mime)
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.starts_with(IMAGE_MIME_PREFIX)
}

fn read_header(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
