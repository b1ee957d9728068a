//! Thumbnail pipeline for the image browser.
//!
//! This module provides:
//! - `ThumbnailGenerator` - Fits images and stored previews into a box
//! - `ThumbnailCache` - Disk and memory caching with LRU eviction
//! - `ThumbnailQueue` - Worker pool that renders off the UI thread

pub mod cache;
pub mod generator;
pub mod queue;

pub use cache::ThumbnailCache;
pub use generator::{ThumbBox, ThumbnailSource, GRID_BOX, VIEW_BOX};
pub use queue::{ThumbnailJob, ThumbnailOutcome, ThumbnailQueue};
