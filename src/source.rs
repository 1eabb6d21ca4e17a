// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Still-image frame sources.
//!
//! Frames are decoded with the `image` crate into packed RGB [`Frame`]s. Image
//! files, directories, simple `dir/*.ext` glob patterns and explicit path
//! lists are supported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{InferenceError, Result};
use crate::frame::Frame;

/// Represents different input sources for prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Path to an image file.
    Image(PathBuf),
    /// List of image paths.
    ImageList(Vec<PathBuf>),
    /// Directory containing images.
    Directory(PathBuf),
    /// Glob pattern for images.
    Glob(String),
}

impl Source {
    /// Check if this source is a single image.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    /// Check if this source is a directory, list or glob pattern.
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        matches!(
            self,
            Self::Directory(_) | Self::Glob(_) | Self::ImageList(_)
        )
    }
}

/// Convert from a string path to Source.
impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if s.contains('*') {
            return Self::Glob(s.to_string());
        }

        let path = PathBuf::from(s);
        if path.is_dir() {
            return Self::Directory(path);
        }
        Self::Image(path)
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::from(path.to_string_lossy().as_ref())
    }
}

impl From<Vec<PathBuf>> for Source {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self::ImageList(paths)
    }
}

/// Metadata about a source frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMeta {
    /// Frame index within the source.
    pub frame_idx: usize,
    /// Total frames in the source.
    pub total_frames: usize,
    /// Source path.
    pub path: String,
}

/// Iterator over frames from a source, in sorted path order.
#[derive(Debug)]
pub struct SourceIterator {
    current_frame: usize,
    image_paths: Vec<PathBuf>,
}

impl SourceIterator {
    /// Create a new source iterator.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or glob base cannot be read.
    pub fn new(source: Source) -> Result<Self> {
        let image_paths = match source {
            Source::Directory(path) => collect_images_from_dir(&path)?,
            Source::Glob(pattern) => collect_images_from_glob(&pattern)?,
            Source::Image(path) => vec![path],
            Source::ImageList(paths) => paths,
        };

        Ok(Self {
            current_frame: 0,
            image_paths,
        })
    }

    /// Number of frames the source will yield.
    #[must_use]
    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    /// Returns `true` if the source has no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }
}

impl Iterator for SourceIterator {
    type Item = Result<(Arc<Frame>, SourceMeta)>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.image_paths.get(self.current_frame)?;
        let meta = SourceMeta {
            frame_idx: self.current_frame,
            total_frames: self.image_paths.len(),
            path: path.to_string_lossy().to_string(),
        };
        self.current_frame += 1;

        Some(load_frame(path).map(|frame| (Arc::new(frame), meta)))
    }
}

/// Decode an image file into an RGB frame.
///
/// # Errors
///
/// Returns `ImageError` if the file cannot be opened or decoded.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path).map_err(|e| {
        InferenceError::ImageError(format!("Failed to load {}: {e}", path.display()))
    })?;
    Frame::from_image(&image)
}

/// Collect image paths from a directory.
fn collect_images_from_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(InferenceError::ImageError(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_image_file(path))
        .collect();

    paths.sort();
    Ok(paths)
}

/// Collect image paths from a glob pattern.
///
/// Only `dir/*` and `dir/*.ext` forms are understood.
fn collect_images_from_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let Some(star_pos) = pattern.find('*') else {
        return Ok(vec![PathBuf::from(pattern)]);
    };

    let dir_part = &pattern[..star_pos];
    let dir = if dir_part.is_empty() {
        Path::new(".")
    } else {
        Path::new(dir_part.trim_end_matches('/').trim_end_matches('\\'))
    };

    // "*.png" -> "png"
    let ext_filter: Option<String> = pattern[star_pos..]
        .strip_prefix("*.")
        .map(str::to_lowercase);

    if !dir.is_dir() {
        return Err(InferenceError::ImageError(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            ext_filter.as_ref().map_or_else(
                || is_image_file(path),
                |ext| {
                    path.extension()
                        .is_some_and(|e| e.to_string_lossy().to_lowercase() == *ext)
                },
            )
        })
        .collect();

    paths.sort();
    Ok(paths)
}

/// Check if a path is an image file based on extension.
fn is_image_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy().to_lowercase();
        matches!(
            ext.as_str(),
            "jpg" | "jpeg" | "png" | "bmp" | "tiff" | "tif"
        )
    })
}
