// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Video frames and borrowed frame views.
//!
//! A [`Frame`] is an immutable, tightly packed 8-bit pixel buffer delivered by
//! an upstream frame source. Poses keep a shared reference (`Arc<Frame>`) to
//! the frame they were computed from. A [`FrameView`] aliases a rectangular
//! window of pixel memory, which is how regions of interest are extracted
//! without copying.

use image::DynamicImage;

use crate::error::{InferenceError, Result};
use crate::geometry::{Rect, Size};

/// Pixel layout of an 8-bit frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Single channel luminance.
    Gray8,
    /// Three channels in blue, green, red order.
    Bgr8,
    /// Three channels in red, green, blue order.
    Rgb8,
}

impl PixelFormat {
    /// Number of interleaved channels per pixel.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Bgr8 | Self::Rgb8 => 3,
        }
    }
}

/// An owned 8-bit video frame with packed rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap raw packed pixel data.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` if the frame is empty or `data` does not hold
    /// exactly `width * height * channels` bytes.
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(InferenceError::ImageError(format!(
                "Frame must not be empty, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(InferenceError::ImageError(format!(
                "Frame data has {} bytes, expected {expected} for {width}x{height} {format:?}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Convert a decoded image into an RGB frame.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` if the image has zero area.
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let rgb = match image {
            DynamicImage::ImageRgb8(rgb) => rgb.clone(),
            _ => image.to_rgb8(),
        };
        let (width, height) = rgb.dimensions();
        Self::from_raw(width, height, PixelFormat::Rgb8, rgb.into_raw())
    }

    /// Frame width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Frame size.
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }

    /// Pixel layout.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw packed pixel bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// View over the whole frame.
    #[must_use]
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            data: &self.data,
            width: self.width as usize,
            height: self.height as usize,
            stride: self.width as usize * self.format.channels(),
            format: self.format,
        }
    }
}

/// A borrowed, possibly strided window over 8-bit pixel memory.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
    format: PixelFormat,
}

impl<'a> FrameView<'a> {
    /// View over packed rows.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` if `data` is too short for the requested shape.
    pub fn packed(data: &'a [u8], width: usize, height: usize, format: PixelFormat) -> Result<Self> {
        let stride = width * format.channels();
        if data.len() < stride * height {
            return Err(InferenceError::ImageError(format!(
                "Pixel buffer has {} bytes, expected {}",
                data.len(),
                stride * height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    /// Alias a sub-rectangle of this view.
    ///
    /// The rectangle is clipped to the view bounds; an empty intersection is
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` if the clipped rectangle has no area.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn sub_view(&self, rect: Rect) -> Result<Self> {
        let clipped = clip_rect(rect, self.width, self.height);
        if clipped.is_empty() {
            return Err(InferenceError::ImageError(format!(
                "Region of interest {rect} lies outside the {}x{} frame",
                self.width, self.height
            )));
        }
        let channels = self.format.channels();
        let start = clipped.y as usize * self.stride + clipped.x as usize * channels;
        Ok(Self {
            data: &self.data[start..],
            width: clipped.width as usize,
            height: clipped.height as usize,
            stride: self.stride,
            format: self.format,
        })
    }

    /// View width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// View height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Distance in bytes between the starts of two consecutive rows.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Pixel layout.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// View size.
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    #[must_use]
    pub const fn size(&self) -> Size {
        Size::new(self.width as i32, self.height as i32)
    }

    /// Pixel bytes of row `y`, without stride padding.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of bounds.
    #[must_use]
    pub fn row(&self, y: usize) -> &'a [u8] {
        assert!(y < self.height, "row {y} out of bounds for height {}", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width * self.format.channels()]
    }

    /// Returns `true` if rows are tightly packed.
    #[must_use]
    pub const fn is_packed(&self) -> bool {
        self.stride == self.width * self.format.channels()
    }

    /// Underlying bytes starting at the first pixel of the view.
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

/// Clip a rectangle to `[0, width) x [0, height)`.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub(crate) fn clip_rect(rect: Rect, width: usize, height: usize) -> Rect {
    let left = rect.x.max(0);
    let top = rect.y.max(0);
    let right = rect.right().min(width as i32);
    let bottom = rect.bottom().min(height as i32);
    Rect::new(left, top, (right - left).max(0), (bottom - top).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Frame {
        let data = (0..width * height)
            .flat_map(|i| {
                let v = (i % 256) as u8;
                [v, v, v]
            })
            .collect();
        Frame::from_raw(width, height, PixelFormat::Bgr8, data).unwrap()
    }

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        let result = Frame::from_raw(4, 4, PixelFormat::Rgb8, vec![0; 10]);
        assert!(matches!(result, Err(InferenceError::ImageError(_))));
    }

    #[test]
    fn test_from_raw_rejects_empty() {
        let result = Frame::from_raw(0, 4, PixelFormat::Gray8, Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_from_image() {
        let image = DynamicImage::new_rgb8(8, 6);
        let frame = Frame::from_image(&image).unwrap();
        assert_eq!(frame.size(), Size::new(8, 6));
        assert_eq!(frame.format(), PixelFormat::Rgb8);
        assert_eq!(frame.as_bytes().len(), 8 * 6 * 3);
    }

    #[test]
    fn test_sub_view_aliases_rows() {
        let frame = gradient_frame(8, 8);
        let view = frame.view().sub_view(Rect::new(2, 3, 4, 2)).unwrap();
        assert_eq!(view.width(), 4);
        assert_eq!(view.height(), 2);
        assert!(!view.is_packed());
        // first pixel of row 3, column 2 in an 8-wide frame is index 26
        assert_eq!(view.row(0)[0], 26);
        assert_eq!(view.row(1)[0], 34);
        assert_eq!(view.row(0).len(), 12);
    }

    #[test]
    fn test_sub_view_clips_to_bounds() {
        let frame = gradient_frame(8, 8);
        let view = frame.view().sub_view(Rect::new(6, 6, 10, 10)).unwrap();
        assert_eq!(view.size(), Size::new(2, 2));

        let outside = frame.view().sub_view(Rect::new(20, 20, 4, 4));
        assert!(outside.is_err());
    }
}
