// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame to tensor adaptation.
//!
//! This module turns arbitrary-sized 8-bit frames into the `[batch, height,
//! width, 3]` float32 layout expected by DeepLabCut graphs: region of interest
//! extraction, area resize, channel order conversion and float packing. Pixel
//! values are converted to float without normalization; the exported graphs
//! normalize internally.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation
)]

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use ndarray::ArrayViewMut3;
use rayon::prelude::*;

use crate::buffer::{ScratchImage, TensorBuffer};
use crate::error::{InferenceError, Result};
use crate::frame::{clip_rect, Frame, FrameView, PixelFormat};
use crate::geometry::{Point, Rect, Size};

/// Number of channels in the model input tensor.
pub const TENSOR_CHANNELS: usize = 3;

/// Channel order conversion applied before packing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorConversion {
    /// Swap blue and red channels of a BGR frame.
    Bgr2Rgb,
    /// Swap red and blue channels of an RGB frame.
    Rgb2Bgr,
    /// Replicate a luminance channel into RGB.
    Gray2Rgb,
    /// Replicate a luminance channel into BGR.
    Gray2Bgr,
}

impl ColorConversion {
    /// Returns the string representation used on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bgr2Rgb => "bgr2rgb",
            Self::Rgb2Bgr => "rgb2bgr",
            Self::Gray2Rgb => "gray2rgb",
            Self::Gray2Bgr => "gray2bgr",
        }
    }

    /// Number of channels the conversion reads.
    #[must_use]
    pub const fn source_channels(&self) -> usize {
        match self {
            Self::Bgr2Rgb | Self::Rgb2Bgr => 3,
            Self::Gray2Rgb | Self::Gray2Bgr => 1,
        }
    }

    /// Layout produced by the conversion.
    #[must_use]
    pub const fn target_format(&self) -> PixelFormat {
        match self {
            Self::Bgr2Rgb | Self::Gray2Rgb => PixelFormat::Rgb8,
            Self::Rgb2Bgr | Self::Gray2Bgr => PixelFormat::Bgr8,
        }
    }
}

impl fmt::Display for ColorConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColorConversion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bgr2rgb" => Ok(Self::Bgr2Rgb),
            "rgb2bgr" => Ok(Self::Rgb2Bgr),
            "gray2rgb" | "grey2rgb" => Ok(Self::Gray2Rgb),
            "gray2bgr" | "grey2bgr" => Ok(Self::Gray2Bgr),
            _ => Err(format!(
                "invalid color conversion '{s}', expected one of: bgr2rgb, rgb2bgr, gray2rgb, gray2bgr"
            )),
        }
    }
}

/// Resolve the frame region used for inference.
///
/// A region with positive width and height is clipped to the frame and its
/// top-left corner becomes the applied offset. Otherwise the whole frame is
/// used with a zero offset.
///
/// # Errors
///
/// Returns `ImageError` if the region does not intersect the frame.
pub fn region_of_interest(frame_size: Size, roi: Option<Rect>) -> Result<(Rect, Point)> {
    let full = Rect::new(0, 0, frame_size.width, frame_size.height);
    match roi {
        Some(roi) if roi.size().is_positive() => {
            let clipped = clip_rect(roi, frame_size.width as usize, frame_size.height as usize);
            if clipped.is_empty() {
                return Err(InferenceError::ImageError(format!(
                    "Region of interest {roi} lies outside the {}x{} frame",
                    frame_size.width, frame_size.height
                )));
            }
            Ok((clipped, clipped.origin()))
        }
        _ => Ok((full, Point::default())),
    }
}

/// Compute the tensor spatial size for a region and optional scale factor.
///
/// Scaled dimensions are truncated towards zero.
#[must_use]
pub fn tensor_size_for(region: Size, scale_factor: Option<f32>) -> Size {
    match scale_factor {
        Some(scale) => Size::new(
            (region.width as f32 * scale) as i32,
            (region.height as f32 * scale) as i32,
        ),
        None => region,
    }
}

/// Converts frames into model input tensors, reusing its scratch buffers.
///
/// The adapter is not reentrant: callers serialize access per pipeline.
pub struct FrameAdapter {
    resizer: Resizer,
    resize_scratch: ScratchImage,
    color_scratch: ScratchImage,
}

impl Default for FrameAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameAdapter")
            .field("resize_scratch", &self.resize_scratch)
            .field("color_scratch", &self.color_scratch)
            .finish_non_exhaustive()
    }
}

impl FrameAdapter {
    /// Create an adapter with empty scratch buffers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
            resize_scratch: ScratchImage::default(),
            color_scratch: ScratchImage::default(),
        }
    }

    /// Adapt one frame and write it into a `[height, width, 3]` tensor slot.
    ///
    /// # Arguments
    ///
    /// * `frame` - Source frame.
    /// * `roi` - Optional region of interest; ignored unless it has positive size.
    /// * `target_size` - Spatial size of the tensor slot.
    /// * `color` - Optional channel conversion. Skipped when the frame is
    ///   already in the conversion's target layout.
    /// * `slot` - Destination tensor memory.
    ///
    /// # Returns
    ///
    /// The top-left offset of the region that was used.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` for an empty target, a region outside the frame or
    /// a frame that does not end up with three channels, and
    /// `ShapeMismatchError` if the slot does not match `target_size`.
    pub fn prepare(
        &mut self,
        frame: &Frame,
        roi: Option<Rect>,
        target_size: Size,
        color: Option<ColorConversion>,
        slot: ArrayViewMut3<'_, f32>,
    ) -> Result<Point> {
        if !target_size.is_positive() {
            return Err(InferenceError::ImageError(format!(
                "Tensor size must be positive, got {}x{}",
                target_size.width, target_size.height
            )));
        }

        let (region, offset) = region_of_interest(frame.size(), roi)?;
        let Self {
            resizer,
            resize_scratch,
            color_scratch,
        } = self;

        let mut view = frame.view().sub_view(region)?;
        if view.size() != target_size {
            resize_region(resizer, frame, region, target_size, resize_scratch)?;
            view = resize_scratch.view()?;
        }

        if let Some(conversion) = color.filter(|c| c.target_format() != view.format()) {
            convert_color(view, conversion, color_scratch)?;
            view = color_scratch.view()?;
        }

        write_tensor(view, slot)?;
        Ok(offset)
    }

    /// Pack a batch of whole frames into consecutive slots of `tensor`.
    ///
    /// In strict mode every frame must have the same size as the first one.
    /// Otherwise frames of a different size are resized to `target_size`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBatchError` for an empty batch and `ShapeMismatchError`
    /// for inconsistent frame sizes (strict mode) or a tensor whose shape does
    /// not match the batch.
    pub fn pack_batch(
        &mut self,
        frames: &[Arc<Frame>],
        target_size: Size,
        color: Option<ColorConversion>,
        strict: bool,
        tensor: &mut TensorBuffer,
    ) -> Result<()> {
        let first = frames.first().ok_or(InferenceError::EmptyBatchError)?;

        if strict {
            if let Some((index, frame)) = frames
                .iter()
                .enumerate()
                .find(|(_, frame)| frame.size() != first.size())
            {
                return Err(InferenceError::ShapeMismatchError(format!(
                    "Frame {index} is {}x{}, expected {}x{}",
                    frame.width(),
                    frame.height(),
                    first.width(),
                    first.height()
                )));
            }
        }

        let expected = [
            frames.len(),
            target_size.height as usize,
            target_size.width as usize,
            TENSOR_CHANNELS,
        ];
        if tensor.shape() != expected {
            return Err(InferenceError::ShapeMismatchError(format!(
                "Batch tensor has shape {:?}, expected {expected:?}",
                tensor.shape()
            )));
        }

        for (index, frame) in frames.iter().enumerate() {
            self.prepare(frame, None, target_size, color, tensor.slot_mut(index))?;
        }
        Ok(())
    }
}

/// Area-resize a frame region into the scratch buffer.
fn resize_region(
    resizer: &mut Resizer,
    frame: &Frame,
    region: Rect,
    target_size: Size,
    scratch: &mut ScratchImage,
) -> Result<()> {
    let pixel_type = match frame.format() {
        PixelFormat::Gray8 => PixelType::U8,
        PixelFormat::Bgr8 | PixelFormat::Rgb8 => PixelType::U8x3,
    };

    let src = ImageRef::new(frame.width(), frame.height(), frame.as_bytes(), pixel_type)
        .map_err(|e| InferenceError::ImageError(format!("Failed to wrap source frame: {e}")))?;

    scratch.ensure_shape(
        target_size.width as usize,
        target_size.height as usize,
        frame.format(),
    );
    let mut dst = Image::from_slice_u8(
        target_size.width as u32,
        target_size.height as u32,
        scratch.as_mut_bytes(),
        pixel_type,
    )
    .map_err(|e| InferenceError::ImageError(format!("Failed to wrap resize buffer: {e}")))?;

    let options = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::Box))
        .crop(
            f64::from(region.x),
            f64::from(region.y),
            f64::from(region.width),
            f64::from(region.height),
        );
    resizer
        .resize(&src, &mut dst, Some(&options))
        .map_err(|e| InferenceError::ImageError(format!("Failed to resize frame: {e}")))
}

/// Apply a channel conversion into the scratch buffer.
fn convert_color(
    src: FrameView<'_>,
    conversion: ColorConversion,
    scratch: &mut ScratchImage,
) -> Result<()> {
    if src.format().channels() != conversion.source_channels() {
        return Err(InferenceError::ImageError(format!(
            "Color conversion {conversion} cannot be applied to a {:?} frame",
            src.format()
        )));
    }

    let width = src.width();
    scratch.ensure_shape(width, src.height(), conversion.target_format());
    let row_len = width * TENSOR_CHANNELS;
    for (y, out_row) in scratch.as_mut_bytes().chunks_exact_mut(row_len).enumerate() {
        let row = src.row(y);
        match conversion {
            ColorConversion::Bgr2Rgb | ColorConversion::Rgb2Bgr => {
                for (out, px) in out_row.chunks_exact_mut(3).zip(row.chunks_exact(3)) {
                    out[0] = px[2];
                    out[1] = px[1];
                    out[2] = px[0];
                }
            }
            ColorConversion::Gray2Rgb | ColorConversion::Gray2Bgr => {
                for (out, &value) in out_row.chunks_exact_mut(3).zip(row) {
                    out.fill(value);
                }
            }
        }
    }
    Ok(())
}

/// Convert 8-bit pixels to float32 directly into the tensor slot.
fn write_tensor(view: FrameView<'_>, mut slot: ArrayViewMut3<'_, f32>) -> Result<()> {
    let (height, width, channels) = slot.dim();
    if view.format().channels() != TENSOR_CHANNELS {
        return Err(InferenceError::ImageError(format!(
            "Model input requires {TENSOR_CHANNELS} channels, got a {:?} frame; \
             set a gray2rgb color conversion",
            view.format()
        )));
    }
    if height != view.height() || width != view.width() || channels != TENSOR_CHANNELS {
        return Err(InferenceError::ShapeMismatchError(format!(
            "Tensor slot is {height}x{width}x{channels}, frame is {}x{}x{TENSOR_CHANNELS}",
            view.height(),
            view.width()
        )));
    }

    let row_len = width * channels;
    let out = slot.as_slice_mut().ok_or_else(|| {
        InferenceError::ShapeMismatchError("Tensor slot is not contiguous".to_string())
    })?;
    out.par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(y, out_row)| {
            for (dst, &src) in out_row.iter_mut().zip(view.row(y)) {
                *dst = f32::from(src);
            }
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;

    fn solid_frame(width: u32, height: u32, format: PixelFormat, pixel: &[u8]) -> Frame {
        let data = (0..width * height)
            .flat_map(|_| pixel.iter().copied())
            .collect();
        Frame::from_raw(width, height, format, data).unwrap()
    }

    /// Frame where the first channel holds the column and the second the row.
    fn coordinate_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        Frame::from_raw(width, height, PixelFormat::Rgb8, data).unwrap()
    }

    #[test]
    fn test_region_of_interest() {
        let size = Size::new(100, 80);
        let (region, offset) = region_of_interest(size, None).unwrap();
        assert_eq!(region, Rect::new(0, 0, 100, 80));
        assert_eq!(offset, Point::default());

        // Degenerate regions fall back to the whole frame
        let (region, _) = region_of_interest(size, Some(Rect::new(10, 10, 0, 5))).unwrap();
        assert_eq!(region, Rect::new(0, 0, 100, 80));

        let (region, offset) = region_of_interest(size, Some(Rect::new(90, 70, 20, 20))).unwrap();
        assert_eq!(region, Rect::new(90, 70, 10, 10));
        assert_eq!(offset, Point::new(90, 70));

        assert!(region_of_interest(size, Some(Rect::new(200, 0, 10, 10))).is_err());
    }

    #[test]
    fn test_tensor_size_for() {
        assert_eq!(tensor_size_for(Size::new(640, 480), None), Size::new(640, 480));
        assert_eq!(tensor_size_for(Size::new(640, 480), Some(0.5)), Size::new(320, 240));
        // Truncation towards zero
        assert_eq!(tensor_size_for(Size::new(101, 51), Some(0.5)), Size::new(50, 25));
    }

    #[test]
    fn test_color_conversion_parse() {
        assert_eq!("BGR2RGB".parse::<ColorConversion>().unwrap(), ColorConversion::Bgr2Rgb);
        assert_eq!("grey2rgb".parse::<ColorConversion>().unwrap(), ColorConversion::Gray2Rgb);
        assert!("hsv".parse::<ColorConversion>().is_err());
        assert_eq!(ColorConversion::Rgb2Bgr.to_string(), "rgb2bgr");
    }

    #[test]
    fn test_prepare_same_size_copies_values() {
        let frame = coordinate_frame(4, 3);
        let mut tensor = TensorBuffer::new([1, 3, 4, 3]);
        let mut adapter = FrameAdapter::new();

        let offset = adapter
            .prepare(&frame, None, Size::new(4, 3), None, tensor.slot_mut(0))
            .unwrap();

        assert_eq!(offset, Point::default());
        let view = tensor.view();
        assert!((view[[0, 2, 3, 0]] - 3.0).abs() < 1e-6);
        assert!((view[[0, 2, 3, 1]] - 2.0).abs() < 1e-6);
        assert!((view[[0, 2, 3, 2]] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_region_of_interest() {
        let frame = coordinate_frame(10, 10);
        let mut tensor = TensorBuffer::new([1, 2, 3, 3]);
        let mut adapter = FrameAdapter::new();

        let offset = adapter
            .prepare(
                &frame,
                Some(Rect::new(4, 5, 3, 2)),
                Size::new(3, 2),
                None,
                tensor.slot_mut(0),
            )
            .unwrap();

        assert_eq!(offset, Point::new(4, 5));
        let view = tensor.view();
        assert!((view[[0, 0, 0, 0]] - 4.0).abs() < 1e-6);
        assert!((view[[0, 0, 0, 1]] - 5.0).abs() < 1e-6);
        assert!((view[[0, 1, 2, 0]] - 6.0).abs() < 1e-6);
        assert!((view[[0, 1, 2, 1]] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_resizes_to_target() {
        let frame = solid_frame(16, 12, PixelFormat::Rgb8, &[10, 20, 30]);
        let mut tensor = TensorBuffer::new([1, 6, 8, 3]);
        let mut adapter = FrameAdapter::new();

        adapter
            .prepare(&frame, None, Size::new(8, 6), None, tensor.slot_mut(0))
            .unwrap();

        // Fixed-point convolution may round by one level
        let view = tensor.view();
        for pixel in view.lanes(Axis(3)) {
            assert!((pixel[0] - 10.0).abs() <= 1.0);
            assert!((pixel[1] - 20.0).abs() <= 1.0);
            assert!((pixel[2] - 30.0).abs() <= 1.0);
        }
    }

    #[test]
    fn test_prepare_swaps_bgr_frames() {
        let frame = solid_frame(2, 2, PixelFormat::Bgr8, &[1, 2, 3]);
        let mut tensor = TensorBuffer::new([1, 2, 2, 3]);
        let mut adapter = FrameAdapter::new();

        adapter
            .prepare(
                &frame,
                None,
                Size::new(2, 2),
                Some(ColorConversion::Bgr2Rgb),
                tensor.slot_mut(0),
            )
            .unwrap();

        let view = tensor.view();
        assert!((view[[0, 1, 1, 0]] - 3.0).abs() < 1e-6);
        assert!((view[[0, 1, 1, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_skips_conversion_for_matching_layout() {
        let frame = solid_frame(2, 2, PixelFormat::Rgb8, &[1, 2, 3]);
        let mut tensor = TensorBuffer::new([1, 2, 2, 3]);
        let mut adapter = FrameAdapter::new();

        adapter
            .prepare(
                &frame,
                None,
                Size::new(2, 2),
                Some(ColorConversion::Bgr2Rgb),
                tensor.slot_mut(0),
            )
            .unwrap();

        assert!((tensor.view()[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_gray_frames() {
        let frame = solid_frame(3, 3, PixelFormat::Gray8, &[42]);
        let mut tensor = TensorBuffer::new([1, 3, 3, 3]);
        let mut adapter = FrameAdapter::new();

        let result = adapter.prepare(&frame, None, Size::new(3, 3), None, tensor.slot_mut(0));
        assert!(matches!(result, Err(InferenceError::ImageError(_))));

        adapter
            .prepare(
                &frame,
                None,
                Size::new(3, 3),
                Some(ColorConversion::Gray2Rgb),
                tensor.slot_mut(0),
            )
            .unwrap();
        assert!(tensor.view().iter().all(|v| (v - 42.0).abs() < 1e-6));
    }

    #[test]
    fn test_prepare_rejects_mismatched_slot() {
        let frame = solid_frame(4, 4, PixelFormat::Rgb8, &[0, 0, 0]);
        let mut tensor = TensorBuffer::new([1, 2, 2, 3]);
        let mut adapter = FrameAdapter::new();

        let result = adapter.prepare(&frame, None, Size::new(4, 4), None, tensor.slot_mut(0));
        assert!(matches!(result, Err(InferenceError::ShapeMismatchError(_))));
    }

    #[test]
    fn test_pack_batch() {
        let frames = vec![
            Arc::new(solid_frame(4, 2, PixelFormat::Rgb8, &[1, 1, 1])),
            Arc::new(solid_frame(4, 2, PixelFormat::Rgb8, &[2, 2, 2])),
        ];
        let mut tensor = TensorBuffer::new([2, 2, 4, 3]);
        let mut adapter = FrameAdapter::new();

        adapter
            .pack_batch(&frames, Size::new(4, 2), None, true, &mut tensor)
            .unwrap();

        let view = tensor.view();
        assert!((view[[0, 1, 3, 2]] - 1.0).abs() < 1e-6);
        assert!((view[[1, 0, 0, 0]] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_pack_batch_errors() {
        let mut adapter = FrameAdapter::new();
        let mut tensor = TensorBuffer::new([2, 2, 4, 3]);

        let result = adapter.pack_batch(&[], Size::new(4, 2), None, true, &mut tensor);
        assert!(matches!(result, Err(InferenceError::EmptyBatchError)));

        let frames = vec![
            Arc::new(solid_frame(4, 2, PixelFormat::Rgb8, &[1, 1, 1])),
            Arc::new(solid_frame(8, 4, PixelFormat::Rgb8, &[2, 2, 2])),
        ];
        let result = adapter.pack_batch(&frames, Size::new(4, 2), None, true, &mut tensor);
        assert!(matches!(result, Err(InferenceError::ShapeMismatchError(_))));

        // Lenient mode resizes the odd frame into its slot
        adapter
            .pack_batch(&frames, Size::new(4, 2), None, false, &mut tensor)
            .unwrap();
        assert!((tensor.view()[[1, 1, 3, 0]] - 2.0).abs() <= 1.0);
    }
}
