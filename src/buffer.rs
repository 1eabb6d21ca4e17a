// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Shape-tagged reusable storage.
//!
//! Every per-frame buffer in the pipeline is reallocated only when its logical
//! shape changes between consecutive frames and overwritten in place otherwise.

use ndarray::{Array4, ArrayView4, ArrayViewMut3, Axis};
use tracing::debug;

use crate::frame::{FrameView, PixelFormat};
use crate::error::Result;

/// A float32 tensor with logical dimensions `[batch, height, width, channels]`.
///
/// The backing storage is always in standard (row-major) layout and holds
/// exactly `batch * height * width * channels` values.
#[derive(Debug, Clone)]
pub struct TensorBuffer {
    data: Array4<f32>,
}

impl Default for TensorBuffer {
    fn default() -> Self {
        Self {
            data: Array4::zeros((0, 0, 0, 0)),
        }
    }
}

impl TensorBuffer {
    /// Allocate a zeroed tensor of the given shape.
    #[must_use]
    pub fn new(shape: [usize; 4]) -> Self {
        Self {
            data: Array4::zeros(shape),
        }
    }

    /// Current logical shape.
    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        let dim = self.data.dim();
        [dim.0, dim.1, dim.2, dim.3]
    }

    /// Make sure the buffer has `shape`, reallocating only if it differs.
    ///
    /// Returns `true` when the storage was reallocated.
    pub fn ensure_shape(&mut self, shape: [usize; 4]) -> bool {
        if self.shape() == shape {
            return false;
        }
        debug!(from = ?self.shape(), to = ?shape, "reallocating tensor buffer");
        self.data = Array4::zeros(shape);
        true
    }

    /// Number of float values held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the buffer holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the backing storage in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Read-only view of the whole tensor.
    #[must_use]
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Mutable `[height, width, channels]` view of batch slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not smaller than the batch size.
    pub fn slot_mut(&mut self, index: usize) -> ArrayViewMut3<'_, f32> {
        self.data.index_axis_mut(Axis(0), index)
    }
}

/// A reusable 8-bit image buffer tagged by width, height and pixel format.
#[derive(Debug, Clone)]
pub struct ScratchImage {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Default for ScratchImage {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::Rgb8,
            data: Vec::new(),
        }
    }
}

impl ScratchImage {
    /// Make sure the buffer matches the requested shape.
    ///
    /// Returns `true` when the storage was reallocated.
    pub fn ensure_shape(&mut self, width: usize, height: usize, format: PixelFormat) -> bool {
        let len = width * height * format.channels();
        if self.width == width && self.height == height && self.data.len() == len {
            self.format = format;
            return false;
        }
        debug!(width, height, ?format, "reallocating scratch image");
        self.width = width;
        self.height = height;
        self.format = format;
        self.data = vec![0; len];
        true
    }

    /// Pixel format of the current content.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Mutable pixel bytes.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Packed view over the current content.
    ///
    /// # Errors
    ///
    /// Never fails for a buffer shaped through [`Self::ensure_shape`].
    pub fn view(&self) -> Result<FrameView<'_>> {
        FrameView::packed(&self.data, self.width, self.height, self.format)
    }
}
