//! CPU-side images, frame metadata and the image pool.

use crate::buffer::PlaneData;
use crate::format::{CvPixelFormat, ImageFormat, MAX_PLANES};

/// Nominal range of the color values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    #[default]
    Auto,
    /// Video (limited) range.
    Limited,
    /// Full range.
    Full,
}

/// Per-frame metadata carried alongside the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameAttributes {
    /// Presentation timestamp in microseconds.
    pub timestamp_us: Option<u64>,
    /// Frame duration in microseconds.
    pub duration_us: Option<u64>,
    pub color_range: ColorRange,
    /// Clockwise display rotation in degrees.
    pub rotation: u16,
}

/// Format parameters negotiated between decoder and renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    pub imgfmt: ImageFormat,
    /// Pixel format of the underlying hardware buffers, if `imgfmt` is a hardware tag.
    pub hw_subfmt: Option<CvPixelFormat>,
    pub width: u32,
    pub height: u32,
    pub color_range: ColorRange,
}

impl ImageParams {
    #[must_use]
    pub fn new(imgfmt: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            imgfmt,
            hw_subfmt: None,
            width,
            height,
            color_range: ColorRange::Auto,
        }
    }

    /// Set the hardware subformat.
    #[must_use]
    pub fn hw_subfmt(mut self, hw_subfmt: CvPixelFormat) -> Self {
        self.hw_subfmt = Some(hw_subfmt);
        self
    }
}

/// Image referencing memory it does not own.
#[derive(Debug, Clone)]
pub struct ImageView<'a> {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub planes: [Option<PlaneData<'a>>; MAX_PLANES],
    pub attributes: FrameAttributes,
}

impl<'a> ImageView<'a> {
    #[must_use]
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            planes: [None; MAX_PLANES],
            attributes: FrameAttributes::default(),
        }
    }

    /// Copies timing and color metadata from a source frame.
    pub fn copy_attributes(&mut self, attributes: &FrameAttributes) {
        self.attributes = *attributes;
    }
}

/// One plane of an owned image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlane {
    pub data: Vec<u8>,
    pub stride: usize,
}

impl ImagePlane {
    /// Returns row `y`, `width_bytes` long, or `None` if it lies outside the plane.
    #[must_use]
    pub fn row(&self, y: usize, width_bytes: usize) -> Option<&[u8]> {
        let start = y.checked_mul(self.stride)?;
        self.data.get(start..start.checked_add(width_bytes)?)
    }
}

/// Image owning its pixel memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<ImagePlane>,
    pub attributes: FrameAttributes,
}

/// Pool of plane allocations reused across copies.
#[derive(Debug)]
pub struct ImagePool {
    free: Vec<Vec<u8>>,
    capacity: usize,
    stride_align: usize,
}

impl Default for ImagePool {
    fn default() -> Self {
        Self {
            free: Vec::new(),
            capacity: 16,
            stride_align: 16,
        }
    }
}

impl ImagePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many plane buffers are kept for reuse.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the stride alignment of copied planes (rounded up to a power of two).
    #[must_use]
    pub fn stride_align(mut self, align: usize) -> Self {
        self.stride_align = align.max(1).next_power_of_two();
        self
    }

    /// Number of buffers currently available for reuse.
    #[must_use]
    pub fn free_buffers(&self) -> usize {
        self.free.len()
    }

    /// Copies `view` into pool memory.
    ///
    /// Returns `None` if the view is missing a plane its format requires, or
    /// if a plane is too small for the view's dimensions.
    pub fn new_copy(&mut self, view: &ImageView<'_>) -> Option<Image> {
        let mut planes = Vec::with_capacity(view.format.num_planes());
        for index in 0..view.format.num_planes() {
            let (row_bytes, rows) = view.format.plane_geometry(index, view.width, view.height)?;
            let src = match view.planes[index] {
                Some(src) => src,
                None => {
                    tracing::warn!("[image-pool] {} view lacks plane {index}", view.format);
                    return None;
                }
            };
            let needed = if rows == 0 {
                0
            } else {
                (rows - 1) * src.stride + row_bytes
            };
            if src.stride < row_bytes || src.data.len() < needed {
                tracing::warn!(
                    "[image-pool] plane {index} too small: stride={}, len={}, need {row_bytes}x{rows}",
                    src.stride,
                    src.data.len(),
                );
                return None;
            }

            let stride = row_bytes.next_multiple_of(self.stride_align);
            let mut data = self.take_buffer(stride * rows);
            for y in 0..rows {
                data[y * stride..y * stride + row_bytes]
                    .copy_from_slice(&src.data[y * src.stride..y * src.stride + row_bytes]);
            }
            planes.push(ImagePlane { data, stride });
        }

        Some(Image {
            format: view.format,
            width: view.width,
            height: view.height,
            planes,
            attributes: view.attributes,
        })
    }

    /// Returns an image's plane memory to the pool.
    pub fn recycle(&mut self, image: Image) {
        for plane in image.planes {
            if self.free.len() >= self.capacity {
                break;
            }
            self.free.push(plane.data);
        }
    }

    fn take_buffer(&mut self, len: usize) -> Vec<u8> {
        match self.free.iter().position(|b| b.capacity() >= len) {
            Some(index) => {
                let mut buf = self.free.swap_remove(index);
                buf.clear();
                buf.resize(len, 0);
                buf
            }
            None => vec![0; len],
        }
    }
}
