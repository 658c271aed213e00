//! Hardware pixel buffers and the retained-buffer slot.

use crate::format::{CvPixelFormat, ImageFormat};
use crate::image::FrameAttributes;
use crate::HwdecError;

/// GPU-importable surface backing a pixel buffer.
pub trait NativeSurface {
    /// Width of `plane` in texels.
    fn plane_width(&self, plane: usize) -> u32;

    /// Height of `plane` in texels.
    fn plane_height(&self, plane: usize) -> u32;
}

/// One plane of a locked pixel buffer.
#[derive(Debug, Clone, Copy)]
pub struct PlaneData<'a> {
    /// Plane memory starting at the base address, `stride * rows` bytes.
    pub data: &'a [u8],
    /// Bytes per row.
    pub stride: usize,
}

/// CPU mapping of a pixel buffer, released on drop.
pub trait LockedPlanes {
    /// Returns the memory of `plane`, or `None` if the buffer has no such plane.
    fn plane(&self, plane: usize) -> Option<PlaneData<'_>>;
}

/// Reference-counted hardware pixel buffer.
///
/// `Clone` retains the buffer and `Drop` releases it, so holding a value
/// keeps the underlying memory alive.
pub trait PixelBuffer: Clone {
    type Surface: NativeSurface;
    type Lock<'a>: LockedPlanes
    where
        Self: 'a;

    /// CoreVideo pixel format type of the buffer.
    fn pixel_format(&self) -> CvPixelFormat;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Returns true if the buffer stores its planes separately.
    fn is_planar(&self) -> bool;

    /// Number of planes; 0 for non-planar buffers.
    fn plane_count(&self) -> usize;

    /// Returns the backing surface, or `None` if the buffer is not GPU-importable.
    fn surface(&self) -> Option<Self::Surface>;

    /// Locks the base address for reading.
    fn lock_read_only(&self) -> Result<Self::Lock<'_>, HwdecError>;
}

/// A decoded frame as handed out by the decoder.
#[derive(Debug, Clone)]
pub struct HardwareFrame<B> {
    /// Image format tag. Hardware frames carry [`ImageFormat::VideoToolbox`].
    pub format: ImageFormat,
    /// The native buffer.
    pub buffer: B,
    /// Timing and color metadata.
    pub attributes: FrameAttributes,
}

impl<B: PixelBuffer> HardwareFrame<B> {
    /// Wraps a VideoToolbox buffer.
    #[must_use]
    pub fn new(buffer: B, attributes: FrameAttributes) -> Self {
        Self {
            format: ImageFormat::VideoToolbox,
            buffer,
            attributes,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }
}

/// Slot holding at most one retained pixel buffer.
///
/// Replacing the content releases the previous buffer before the new one is
/// adopted, and dropping the slot releases whatever it holds.
#[derive(Debug)]
pub struct RetainedBuffer<B> {
    buffer: Option<B>,
}

impl<B> Default for RetainedBuffer<B> {
    fn default() -> Self {
        Self { buffer: None }
    }
}

impl<B: PixelBuffer> RetainedBuffer<B> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases the held buffer, then retains `buffer`.
    pub fn replace(&mut self, buffer: &B) -> &B {
        self.release();
        self.buffer.insert(buffer.clone())
    }

    /// Releases the held buffer. No-op on an empty slot.
    pub fn release(&mut self) {
        self.buffer = None;
    }

    #[must_use]
    pub fn get(&self) -> Option<&B> {
        self.buffer.as_ref()
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.buffer.is_some()
    }
}
