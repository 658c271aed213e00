//! CPU copy of hardware frames for consumers that cannot sample textures.

use crate::buffer::{HardwareFrame, LockedPlanes, PixelBuffer};
use crate::format::{lookup_by_hardware_id, ImageFormat};
use crate::image::{Image, ImagePool, ImageView};

/// Copies `frame` into a software image allocated from `pool`.
///
/// The buffer stays locked read-only for the duration of the copy and is
/// unlocked on every return path. Returns `None` if the frame is not a
/// VideoToolbox frame, the buffer cannot be locked, or its format is not in
/// the format table.
pub fn download_image<B: PixelBuffer>(
    frame: &HardwareFrame<B>,
    pool: &mut ImagePool,
) -> Option<Image> {
    if frame.format != ImageFormat::VideoToolbox {
        return None;
    }

    let buffer = &frame.buffer;
    let lock = match buffer.lock_read_only() {
        Ok(lock) => lock,
        Err(e) => {
            tracing::warn!("[hwdec-vt] download: {e}");
            return None;
        }
    };

    let width = buffer.width();
    let height = buffer.height();
    let hw_format = buffer.pixel_format();
    let Some(desc) = lookup_by_hardware_id(hw_format) else {
        tracing::warn!("[hwdec-vt] download: unsupported format type {hw_format}");
        return None;
    };

    let mut view = ImageView::new(desc.image_format, width, height);
    for i in 0..desc.plane_count() {
        view.planes[i] = lock.plane(i);
    }
    view.copy_attributes(&frame.attributes);

    let image = pool.new_copy(&view);
    drop(lock);
    image
}
