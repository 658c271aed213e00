//! Zero-copy import of pixel buffer planes as OpenGL textures.

use crate::buffer::{HardwareFrame, NativeSurface, PixelBuffer, RetainedBuffer};
use crate::format::{lookup_by_hardware_id, ImageFormat, Swizzle, MAX_PLANES};
use crate::gl::{GlContext, SurfaceImport, SurfaceImportError, TextureId, TextureTarget};
use crate::HwdecError;

/// A plane texture ready for sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedPlane {
    pub texture: TextureId,
    pub target: TextureTarget,
    pub width: u32,
    pub height: u32,
    pub swizzle: Swizzle,
}

/// Per-plane textures of the currently mapped frame.
///
/// A plane whose import failed stays empty and its error is kept in
/// [`failed_planes`](Self::failed_planes); the renderer has to cope with
/// the missing plane.
#[derive(Debug, Default)]
pub struct ImportedTextureSet {
    planes: [Option<ImportedPlane>; MAX_PLANES],
    failed: [Option<SurfaceImportError>; MAX_PLANES],
    image_format: Option<ImageFormat>,
}

impl ImportedTextureSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns plane `index` if it was imported.
    #[must_use]
    pub fn plane(&self, index: usize) -> Option<&ImportedPlane> {
        self.planes.get(index).and_then(Option::as_ref)
    }

    /// Iterates over imported planes with their index.
    pub fn planes(&self) -> impl Iterator<Item = (usize, &ImportedPlane)> {
        self.planes
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
    }

    /// Number of imported planes.
    #[must_use]
    pub fn populated(&self) -> usize {
        self.planes.iter().flatten().count()
    }

    /// Iterates over planes whose import failed.
    pub fn failed_planes(&self) -> impl Iterator<Item = (usize, &SurfaceImportError)> {
        self.failed
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    /// Returns true if at least one plane failed to import.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.failed.iter().any(Option::is_some)
    }

    /// Software format the planes should be interpreted as.
    #[must_use]
    pub fn image_format(&self) -> Option<ImageFormat> {
        self.image_format
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Retains `frame`'s buffer and binds its surface planes to `textures`.
///
/// The previously retained buffer is released before the new one is
/// retained, whether or not the import succeeds afterwards. Plane import
/// failures are logged and recorded in `out` without failing the call.
pub fn import<C, B>(
    gl: &mut C,
    textures: &[TextureId; MAX_PLANES],
    retained: &mut RetainedBuffer<B>,
    frame: &HardwareFrame<B>,
    out: &mut ImportedTextureSet,
) -> Result<(), HwdecError>
where
    C: GlContext<Surface = B::Surface>,
    B: PixelBuffer,
{
    out.clear();

    let buffer = retained.replace(&frame.buffer);
    let Some(surface) = buffer.surface() else {
        tracing::error!("[hwdec-vt] CVPixelBuffer has no IOSurface");
        return Err(HwdecError::NoSurface);
    };

    let hw_format = buffer.pixel_format();
    let Some(desc) = lookup_by_hardware_id(hw_format) else {
        tracing::error!("[hwdec-vt] CVPixelBuffer has unsupported format type {hw_format}");
        return Err(HwdecError::UnsupportedFormat(hw_format));
    };

    let planar = buffer.is_planar();
    let planes = buffer.plane_count();
    let consistent = if planar {
        planes == desc.plane_count()
    } else {
        desc.plane_count() == 1
    };
    if !consistent {
        tracing::error!(
            "[hwdec-vt] {hw_format}: buffer has {planes} planes (planar: {planar}), expected {}",
            desc.plane_count()
        );
        return Err(HwdecError::PlaneCountMismatch {
            format: hw_format,
            planar,
            found: planes,
            expected: desc.plane_count(),
        });
    }

    let target = TextureTarget::Rectangle;
    for (i, layout) in desc.planes.iter().enumerate() {
        let width = surface.plane_width(i);
        let height = surface.plane_height(i);

        gl.bind_texture(target, textures[i]);
        let result = gl.tex_image_surface(
            &SurfaceImport {
                target,
                internal_format: layout.internal_format,
                width,
                height,
                format: layout.format,
                sample_type: layout.sample_type,
                plane: i,
            },
            &surface,
        );
        gl.bind_texture(target, TextureId::NONE);

        match result {
            Ok(()) => {
                out.planes[i] = Some(ImportedPlane {
                    texture: textures[i],
                    target,
                    width,
                    height,
                    swizzle: layout.swizzle,
                });
            }
            Err(err) => {
                tracing::error!("[hwdec-vt] error creating IOSurface texture for plane {i}: {err}");
                out.failed[i] = Some(err);
            }
        }
    }
    out.image_format = Some(desc.image_format);

    tracing::trace!(
        "[hwdec-vt] mapped {hw_format} {}x{}, {} planes",
        frame.width(),
        frame.height(),
        out.populated()
    );
    Ok(())
}
