//! OpenGL capability check run once before the interop is created.

use crate::gl::{GlContext, GlVersion};
use crate::HwdecError;

/// Checks that `gl` can import IOSurfaces as rectangle textures.
///
/// `min_version` is clamped to [`GlVersion::MIN_RECTANGLE_TEXTURE`].
pub fn check<C: GlContext>(gl: &C, min_version: GlVersion) -> Result<(), HwdecError> {
    let required = min_version.max(GlVersion::MIN_RECTANGLE_TEXTURE);
    let found = gl.version();
    if found < required {
        tracing::error!(
            "[hwdec-vt] need >= OpenGL {required} for core rectangle texture support (have {found})"
        );
        return Err(HwdecError::GlVersionTooOld { found, required });
    }

    if !gl.has_current_context() {
        tracing::error!("[hwdec-vt] need cocoa OpenGL backend to be active");
        return Err(HwdecError::NoCurrentContext);
    }

    Ok(())
}
