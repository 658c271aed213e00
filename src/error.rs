//! Error types for hardware surface interop.

use thiserror::Error;

use crate::format::{CvPixelFormat, ImageFormat};
use crate::gl::GlVersion;

/// Broad classification of an [`HwdecError`].
///
/// Callers use this to decide between giving up on the interop for good,
/// dropping a single frame, or falling back to the CPU copy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The GPU context cannot host the interop. Construction fails.
    Configuration,
    /// The frame uses a pixel format missing from the format table.
    Format,
    /// Caller or decoder broke the interop's contract.
    ContractViolation,
    /// A GPU-side import failed.
    Resource,
    /// The buffer has no GPU-importable surface; use the CPU copy instead.
    SurfaceUnavailable,
}

/// Errors that can occur while importing hardware frames.
#[derive(Debug, Error)]
pub enum HwdecError {
    /// The OpenGL version is too old for rectangle texture import.
    #[error("need >= OpenGL {required} for core rectangle texture support (have {found})")]
    GlVersionTooOld { found: GlVersion, required: GlVersion },

    /// No OpenGL context is current on this thread.
    #[error("no current CGL context; the cocoa OpenGL backend must be active")]
    NoCurrentContext,

    /// The pixel buffer is not backed by an IOSurface.
    #[error("pixel buffer has no IOSurface")]
    NoSurface,

    /// The pixel buffer uses a format missing from the format table.
    #[error("unsupported pixel buffer format {0}")]
    UnsupportedFormat(CvPixelFormat),

    /// `reinit` was given a hardware subformat that cannot be resolved.
    #[error("unsupported hardware subformat {0:?}")]
    UnsupportedSubformat(Option<CvPixelFormat>),

    /// The buffer's plane layout disagrees with the format table.
    #[error("plane count mismatch for {format}: buffer reports {found} (planar: {planar}), table expects {expected}")]
    PlaneCountMismatch {
        format: CvPixelFormat,
        planar: bool,
        found: usize,
        expected: usize,
    },

    /// A frame or parameter set carried the wrong image format tag.
    #[error("expected image format {expected}, got {found}")]
    UnexpectedImageFormat {
        expected: ImageFormat,
        found: ImageFormat,
    },

    /// The interop was already destroyed.
    #[error("interop used after destroy")]
    Destroyed,

    /// Locking the pixel buffer base address failed.
    #[error("failed to lock pixel buffer: CVReturn {0}")]
    LockFailed(i32),

    /// Invalid option value.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl HwdecError {
    /// Create an InvalidOption error with a message.
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    /// Returns the class this error belongs to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::GlVersionTooOld { .. } | Self::NoCurrentContext | Self::InvalidOption(_) => {
                ErrorClass::Configuration
            }
            Self::UnsupportedFormat(_) | Self::UnsupportedSubformat(_) => ErrorClass::Format,
            Self::PlaneCountMismatch { .. }
            | Self::UnexpectedImageFormat { .. }
            | Self::Destroyed => ErrorClass::ContractViolation,
            Self::LockFailed(_) => ErrorClass::Resource,
            Self::NoSurface => ErrorClass::SurfaceUnavailable,
        }
    }

    /// Returns true if the interop cannot be used anymore after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Configuration | ErrorClass::ContractViolation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(HwdecError::NoSurface.class(), ErrorClass::SurfaceUnavailable);
        assert_eq!(
            HwdecError::UnsupportedFormat(CvPixelFormat(0)).class(),
            ErrorClass::Format
        );
        assert!(HwdecError::Destroyed.is_fatal());
        assert!(HwdecError::NoCurrentContext.is_fatal());
        assert!(!HwdecError::NoSurface.is_fatal());
    }

    #[test]
    fn test_display_mentions_fourcc() {
        let err = HwdecError::UnsupportedFormat(CvPixelFormat::from_fourcc(*b"x420"));
        assert_eq!(err.to_string(), "unsupported pixel buffer format 'x420'");
    }
}
