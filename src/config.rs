//! Runtime options.

use std::sync::{Arc, RwLock};

use crate::format::ImageFormat;
use crate::gl::GlVersion;

/// Options read by the interop and by its registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwdecOptions {
    /// Software format the decoder should ask VideoToolbox to output.
    pub videotoolbox_format: ImageFormat,
    /// Minimum OpenGL version accepted by the capability check.
    pub min_gl_version: GlVersion,
}

impl Default for HwdecOptions {
    fn default() -> Self {
        Self {
            videotoolbox_format: ImageFormat::Nv12,
            min_gl_version: GlVersion::MIN_RECTANGLE_TEXTURE,
        }
    }
}

impl HwdecOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred VideoToolbox output format.
    #[must_use]
    pub fn videotoolbox_format(mut self, format: ImageFormat) -> Self {
        self.videotoolbox_format = format;
        self
    }

    /// Set the minimum OpenGL version.
    #[must_use]
    pub fn min_gl_version(mut self, version: GlVersion) -> Self {
        self.min_gl_version = version;
        self
    }

    /// Wrap into a handle that can be updated after the interop is created.
    #[must_use]
    pub fn shared(self) -> SharedOptions {
        Arc::new(RwLock::new(self))
    }
}

/// Options shared between the owner and the registered device.
pub type SharedOptions = Arc<RwLock<HwdecOptions>>;
