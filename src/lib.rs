//! Zero-copy VideoToolbox to OpenGL interop.
//!
//! This crate maps frames decoded by Apple VideoToolbox (CoreVideo pixel
//! buffers backed by IOSurfaces) into OpenGL rectangle textures without
//! copying pixel data, and provides a CPU copy path for consumers that
//! cannot sample textures.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hwdec_gl::{HwdecDevices, HwdecDriver, HwdecOptions, VtGlInterop};
//! use hwdec_gl::videotoolbox::{CglContext, CvPixelBuffer};
//!
//! let registry = Arc::new(HwdecDevices::<CvPixelBuffer>::new());
//! let options = HwdecOptions::new().shared();
//!
//! // The CGL context must be current on this thread.
//! let gl = CglContext::current()?;
//! let mut interop = VtGlInterop::create(gl, registry.clone(), options)?;
//!
//! // Per decoded frame
//! let textures = interop.map_frame(&frame)?;
//! for (i, plane) in textures.planes() {
//!     // bind plane.texture on GL_TEXTURE_RECTANGLE, apply plane.swizzle
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `videotoolbox` - CoreVideo/IOSurface/CGL backend (macOS only)
//!
//! # Architecture
//!
//! The import logic is written against the [`GlContext`] and [`PixelBuffer`]
//! traits. The macOS backend implements them on top of CoreVideo and CGL;
//! tests implement them with in-memory fakes.

mod buffer;
mod capability;
mod config;
mod device;
mod download;
mod error;
mod format;
mod gl;
mod image;
mod import;
mod interop;

#[cfg(test)]
mod testing;

pub use buffer::{
    HardwareFrame, LockedPlanes, NativeSurface, PixelBuffer, PlaneData, RetainedBuffer,
};
pub use capability::check as check_capabilities;
pub use config::{HwdecOptions, SharedOptions};
pub use device::{DeviceRegistry, HwdecApi, HwdecDevice, HwdecDevices};
pub use download::download_image;
pub use error::{ErrorClass, HwdecError};
pub use format::{
    formats, lookup_by_hardware_id, lookup_by_image_format, CvPixelFormat, ImageFormat,
    PixelFormatDescriptor, PlaneLayout, Swizzle, MAX_PLANES,
};
pub use gl::{
    drain_errors, query_version, GlContext, GlVersion, InternalFormat, SampleType, SurfaceImport,
    SurfaceImportError, TexelFormat, TextureId, TextureTarget, GL_TEXTURE_RECTANGLE,
};
pub use image::{ColorRange, FrameAttributes, Image, ImageParams, ImagePlane, ImagePool, ImageView};
pub use import::{import, ImportedPlane, ImportedTextureSet};
pub use interop::{HwdecDriver, InteropState, VtGlInterop};

// macOS backend
#[cfg(all(target_os = "macos", feature = "videotoolbox"))]
pub mod videotoolbox;
