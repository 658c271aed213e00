//! CoreVideo, IOSurface and CGL implementations of the interop traits.
//!
//! Only built on macOS with the `videotoolbox` feature.

use std::ffi::CStr;

use core_foundation_sys::base::{CFRelease, CFRetain, CFTypeRef};
use libc::{c_char, c_void};
use video_toolbox_sys::cv_types::CVPixelBufferRef;

use crate::buffer::{LockedPlanes, NativeSurface, PixelBuffer, PlaneData};
use crate::format::CvPixelFormat;
use crate::gl::{
    drain_errors, query_version, GlContext, GlVersion, SurfaceImport, SurfaceImportError,
    TextureId, TextureTarget,
};
use crate::HwdecError;

type IOSurfaceRef = *mut c_void;
type CGLContextObj = *mut c_void;
type CGLError = i32;

const K_CV_PIXEL_BUFFER_LOCK_READ_ONLY: u64 = 1;

#[link(name = "CoreVideo", kind = "framework")]
extern "C" {
    fn CVPixelBufferRetain(buf: CVPixelBufferRef) -> CVPixelBufferRef;
    fn CVPixelBufferRelease(buf: CVPixelBufferRef);
    fn CVPixelBufferGetPixelFormatType(buf: CVPixelBufferRef) -> u32;
    fn CVPixelBufferGetWidth(buf: CVPixelBufferRef) -> usize;
    fn CVPixelBufferGetHeight(buf: CVPixelBufferRef) -> usize;
    fn CVPixelBufferIsPlanar(buf: CVPixelBufferRef) -> u8;
    fn CVPixelBufferGetPlaneCount(buf: CVPixelBufferRef) -> usize;
    fn CVPixelBufferGetIOSurface(buf: CVPixelBufferRef) -> IOSurfaceRef;
    fn CVPixelBufferLockBaseAddress(buf: CVPixelBufferRef, flags: u64) -> i32;
    fn CVPixelBufferUnlockBaseAddress(buf: CVPixelBufferRef, flags: u64) -> i32;
    fn CVPixelBufferGetBaseAddress(buf: CVPixelBufferRef) -> *mut c_void;
    fn CVPixelBufferGetBytesPerRow(buf: CVPixelBufferRef) -> usize;
    fn CVPixelBufferGetBaseAddressOfPlane(buf: CVPixelBufferRef, idx: usize) -> *mut c_void;
    fn CVPixelBufferGetBytesPerRowOfPlane(buf: CVPixelBufferRef, idx: usize) -> usize;
    fn CVPixelBufferGetHeightOfPlane(buf: CVPixelBufferRef, idx: usize) -> usize;
}

#[link(name = "IOSurface", kind = "framework")]
extern "C" {
    fn IOSurfaceGetWidth(surface: IOSurfaceRef) -> usize;
    fn IOSurfaceGetHeight(surface: IOSurfaceRef) -> usize;
    fn IOSurfaceGetPlaneCount(surface: IOSurfaceRef) -> usize;
    fn IOSurfaceGetWidthOfPlane(surface: IOSurfaceRef, plane: usize) -> usize;
    fn IOSurfaceGetHeightOfPlane(surface: IOSurfaceRef, plane: usize) -> usize;
}

#[link(name = "OpenGL", kind = "framework")]
extern "C" {
    fn CGLGetCurrentContext() -> CGLContextObj;
    fn CGLErrorString(error: CGLError) -> *const c_char;
    fn CGLTexImageIOSurface2D(
        ctx: CGLContextObj,
        target: u32,
        internal_format: u32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        surface: IOSurfaceRef,
        plane: u32,
    ) -> CGLError;
    fn glGenTextures(n: i32, textures: *mut u32);
    fn glDeleteTextures(n: i32, textures: *const u32);
    fn glBindTexture(target: u32, texture: u32);
    fn glGetError() -> u32;
    fn glGetIntegerv(pname: u32, data: *mut i32);
}

/// Retained `CVPixelBufferRef`.
///
/// `Clone` calls `CVPixelBufferRetain`, `Drop` calls `CVPixelBufferRelease`.
pub struct CvPixelBuffer {
    ptr: CVPixelBufferRef,
}

// CoreVideo reference counting is thread-safe.
unsafe impl Send for CvPixelBuffer {}

impl CvPixelBuffer {
    /// Retains `ptr` and wraps it.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be a valid `CVPixelBufferRef` or null.
    pub unsafe fn retain(ptr: CVPixelBufferRef) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(Self {
            ptr: CVPixelBufferRetain(ptr),
        })
    }

    pub fn as_ptr(&self) -> CVPixelBufferRef {
        self.ptr
    }
}

impl Clone for CvPixelBuffer {
    fn clone(&self) -> Self {
        Self {
            ptr: unsafe { CVPixelBufferRetain(self.ptr) },
        }
    }
}

impl Drop for CvPixelBuffer {
    fn drop(&mut self) {
        unsafe { CVPixelBufferRelease(self.ptr) };
    }
}

impl std::fmt::Debug for CvPixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CvPixelBuffer")
            .field("ptr", &self.ptr)
            .field("format", &self.pixel_format())
            .finish()
    }
}

impl PixelBuffer for CvPixelBuffer {
    type Surface = IoSurface;
    type Lock<'a> = CvReadLock<'a>;

    fn pixel_format(&self) -> CvPixelFormat {
        CvPixelFormat(unsafe { CVPixelBufferGetPixelFormatType(self.ptr) })
    }

    fn width(&self) -> u32 {
        unsafe { CVPixelBufferGetWidth(self.ptr) as u32 }
    }

    fn height(&self) -> u32 {
        unsafe { CVPixelBufferGetHeight(self.ptr) as u32 }
    }

    fn is_planar(&self) -> bool {
        unsafe { CVPixelBufferIsPlanar(self.ptr) != 0 }
    }

    fn plane_count(&self) -> usize {
        unsafe { CVPixelBufferGetPlaneCount(self.ptr) }
    }

    fn surface(&self) -> Option<IoSurface> {
        let surface = unsafe { CVPixelBufferGetIOSurface(self.ptr) };
        if surface.is_null() {
            return None;
        }
        unsafe { CFRetain(surface as CFTypeRef) };
        Some(IoSurface { ptr: surface })
    }

    fn lock_read_only(&self) -> Result<CvReadLock<'_>, HwdecError> {
        let status =
            unsafe { CVPixelBufferLockBaseAddress(self.ptr, K_CV_PIXEL_BUFFER_LOCK_READ_ONLY) };
        if status != 0 {
            return Err(HwdecError::LockFailed(status));
        }
        Ok(CvReadLock {
            buffer: self,
            planar: self.is_planar(),
        })
    }
}

/// Read-only base address lock, unlocked on drop.
pub struct CvReadLock<'a> {
    buffer: &'a CvPixelBuffer,
    planar: bool,
}

impl LockedPlanes for CvReadLock<'_> {
    fn plane(&self, plane: usize) -> Option<PlaneData<'_>> {
        let buf = self.buffer.ptr;
        let (base, stride, rows) = unsafe {
            if self.planar {
                if plane >= CVPixelBufferGetPlaneCount(buf) {
                    return None;
                }
                (
                    CVPixelBufferGetBaseAddressOfPlane(buf, plane),
                    CVPixelBufferGetBytesPerRowOfPlane(buf, plane),
                    CVPixelBufferGetHeightOfPlane(buf, plane),
                )
            } else {
                if plane > 0 {
                    return None;
                }
                (
                    CVPixelBufferGetBaseAddress(buf),
                    CVPixelBufferGetBytesPerRow(buf),
                    CVPixelBufferGetHeight(buf),
                )
            }
        };
        if base.is_null() {
            return None;
        }

        // Valid until the lock is dropped.
        let data = unsafe { std::slice::from_raw_parts(base as *const u8, stride * rows) };
        Some(PlaneData { data, stride })
    }
}

impl Drop for CvReadLock<'_> {
    fn drop(&mut self) {
        let status = unsafe {
            CVPixelBufferUnlockBaseAddress(self.buffer.ptr, K_CV_PIXEL_BUFFER_LOCK_READ_ONLY)
        };
        if status != 0 {
            tracing::warn!("[hwdec-vt] CVPixelBufferUnlockBaseAddress failed: {status}");
        }
    }
}

/// Retained `IOSurfaceRef`.
pub struct IoSurface {
    ptr: IOSurfaceRef,
}

impl IoSurface {
    pub fn as_ptr(&self) -> IOSurfaceRef {
        self.ptr
    }
}

impl Clone for IoSurface {
    fn clone(&self) -> Self {
        unsafe { CFRetain(self.ptr as CFTypeRef) };
        Self { ptr: self.ptr }
    }
}

impl Drop for IoSurface {
    fn drop(&mut self) {
        unsafe { CFRelease(self.ptr as CFTypeRef) };
    }
}

impl NativeSurface for IoSurface {
    fn plane_width(&self, plane: usize) -> u32 {
        unsafe {
            if IOSurfaceGetPlaneCount(self.ptr) == 0 {
                IOSurfaceGetWidth(self.ptr) as u32
            } else {
                IOSurfaceGetWidthOfPlane(self.ptr, plane) as u32
            }
        }
    }

    fn plane_height(&self, plane: usize) -> u32 {
        unsafe {
            if IOSurfaceGetPlaneCount(self.ptr) == 0 {
                IOSurfaceGetHeight(self.ptr) as u32
            } else {
                IOSurfaceGetHeightOfPlane(self.ptr, plane) as u32
            }
        }
    }
}

/// The CGL context that was current when [`CglContext::current`] was called.
pub struct CglContext {
    ctx: CGLContextObj,
    version: GlVersion,
}

impl CglContext {
    /// Captures the calling thread's current CGL context.
    pub fn current() -> Result<Self, HwdecError> {
        let ctx = unsafe { CGLGetCurrentContext() };
        if ctx.is_null() {
            return Err(HwdecError::NoCurrentContext);
        }

        let version = query_version(
            || unsafe { glGetError() },
            |pname| {
                let mut value = 0i32;
                unsafe { glGetIntegerv(pname, &mut value) };
                value
            },
        );

        Ok(Self { ctx, version })
    }
}

impl GlContext for CglContext {
    type Surface = IoSurface;

    fn version(&self) -> GlVersion {
        self.version
    }

    fn has_current_context(&self) -> bool {
        let current = unsafe { CGLGetCurrentContext() };
        !current.is_null() && current == self.ctx
    }

    fn gen_textures(&mut self, textures: &mut [TextureId]) {
        let mut names = vec![0u32; textures.len()];
        unsafe { glGenTextures(names.len() as i32, names.as_mut_ptr()) };
        for (slot, name) in textures.iter_mut().zip(names) {
            *slot = TextureId(name);
        }
    }

    fn delete_textures(&mut self, textures: &[TextureId]) {
        let names: Vec<u32> = textures.iter().map(|t| t.0).collect();
        unsafe { glDeleteTextures(names.len() as i32, names.as_ptr()) };
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId) {
        unsafe { glBindTexture(target.gl_enum(), texture.0) };
    }

    fn tex_image_surface(
        &mut self,
        import: &SurfaceImport,
        surface: &IoSurface,
    ) -> Result<(), SurfaceImportError> {
        drain_errors(|| unsafe { glGetError() });
        let err = unsafe {
            CGLTexImageIOSurface2D(
                self.ctx,
                import.target.gl_enum(),
                import.internal_format.gl_enum(),
                import.width as i32,
                import.height as i32,
                import.format.gl_enum(),
                import.sample_type.gl_enum(),
                surface.ptr,
                import.plane as u32,
            )
        };
        if err == 0 {
            return Ok(());
        }

        let message = unsafe {
            let s = CGLErrorString(err);
            if s.is_null() {
                String::from("unknown CGL error")
            } else {
                CStr::from_ptr(s).to_string_lossy().into_owned()
            }
        };
        Err(SurfaceImportError {
            code: err,
            message,
            gl_error: unsafe { glGetError() },
        })
    }
}
