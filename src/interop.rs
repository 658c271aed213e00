//! VideoToolbox → OpenGL interop driver.
//!
//! Owns the plane textures and the retained pixel buffer for the lifetime
//! of a rendering session:
//!
//! ```text
//! create ──► Ready ──map_frame──► Mapped ⟲ map_frame
//!                                   │
//!                        destroy / drop
//!                                   ▼
//!                               Destroyed
//! ```

use std::sync::Arc;

use crate::buffer::{HardwareFrame, PixelBuffer, RetainedBuffer};
use crate::capability;
use crate::config::SharedOptions;
use crate::device::{DeviceRegistry, HwdecApi, HwdecDevice};
use crate::format::{lookup_by_hardware_id, ImageFormat, MAX_PLANES};
use crate::gl::{GlContext, TextureId};
use crate::image::ImageParams;
use crate::import::{import, ImportedTextureSet};
use crate::HwdecError;

/// Interface shared by hardware decoding interop drivers.
pub trait HwdecDriver<B: PixelBuffer> {
    /// Short driver name.
    fn name(&self) -> &'static str;

    /// Hardware decoding API served by the driver.
    fn api(&self) -> HwdecApi;

    /// Image format tag of the frames the driver accepts.
    fn imgfmt(&self) -> ImageFormat;

    /// Rewrites hardware `params` into the software format the textures
    /// will be sampled as.
    fn reinit(&mut self, params: &mut ImageParams) -> Result<(), HwdecError>;

    /// Maps `frame` into the driver's textures.
    fn map_frame(&mut self, frame: &HardwareFrame<B>) -> Result<&ImportedTextureSet, HwdecError>;

    /// Releases every resource. Calling it twice is a no-op.
    fn destroy(&mut self);
}

/// Lifecycle state of a [`VtGlInterop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteropState {
    /// Textures allocated, nothing mapped yet.
    Ready,
    /// At least one frame went through `map_frame`.
    Mapped,
    Destroyed,
}

/// Maps VideoToolbox frames to OpenGL rectangle textures without copies.
pub struct VtGlInterop<C, B>
where
    C: GlContext<Surface = B::Surface>,
    B: PixelBuffer + 'static,
{
    gl: C,
    textures: [TextureId; MAX_PLANES],
    retained: RetainedBuffer<B>,
    mapped: ImportedTextureSet,
    device: Arc<HwdecDevice<B>>,
    registry: Arc<dyn DeviceRegistry<B>>,
    state: InteropState,
}

impl<C, B> VtGlInterop<C, B>
where
    C: GlContext<Surface = B::Surface>,
    B: PixelBuffer + 'static,
{
    /// Checks the context, allocates plane textures and registers the device.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The OpenGL version is older than `options.min_gl_version` or 3.0
    /// - No OpenGL context is current
    pub fn create(
        mut gl: C,
        registry: Arc<dyn DeviceRegistry<B>>,
        options: SharedOptions,
    ) -> Result<Self, HwdecError> {
        let min_version = match options.read() {
            Ok(o) => o.min_gl_version,
            Err(poisoned) => {
                tracing::warn!("[hwdec-vt] options lock poisoned, using last written values");
                poisoned.into_inner().min_gl_version
            }
        };
        capability::check(&gl, min_version)?;

        let mut textures = [TextureId::NONE; MAX_PLANES];
        gl.gen_textures(&mut textures);

        let device = Arc::new(HwdecDevice::new(HwdecApi::VideoToolbox, options));
        registry.register(Arc::clone(&device));

        tracing::info!(
            "[hwdec-vt] interop ready: OpenGL {}, {} plane textures",
            gl.version(),
            MAX_PLANES
        );

        Ok(Self {
            gl,
            textures,
            retained: RetainedBuffer::new(),
            mapped: ImportedTextureSet::new(),
            device,
            registry,
            state: InteropState::Ready,
        })
    }

    #[must_use]
    pub fn state(&self) -> InteropState {
        self.state
    }

    /// Device registered on behalf of this interop.
    #[must_use]
    pub fn device(&self) -> &Arc<HwdecDevice<B>> {
        &self.device
    }

    /// Textures of the last mapped frame.
    #[must_use]
    pub fn mapped(&self) -> &ImportedTextureSet {
        &self.mapped
    }

    /// Buffer currently kept alive for the mapped textures.
    #[must_use]
    pub fn retained_buffer(&self) -> Option<&B> {
        self.retained.get()
    }

    #[must_use]
    pub fn gl(&self) -> &C {
        &self.gl
    }
}

impl<C, B> HwdecDriver<B> for VtGlInterop<C, B>
where
    C: GlContext<Surface = B::Surface>,
    B: PixelBuffer + 'static,
{
    fn name(&self) -> &'static str {
        "videotoolbox"
    }

    fn api(&self) -> HwdecApi {
        HwdecApi::VideoToolbox
    }

    fn imgfmt(&self) -> ImageFormat {
        ImageFormat::VideoToolbox
    }

    fn reinit(&mut self, params: &mut ImageParams) -> Result<(), HwdecError> {
        if self.state == InteropState::Destroyed {
            return Err(HwdecError::Destroyed);
        }
        if params.imgfmt != self.imgfmt() {
            return Err(HwdecError::UnexpectedImageFormat {
                expected: self.imgfmt(),
                found: params.imgfmt,
            });
        }

        let Some(desc) = params.hw_subfmt.and_then(lookup_by_hardware_id) else {
            tracing::error!("[hwdec-vt] Unsupported CVPixelBuffer format {:?}", params.hw_subfmt);
            return Err(HwdecError::UnsupportedSubformat(params.hw_subfmt));
        };

        params.imgfmt = desc.image_format;
        params.hw_subfmt = None;
        tracing::debug!(
            "[hwdec-vt] reinit: {} {}x{}",
            params.imgfmt,
            params.width,
            params.height
        );
        Ok(())
    }

    fn map_frame(&mut self, frame: &HardwareFrame<B>) -> Result<&ImportedTextureSet, HwdecError> {
        if self.state == InteropState::Destroyed {
            return Err(HwdecError::Destroyed);
        }
        if frame.format != self.imgfmt() {
            return Err(HwdecError::UnexpectedImageFormat {
                expected: self.imgfmt(),
                found: frame.format,
            });
        }

        self.state = InteropState::Mapped;
        import(
            &mut self.gl,
            &self.textures,
            &mut self.retained,
            frame,
            &mut self.mapped,
        )?;
        Ok(&self.mapped)
    }

    fn destroy(&mut self) {
        if self.state == InteropState::Destroyed {
            return;
        }

        self.mapped.clear();
        self.retained.release();
        self.gl.delete_textures(&self.textures);
        self.textures = [TextureId::NONE; MAX_PLANES];
        self.registry.unregister(&self.device);
        self.state = InteropState::Destroyed;

        tracing::debug!("[hwdec-vt] interop destroyed");
    }
}

impl<C, B> Drop for VtGlInterop<C, B>
where
    C: GlContext<Surface = B::Surface>,
    B: PixelBuffer + 'static,
{
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HwdecOptions;
    use crate::device::HwdecDevices;
    use crate::error::ErrorClass;
    use crate::format::CvPixelFormat;
    use crate::gl::GlVersion;
    use crate::image::FrameAttributes;
    use crate::testing::{take_buffer_events, BufferEvent, FakeBuffer, FakeBufferSpec, FakeGl};

    type Interop = VtGlInterop<FakeGl, FakeBuffer>;

    fn create(gl: FakeGl) -> (Result<Interop, HwdecError>, Arc<HwdecDevices<FakeBuffer>>) {
        let registry = Arc::new(HwdecDevices::new());
        let interop = Interop::create(gl, registry.clone(), HwdecOptions::default().shared());
        (interop, registry)
    }

    fn frame(spec: FakeBufferSpec) -> HardwareFrame<FakeBuffer> {
        HardwareFrame::new(FakeBuffer::new(spec), FrameAttributes::default())
    }

    #[test]
    fn test_create_registers_device() {
        let gl = FakeGl::new(GlVersion::new(4, 1));
        let (interop, registry) = create(gl.clone());
        let interop = interop.unwrap();

        assert_eq!(interop.state(), InteropState::Ready);
        assert_eq!(interop.name(), "videotoolbox");
        assert_eq!(gl.state.borrow().live.len(), MAX_PLANES);
        assert_eq!(registry.len(), 1);
        let registered = registry.get(HwdecApi::VideoToolbox).unwrap();
        assert!(Arc::ptr_eq(&registered, interop.device()));
    }

    #[test]
    fn test_create_rejects_old_gl() {
        let gl = FakeGl::new(GlVersion::new(2, 1));
        let (interop, registry) = create(gl.clone());
        let err = interop.err().unwrap();
        assert!(matches!(err, HwdecError::GlVersionTooOld { .. }));
        assert!(err.is_fatal());
        assert!(registry.is_empty());
        assert!(gl.state.borrow().live.is_empty());
    }

    #[test]
    fn test_create_honours_min_version_option() {
        let registry: Arc<HwdecDevices<FakeBuffer>> = Arc::new(HwdecDevices::new());
        let options = HwdecOptions::new()
            .min_gl_version(GlVersion::new(4, 1))
            .shared();
        let result = Interop::create(FakeGl::new(GlVersion::new(3, 3)), registry.clone(), options);
        assert!(matches!(
            result.err(),
            Some(HwdecError::GlVersionTooOld { required, .. }) if required == GlVersion::new(4, 1)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_reads_poisoned_options() {
        let registry: Arc<HwdecDevices<FakeBuffer>> = Arc::new(HwdecDevices::new());
        let options = HwdecOptions::new()
            .min_gl_version(GlVersion::new(4, 1))
            .shared();
        let writer = Arc::clone(&options);
        let _ = std::thread::spawn(move || {
            let _guard = writer.write().unwrap();
            panic!("writer panicked");
        })
        .join();
        assert!(options.is_poisoned());

        let result = Interop::create(FakeGl::new(GlVersion::new(3, 3)), registry.clone(), options);
        assert!(matches!(
            result.err(),
            Some(HwdecError::GlVersionTooOld { required, .. }) if required == GlVersion::new(4, 1)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_without_context() {
        let (interop, registry) = create(FakeGl::new(GlVersion::new(3, 2)).without_context());
        assert!(matches!(interop.err(), Some(HwdecError::NoCurrentContext)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sequential_maps_retain_one_buffer() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();

        let frames: Vec<_> = (0..5).map(|_| frame(FakeBufferSpec::nv12(32, 32))).collect();
        for f in &frames {
            let set = interop.map_frame(f).unwrap();
            assert_eq!(set.populated(), 2);
        }
        assert_eq!(interop.state(), InteropState::Mapped);

        for f in &frames[..4] {
            assert_eq!(f.buffer.live_refs(), 1);
        }
        assert_eq!(frames[4].buffer.live_refs(), 2);
        assert_eq!(interop.retained_buffer().unwrap().id(), frames[4].buffer.id());
    }

    #[test]
    fn test_map_releases_previous_before_retaining() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();
        let first = frame(FakeBufferSpec::bgra(8, 8));
        let second = frame(FakeBufferSpec::bgra(8, 8));

        interop.map_frame(&first).unwrap();
        take_buffer_events();
        interop.map_frame(&second).unwrap();
        assert_eq!(
            take_buffer_events(),
            vec![
                BufferEvent::Release(first.buffer.id()),
                BufferEvent::Retain(second.buffer.id()),
            ]
        );
    }

    #[test]
    fn test_map_rejects_software_frame() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();
        let mut f = frame(FakeBufferSpec::nv12(8, 8));
        f.format = ImageFormat::Nv12;

        let err = interop.map_frame(&f).unwrap_err();
        assert_eq!(err.class(), ErrorClass::ContractViolation);
        assert!(interop.retained_buffer().is_none());
        assert_eq!(interop.state(), InteropState::Ready);
    }

    #[test]
    fn test_failed_map_stays_mapped() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();
        let f = frame(FakeBufferSpec::nv12(8, 8).without_surface());

        assert!(matches!(interop.map_frame(&f), Err(HwdecError::NoSurface)));
        assert_eq!(interop.state(), InteropState::Mapped);
        assert_eq!(interop.retained_buffer().unwrap().id(), f.buffer.id());

        let good = frame(FakeBufferSpec::nv12(8, 8));
        assert_eq!(interop.map_frame(&good).unwrap().populated(), 2);
    }

    #[test]
    fn test_destroy_without_maps() {
        let gl = FakeGl::new(GlVersion::new(3, 2));
        let (interop, registry) = create(gl.clone());
        let mut interop = interop.unwrap();

        interop.destroy();
        assert_eq!(interop.state(), InteropState::Destroyed);
        assert!(registry.is_empty());
        let state = gl.state.borrow();
        assert!(state.live.is_empty());
        assert_eq!(state.deleted.len(), MAX_PLANES);
    }

    #[test]
    fn test_destroy_releases_buffer_once() {
        let gl = FakeGl::new(GlVersion::new(3, 2));
        let (interop, registry) = create(gl.clone());
        let mut interop = interop.unwrap();
        let f = frame(FakeBufferSpec::yuv420p(16, 16));
        interop.map_frame(&f).unwrap();
        assert_eq!(f.buffer.live_refs(), 2);

        interop.destroy();
        interop.destroy();
        assert_eq!(f.buffer.live_refs(), 1);
        assert!(registry.is_empty());
        assert_eq!(gl.state.borrow().deleted.len(), MAX_PLANES);
        assert_eq!(interop.mapped().populated(), 0);

        drop(interop);
        assert_eq!(gl.state.borrow().deleted.len(), MAX_PLANES);
    }

    #[test]
    fn test_use_after_destroy() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();
        interop.destroy();

        let f = frame(FakeBufferSpec::nv12(8, 8));
        assert!(matches!(interop.map_frame(&f), Err(HwdecError::Destroyed)));
        assert_eq!(f.buffer.live_refs(), 1);

        let mut params = ImageParams::new(ImageFormat::VideoToolbox, 8, 8)
            .hw_subfmt(CvPixelFormat::BIPLANAR_420_VIDEO_RANGE);
        assert!(matches!(interop.reinit(&mut params), Err(HwdecError::Destroyed)));
        assert_eq!(params.imgfmt, ImageFormat::VideoToolbox);
    }

    #[test]
    fn test_drop_cleans_up() {
        let gl = FakeGl::new(GlVersion::new(3, 2));
        let (interop, registry) = create(gl.clone());
        let mut interop = interop.unwrap();
        let f = frame(FakeBufferSpec::uyvy(8, 8));
        interop.map_frame(&f).unwrap();

        drop(interop);
        assert_eq!(f.buffer.live_refs(), 1);
        assert!(registry.is_empty());
        assert!(gl.state.borrow().live.is_empty());
    }

    #[test]
    fn test_reinit_resolves_subformat() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();

        for (hw, sw) in [
            (CvPixelFormat::BIPLANAR_420_VIDEO_RANGE, ImageFormat::Nv12),
            (CvPixelFormat::YCBCR_422, ImageFormat::Uyvy),
            (CvPixelFormat::PLANAR_420, ImageFormat::Yuv420p),
            (CvPixelFormat::BGRA_32, ImageFormat::Rgb0),
        ] {
            let mut params = ImageParams::new(ImageFormat::VideoToolbox, 1920, 1080).hw_subfmt(hw);
            interop.reinit(&mut params).unwrap();
            assert_eq!(params.imgfmt, sw);
            assert_eq!(params.hw_subfmt, None);
            assert_eq!((params.width, params.height), (1920, 1080));
        }
    }

    #[test]
    fn test_reinit_unknown_subformat_leaves_params() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();
        let unknown = CvPixelFormat::from_fourcc(*b"x420");

        let mut params = ImageParams::new(ImageFormat::VideoToolbox, 64, 64).hw_subfmt(unknown);
        let err = interop.reinit(&mut params).unwrap_err();
        assert!(matches!(err, HwdecError::UnsupportedSubformat(Some(f)) if f == unknown));
        assert_eq!(err.class(), ErrorClass::Format);
        assert_eq!(params.imgfmt, ImageFormat::VideoToolbox);
        assert_eq!(params.hw_subfmt, Some(unknown));

        let mut missing = ImageParams::new(ImageFormat::VideoToolbox, 64, 64);
        assert!(matches!(
            interop.reinit(&mut missing),
            Err(HwdecError::UnsupportedSubformat(None))
        ));
    }

    #[test]
    fn test_reinit_rejects_software_params() {
        let (interop, _registry) = create(FakeGl::new(GlVersion::new(3, 2)));
        let mut interop = interop.unwrap();
        let mut params = ImageParams::new(ImageFormat::Nv12, 64, 64);
        let err = interop.reinit(&mut params).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(params.imgfmt, ImageFormat::Nv12);
    }
}
