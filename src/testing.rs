//! In-memory stand-ins for CoreVideo buffers and the OpenGL context.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::buffer::{LockedPlanes, NativeSurface, PixelBuffer, PlaneData};
use crate::format::CvPixelFormat;
use crate::gl::{
    GlContext, GlVersion, SurfaceImport, SurfaceImportError, TextureId, TextureTarget,
};
use crate::HwdecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEvent {
    Retain(usize),
    Release(usize),
}

thread_local! {
    static EVENTS: RefCell<Vec<BufferEvent>> = const { RefCell::new(Vec::new()) };
    static NEXT_ID: Cell<usize> = const { Cell::new(1) };
}

/// Drains the retain/release log of the current test thread.
pub fn take_buffer_events() -> Vec<BufferEvent> {
    EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

fn log_event(event: BufferEvent) {
    EVENTS.with(|e| e.borrow_mut().push(event));
}

#[derive(Debug, Clone)]
pub struct FakePlane {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl FakePlane {
    fn filled(width: u32, height: u32, stride: usize, value: u8) -> Self {
        Self {
            width,
            height,
            stride,
            data: vec![value; stride * height as usize],
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeBufferSpec {
    pub format: CvPixelFormat,
    pub width: u32,
    pub height: u32,
    pub planar: bool,
    pub planes: Vec<FakePlane>,
    pub reported_planes: Option<usize>,
    pub has_surface: bool,
    pub lock_error: Option<i32>,
}

impl FakeBufferSpec {
    pub fn nv12(width: u32, height: u32) -> Self {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        Self {
            format: CvPixelFormat::BIPLANAR_420_VIDEO_RANGE,
            width,
            height,
            planar: true,
            planes: vec![
                FakePlane::filled(width, height, width as usize, 16),
                FakePlane::filled(cw, ch, cw as usize * 2, 128),
            ],
            reported_planes: None,
            has_surface: true,
            lock_error: None,
        }
    }

    pub fn yuv420p(width: u32, height: u32) -> Self {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        Self {
            format: CvPixelFormat::PLANAR_420,
            planes: vec![
                FakePlane::filled(width, height, width as usize, 16),
                FakePlane::filled(cw, ch, cw as usize, 100),
                FakePlane::filled(cw, ch, cw as usize, 200),
            ],
            ..Self::nv12(width, height)
        }
    }

    pub fn bgra(width: u32, height: u32) -> Self {
        Self {
            format: CvPixelFormat::BGRA_32,
            width,
            height,
            planar: false,
            planes: vec![FakePlane::filled(width, height, width as usize * 4 + 8, 0xff)],
            reported_planes: None,
            has_surface: true,
            lock_error: None,
        }
    }

    pub fn uyvy(width: u32, height: u32) -> Self {
        Self {
            format: CvPixelFormat::YCBCR_422,
            planes: vec![FakePlane::filled(
                width,
                height,
                width.div_ceil(2) as usize * 4,
                0x80,
            )],
            ..Self::bgra(width, height)
        }
    }

    pub fn format(mut self, format: CvPixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn without_surface(mut self) -> Self {
        self.has_surface = false;
        self
    }

    pub fn non_planar(mut self) -> Self {
        self.planar = false;
        self
    }

    pub fn reported_planes(mut self, count: usize) -> Self {
        self.reported_planes = Some(count);
        self
    }

    pub fn lock_error(mut self, code: i32) -> Self {
        self.lock_error = Some(code);
        self
    }
}

#[derive(Debug)]
struct FakeShared {
    id: usize,
    spec: FakeBufferSpec,
    locks: Cell<usize>,
    unlocks: Cell<usize>,
}

/// Pixel buffer whose clones behave like CoreVideo retains.
#[derive(Debug)]
pub struct FakeBuffer {
    shared: Rc<FakeShared>,
}

impl FakeBuffer {
    pub fn new(spec: FakeBufferSpec) -> Self {
        let id = NEXT_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });
        Self {
            shared: Rc::new(FakeShared {
                id,
                spec,
                locks: Cell::new(0),
                unlocks: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.shared.id
    }

    /// Outstanding references, including this one.
    pub fn live_refs(&self) -> usize {
        Rc::strong_count(&self.shared)
    }

    pub fn locks(&self) -> usize {
        self.shared.locks.get()
    }

    pub fn unlocks(&self) -> usize {
        self.shared.unlocks.get()
    }
}

impl Clone for FakeBuffer {
    fn clone(&self) -> Self {
        log_event(BufferEvent::Retain(self.id()));
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl Drop for FakeBuffer {
    fn drop(&mut self) {
        log_event(BufferEvent::Release(self.id()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeSurface {
    pub planes: Vec<(u32, u32)>,
}

impl NativeSurface for FakeSurface {
    fn plane_width(&self, plane: usize) -> u32 {
        self.planes.get(plane).map_or(0, |p| p.0)
    }

    fn plane_height(&self, plane: usize) -> u32 {
        self.planes.get(plane).map_or(0, |p| p.1)
    }
}

pub struct FakeLock<'a> {
    buffer: &'a FakeBuffer,
}

impl LockedPlanes for FakeLock<'_> {
    fn plane(&self, plane: usize) -> Option<PlaneData<'_>> {
        let spec = &self.buffer.shared.spec;
        if !spec.planar && plane > 0 {
            return None;
        }
        spec.planes.get(plane).map(|p| PlaneData {
            data: &p.data,
            stride: p.stride,
        })
    }
}

impl Drop for FakeLock<'_> {
    fn drop(&mut self) {
        let unlocks = &self.buffer.shared.unlocks;
        unlocks.set(unlocks.get() + 1);
    }
}

impl PixelBuffer for FakeBuffer {
    type Surface = FakeSurface;
    type Lock<'a> = FakeLock<'a>;

    fn pixel_format(&self) -> CvPixelFormat {
        self.shared.spec.format
    }

    fn width(&self) -> u32 {
        self.shared.spec.width
    }

    fn height(&self) -> u32 {
        self.shared.spec.height
    }

    fn is_planar(&self) -> bool {
        self.shared.spec.planar
    }

    fn plane_count(&self) -> usize {
        let spec = &self.shared.spec;
        match (spec.planar, spec.reported_planes) {
            (_, Some(count)) => count,
            (true, None) => spec.planes.len(),
            (false, None) => 0,
        }
    }

    fn surface(&self) -> Option<FakeSurface> {
        let spec = &self.shared.spec;
        spec.has_surface.then(|| FakeSurface {
            planes: spec.planes.iter().map(|p| (p.width, p.height)).collect(),
        })
    }

    fn lock_read_only(&self) -> Result<FakeLock<'_>, HwdecError> {
        if let Some(code) = self.shared.spec.lock_error {
            return Err(HwdecError::LockFailed(code));
        }
        let locks = &self.shared.locks;
        locks.set(locks.get() + 1);
        Ok(FakeLock { buffer: self })
    }
}

#[derive(Debug, Default)]
pub struct GlState {
    pub version: Option<GlVersion>,
    pub current: bool,
    pub next_name: u32,
    pub live: Vec<TextureId>,
    pub deleted: Vec<TextureId>,
    pub bound: Option<(TextureTarget, TextureId)>,
    pub imports: Vec<(TextureId, SurfaceImport)>,
    pub fail_planes: Vec<usize>,
}

/// OpenGL context recording every call; clones share state.
#[derive(Debug, Clone)]
pub struct FakeGl {
    pub state: Rc<RefCell<GlState>>,
}

impl FakeGl {
    pub fn new(version: GlVersion) -> Self {
        Self {
            state: Rc::new(RefCell::new(GlState {
                version: Some(version),
                current: true,
                next_name: 1,
                ..Default::default()
            })),
        }
    }

    pub fn without_context(self) -> Self {
        self.state.borrow_mut().current = false;
        self
    }

    pub fn fail_plane(&self, plane: usize) {
        self.state.borrow_mut().fail_planes.push(plane);
    }
}

impl GlContext for FakeGl {
    type Surface = FakeSurface;

    fn version(&self) -> GlVersion {
        self.state.borrow().version.unwrap_or(GlVersion::new(2, 1))
    }

    fn has_current_context(&self) -> bool {
        self.state.borrow().current
    }

    fn gen_textures(&mut self, textures: &mut [TextureId]) {
        let mut state = self.state.borrow_mut();
        for slot in textures {
            *slot = TextureId(state.next_name);
            state.next_name += 1;
            state.live.push(*slot);
        }
    }

    fn delete_textures(&mut self, textures: &[TextureId]) {
        let mut state = self.state.borrow_mut();
        for texture in textures {
            state.live.retain(|t| t != texture);
            state.deleted.push(*texture);
        }
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId) {
        self.state.borrow_mut().bound = (texture != TextureId::NONE).then_some((target, texture));
    }

    fn tex_image_surface(
        &mut self,
        import: &SurfaceImport,
        _surface: &FakeSurface,
    ) -> Result<(), SurfaceImportError> {
        let mut state = self.state.borrow_mut();
        let bound = match state.bound {
            Some((target, texture)) if target == import.target => texture,
            _ => {
                return Err(SurfaceImportError {
                    code: 10004,
                    message: "invalid operation".to_string(),
                    gl_error: 0x0502,
                })
            }
        };
        if state.fail_planes.contains(&import.plane) {
            return Err(SurfaceImportError {
                code: 10008,
                message: "invalid value".to_string(),
                gl_error: 0x0501,
            });
        }
        state.imports.push((bound, *import));
        Ok(())
    }
}
