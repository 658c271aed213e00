//! OpenGL collaborator interface.
//!
//! The interop never calls OpenGL directly. Everything it needs from the
//! rendering context goes through [`GlContext`], which the macOS backend
//! implements on top of CGL and which tests replace with a fake.

use std::fmt;

/// `GL_TEXTURE_RECTANGLE`
pub const GL_TEXTURE_RECTANGLE: u32 = 0x84F5;
pub const GL_MAJOR_VERSION: u32 = 0x821B;
pub const GL_MINOR_VERSION: u32 = 0x821C;
const GL_NO_ERROR: u32 = 0;
const MAX_PENDING_ERRORS: usize = 32;

/// OpenGL version as reported by the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
}

impl GlVersion {
    /// Oldest version with core rectangle texture support.
    pub const MIN_RECTANGLE_TEXTURE: GlVersion = GlVersion::new(3, 0);

    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl std::str::FromStr for GlVersion {
    type Err = crate::HwdecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s.split_once('.').unwrap_or((s, "0"));
        let parse = |v: &str| {
            v.trim().parse::<u32>().map_err(|_| {
                crate::HwdecError::invalid_option(format!("bad OpenGL version '{s}'"))
            })
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

/// Clears the error flags left by earlier GL calls on this context.
///
/// `get_error` is `glGetError`. Returns the number of flags cleared.
pub fn drain_errors(mut get_error: impl FnMut() -> u32) -> usize {
    let mut drained = 0;
    // Bounded; a lost context may never clear its flag.
    while drained < MAX_PENDING_ERRORS && get_error() != GL_NO_ERROR {
        drained += 1;
    }
    drained
}

/// Reads the context version through `glGetIntegerv`.
///
/// Pending errors are drained first so that only a failure of the query
/// itself marks the context as pre-3.0 (2.1).
pub fn query_version(
    mut get_error: impl FnMut() -> u32,
    mut get_integer: impl FnMut(u32) -> i32,
) -> GlVersion {
    let stale = drain_errors(&mut get_error);
    if stale > 0 {
        tracing::debug!("[hwdec-vt] cleared {stale} pending GL errors before version query");
    }

    let major = get_integer(GL_MAJOR_VERSION);
    let minor = get_integer(GL_MINOR_VERSION);
    // GL_MAJOR_VERSION is unknown before 3.0.
    if get_error() != GL_NO_ERROR {
        return GlVersion::new(2, 1);
    }
    GlVersion::new(major.max(0) as u32, minor.max(0) as u32)
}

/// Pixel data format passed to the surface import call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Red,
    Rg,
    Bgra,
    /// `GL_RGB_422_APPLE`
    Rgb422Apple,
}

impl TexelFormat {
    #[must_use]
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Red => 0x1903,
            Self::Rg => 0x8227,
            Self::Bgra => 0x80E1,
            Self::Rgb422Apple => 0x8A1F,
        }
    }

    /// Number of texture channels the format fills.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Red => 1,
            Self::Rg => 2,
            Self::Rgb422Apple => 3,
            Self::Bgra => 4,
        }
    }
}

/// Pixel data type passed to the surface import call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    UnsignedByte,
    /// `GL_UNSIGNED_SHORT_8_8_APPLE`
    UnsignedShort88Apple,
    UnsignedInt8888Rev,
}

impl SampleType {
    #[must_use]
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::UnsignedByte => 0x1401,
            Self::UnsignedShort88Apple => 0x85BA,
            Self::UnsignedInt8888Rev => 0x8367,
        }
    }
}

/// Internal storage format of the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    Red,
    Rg,
    Rgb,
    Rgba,
}

impl InternalFormat {
    #[must_use]
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Red => 0x1903,
            Self::Rg => 0x8227,
            Self::Rgb => 0x1907,
            Self::Rgba => 0x1908,
        }
    }
}

/// Texture binding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    #[default]
    Rectangle,
}

impl TextureTarget {
    #[must_use]
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Rectangle => GL_TEXTURE_RECTANGLE,
        }
    }
}

/// OpenGL texture object name. `0` is the unbound name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureId(pub u32);

impl TextureId {
    pub const NONE: TextureId = TextureId(0);
}

/// Parameters of one plane import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceImport {
    pub target: TextureTarget,
    pub internal_format: InternalFormat,
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
    pub sample_type: SampleType,
    pub plane: usize,
}

/// Failure of a single plane import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceImportError {
    /// Platform error code (`CGLError` on macOS).
    pub code: i32,
    /// Human readable form of `code`.
    pub message: String,
    /// `glGetError()` right after the failed call.
    pub gl_error: u32,
}

impl fmt::Display for SurfaceImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:x})", self.message, self.gl_error)
    }
}

/// Rendering context used by the interop.
///
/// All methods are called on the thread that owns the context.
pub trait GlContext {
    /// Native surface type the context can import from.
    type Surface;

    /// Returns the context's OpenGL version.
    fn version(&self) -> GlVersion;

    /// Returns true if a context is current on the calling thread.
    fn has_current_context(&self) -> bool;

    /// Allocates one texture object name per slot of `textures`.
    fn gen_textures(&mut self, textures: &mut [TextureId]);

    /// Deletes texture object names.
    fn delete_textures(&mut self, textures: &[TextureId]);

    /// Binds `texture` to `target`; [`TextureId::NONE`] unbinds.
    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId);

    /// Binds one plane of `surface` as the storage of the bound texture.
    fn tex_image_surface(
        &mut self,
        import: &SurfaceImport,
        surface: &Self::Surface,
    ) -> Result<(), SurfaceImportError>;
}
