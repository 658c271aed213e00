//! Pixel format table.
//!
//! Maps CoreVideo pixel format types to image formats and to the OpenGL
//! layout of each plane. The table is the only place that knows how a
//! hardware buffer turns into textures; both the GPU import and the CPU
//! copy path resolve formats through it.

use std::fmt;
use std::str::FromStr;

use crate::gl::{InternalFormat, SampleType, TexelFormat};
use crate::HwdecError;

/// Maximum number of planes of any supported format.
pub const MAX_PLANES: usize = 4;

/// CoreVideo pixel format type (`OSType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CvPixelFormat(pub u32);

impl CvPixelFormat {
    /// `kCVPixelFormatType_420YpCbCr8BiPlanarVideoRange`
    pub const BIPLANAR_420_VIDEO_RANGE: CvPixelFormat = CvPixelFormat::from_fourcc(*b"420v");
    /// `kCVPixelFormatType_422YpCbCr8`
    pub const YCBCR_422: CvPixelFormat = CvPixelFormat::from_fourcc(*b"2vuy");
    /// `kCVPixelFormatType_420YpCbCr8Planar`
    pub const PLANAR_420: CvPixelFormat = CvPixelFormat::from_fourcc(*b"y420");
    /// `kCVPixelFormatType_32BGRA`
    pub const BGRA_32: CvPixelFormat = CvPixelFormat::from_fourcc(*b"BGRA");

    #[must_use]
    pub const fn from_fourcc(code: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(code))
    }

    #[must_use]
    pub const fn fourcc(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for CvPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.fourcc();
        if code.iter().all(|c| c.is_ascii_graphic() || *c == b' ') {
            write!(f, "'{}'", String::from_utf8_lossy(&code))
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

/// Image format of a frame as seen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Opaque VideoToolbox hardware frame.
    VideoToolbox,
    /// Y plane + interleaved CbCr plane, 4:2:0.
    Nv12,
    /// Packed 4:2:2, Cb Y0 Cr Y1.
    Uyvy,
    /// Three planes, 4:2:0.
    Yuv420p,
    /// Packed RGB with an unused fourth byte.
    Rgb0,
}

impl ImageFormat {
    /// Option-string name of the format.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::VideoToolbox => "videotoolbox",
            Self::Nv12 => "nv12",
            Self::Uyvy => "uyvy",
            Self::Yuv420p => "yuv420p",
            Self::Rgb0 => "rgb0",
        }
    }

    /// Returns true for the opaque hardware frame tag.
    #[must_use]
    pub const fn is_hwaccel(self) -> bool {
        matches!(self, Self::VideoToolbox)
    }

    /// Number of memory planes of the software format (0 for hardware tags).
    #[must_use]
    pub const fn num_planes(self) -> usize {
        match self {
            Self::VideoToolbox => 0,
            Self::Uyvy | Self::Rgb0 => 1,
            Self::Nv12 => 2,
            Self::Yuv420p => 3,
        }
    }

    /// Bytes per row and number of rows of `plane` for a `width`x`height` image.
    ///
    /// Returns `None` for planes the format does not have.
    #[must_use]
    pub fn plane_geometry(self, plane: usize, width: u32, height: u32) -> Option<(usize, usize)> {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        match (self, plane) {
            (Self::Nv12 | Self::Yuv420p, 0) => Some((w, h)),
            (Self::Nv12, 1) => Some((cw * 2, ch)),
            (Self::Yuv420p, 1 | 2) => Some((cw, ch)),
            (Self::Uyvy, 0) => Some((cw * 4, h)),
            (Self::Rgb0, 0) => Some((w * 4, h)),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ImageFormat {
    type Err = HwdecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::VideoToolbox,
            Self::Nv12,
            Self::Uyvy,
            Self::Yuv420p,
            Self::Rgb0,
        ]
        .into_iter()
        .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| HwdecError::invalid_option(format!("unknown image format '{s}'")))
    }
}

/// Channel remapping applied when sampling a plane texture.
///
/// Up to four characters from `rgba01`. Empty means identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Swizzle {
    chars: [u8; 4],
    len: u8,
}

impl Swizzle {
    pub const IDENTITY: Swizzle = Swizzle {
        chars: [0; 4],
        len: 0,
    };

    const fn is_valid_char(c: u8) -> bool {
        matches!(c, b'r' | b'g' | b'b' | b'a' | b'0' | b'1')
    }

    /// Builds a swizzle from a literal; invalid input fails const evaluation.
    #[must_use]
    pub const fn from_static(s: &str) -> Self {
        let bytes = s.as_bytes();
        assert!(bytes.len() <= 4, "swizzle longer than 4 channels");
        let mut chars = [0u8; 4];
        let mut i = 0;
        while i < bytes.len() {
            assert!(Self::is_valid_char(bytes[i]), "invalid swizzle channel");
            chars[i] = bytes[i];
            i += 1;
        }
        Self {
            chars,
            len: bytes.len() as u8,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ASCII from the validated alphabet is ever stored.
        std::str::from_utf8(&self.chars[..self.len as usize]).unwrap_or("")
    }

    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Swizzle({:?})", self.as_str())
    }
}

impl fmt::Display for Swizzle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenGL layout of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub format: TexelFormat,
    pub sample_type: SampleType,
    pub internal_format: InternalFormat,
    pub swizzle: Swizzle,
}

impl PlaneLayout {
    const fn new(
        format: TexelFormat,
        sample_type: SampleType,
        internal_format: InternalFormat,
        swizzle: &str,
    ) -> Self {
        Self {
            format,
            sample_type,
            internal_format,
            swizzle: Swizzle::from_static(swizzle),
        }
    }
}

/// One entry of the format table.
#[derive(Debug, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    pub hw_format: CvPixelFormat,
    pub image_format: ImageFormat,
    pub planes: &'static [PlaneLayout],
}

impl PixelFormatDescriptor {
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }
}

const R8: PlaneLayout = PlaneLayout::new(
    TexelFormat::Red,
    SampleType::UnsignedByte,
    InternalFormat::Red,
    "",
);

static FORMATS: [PixelFormatDescriptor; 4] = [
    PixelFormatDescriptor {
        hw_format: CvPixelFormat::BIPLANAR_420_VIDEO_RANGE,
        image_format: ImageFormat::Nv12,
        planes: &[
            R8,
            PlaneLayout::new(
                TexelFormat::Rg,
                SampleType::UnsignedByte,
                InternalFormat::Rg,
                "",
            ),
        ],
    },
    PixelFormatDescriptor {
        hw_format: CvPixelFormat::YCBCR_422,
        image_format: ImageFormat::Uyvy,
        planes: &[PlaneLayout::new(
            TexelFormat::Rgb422Apple,
            SampleType::UnsignedShort88Apple,
            InternalFormat::Rgb,
            "gbra",
        )],
    },
    PixelFormatDescriptor {
        hw_format: CvPixelFormat::PLANAR_420,
        image_format: ImageFormat::Yuv420p,
        planes: &[R8, R8, R8],
    },
    PixelFormatDescriptor {
        hw_format: CvPixelFormat::BGRA_32,
        image_format: ImageFormat::Rgb0,
        planes: &[PlaneLayout::new(
            TexelFormat::Bgra,
            SampleType::UnsignedInt8888Rev,
            InternalFormat::Rgba,
            "",
        )],
    },
];

/// All supported formats.
pub fn formats() -> &'static [PixelFormatDescriptor] {
    &FORMATS
}

/// Finds the table entry for a CoreVideo pixel format.
pub fn lookup_by_hardware_id(hw_format: CvPixelFormat) -> Option<&'static PixelFormatDescriptor> {
    FORMATS.iter().find(|f| f.hw_format == hw_format)
}

/// Finds the table entry producing `image_format`.
pub fn lookup_by_image_format(image_format: ImageFormat) -> Option<&'static PixelFormatDescriptor> {
    FORMATS.iter().find(|f| f.image_format == image_format)
}
