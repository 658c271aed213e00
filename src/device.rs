//! Hardware decoding device descriptors and their registry.
//!
//! The interop publishes a [`HwdecDevice`] while it is alive so the decoder
//! side can ask which pixel format to request from VideoToolbox, and so
//! CPU consumers can download frames without knowing about OpenGL.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::buffer::{HardwareFrame, PixelBuffer};
use crate::config::SharedOptions;
use crate::download::download_image;
use crate::format::{lookup_by_image_format, CvPixelFormat};
use crate::image::{Image, ImagePool};

/// Hardware decoding API of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwdecApi {
    VideoToolbox,
}

/// Device descriptor registered by a live interop.
pub struct HwdecDevice<B> {
    api: HwdecApi,
    options: SharedOptions,
    _buffer: PhantomData<fn(&B)>,
}

impl<B> std::fmt::Debug for HwdecDevice<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwdecDevice")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

impl<B: PixelBuffer> HwdecDevice<B> {
    #[must_use]
    pub fn new(api: HwdecApi, options: SharedOptions) -> Self {
        Self {
            api,
            options,
            _buffer: PhantomData,
        }
    }

    #[must_use]
    pub fn api(&self) -> HwdecApi {
        self.api
    }

    /// CoreVideo format matching the configured `videotoolbox_format`.
    ///
    /// Returns `None` if the option names a format missing from the table.
    #[must_use]
    pub fn preferred_hw_format(&self) -> Option<CvPixelFormat> {
        let format = self.options.read().ok()?.videotoolbox_format;
        lookup_by_image_format(format).map(|f| f.hw_format)
    }

    /// Copies a hardware frame into CPU memory.
    pub fn download_image(&self, frame: &HardwareFrame<B>, pool: &mut ImagePool) -> Option<Image> {
        download_image(frame, pool)
    }
}

/// Registry of hardware decoding devices.
pub trait DeviceRegistry<B> {
    fn register(&self, device: Arc<HwdecDevice<B>>);

    /// Removes `device`. Unknown devices are ignored.
    fn unregister(&self, device: &Arc<HwdecDevice<B>>);
}

/// Simple in-process device registry.
pub struct HwdecDevices<B> {
    devices: Mutex<Vec<Arc<HwdecDevice<B>>>>,
}

impl<B> Default for HwdecDevices<B> {
    fn default() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }
}

impl<B> HwdecDevices<B> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first device of `api`.
    #[must_use]
    pub fn get(&self, api: HwdecApi) -> Option<Arc<HwdecDevice<B>>> {
        let devices = self.devices.lock().ok()?;
        devices.iter().find(|d| d.api == api).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.lock().map(|d| d.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B> DeviceRegistry<B> for HwdecDevices<B> {
    fn register(&self, device: Arc<HwdecDevice<B>>) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.push(device);
        }
    }

    fn unregister(&self, device: &Arc<HwdecDevice<B>>) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.retain(|d| !Arc::ptr_eq(d, device));
        }
    }
}
