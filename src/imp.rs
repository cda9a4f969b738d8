// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The device call surface.

[Device] is the only code that touches device state.  Implementations are
created on, and only ever called from, the thread of a [crate::task::Task];
everything else reaches the device by submitting closures to that task.

Two implementations ship with the crate:

* [soft::SoftDevice], an in-memory device with configurable capabilities that
  records every call.  It backs the tests and headless use.
* `wgpu::WgpuDevice` (feature `backend_wgpu`), which drives a `wgpu::Device`.
*/

use crate::capabilities::Capabilities;
use crate::coordinates::RasterRect;
use crate::error::DeviceError;
use crate::pixel_formats::PixelFormat;
use crate::sampler::SamplerParams;
use std::fmt::{Display, Formatter};
use std::ptr::NonNull;

pub mod soft;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

/// Device-assigned texture id.  Zero means "unallocated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub const NONE: TextureHandle = TextureHandle(0);

    pub const fn from_raw(raw: u32) -> Self {
        TextureHandle(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Display for TextureHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Device-assigned pixel unpack buffer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub const fn from_raw(raw: u32) -> Self {
        BufferHandle(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl Display for BufferHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Device-assigned sampler object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(u32);

impl SamplerHandle {
    pub const fn from_raw(raw: u32) -> Self {
        SamplerHandle(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// How the device stores texels, independent of the upload byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    Rgba8,
    Srgb8Alpha8,
    Rgb8,
    Rgb565,
    Rgb5A1,
    Rgba4,
    R8,
    Rg8,
    Luminance8,
    LuminanceAlpha8,
    Alpha8,
}

impl InternalFormat {
    /// The upload format whose texel layout matches this storage.
    pub const fn layout(self) -> PixelFormat {
        match self {
            InternalFormat::Rgba8 | InternalFormat::Srgb8Alpha8 => PixelFormat::Rgba8888,
            InternalFormat::Rgb8 => PixelFormat::Rgb888,
            InternalFormat::Rgb565 => PixelFormat::Rgb565,
            InternalFormat::Rgb5A1 => PixelFormat::Rgba5551,
            InternalFormat::Rgba4 => PixelFormat::Rgba4444,
            InternalFormat::R8 | InternalFormat::Luminance8 => PixelFormat::I8,
            InternalFormat::Rg8 | InternalFormat::LuminanceAlpha8 => PixelFormat::Ia88,
            InternalFormat::Alpha8 => PixelFormat::A8,
        }
    }

    pub const fn bytes_per_pixel(self) -> u8 {
        self.layout().bytes_per_pixel()
    }

    /// See [PixelFormat::is_packed].
    pub const fn is_packed(self) -> bool {
        self.layout().is_packed()
    }

    pub const fn name(self) -> &'static str {
        match self {
            InternalFormat::Rgba8 => "RGBA8",
            InternalFormat::Srgb8Alpha8 => "SRGB8_ALPHA8",
            InternalFormat::Rgb8 => "RGB8",
            InternalFormat::Rgb565 => "RGB565",
            InternalFormat::Rgb5A1 => "RGB5_A1",
            InternalFormat::Rgba4 => "RGBA4",
            InternalFormat::R8 => "R8",
            InternalFormat::Rg8 => "RG8",
            InternalFormat::Luminance8 => "LUMINANCE8",
            InternalFormat::LuminanceAlpha8 => "LUMINANCE8_ALPHA8",
            InternalFormat::Alpha8 => "ALPHA8",
        }
    }
}

/// Where one output channel of a swizzled read comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwizzleSource {
    Red,
    Green,
    Blue,
    Alpha,
    Zero,
    One,
}

/// Per-channel read remapping, in R, G, B, A output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle(pub [SwizzleSource; 4]);

impl Swizzle {
    pub const IDENTITY: Swizzle = Swizzle([
        SwizzleSource::Red,
        SwizzleSource::Green,
        SwizzleSource::Blue,
        SwizzleSource::Alpha,
    ]);
    pub const INTENSITY_ALPHA: Swizzle = Swizzle([
        SwizzleSource::Red,
        SwizzleSource::Red,
        SwizzleSource::Red,
        SwizzleSource::Green,
    ]);
    pub const ALPHA_ONLY: Swizzle = Swizzle([
        SwizzleSource::One,
        SwizzleSource::One,
        SwizzleSource::One,
        SwizzleSource::Red,
    ]);
}

/// Row layout of upload source memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnpackLayout {
    /// Rows start on multiples of this many bytes (1, 2, 4 or 8).
    pub alignment: u8,
    /// Source row length in pixels; 0 means "the upload width".
    pub row_length: u32,
}

impl UnpackLayout {
    pub const PACKED: UnpackLayout = UnpackLayout {
        alignment: 1,
        row_length: 0,
    };

    /// Bytes between the starts of consecutive source rows.
    pub const fn source_pitch(&self, width: u32, format: PixelFormat) -> usize {
        let pixels = if self.row_length == 0 {
            width
        } else {
            self.row_length
        };
        let row = format.pixel_bytes(pixels as usize);
        let align = if self.alignment == 0 {
            1
        } else {
            self.alignment as usize
        };
        row.div_ceil(align) * align
    }

    /// Bytes an upload of `width` x `height` reads from its source.
    pub const fn source_span(&self, width: u32, height: u32, format: PixelFormat) -> usize {
        if width == 0 || height == 0 {
            0
        } else {
            self.source_pitch(width, format) * (height as usize - 1)
                + format.pixel_bytes(width as usize)
        }
    }
}

/// Where upload pixels come from.
#[derive(Debug, Clone, Copy)]
pub enum UploadSource<'a> {
    /// Host memory, read during the call.
    Host(&'a [u8]),
    /// A previously mapped and flushed pixel unpack buffer.
    PixelBuffer { buffer: BufferHandle, offset: usize },
}

impl UploadSource<'_> {
    pub const fn kind(&self) -> UploadSourceKind {
        match self {
            UploadSource::Host(_) => UploadSourceKind::Host,
            UploadSource::PixelBuffer { .. } => UploadSourceKind::PixelBuffer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadSourceKind {
    Host,
    PixelBuffer,
}

/// Host-visible memory of a mapped pixel buffer.
///
/// Owned by the device.  Valid until the buffer is flushed or deleted.
#[derive(Debug, Clone, Copy)]
pub struct MappedRange {
    ptr: NonNull<u8>,
    len: usize,
}

// The range is a plain address; using it is what needs care, see the constructor.
unsafe impl Send for MappedRange {}
unsafe impl Sync for MappedRange {}

impl MappedRange {
    /**
    # Safety
    `ptr` must be valid for reads and writes of `len` bytes until the buffer is
    flushed or deleted, and nothing else may access that memory meanwhile.
    */
    pub unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        MappedRange { ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

/**
The device call surface.

Every method corresponds to one device call and reports driver errors as
[DeviceError].  Callers in this crate log those errors and continue.
*/
pub trait Device {
    /// Feature flags, read once when the task starts.
    fn capabilities(&self) -> Capabilities;

    fn create_texture(&mut self) -> Result<TextureHandle, DeviceError>;

    fn delete_texture(&mut self, handle: TextureHandle) -> Result<(), DeviceError>;

    /// Allocates immutable storage for all `levels` at once.
    fn allocate_storage(
        &mut self,
        handle: TextureHandle,
        levels: u32,
        internal: InternalFormat,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError>;

    /// (Re)defines one level of mutable storage, contents undefined.
    fn define_level(
        &mut self,
        handle: TextureHandle,
        level: u32,
        internal: InternalFormat,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError>;

    /// Copies `rect` of `level` from `source`.
    fn upload(
        &mut self,
        handle: TextureHandle,
        level: u32,
        rect: RasterRect,
        format: PixelFormat,
        layout: UnpackLayout,
        source: UploadSource<'_>,
    ) -> Result<(), DeviceError>;

    fn generate_mipmaps(&mut self, handle: TextureHandle) -> Result<(), DeviceError>;

    fn set_swizzle(&mut self, handle: TextureHandle, swizzle: Swizzle) -> Result<(), DeviceError>;

    /// Sets per-texture filter/wrap state.
    fn set_sampler_params(
        &mut self,
        handle: TextureHandle,
        params: SamplerParams,
    ) -> Result<(), DeviceError>;

    fn create_sampler(&mut self, params: SamplerParams) -> Result<SamplerHandle, DeviceError>;

    fn delete_sampler(&mut self, sampler: SamplerHandle) -> Result<(), DeviceError>;

    fn create_pixel_buffer(&mut self, _len: usize) -> Result<BufferHandle, DeviceError> {
        Err(DeviceError::Unsupported("pixel buffers"))
    }

    fn map_pixel_buffer(&mut self, _buffer: BufferHandle) -> Result<MappedRange, DeviceError> {
        Err(DeviceError::Unsupported("pixel buffers"))
    }

    /// Makes `len` bytes written at `offset` visible to uploads and unmaps the buffer.
    fn flush_pixel_buffer(
        &mut self,
        _buffer: BufferHandle,
        _offset: usize,
        _len: usize,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("pixel buffers"))
    }

    fn delete_pixel_buffer(&mut self, _buffer: BufferHandle) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("pixel buffers"))
    }

    /// Reads back a whole level, tightly packed.
    fn read_pixels(&mut self, _handle: TextureHandle, _level: u32) -> Result<Vec<u8>, DeviceError> {
        Err(DeviceError::Unsupported("read_pixels"))
    }
}

/// Logs a failed device call with its name and handle.  Returns the value on success.
pub(crate) fn checked<T>(
    call: &'static str,
    handle: TextureHandle,
    result: Result<T, DeviceError>,
) -> Option<T> {
    match result {
        Ok(t) => Some(t),
        Err(err) => {
            logwise::error_sync!(
                "{call} failed for texture {handle}: {err}",
                call = call,
                handle = handle.raw(),
                err = logwise::privacy::LogIt(&err)
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_pitch_respects_alignment() {
        let packed = UnpackLayout::PACKED;
        assert_eq!(packed.source_pitch(3, PixelFormat::Rgb888), 9);
        let aligned = UnpackLayout {
            alignment: 4,
            row_length: 0,
        };
        assert_eq!(aligned.source_pitch(3, PixelFormat::Rgb888), 12);
        let strided = UnpackLayout {
            alignment: 8,
            row_length: 16,
        };
        assert_eq!(strided.source_pitch(4, PixelFormat::Rgba8888), 64);
        assert_eq!(strided.source_span(4, 2, PixelFormat::Rgba8888), 64 + 16);
    }

    #[test]
    fn storage_layout_follows_pixel_formats() {
        assert!(InternalFormat::Rgb5A1.is_packed());
        assert!(InternalFormat::Rgba4.is_packed());
        assert!(!InternalFormat::LuminanceAlpha8.is_packed());
        assert_eq!(InternalFormat::Srgb8Alpha8.bytes_per_pixel(), 4);
        assert_eq!(InternalFormat::Rg8.layout(), PixelFormat::Ia88);
        assert_eq!(InternalFormat::Rgb8.bytes_per_pixel(), 3);
    }

    #[test]
    fn handle_display_is_hex() {
        assert_eq!(TextureHandle::from_raw(255).to_string(), "0xFF");
        assert!(TextureHandle::NONE.is_none());
    }
}
