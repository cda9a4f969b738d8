// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error types for device calls, the execution queue, and texture operations.

use crate::coordinates::RasterRect;
use crate::imp::{BufferHandle, TextureHandle};
use crate::pixel_formats::PixelFormat;

/// An error reported by a [crate::imp::Device] call.
///
/// These are driver-contract violations.  Queue closures log them and keep going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
    #[error("no live texture for handle {0}")]
    InvalidHandle(TextureHandle),
    #[error("no live pixel buffer for handle {0}")]
    InvalidBuffer(BufferHandle),
    #[error("texture {handle} has immutable storage")]
    ImmutableStorage { handle: TextureHandle },
    #[error("level {level} of texture {handle} is not defined")]
    UndefinedLevel { handle: TextureHandle, level: u32 },
    #[error("region {region:?} exceeds level bounds {width}x{height}")]
    OutOfBounds {
        region: RasterRect,
        width: u32,
        height: u32,
    },
    #[error("upload source holds {actual} bytes, {expected} required")]
    ShortSource { expected: usize, actual: usize },
    #[error("format {0:?} has no internal format on this device")]
    NoInternalFormat(PixelFormat),
    #[error("{0}")]
    Backend(String),
}

/// An error submitting work to a [crate::task::Task].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("the device thread has shut down")]
    Closed,
    #[error("the job was discarded before it finished")]
    Discarded,
    #[error("a blocking submission was made from the device thread itself")]
    Reentrant,
    #[error("the device could not be created")]
    DeviceCreation,
}

/// An error from a [crate::texture::Texture] operation.
///
/// Every error here is also logged at the point it is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextureError {
    #[error("texture has no device storage")]
    Unallocated,
    #[error("texture size must be non-zero, got {width}x{height}")]
    ZeroSize { width: u32, height: u32 },
    #[error("format {0:?} cannot be uploaded on this device")]
    UnsupportedFormat(PixelFormat),
    #[error("rect {rect:?} does not fit level {level} ({width}x{height})")]
    OutOfBounds {
        rect: RasterRect,
        level: u32,
        width: u32,
        height: u32,
    },
    #[error("level {level} does not exist, texture has {levels}")]
    NoSuchLevel { level: u32, levels: u32 },
    #[error("pixel size mismatch: texture is {texture:?}, pixmap is {pixmap:?}")]
    FormatMismatch {
        texture: PixelFormat,
        pixmap: PixelFormat,
    },
    #[error("pixel data is not aligned to {alignment} bytes")]
    Misaligned { alignment: u8 },
    #[error("failed allocating {bytes} bytes for pixel buffer")]
    AllocationFailed { bytes: usize },
    #[error("locked buffer belongs to a different texture")]
    ForeignBuffer,
    #[error("texture size {width}x{height} does not support mipmaps")]
    MipmapsUnsupported { width: u32, height: u32 },
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}
