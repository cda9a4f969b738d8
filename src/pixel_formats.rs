// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel format definitions and size arithmetic.
//!
//! Every texture and pixmap carries a [`PixelFormat`], which fixes:
//!
//! - Number of channels (1, 2, 3 or 4)
//! - Bits per channel, or the packed 16-bit layout
//! - Byte order (RGBA vs BGRA)
//!
//! [`PixmapDesc`] pairs a format with a size and provides the stride and level
//! arithmetic used by the upload paths.
//!
//! # Available Formats
//!
//! ## Single Channel
//! - [`PixelFormat::I8`] - 8-bit intensity (luminance)
//! - [`PixelFormat::A8`] - 8-bit alpha
//!
//! ## Multi-Channel
//! - [`PixelFormat::Ia88`] - 8-bit intensity + 8-bit alpha
//! - [`PixelFormat::Rgb888`] - 3x8-bit, no alpha
//! - [`PixelFormat::Rgb565`], [`PixelFormat::Rgba5551`], [`PixelFormat::Rgba4444`] - packed 16-bit
//! - [`PixelFormat::Rgba8888`] - 4x8-bit
//! - [`PixelFormat::Bgra8888`] - 4x8-bit, BGRA byte order
//!
//! # Examples
//!
//! ```
//! use texels_and_tasks::pixel_formats::{PixelFormat, PixmapDesc};
//!
//! let desc = PixmapDesc::new(256, 128, PixelFormat::Rgba8888);
//! assert_eq!(desc.pitch_bytes(), 1024);
//! assert_eq!(desc.level_size(3), (32, 16));
//! assert_eq!(desc.max_levels(), 9);
//! ```

/*
The format is a runtime id rather than a type parameter: one texture may be
reconfigured to a different format with set_format, and the device picks
internal formats from a table at runtime.
 */
pub mod png_support;

/// Identifies the memory layout of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 channels, 8 bits each, bytes in R, G, B, A order.
    Rgba8888,
    /// 4 channels, 8 bits each, bytes in B, G, R, A order.
    ///
    /// Requires [crate::capabilities::Capabilities::bgra].
    Bgra8888,
    /// 3 channels, 8 bits each.
    Rgb888,
    /// Packed 16-bit, 5 bits red, 6 green, 5 blue.
    Rgb565,
    /// Packed 16-bit, 5 bits per color channel and 1 bit alpha.
    Rgba5551,
    /// Packed 16-bit, 4 bits per channel.
    Rgba4444,
    /// Single 8-bit intensity channel.
    I8,
    /// 8-bit intensity followed by 8-bit alpha.
    Ia88,
    /// Single 8-bit alpha channel.
    A8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 9] = [
        PixelFormat::Rgba8888,
        PixelFormat::Bgra8888,
        PixelFormat::Rgb888,
        PixelFormat::Rgb565,
        PixelFormat::Rgba5551,
        PixelFormat::Rgba4444,
        PixelFormat::I8,
        PixelFormat::Ia88,
        PixelFormat::A8,
    ];

    pub const fn bytes_per_pixel(self) -> u8 {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgb565
            | PixelFormat::Rgba5551
            | PixelFormat::Rgba4444
            | PixelFormat::Ia88 => 2,
            PixelFormat::I8 | PixelFormat::A8 => 1,
        }
    }

    pub const fn channels(self) -> u8 {
        match self {
            PixelFormat::Rgba8888
            | PixelFormat::Bgra8888
            | PixelFormat::Rgba5551
            | PixelFormat::Rgba4444 => 4,
            PixelFormat::Rgb888 | PixelFormat::Rgb565 => 3,
            PixelFormat::Ia88 => 2,
            PixelFormat::I8 | PixelFormat::A8 => 1,
        }
    }

    /// Whether several channels share one 16-bit word.
    ///
    /// Byte-wise filtering is meaningless for these formats.
    pub const fn is_packed(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgb565 | PixelFormat::Rgba5551 | PixelFormat::Rgba4444
        )
    }

    /// Byte length of `pixels` tightly packed pixels.
    pub const fn pixel_bytes(self, pixels: usize) -> usize {
        pixels * self.bytes_per_pixel() as usize
    }

    /// Only 8-bit-per-channel color formats have sRGB variants.
    pub const fn has_srgb_variant(self) -> bool {
        matches!(self, PixelFormat::Rgba8888 | PixelFormat::Bgra8888)
    }

    pub const fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Bgra8888 => "BGRA8888",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Rgba5551 => "RGBA5551",
            PixelFormat::Rgba4444 => "RGBA4444",
            PixelFormat::I8 => "I8",
            PixelFormat::Ia88 => "IA88",
            PixelFormat::A8 => "A8",
        }
    }
}

/// The color space a texture is sampled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    Linear,
    Srgb,
}

/// Size and format of a 2D image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixmapDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl PixmapDesc {
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        PixmapDesc {
            width,
            height,
            format,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes in one tightly packed row.
    pub const fn pitch_bytes(&self) -> usize {
        self.format.pixel_bytes(self.width as usize)
    }

    /// Bytes in the whole tightly packed image.
    pub const fn bytes(&self) -> usize {
        self.pitch_bytes() * self.height as usize
    }

    /// Same format, different size.
    pub const fn with_size(&self, width: u32, height: u32) -> Self {
        PixmapDesc::new(width, height, self.format)
    }

    /// Size of mip `level`: each step halves both dimensions, rounding down, minimum 1.
    pub const fn level_size(&self, level: u32) -> (u32, u32) {
        level_size(self.width, self.height, level)
    }

    /// Number of levels in a full mip chain for this size.
    pub const fn max_levels(&self) -> u32 {
        max_levels(self.width, self.height)
    }
}

/// Size of mip `level` of a `width` x `height` image.
pub const fn level_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    let w = if level >= 32 { 0 } else { width >> level };
    let h = if level >= 32 { 0 } else { height >> level };
    (if w == 0 { 1 } else { w }, if h == 0 { 1 } else { h })
}

/// `floor(log2(max(width, height))) + 1`, or 0 for an empty size.
pub const fn max_levels(width: u32, height: u32) -> u32 {
    let combined = width | height;
    if combined == 0 {
        0
    } else {
        u32::BITS - combined.leading_zeros()
    }
}
