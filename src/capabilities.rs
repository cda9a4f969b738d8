// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Per-device feature flags.

A [Capabilities] value is produced once by [crate::imp::Device::capabilities] on the
device thread when a [crate::task::Task] starts, and is shared read-only by every
texture and sampler on that task.  Nothing here is global, so tests construct
synthetic capability sets with the `with_*` builders:

```
use texels_and_tasks::capabilities::Capabilities;

let caps = Capabilities::legacy()
    .with_strided_upload(false)
    .with_non_pow2_mipmaps(false);
assert!(!caps.supports_mipmaps(100, 60));
assert!(caps.supports_mipmaps(64, 32));
```
*/

use crate::imp::{InternalFormat, Swizzle};
use crate::pixel_formats::{ColorSpace, PixelFormat};

/// Which device internal formats stand in for the narrow pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTable {
    /// Internal format for [PixelFormat::I8].
    pub luminance: Option<InternalFormat>,
    /// Internal format for [PixelFormat::Ia88].
    pub luminance_alpha: Option<InternalFormat>,
    /// Internal format for [PixelFormat::A8].
    pub alpha: Option<InternalFormat>,
}

impl FormatTable {
    /// Narrow formats stored as red / red-green textures, read through a swizzle.
    pub const fn red_green() -> Self {
        FormatTable {
            luminance: Some(InternalFormat::R8),
            luminance_alpha: Some(InternalFormat::Rg8),
            alpha: Some(InternalFormat::R8),
        }
    }

    /// Narrow formats stored with the legacy luminance/alpha internal formats.
    pub const fn luminance_alpha() -> Self {
        FormatTable {
            luminance: Some(InternalFormat::Luminance8),
            luminance_alpha: Some(InternalFormat::LuminanceAlpha8),
            alpha: Some(InternalFormat::Alpha8),
        }
    }
}

/// How device storage for a texture is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStrategy {
    /// Size, format and level count fixed by one allocation call.
    Immutable,
    /// Each level defined by its own call; redefinable without a new handle.
    Mutable,
}

/// Immutable per-device feature flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Storage can be allocated once with a fixed level count.
    pub immutable_storage: bool,
    /// Uploads may skip row padding (an unpack row length).
    pub strided_upload: bool,
    /// Per-channel read remapping is available.
    pub swizzle: bool,
    /// BGRA-ordered uploads are accepted.
    pub bgra: bool,
    /// Filter/wrap state lives in shareable sampler objects.
    pub sampler_objects: bool,
    /// Mipmaps can be generated for non-power-of-two sizes.
    pub non_pow2_mipmaps: bool,
    /// The device can generate mipmaps at all.
    pub mipmap_generation: bool,
    /// Host-mappable pixel unpack buffers exist.
    pub pixel_buffers: bool,
    /// sRGB internal formats exist.
    pub srgb: bool,
    pub formats: FormatTable,
}

impl Capabilities {
    /// A device with every feature: immutable storage, row-length uploads, swizzle,
    /// sampler objects and non-power-of-two mipmaps.
    pub const fn modern() -> Self {
        Capabilities {
            immutable_storage: true,
            strided_upload: true,
            swizzle: true,
            bgra: true,
            sampler_objects: true,
            non_pow2_mipmaps: true,
            mipmap_generation: true,
            pixel_buffers: true,
            srgb: true,
            formats: FormatTable::red_green(),
        }
    }

    /// A minimal device: mutable storage only, tightly packed uploads only,
    /// per-texture sampler state and power-of-two mipmaps.
    pub const fn legacy() -> Self {
        Capabilities {
            immutable_storage: false,
            strided_upload: false,
            swizzle: false,
            bgra: false,
            sampler_objects: false,
            non_pow2_mipmaps: false,
            mipmap_generation: true,
            pixel_buffers: false,
            srgb: false,
            formats: FormatTable::luminance_alpha(),
        }
    }

    pub const fn with_immutable_storage(mut self, value: bool) -> Self {
        self.immutable_storage = value;
        self
    }

    pub const fn with_strided_upload(mut self, value: bool) -> Self {
        self.strided_upload = value;
        self
    }

    pub const fn with_swizzle(mut self, value: bool) -> Self {
        self.swizzle = value;
        self
    }

    pub const fn with_bgra(mut self, value: bool) -> Self {
        self.bgra = value;
        self
    }

    pub const fn with_sampler_objects(mut self, value: bool) -> Self {
        self.sampler_objects = value;
        self
    }

    pub const fn with_non_pow2_mipmaps(mut self, value: bool) -> Self {
        self.non_pow2_mipmaps = value;
        self
    }

    pub const fn with_mipmap_generation(mut self, value: bool) -> Self {
        self.mipmap_generation = value;
        self
    }

    pub const fn with_pixel_buffers(mut self, value: bool) -> Self {
        self.pixel_buffers = value;
        self
    }

    pub const fn with_srgb(mut self, value: bool) -> Self {
        self.srgb = value;
        self
    }

    pub const fn with_formats(mut self, formats: FormatTable) -> Self {
        self.formats = formats;
        self
    }

    pub const fn storage_strategy(&self) -> StorageStrategy {
        if self.immutable_storage {
            StorageStrategy::Immutable
        } else {
            StorageStrategy::Mutable
        }
    }

    /// Whether a `width` x `height` texture may carry a mip chain.
    ///
    /// Both dimensions must be non-zero, and powers of two unless
    /// [Capabilities::non_pow2_mipmaps].
    pub const fn supports_mipmaps(&self, width: u32, height: u32) -> bool {
        self.mipmap_generation
            && width != 0
            && height != 0
            && (self.non_pow2_mipmaps || (width.is_power_of_two() && height.is_power_of_two()))
    }

    /// The color space a texture of `format` actually gets when `requested` is asked for.
    pub const fn supported_color_space(
        &self,
        format: PixelFormat,
        requested: ColorSpace,
    ) -> ColorSpace {
        match requested {
            ColorSpace::Srgb if self.srgb && format.has_srgb_variant() => ColorSpace::Srgb,
            _ => ColorSpace::Linear,
        }
    }

    /// Whether pixels of `format` can be stored and uploaded at all.
    pub const fn can_upload(&self, format: PixelFormat) -> bool {
        match format {
            PixelFormat::Bgra8888 => self.bgra,
            _ => self.internal_format(format, ColorSpace::Linear).is_some(),
        }
    }

    /// The internal format storage for `format` is created with.
    pub const fn internal_format(
        &self,
        format: PixelFormat,
        color_space: ColorSpace,
    ) -> Option<InternalFormat> {
        let srgb = matches!(
            self.supported_color_space(format, color_space),
            ColorSpace::Srgb
        );
        match format {
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => {
                if srgb {
                    Some(InternalFormat::Srgb8Alpha8)
                } else {
                    Some(InternalFormat::Rgba8)
                }
            }
            PixelFormat::Rgb888 => Some(InternalFormat::Rgb8),
            PixelFormat::Rgb565 => Some(InternalFormat::Rgb565),
            PixelFormat::Rgba5551 => Some(InternalFormat::Rgb5A1),
            PixelFormat::Rgba4444 => Some(InternalFormat::Rgba4),
            PixelFormat::I8 => self.formats.luminance,
            PixelFormat::Ia88 => self.formats.luminance_alpha,
            PixelFormat::A8 => self.formats.alpha,
        }
    }

    /// The read swizzle a texture of `format` needs, if the device can swizzle.
    ///
    /// Intensity-alpha reads as `(I, I, I, A)` and alpha-only as `(1, 1, 1, A)`.
    pub const fn swizzle_for(&self, format: PixelFormat) -> Option<Swizzle> {
        if !self.swizzle {
            return None;
        }
        Some(match format {
            PixelFormat::Ia88 => Swizzle::INTENSITY_ALPHA,
            PixelFormat::A8 => Swizzle::ALPHA_ONLY,
            _ => Swizzle::IDENTITY,
        })
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::modern()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mipmap_gate() {
        let legacy = Capabilities::legacy();
        assert!(legacy.supports_mipmaps(256, 128));
        assert!(!legacy.supports_mipmaps(100, 60));
        assert!(!legacy.supports_mipmaps(0, 64));
        assert!(Capabilities::modern().supports_mipmaps(100, 60));
        assert!(!Capabilities::modern()
            .with_mipmap_generation(false)
            .supports_mipmaps(64, 64));
    }

    #[test]
    fn srgb_needs_device_and_format() {
        let modern = Capabilities::modern();
        assert_eq!(
            modern.internal_format(PixelFormat::Rgba8888, ColorSpace::Srgb),
            Some(InternalFormat::Srgb8Alpha8)
        );
        assert_eq!(
            modern.internal_format(PixelFormat::Rgb565, ColorSpace::Srgb),
            Some(InternalFormat::Rgb565)
        );
        assert_eq!(
            modern
                .clone()
                .with_srgb(false)
                .supported_color_space(PixelFormat::Bgra8888, ColorSpace::Srgb),
            ColorSpace::Linear
        );
    }

    #[test]
    fn narrow_formats_follow_table() {
        let caps = Capabilities::legacy();
        assert_eq!(
            caps.internal_format(PixelFormat::Ia88, ColorSpace::Linear),
            Some(InternalFormat::LuminanceAlpha8)
        );
        assert!(!caps.can_upload(PixelFormat::Bgra8888));
        let no_alpha = caps.with_formats(FormatTable {
            alpha: None,
            ..FormatTable::luminance_alpha()
        });
        assert!(!no_alpha.can_upload(PixelFormat::A8));
    }

    #[test]
    fn swizzle_only_when_supported() {
        assert_eq!(Capabilities::legacy().swizzle_for(PixelFormat::A8), None);
        assert_eq!(
            Capabilities::modern().swizzle_for(PixelFormat::Ia88),
            Some(Swizzle::INTENSITY_ALPHA)
        );
    }
}
