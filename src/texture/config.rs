// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Builder for initial texture configuration.

use crate::capabilities::Capabilities;
use crate::pixel_formats::{ColorSpace, PixmapDesc};
use crate::sampler::SamplerParams;

/// How [crate::texture::Texture::new] configures a texture.
///
/// Collects what [crate::texture::Texture::set_format] takes as arguments, plus
/// whether mipmaps will be generated later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureConfig {
    desc: PixmapDesc,
    levels: u32,
    color_space: ColorSpace,
    compat_sampler: Option<SamplerParams>,
    will_generate_mipmaps: bool,
}

impl TextureConfig {
    /// One level, linear color, no compat sampler.
    pub fn new(desc: PixmapDesc) -> Self {
        Self {
            desc,
            levels: 1,
            color_space: ColorSpace::Linear,
            compat_sampler: None,
            will_generate_mipmaps: false,
        }
    }

    /// Level count to request; 0 asks for a full chain.
    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Sampler state for devices without sampler objects.
    pub fn with_compat_sampler(mut self, params: SamplerParams) -> Self {
        self.compat_sampler = Some(params);
        self
    }

    /// Requests a full chain that will be filled by mipmap generation.
    pub fn with_mipmaps(mut self, will_generate_mipmaps: bool) -> Self {
        self.will_generate_mipmaps = will_generate_mipmaps;
        if will_generate_mipmaps {
            self.levels = 0;
        }
        self
    }

    pub fn desc(&self) -> PixmapDesc {
        self.desc
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn compat_sampler(&self) -> Option<SamplerParams> {
        self.compat_sampler
    }

    pub fn will_generate_mipmaps(&self) -> bool {
        self.will_generate_mipmaps
    }

    /// The level count to pass to `set_format` on a device.
    ///
    /// Mutable storage only needs level 0 defined when generation fills the rest.
    pub fn levels_for(&self, capabilities: &Capabilities) -> u32 {
        if self.will_generate_mipmaps && !capabilities.immutable_storage {
            1
        } else {
            self.levels
        }
    }
}
