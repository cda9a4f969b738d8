// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Texture sampling parameters.

On devices with [crate::capabilities::Capabilities::sampler_objects] a
[TextureSampler] owns a device sampler object that any number of textures share.
Elsewhere filter and wrap state is per texture, so the sampler only carries its
[SamplerParams] and textures apply them when their storage is first created
(see [crate::texture::Texture::set_compat_sampler]).
*/

use crate::error::TaskError;
use crate::imp::{SamplerHandle, TextureHandle, checked};
use crate::task::Task;

/// Texel filter for magnification and minification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

/// How minification picks between mip levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipFilter {
    /// Only level 0 is sampled.
    #[default]
    None,
    Nearest,
    Linear,
}

/// Behavior for coordinates outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Filter and wrap state for sampling a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerParams {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: MipFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl SamplerParams {
    /// Nearest filtering, clamped, no mipmaps.
    pub const fn nearest() -> Self {
        SamplerParams {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            mipmap_filter: MipFilter::None,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
        }
    }

    /// Bilinear filtering, clamped, no mipmaps.
    pub const fn linear() -> Self {
        SamplerParams {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            ..Self::nearest()
        }
    }

    /// Trilinear filtering across the mip chain.
    pub const fn mipmapped() -> Self {
        SamplerParams {
            mipmap_filter: MipFilter::Linear,
            ..Self::linear()
        }
    }

    /// Pixel art: crisp when magnified, smooth when minified.
    pub const fn pixel_linear() -> Self {
        SamplerParams {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Linear,
            mipmap_filter: MipFilter::Nearest,
            ..Self::nearest()
        }
    }

    pub const fn with_wrap(mut self, wrap_s: WrapMode, wrap_t: WrapMode) -> Self {
        self.wrap_s = wrap_s;
        self.wrap_t = wrap_t;
        self
    }

    /// Whether sampling reads levels other than 0.
    pub const fn uses_mipmaps(&self) -> bool {
        !matches!(self.mipmap_filter, MipFilter::None)
    }
}

/**
A sampler usable with any texture on one task.

Holds a device sampler object when the device has them; the object is deleted
on the task when the sampler is dropped.
*/
#[derive(Debug)]
pub struct TextureSampler {
    params: SamplerParams,
    object: Option<SamplerHandle>,
    task: Task,
}

impl TextureSampler {
    pub async fn new(task: &Task, params: SamplerParams) -> Result<Self, TaskError> {
        let object = if task.capabilities().sampler_objects {
            task.run_async("create sampler", move |device| {
                checked(
                    "create_sampler",
                    TextureHandle::NONE,
                    device.create_sampler(params),
                )
            })
            .await?
        } else {
            None
        };
        logwise::trace_sync!(
            "created sampler {params} object {object}",
            params = logwise::privacy::LogIt(&params),
            object = logwise::privacy::LogIt(&object)
        );
        Ok(TextureSampler {
            params,
            object,
            task: task.clone(),
        })
    }

    pub fn params(&self) -> SamplerParams {
        self.params
    }

    /// The device sampler object, if the device has them.
    pub fn object(&self) -> Option<SamplerHandle> {
        self.object
    }
}

impl Drop for TextureSampler {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.task.run("delete sampler", move |device| {
                checked(
                    "delete_sampler",
                    TextureHandle::NONE,
                    device.delete_sampler(object),
                );
            });
        }
    }
}
