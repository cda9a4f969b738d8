// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A [Device] backed by wgpu.

wgpu textures are always immutable storage, uploads take an explicit
`bytes_per_row` so padded pixmaps are read in place, and filter state lives in
sampler objects.  wgpu has no mipmap generation or swizzle, and no 3-channel or
packed 16-bit formats; those calls report [DeviceError::Unsupported].
*/

use crate::capabilities::{Capabilities, FormatTable};
use crate::coordinates::RasterRect;
use crate::error::DeviceError;
use crate::imp::{
    Device, InternalFormat, SamplerHandle, Swizzle, TextureHandle, UnpackLayout, UploadSource,
};
use crate::pixel_formats::PixelFormat;
use crate::sampler::{Filter, MipFilter, SamplerParams, WrapMode};
use std::collections::HashMap;
use wgpu::{AddressMode, Extent3d, Origin3d, SamplerDescriptor, TexelCopyBufferLayout, TexelCopyTextureInfo};

const fn wgpu_format(internal: InternalFormat) -> Option<wgpu::TextureFormat> {
    match internal {
        InternalFormat::Rgba8 => Some(wgpu::TextureFormat::Rgba8Unorm),
        InternalFormat::Srgb8Alpha8 => Some(wgpu::TextureFormat::Rgba8UnormSrgb),
        InternalFormat::R8 => Some(wgpu::TextureFormat::R8Unorm),
        InternalFormat::Rg8 => Some(wgpu::TextureFormat::Rg8Unorm),
        InternalFormat::Rgb8
        | InternalFormat::Rgb565
        | InternalFormat::Rgb5A1
        | InternalFormat::Rgba4
        | InternalFormat::Luminance8
        | InternalFormat::LuminanceAlpha8
        | InternalFormat::Alpha8 => None,
    }
}

const fn filter(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

const fn address_mode(wrap: WrapMode) -> AddressMode {
    match wrap {
        WrapMode::ClampToEdge => AddressMode::ClampToEdge,
        WrapMode::Repeat => AddressMode::Repeat,
        WrapMode::MirroredRepeat => AddressMode::MirrorRepeat,
    }
}

fn sampler_descriptor(params: SamplerParams) -> SamplerDescriptor<'static> {
    let (mipmap_filter, lod_max_clamp) = match params.mipmap_filter {
        //sampling level 0 only
        MipFilter::None => (wgpu::FilterMode::Nearest, 0.0),
        MipFilter::Nearest => (wgpu::FilterMode::Nearest, 32.0),
        MipFilter::Linear => (wgpu::FilterMode::Linear, 32.0),
    };
    SamplerDescriptor {
        label: None,
        address_mode_u: address_mode(params.wrap_s),
        address_mode_v: address_mode(params.wrap_t),
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: filter(params.mag_filter),
        min_filter: filter(params.min_filter),
        mipmap_filter,
        lod_min_clamp: 0.0,
        lod_max_clamp,
        compare: None,
        anisotropy_clamp: 1,
        border_color: None,
    }
}

#[derive(Debug)]
struct Slot {
    texture: Option<wgpu::Texture>,
}

/// A device over a `wgpu::Device` and its queue.
#[derive(Debug)]
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: u32,
    textures: HashMap<TextureHandle, Slot>,
    samplers: HashMap<SamplerHandle, wgpu::Sampler>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuDevice {
            device,
            queue,
            next_id: 0,
            textures: HashMap::new(),
            samplers: HashMap::new(),
        }
    }

    /// The sampler object for `handle`, for building bind groups.
    pub fn sampler(&self, handle: SamplerHandle) -> Option<&wgpu::Sampler> {
        self.samplers.get(&handle)
    }

    /// The texture for `handle`, once storage has been allocated.
    pub fn texture(&self, handle: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&handle)?.texture.as_ref()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl Device for WgpuDevice {
    fn capabilities(&self) -> Capabilities {
        Capabilities::modern()
            .with_swizzle(false)
            .with_bgra(false)
            .with_mipmap_generation(false)
            .with_pixel_buffers(false)
            .with_formats(FormatTable::red_green())
    }

    fn create_texture(&mut self) -> Result<TextureHandle, DeviceError> {
        let handle = TextureHandle::from_raw(self.next_id());
        self.textures.insert(handle, Slot { texture: None });
        Ok(handle)
    }

    fn delete_texture(&mut self, handle: TextureHandle) -> Result<(), DeviceError> {
        let slot = self
            .textures
            .remove(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        if let Some(texture) = slot.texture {
            texture.destroy();
        }
        Ok(())
    }

    fn allocate_storage(
        &mut self,
        handle: TextureHandle,
        levels: u32,
        internal: InternalFormat,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        let format = wgpu_format(internal).ok_or(DeviceError::Unsupported(internal.name()))?;
        let label = format!("texels_and_tasks texture {handle}");
        let slot = self
            .textures
            .get_mut(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        if slot.texture.is_some() {
            return Err(DeviceError::ImmutableStorage { handle });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        slot.texture = Some(texture);
        Ok(())
    }

    fn define_level(
        &mut self,
        _handle: TextureHandle,
        _level: u32,
        _internal: InternalFormat,
        _format: PixelFormat,
        _width: u32,
        _height: u32,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("mutable storage"))
    }

    fn upload(
        &mut self,
        handle: TextureHandle,
        level: u32,
        rect: RasterRect,
        format: PixelFormat,
        layout: UnpackLayout,
        source: UploadSource<'_>,
    ) -> Result<(), DeviceError> {
        let UploadSource::Host(bytes) = source else {
            return Err(DeviceError::Unsupported("pixel buffers"));
        };
        let texture = self
            .textures
            .get(&handle)
            .and_then(|slot| slot.texture.as_ref())
            .ok_or(DeviceError::UndefinedLevel { handle, level })?;
        if texture.format().block_copy_size(None) != Some(format.bytes_per_pixel() as u32) {
            return Err(DeviceError::Backend(format!(
                "{} data cannot update {:?} storage",
                format.name(),
                texture.format()
            )));
        }
        let expected = layout.source_span(rect.width, rect.height, format);
        if bytes.len() < expected {
            return Err(DeviceError::ShortSource {
                expected,
                actual: bytes.len(),
            });
        }
        let pitch = layout.source_pitch(rect.width, format) as u32;
        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture,
                mip_level: level,
                origin: Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &bytes[..expected],
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pitch),
                rows_per_image: Some(rect.height),
            },
            Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn generate_mipmaps(&mut self, _handle: TextureHandle) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("mipmap generation"))
    }

    fn set_swizzle(&mut self, _handle: TextureHandle, _swizzle: Swizzle) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("swizzle"))
    }

    fn set_sampler_params(
        &mut self,
        _handle: TextureHandle,
        _params: SamplerParams,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported("per-texture sampler state"))
    }

    fn create_sampler(&mut self, params: SamplerParams) -> Result<SamplerHandle, DeviceError> {
        let sampler = self.device.create_sampler(&sampler_descriptor(params));
        let handle = SamplerHandle::from_raw(self.next_id());
        self.samplers.insert(handle, sampler);
        Ok(handle)
    }

    fn delete_sampler(&mut self, sampler: SamplerHandle) -> Result<(), DeviceError> {
        self.samplers
            .remove(&sampler)
            .map(|_| ())
            .ok_or(DeviceError::Backend(format!(
                "no sampler 0x{:X}",
                sampler.raw()
            )))
    }
}
