// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
An in-memory device.

[SoftDevice] keeps texels in host memory and follows the same rules a driver
would: unpack alignment and row length decide the source stride, immutable
storage rejects redefinition, and features missing from its [Capabilities] are
refused.  Every call is appended to a log that a [SoftInspector] can read from
any thread, which is how the tests observe what reached the device.
*/

use crate::capabilities::Capabilities;
use crate::coordinates::RasterRect;
use crate::error::DeviceError;
use crate::imp::{
    BufferHandle, Device, InternalFormat, MappedRange, SamplerHandle, Swizzle, TextureHandle,
    UnpackLayout, UploadSource, UploadSourceKind,
};
use crate::pixel_formats::{PixelFormat, level_size, max_levels};
use crate::sampler::SamplerParams;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use wasm_safe_mutex::Mutex;

/// One call that reached a [SoftDevice].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    CreateTexture(TextureHandle),
    DeleteTexture(TextureHandle),
    AllocateStorage {
        handle: TextureHandle,
        levels: u32,
        internal: InternalFormat,
        width: u32,
        height: u32,
    },
    DefineLevel {
        handle: TextureHandle,
        level: u32,
        internal: InternalFormat,
        width: u32,
        height: u32,
    },
    Upload {
        handle: TextureHandle,
        level: u32,
        rect: RasterRect,
        format: PixelFormat,
        layout: UnpackLayout,
        source: UploadSourceKind,
    },
    GenerateMipmaps(TextureHandle),
    SetSwizzle {
        handle: TextureHandle,
        swizzle: Swizzle,
    },
    SetSamplerParams {
        handle: TextureHandle,
        params: SamplerParams,
    },
    CreateSampler(SamplerHandle),
    DeleteSampler(SamplerHandle),
    CreatePixelBuffer {
        buffer: BufferHandle,
        len: usize,
    },
    MapPixelBuffer(BufferHandle),
    FlushPixelBuffer {
        buffer: BufferHandle,
        offset: usize,
        len: usize,
    },
    DeletePixelBuffer(BufferHandle),
    ReadPixels {
        handle: TextureHandle,
        level: u32,
    },
}

#[derive(Debug)]
struct SoftLevel {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
struct SoftTexture {
    immutable: bool,
    internal: Option<InternalFormat>,
    levels: Vec<Option<SoftLevel>>,
    swizzle: Swizzle,
    sampler: Option<SamplerParams>,
}

#[derive(Debug)]
struct SoftBuffer {
    data: Box<[u8]>,
    mapped: bool,
}

#[derive(Debug, Default)]
struct SoftState {
    next_id: u32,
    textures: HashMap<TextureHandle, SoftTexture>,
    buffers: HashMap<BufferHandle, SoftBuffer>,
    samplers: HashMap<SamplerHandle, SamplerParams>,
    calls: Vec<DeviceCall>,
}

impl SoftState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn texture_mut(&mut self, handle: TextureHandle) -> Result<&mut SoftTexture, DeviceError> {
        self.textures
            .get_mut(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))
    }
}

/// Box filter for byte channels, nearest for packed texels.
fn downsample(src: &SoftLevel, width: u32, height: u32, bpp: usize, packed: bool) -> SoftLevel {
    let mut data = vec![0; width as usize * height as usize * bpp];
    let texel = |x: u32, y: u32| {
        let x = x.min(src.width - 1) as usize;
        let y = y.min(src.height - 1) as usize;
        let start = (y * src.width as usize + x) * bpp;
        &src.data[start..start + bpp]
    };
    for y in 0..height {
        for x in 0..width {
            let start = (y as usize * width as usize + x as usize) * bpp;
            let out = &mut data[start..start + bpp];
            if packed {
                out.copy_from_slice(texel(2 * x, 2 * y));
                continue;
            }
            let samples = [
                texel(2 * x, 2 * y),
                texel(2 * x + 1, 2 * y),
                texel(2 * x, 2 * y + 1),
                texel(2 * x + 1, 2 * y + 1),
            ];
            for (c, byte) in out.iter_mut().enumerate() {
                let sum: u32 = samples.iter().map(|s| s[c] as u32).sum();
                *byte = ((sum + 2) / 4) as u8;
            }
        }
    }
    SoftLevel {
        width,
        height,
        data,
    }
}

/// A software device.  See the module documentation.
#[derive(Debug)]
pub struct SoftDevice {
    capabilities: Capabilities,
    state: Arc<Mutex<SoftState>>,
}

/// Read access to a [SoftDevice]'s state, usable from any thread.
#[derive(Debug, Clone)]
pub struct SoftInspector {
    state: Arc<Mutex<SoftState>>,
}

impl SoftDevice {
    pub fn new(capabilities: Capabilities) -> Self {
        SoftDevice {
            capabilities,
            state: Arc::new(Mutex::new(SoftState::default())),
        }
    }

    pub fn inspector(&self) -> SoftInspector {
        SoftInspector {
            state: self.state.clone(),
        }
    }

    fn require(&self, supported: bool, feature: &'static str) -> Result<(), DeviceError> {
        if supported {
            Ok(())
        } else {
            Err(DeviceError::Unsupported(feature))
        }
    }
}

impl Device for SoftDevice {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn create_texture(&mut self) -> Result<TextureHandle, DeviceError> {
        let mut state = self.state.lock_sync();
        let handle = TextureHandle::from_raw(state.next_id());
        state.textures.insert(
            handle,
            SoftTexture {
                immutable: false,
                internal: None,
                levels: Vec::new(),
                swizzle: Swizzle::IDENTITY,
                sampler: None,
            },
        );
        state.calls.push(DeviceCall::CreateTexture(handle));
        Ok(handle)
    }

    fn delete_texture(&mut self, handle: TextureHandle) -> Result<(), DeviceError> {
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::DeleteTexture(handle));
        state
            .textures
            .remove(&handle)
            .map(|_| ())
            .ok_or(DeviceError::InvalidHandle(handle))
    }

    fn allocate_storage(
        &mut self,
        handle: TextureHandle,
        levels: u32,
        internal: InternalFormat,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        self.require(self.capabilities.immutable_storage, "immutable storage")?;
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::AllocateStorage {
            handle,
            levels,
            internal,
            width,
            height,
        });
        if levels == 0 || levels > max_levels(width, height) {
            return Err(DeviceError::Backend(format!(
                "{levels} levels invalid for {width}x{height}"
            )));
        }
        let texture = state.texture_mut(handle)?;
        if texture.immutable {
            return Err(DeviceError::ImmutableStorage { handle });
        }
        let bpp = internal.bytes_per_pixel() as usize;
        texture.immutable = true;
        texture.internal = Some(internal);
        texture.levels = (0..levels)
            .map(|level| {
                let (w, h) = level_size(width, height, level);
                Some(SoftLevel {
                    width: w,
                    height: h,
                    data: vec![0; w as usize * h as usize * bpp],
                })
            })
            .collect();
        Ok(())
    }

    fn define_level(
        &mut self,
        handle: TextureHandle,
        level: u32,
        internal: InternalFormat,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::DefineLevel {
            handle,
            level,
            internal,
            width,
            height,
        });
        if format.bytes_per_pixel() != internal.bytes_per_pixel() {
            return Err(DeviceError::Backend(format!(
                "{} data cannot define {} storage",
                format.name(),
                internal.name()
            )));
        }
        let texture = state.texture_mut(handle)?;
        if texture.immutable {
            return Err(DeviceError::ImmutableStorage { handle });
        }
        let index = level as usize;
        if texture.levels.len() <= index {
            texture.levels.resize_with(index + 1, || None);
        }
        texture.internal = Some(internal);
        texture.levels[index] = Some(SoftLevel {
            width,
            height,
            data: vec![0; internal.bytes_per_pixel() as usize * width as usize * height as usize],
        });
        Ok(())
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
        if layout.row_length != 0 {
            self.require(self.capabilities.strided_upload, "unpack row length")?;
        }
        if format == PixelFormat::Bgra8888 {
            self.require(self.capabilities.bgra, "BGRA uploads")?;
        }
        let mut guard = self.state.lock_sync();
        let state = &mut *guard;
        state.calls.push(DeviceCall::Upload {
            handle,
            level,
            rect,
            format,
            layout,
            source: source.kind(),
        });
        let bytes: &[u8] = match source {
            UploadSource::Host(bytes) => bytes,
            UploadSource::PixelBuffer { buffer, offset } => {
                let soft = state
                    .buffers
                    .get(&buffer)
                    .ok_or(DeviceError::InvalidBuffer(buffer))?;
                if soft.mapped {
                    return Err(DeviceError::Backend(format!(
                        "pixel buffer {buffer} is still mapped"
                    )));
                }
                soft.data.get(offset..).unwrap_or(&[])
            }
        };
        let texture = state
            .textures
            .get_mut(&handle)
            .ok_or(DeviceError::InvalidHandle(handle))?;
        let internal = texture
            .internal
            .ok_or(DeviceError::UndefinedLevel { handle, level })?;
        if internal.bytes_per_pixel() != format.bytes_per_pixel() {
            return Err(DeviceError::Backend(format!(
                "{} data cannot update {} storage",
                format.name(),
                internal.name()
            )));
        }
        let target = texture
            .levels
            .get_mut(level as usize)
            .and_then(Option::as_mut)
            .ok_or(DeviceError::UndefinedLevel { handle, level })?;
        if !rect.fits_within(target.width, target.height) {
            return Err(DeviceError::OutOfBounds {
                region: rect,
                width: target.width,
                height: target.height,
            });
        }
        let expected = layout.source_span(rect.width, rect.height, format);
        if bytes.len() < expected {
            return Err(DeviceError::ShortSource {
                expected,
                actual: bytes.len(),
            });
        }
        let pitch = layout.source_pitch(rect.width, format);
        let row = format.pixel_bytes(rect.width as usize);
        let target_pitch = format.pixel_bytes(target.width as usize);
        for y in 0..rect.height as usize {
            let src = &bytes[y * pitch..y * pitch + row];
            let dst_start =
                (rect.y as usize + y) * target_pitch + format.pixel_bytes(rect.x as usize);
            target.data[dst_start..dst_start + row].copy_from_slice(src);
        }
        Ok(())
    }

    fn generate_mipmaps(&mut self, handle: TextureHandle) -> Result<(), DeviceError> {
        self.require(self.capabilities.mipmap_generation, "mipmap generation")?;
        let capabilities = self.capabilities.clone();
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::GenerateMipmaps(handle));
        let texture = state.texture_mut(handle)?;
        let internal = texture
            .internal
            .ok_or(DeviceError::UndefinedLevel { handle, level: 0 })?;
        let (width, height) = match texture.levels.first().and_then(Option::as_ref) {
            Some(base) => (base.width, base.height),
            None => return Err(DeviceError::UndefinedLevel { handle, level: 0 }),
        };
        if !capabilities.supports_mipmaps(width, height) {
            return Err(DeviceError::Unsupported("mipmaps for this size"));
        }
        let count = if texture.immutable {
            texture.levels.len()
        } else {
            max_levels(width, height) as usize
        };
        texture.levels.resize_with(count, || None);
        let bpp = internal.bytes_per_pixel() as usize;
        for level in 1..count {
            let (w, h) = level_size(width, height, level as u32);
            let next = match &texture.levels[level - 1] {
                Some(previous) => downsample(previous, w, h, bpp, internal.is_packed()),
                None => {
                    return Err(DeviceError::UndefinedLevel {
                        handle,
                        level: level as u32 - 1,
                    });
                }
            };
            texture.levels[level] = Some(next);
        }
        Ok(())
    }

    fn set_swizzle(&mut self, handle: TextureHandle, swizzle: Swizzle) -> Result<(), DeviceError> {
        self.require(self.capabilities.swizzle, "swizzle")?;
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::SetSwizzle { handle, swizzle });
        state.texture_mut(handle)?.swizzle = swizzle;
        Ok(())
    }

    fn set_sampler_params(
        &mut self,
        handle: TextureHandle,
        params: SamplerParams,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock_sync();
        state
            .calls
            .push(DeviceCall::SetSamplerParams { handle, params });
        state.texture_mut(handle)?.sampler = Some(params);
        Ok(())
    }

    fn create_sampler(&mut self, params: SamplerParams) -> Result<SamplerHandle, DeviceError> {
        self.require(self.capabilities.sampler_objects, "sampler objects")?;
        let mut state = self.state.lock_sync();
        let sampler = SamplerHandle::from_raw(state.next_id());
        state.samplers.insert(sampler, params);
        state.calls.push(DeviceCall::CreateSampler(sampler));
        Ok(sampler)
    }

    fn delete_sampler(&mut self, sampler: SamplerHandle) -> Result<(), DeviceError> {
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::DeleteSampler(sampler));
        state
            .samplers
            .remove(&sampler)
            .map(|_| ())
            .ok_or(DeviceError::Backend(format!(
                "no sampler 0x{:X}",
                sampler.raw()
            )))
    }

    fn create_pixel_buffer(&mut self, len: usize) -> Result<BufferHandle, DeviceError> {
        self.require(self.capabilities.pixel_buffers, "pixel buffers")?;
        let mut state = self.state.lock_sync();
        let buffer = BufferHandle::from_raw(state.next_id());
        state.buffers.insert(
            buffer,
            SoftBuffer {
                data: vec![0; len].into_boxed_slice(),
                mapped: false,
            },
        );
        state.calls.push(DeviceCall::CreatePixelBuffer { buffer, len });
        Ok(buffer)
    }

    fn map_pixel_buffer(&mut self, buffer: BufferHandle) -> Result<MappedRange, DeviceError> {
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::MapPixelBuffer(buffer));
        let soft = state
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::InvalidBuffer(buffer))?;
        if soft.mapped {
            return Err(DeviceError::Backend(format!(
                "pixel buffer {buffer} is already mapped"
            )));
        }
        soft.mapped = true;
        let len = soft.data.len();
        let ptr = NonNull::new(soft.data.as_mut_ptr())
            .ok_or(DeviceError::Backend("null pixel buffer".to_string()))?;
        // SAFETY: the boxed slice is never resized and is freed only by
        // delete_pixel_buffer; nothing reads it while `mapped` is set.
        Ok(unsafe { MappedRange::new(ptr, len) })
    }

    fn flush_pixel_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        len: usize,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock_sync();
        state
            .calls
            .push(DeviceCall::FlushPixelBuffer { buffer, offset, len });
        let soft = state
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::InvalidBuffer(buffer))?;
        if offset.checked_add(len).is_none_or(|end| end > soft.data.len()) {
            return Err(DeviceError::Backend(format!(
                "flush of {len} bytes at {offset} exceeds pixel buffer {buffer}"
            )));
        }
        soft.mapped = false;
        Ok(())
    }

    fn delete_pixel_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError> {
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::DeletePixelBuffer(buffer));
        state
            .buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or(DeviceError::InvalidBuffer(buffer))
    }

    fn read_pixels(&mut self, handle: TextureHandle, level: u32) -> Result<Vec<u8>, DeviceError> {
        let mut state = self.state.lock_sync();
        state.calls.push(DeviceCall::ReadPixels { handle, level });
        state
            .texture_mut(handle)?
            .levels
            .get(level as usize)
            .and_then(Option::as_ref)
            .map(|l| l.data.clone())
            .ok_or(DeviceError::UndefinedLevel { handle, level })
    }
}

impl SoftInspector {
    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock_sync().calls.clone()
    }

    /// Number of logged calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state
            .lock_sync()
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock_sync().calls.clear();
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock_sync().textures.len()
    }

    pub fn live_pixel_buffers(&self) -> usize {
        self.state.lock_sync().buffers.len()
    }

    /// Tightly packed texels of one level, if it is defined.
    pub fn level_bytes(&self, handle: TextureHandle, level: u32) -> Option<Vec<u8>> {
        self.state
            .lock_sync()
            .textures
            .get(&handle)?
            .levels
            .get(level as usize)?
            .as_ref()
            .map(|l| l.data.clone())
    }

    /// Sizes of the defined levels, in level order.
    pub fn level_sizes(&self, handle: TextureHandle) -> Vec<(u32, u32)> {
        self.state
            .lock_sync()
            .textures
            .get(&handle)
            .map(|t| {
                t.levels
                    .iter()
                    .flatten()
                    .map(|l| (l.width, l.height))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn swizzle(&self, handle: TextureHandle) -> Option<Swizzle> {
        self.state
            .lock_sync()
            .textures
            .get(&handle)
            .map(|t| t.swizzle)
    }

    pub fn sampler_params(&self, handle: TextureHandle) -> Option<SamplerParams> {
        self.state
            .lock_sync()
            .textures
            .get(&handle)
            .and_then(|t| t.sampler)
    }
}
