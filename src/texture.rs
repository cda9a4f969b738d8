// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Device textures.

A [Texture] owns one device texture handle on a [Task].  All device work is done
by closures submitted to the task; the texture itself only keeps the handle in a
shared cell that those closures write, plus metadata (size, format, level count)
that is updated as soon as each call returns.

# Storage

[Texture::set_format] picks a [StorageStrategy] from the device capabilities:

* **Immutable**: a new handle is created and storage for every level is allocated
  in one call.  Any previous handle is deleted first.
* **Mutable**: each level is defined separately.  The handle is only recreated
  when the level count changes, so resizing keeps sampler state bound to it.

Either way the new handle is published to the caller before the rest of the
setup runs on the device thread.

# Uploads

[Texture::write] uploads straight from caller memory when the device can read
the pixmap's row layout, and otherwise copies it into a [LockedBuffer] first.
It blocks until the device has consumed the pixels.  [Texture::write_owned]
takes ownership of a [Pixmap] instead and returns immediately.

```
use texels_and_tasks::capabilities::Capabilities;
use texels_and_tasks::coordinates::RasterCoord2D;
use texels_and_tasks::imp::soft::SoftDevice;
use texels_and_tasks::pixel_formats::{PixelFormat, PixmapDesc};
use texels_and_tasks::pixmap::Pixmap;
use texels_and_tasks::task::Task;
use texels_and_tasks::texture::{Texture, TextureConfig, WriteFlags};

# test_executors::sleep_on(async {
let task = Task::new("doc", || Ok(SoftDevice::new(Capabilities::modern())))
    .await
    .unwrap();
let desc = PixmapDesc::new(16, 16, PixelFormat::Rgba8888);
let mut texture = Texture::new(&task, TextureConfig::new(desc)).await.unwrap();
let pixels = Pixmap::new(desc);
texture
    .write(0, &pixels.view(), RasterCoord2D::ORIGIN, WriteFlags::empty())
    .unwrap();
assert_eq!(texture.size(0), (16, 16));
# });
```
*/

pub mod config;
pub mod locked;

pub use config::TextureConfig;
pub use locked::{LockFlags, LockedBuffer};

use crate::capabilities::{Capabilities, StorageStrategy};
use crate::coordinates::{RasterCoord2D, RasterRect};
use crate::error::{DeviceError, TextureError};
use crate::imp::{
    Device, InternalFormat, Swizzle, TextureHandle, UnpackLayout, UploadSource, checked,
};
use crate::pixel_formats::{ColorSpace, PixelFormat, PixmapDesc, level_size};
use crate::pixmap::source::PixmapSource;
use crate::pixmap::{Pixmap, PixmapView};
use crate::sampler::{SamplerParams, TextureSampler};
use crate::task::Task;
use locked::Staging;
use std::ops::BitOr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Options for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteFlags(u8);

impl WriteFlags {
    /// Regenerate the mip chain after the upload, when the size allows it.
    pub const MAKE_MIPMAPS: WriteFlags = WriteFlags(1);

    pub const fn empty() -> Self {
        WriteFlags(0)
    }

    pub const fn contains(self, other: WriteFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WriteFlags {
    type Output = WriteFlags;
    fn bitor(self, rhs: WriteFlags) -> WriteFlags {
        WriteFlags(self.0 | rhs.0)
    }
}

/// How shaders should read a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    /// Not formatted yet.
    #[default]
    Unset,
    OneChannel,
    TwoChannel,
    FourChannel,
    /// Created outside this crate.
    External,
}

impl TextureType {
    pub const fn for_format(format: PixelFormat) -> Self {
        match format.channels() {
            1 => TextureType::OneChannel,
            2 => TextureType::TwoChannel,
            _ => TextureType::FourChannel,
        }
    }
}

/// What a draw call needs to sample a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    pub handle: TextureHandle,
    pub texture_type: TextureType,
}

/// Unpack alignment for each value of `x & 7`.
const ALIGNMENT_FOR_LOW_BITS: [u8; 8] = [8, 1, 2, 1, 4, 1, 2, 1];

const fn alignment_for(value: usize) -> u8 {
    ALIGNMENT_FOR_LOW_BITS[value & 7]
}

fn load(cell: &AtomicU32) -> TextureHandle {
    TextureHandle::from_raw(cell.load(Ordering::Acquire))
}

fn store(cell: &AtomicU32, handle: TextureHandle) {
    cell.store(handle.raw(), Ordering::Release)
}

fn resolve_levels(capabilities: &Capabilities, desc: PixmapDesc, requested: u32) -> u32 {
    if !capabilities.supports_mipmaps(desc.width, desc.height) {
        return 1;
    }
    let max = desc.max_levels();
    if requested == 0 || requested > max {
        max
    } else {
        requested
    }
}

/// Defines levels `levels - 1` down to 0 of mutable storage.
fn define_levels(
    device: &mut dyn Device,
    handle: TextureHandle,
    internal: InternalFormat,
    desc: PixmapDesc,
    levels: u32,
) {
    for level in (0..levels).rev() {
        let (width, height) = level_size(desc.width, desc.height, level);
        checked(
            "define_level",
            handle,
            device.define_level(handle, level, internal, desc.format, width, height),
        );
    }
}

fn finish_format(
    device: &mut dyn Device,
    handle: TextureHandle,
    swizzle: Option<Swizzle>,
    sampler: Option<SamplerParams>,
) {
    if let Some(swizzle) = swizzle {
        checked("set_swizzle", handle, device.set_swizzle(handle, swizzle));
    }
    if let Some(params) = sampler {
        checked(
            "set_sampler_params",
            handle,
            device.set_sampler_params(handle, params),
        );
    }
}

/// A device texture.  See the module documentation.
#[derive(Debug)]
pub struct Texture {
    task: Task,
    handle: Arc<AtomicU32>,
    desc: PixmapDesc,
    levels: u32,
    texture_type: TextureType,
    color_space: ColorSpace,
    compat_sampler: Option<SamplerParams>,
    owns_handle: bool,
}

impl Texture {
    /// A texture with no device storage.  Call [Texture::set_format] before use.
    pub fn unallocated(task: &Task) -> Self {
        Texture {
            task: task.clone(),
            handle: Arc::new(AtomicU32::new(TextureHandle::NONE.raw())),
            desc: PixmapDesc::new(0, 0, PixelFormat::Rgba8888),
            levels: 0,
            texture_type: TextureType::Unset,
            color_space: ColorSpace::Linear,
            compat_sampler: None,
            owns_handle: true,
        }
    }

    /// Creates and formats a texture.
    pub async fn new(task: &Task, config: TextureConfig) -> Result<Self, TextureError> {
        let mut texture = Texture::unallocated(task);
        let levels = config.levels_for(task.capabilities());
        texture
            .set_format(
                config.desc(),
                levels,
                config.color_space(),
                config.compat_sampler(),
            )
            .await?;
        Ok(texture)
    }

    /**
    Wraps a texture created outside this crate.

    The texture has one level and is never deleted by this crate.
    */
    pub fn adopt_external(task: &Task, handle: TextureHandle, desc: PixmapDesc) -> Self {
        Texture {
            task: task.clone(),
            handle: Arc::new(AtomicU32::new(handle.raw())),
            desc,
            levels: 1,
            texture_type: TextureType::External,
            color_space: ColorSpace::Linear,
            compat_sampler: None,
            owns_handle: false,
        }
    }

    /**
    Creates a texture holding the pixels of `source`.

    Sources that expose a view are uploaded directly; others write themselves
    into a locked buffer.
    */
    pub async fn from_source<S>(
        task: &Task,
        source: &S,
        compat_sampler: Option<&TextureSampler>,
        make_mipmaps: bool,
    ) -> Result<Self, TextureError>
    where
        S: PixmapSource + ?Sized,
    {
        let mut config = TextureConfig::new(source.desc()).with_mipmaps(make_mipmaps);
        if let Some(sampler) = compat_sampler {
            config = config.with_compat_sampler(sampler.params());
        }
        let mut texture = Texture::new(task, config).await?;
        let flags = if make_mipmaps {
            WriteFlags::MAKE_MIPMAPS
        } else {
            WriteFlags::empty()
        };
        match source.pixmap_view() {
            Some(view) => texture.write(0, &view, RasterCoord2D::ORIGIN, flags)?,
            None => {
                let mut buffer = texture.lock_level(0, LockFlags::empty())?;
                source.write_into(buffer.pixmap_mut());
                texture.unlock(buffer, flags)?;
            }
        }
        Ok(texture)
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// The current device handle, [TextureHandle::NONE] when unallocated.
    pub fn handle(&self) -> TextureHandle {
        load(&self.handle)
    }

    pub fn is_allocated(&self) -> bool {
        !self.handle().is_none()
    }

    pub fn binding(&self) -> TextureBinding {
        TextureBinding {
            handle: self.handle(),
            texture_type: self.texture_type,
        }
    }

    pub fn desc(&self) -> PixmapDesc {
        self.desc
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn texture_type(&self) -> TextureType {
        self.texture_type
    }

    /// The color space the device actually samples in.
    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Per-texture sampler state used on devices without sampler objects.
    pub fn compat_sampler(&self) -> Option<SamplerParams> {
        self.compat_sampler
    }

    /// Size of `level`.
    pub fn size(&self, level: u32) -> (u32, u32) {
        if self.desc.is_empty() {
            return (0, 0);
        }
        self.desc.level_size(level)
    }

    /// Whether the current size may carry a mip chain on this device.
    pub fn can_use_mipmaps(&self) -> bool {
        self.task
            .capabilities()
            .supports_mipmaps(self.desc.width, self.desc.height)
    }

    /// The largest unpack alignment (8, 4, 2 or 1) both the address and pitch of `pixmap` satisfy.
    pub fn best_alignment(pixmap: &PixmapView<'_>) -> u8 {
        alignment_for(pixmap.addr()).min(alignment_for(pixmap.pitch_bytes()))
    }

    fn fail(&self, op: &'static str, err: TextureError) -> TextureError {
        logwise::error_sync!(
            "{op} on texture {handle} failed: {err}",
            op = op,
            handle = self.handle().raw(),
            err = logwise::privacy::LogIt(&err)
        );
        err
    }

    fn require_allocated(&self, op: &'static str) -> Result<TextureHandle, TextureError> {
        let handle = self.handle();
        if handle.is_none() {
            Err(self.fail(op, TextureError::Unallocated))
        } else {
            Ok(handle)
        }
    }

    fn check_region(&self, op: &'static str, level: u32, rect: RasterRect) -> Result<(), TextureError> {
        if level >= self.levels {
            return Err(self.fail(
                op,
                TextureError::NoSuchLevel {
                    level,
                    levels: self.levels,
                },
            ));
        }
        let (width, height) = self.size(level);
        if !rect.fits_within(width, height) {
            return Err(self.fail(
                op,
                TextureError::OutOfBounds {
                    rect,
                    level,
                    width,
                    height,
                },
            ));
        }
        Ok(())
    }

    fn check_write(
        &self,
        op: &'static str,
        level: u32,
        pixmap: &PixmapView<'_>,
        dest: RasterCoord2D,
    ) -> Result<RasterRect, TextureError> {
        self.require_allocated(op)?;
        if pixmap.format().bytes_per_pixel() != self.desc.format.bytes_per_pixel() {
            return Err(self.fail(
                op,
                TextureError::FormatMismatch {
                    texture: self.desc.format,
                    pixmap: pixmap.format(),
                },
            ));
        }
        let rect = RasterRect::at(dest, pixmap.width(), pixmap.height());
        self.check_region(op, level, rect)?;
        Ok(rect)
    }

    fn wants_mipmaps(&self, flags: WriteFlags) -> bool {
        flags.contains(WriteFlags::MAKE_MIPMAPS) && self.can_use_mipmaps()
    }

    /// Immutable storage was allocated with its final level count.
    fn note_mipmaps_generated(&mut self) {
        if !self.task.capabilities().immutable_storage {
            self.levels = self.desc.max_levels();
        }
    }

    /**
    (Re)establishes device storage for `desc`.

    `levels` of 0 requests a full mip chain.  Sizes that cannot be mipmapped on
    this device always get one level.  `compat_sampler` is applied when a new
    handle is created on devices without sampler objects.

    Resolves once the handle is visible; the remaining setup runs in order on the
    device thread.
    */
    pub async fn set_format(
        &mut self,
        desc: PixmapDesc,
        levels: u32,
        color_space: ColorSpace,
        compat_sampler: Option<SamplerParams>,
    ) -> Result<(), TextureError> {
        if desc.is_empty() {
            return Err(self.fail(
                "set_format",
                TextureError::ZeroSize {
                    width: desc.width,
                    height: desc.height,
                },
            ));
        }
        let capabilities = Arc::clone(self.task.capabilities());
        let internal = if capabilities.can_upload(desc.format) {
            capabilities.internal_format(desc.format, color_space)
        } else {
            None
        };
        let Some(internal) = internal else {
            return Err(self.fail(
                "set_format",
                TextureError::UnsupportedFormat(desc.format),
            ));
        };
        let levels = resolve_levels(&capabilities, desc, levels);
        let swizzle = capabilities.swizzle_for(desc.format);
        let sampler = if capabilities.sampler_objects {
            None
        } else {
            compat_sampler
        };
        let delete_old = self.owns_handle;
        let old = self.handle();
        let cell = self.handle.clone();

        let created = match capabilities.storage_strategy() {
            StorageStrategy::Immutable => Some(
                self.task
                    .run_signaled("set_format", move |device, signal| {
                        let old = load(&cell);
                        if delete_old && !old.is_none() {
                            checked("delete_texture", old, device.delete_texture(old));
                        }
                        let handle = checked("create_texture", old, device.create_texture())
                            .unwrap_or(TextureHandle::NONE);
                        store(&cell, handle);
                        signal.notify(handle);
                        if handle.is_none() {
                            return;
                        }
                        checked(
                            "allocate_storage",
                            handle,
                            device.allocate_storage(handle, levels, internal, desc.width, desc.height),
                        );
                        finish_format(device, handle, swizzle, sampler);
                    })
                    .await,
            ),
            StorageStrategy::Mutable if delete_old && !old.is_none() && self.levels == levels => {
                self.task.run("set_format", move |device| {
                    let handle = load(&cell);
                    define_levels(device, handle, internal, desc, levels);
                    finish_format(device, handle, swizzle, None);
                });
                None
            }
            StorageStrategy::Mutable => Some(
                self.task
                    .run_signaled("set_format", move |device, signal| {
                        let old = load(&cell);
                        if delete_old && !old.is_none() {
                            checked("delete_texture", old, device.delete_texture(old));
                        }
                        let handle = checked("create_texture", old, device.create_texture())
                            .unwrap_or(TextureHandle::NONE);
                        store(&cell, handle);
                        signal.notify(handle);
                        if handle.is_none() {
                            return;
                        }
                        define_levels(device, handle, internal, desc, levels);
                        finish_format(device, handle, swizzle, sampler);
                    })
                    .await,
            ),
        };
        if let Some(created) = created {
            let handle = created.map_err(|err| self.fail("set_format", err.into()))?;
            if handle.is_none() {
                return Err(self.fail("set_format", TextureError::Unallocated));
            }
        }

        self.desc = desc;
        self.levels = levels;
        self.texture_type = TextureType::for_format(desc.format);
        self.color_space = capabilities.supported_color_space(desc.format, color_space);
        self.compat_sampler = compat_sampler;
        self.owns_handle = true;
        logwise::info_sync!(
            "texture {handle} formatted {width}x{height} {format}, {levels} levels",
            handle = self.handle().raw(),
            width = desc.width,
            height = desc.height,
            format = desc.format.name(),
            levels = levels
        );
        Ok(())
    }

    /// The unpack layout that reads `pixmap` in place, if the device can express it.
    fn direct_layout(&self, pixmap: &PixmapView<'_>, alignment: u8) -> Option<UnpackLayout> {
        let capabilities = self.task.capabilities();
        if !capabilities.strided_upload && pixmap.is_padded() {
            return None;
        }
        let layout = UnpackLayout {
            alignment,
            row_length: if capabilities.strided_upload {
                pixmap.pitch_pixels()
            } else {
                0
            },
        };
        let expressible = pixmap.height() <= 1
            || layout.source_pitch(pixmap.width(), pixmap.format()) == pixmap.pitch_bytes();
        expressible.then_some(layout)
    }

    /// Uploads `pixmap` at `dest` of `level`, using [Texture::best_alignment].
    ///
    /// Blocks until the device has read the pixels.
    pub fn write(
        &mut self,
        level: u32,
        pixmap: &PixmapView<'_>,
        dest: RasterCoord2D,
        flags: WriteFlags,
    ) -> Result<(), TextureError> {
        self.write_aligned(level, pixmap, dest, Texture::best_alignment(pixmap), flags)
    }

    /**
    Uploads `pixmap` at `dest` of `level` with an explicit unpack alignment.

    An alignment of 0 is computed from the pixmap.  Blocks until the device has
    read the pixels, so `pixmap` only needs to live for the call.
    */
    pub fn write_aligned(
        &mut self,
        level: u32,
        pixmap: &PixmapView<'_>,
        dest: RasterCoord2D,
        alignment: u8,
        flags: WriteFlags,
    ) -> Result<(), TextureError> {
        let alignment = if alignment == 0 {
            Texture::best_alignment(pixmap)
        } else {
            alignment
        };
        if !matches!(alignment, 1 | 2 | 4 | 8) || pixmap.addr() % alignment as usize != 0 {
            return Err(self.fail("write", TextureError::Misaligned { alignment }));
        }
        let rect = self.check_write("write", level, pixmap, dest)?;
        let Some(layout) = self.direct_layout(pixmap, alignment) else {
            return self.write_staged(level, pixmap, rect, flags);
        };
        let mipmaps = self.wants_mipmaps(flags);
        let cell = self.handle.clone();
        let format = pixmap.format();
        let data = pixmap.data();
        self.task
            .run_wait("write", move |device| {
                let handle = load(&cell);
                checked(
                    "upload",
                    handle,
                    device.upload(handle, level, rect, format, layout, UploadSource::Host(data)),
                );
                if mipmaps {
                    checked("generate_mipmaps", handle, device.generate_mipmaps(handle));
                }
            })
            .map_err(|err| self.fail("write", err.into()))?;
        if mipmaps {
            self.note_mipmaps_generated();
        }
        Ok(())
    }

    /// Copies rows into a locked buffer, dropping padding the device cannot skip.
    fn write_staged(
        &mut self,
        level: u32,
        pixmap: &PixmapView<'_>,
        rect: RasterRect,
        flags: WriteFlags,
    ) -> Result<(), TextureError> {
        let _staged = logwise::perfwarn_begin!("texture write through staging buffer");
        let mut buffer = self.lock(level, rect, LockFlags::empty())?;
        buffer.pixmap_mut().write(pixmap);
        self.unlock(buffer, flags)
    }

    /**
    Uploads an owned pixmap at `dest` of `level` without waiting.

    The pixmap is freed on the device thread once the upload has read it.
    */
    pub fn write_owned(
        &mut self,
        level: u32,
        pixmap: Pixmap,
        dest: RasterCoord2D,
        flags: WriteFlags,
    ) -> Result<(), TextureError> {
        let view = pixmap.view();
        let rect = self.check_write("write_owned", level, &view, dest)?;
        let Some(layout) = self.direct_layout(&view, Texture::best_alignment(&view)) else {
            return self.write_staged(level, &view, rect, flags);
        };
        let format = view.format();
        let mipmaps = self.wants_mipmaps(flags);
        let cell = self.handle.clone();
        self.task.run("write_owned", move |device| {
            let handle = load(&cell);
            let view = pixmap.view();
            checked(
                "upload",
                handle,
                device.upload(handle, level, rect, format, layout, UploadSource::Host(view.data())),
            );
            if mipmaps {
                checked("generate_mipmaps", handle, device.generate_mipmaps(handle));
            }
        });
        if mipmaps {
            self.note_mipmaps_generated();
        }
        Ok(())
    }

    /**
    Returns staging memory for `rect` of `level`.

    The rect is checked before anything is allocated.  With [LockFlags::MAPPED] on
    a device with pixel buffers the memory is a mapped device buffer; otherwise it
    is host memory, always zeroed, and failing to allocate it is
    [TextureError::AllocationFailed].
    */
    pub fn lock(
        &self,
        level: u32,
        rect: RasterRect,
        flags: LockFlags,
    ) -> Result<LockedBuffer, TextureError> {
        let handle = self.require_allocated("lock")?;
        self.check_region("lock", level, rect)?;
        let desc = self.desc.with_size(rect.width, rect.height);
        let bytes = desc.bytes();

        if flags.contains(LockFlags::MAPPED) && self.task.capabilities().pixel_buffers {
            let mapped = self
                .task
                .run_wait("lock mapped", move |device| {
                    let buffer = checked(
                        "create_pixel_buffer",
                        handle,
                        device.create_pixel_buffer(bytes),
                    )?;
                    match checked("map_pixel_buffer", handle, device.map_pixel_buffer(buffer)) {
                        Some(range) => Some((buffer, range)),
                        None => {
                            checked(
                                "delete_pixel_buffer",
                                handle,
                                device.delete_pixel_buffer(buffer),
                            );
                            None
                        }
                    }
                })
                .map_err(|err| self.fail("lock", err.into()))?;
            if let Some((buffer, range)) = mapped {
                let mut locked = LockedBuffer {
                    task: self.task.clone(),
                    owner: self.handle.clone(),
                    level,
                    rect,
                    desc,
                    staging: Some(Staging::Mapped { buffer, range }),
                };
                if flags.contains(LockFlags::CLEARED) {
                    locked.bytes_mut().fill(0);
                }
                return Ok(locked);
            }
            logwise::warn_sync!(
                "texture {handle} could not map a pixel buffer; staging in host memory",
                handle = handle.raw()
            );
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(bytes).is_err() {
            return Err(self.fail("lock", TextureError::AllocationFailed { bytes }));
        }
        data.resize(bytes, 0);
        Ok(LockedBuffer {
            task: self.task.clone(),
            owner: self.handle.clone(),
            level,
            rect,
            desc,
            staging: Some(Staging::Host(data)),
        })
    }

    /// Locks all of `level`.
    pub fn lock_level(&self, level: u32, flags: LockFlags) -> Result<LockedBuffer, TextureError> {
        let (width, height) = self.size(level);
        self.lock(level, RasterRect::full(width, height), flags)
    }

    /**
    Uploads a buffer returned by [Texture::lock] on this texture.

    Returns without waiting; host memory is freed on the device thread after the
    upload, and a mapped pixel buffer is released.

    The destination is checked again, since the texture may have been
    reconfigured since the lock.  A rejected buffer uploads nothing and its pixel
    buffer, if any, is released.
    */
    pub fn unlock(&mut self, mut buffer: LockedBuffer, flags: WriteFlags) -> Result<(), TextureError> {
        if !Arc::ptr_eq(&buffer.owner, &self.handle) {
            return Err(self.fail("unlock", TextureError::ForeignBuffer));
        }
        self.require_allocated("unlock")?;
        let (level, rect, desc) = (buffer.level, buffer.rect, buffer.desc);
        if desc.format.bytes_per_pixel() != self.desc.format.bytes_per_pixel() {
            return Err(self.fail(
                "unlock",
                TextureError::FormatMismatch {
                    texture: self.desc.format,
                    pixmap: desc.format,
                },
            ));
        }
        self.check_region("unlock", level, rect)?;
        let Some(staging) = buffer.staging.take() else {
            return Ok(());
        };
        let mipmaps = self.wants_mipmaps(flags);
        let cell = self.handle.clone();
        match staging {
            Staging::Host(data) => {
                let layout = UnpackLayout {
                    alignment: alignment_for(desc.pitch_bytes()),
                    row_length: 0,
                };
                self.task.run("unlock", move |device| {
                    let handle = load(&cell);
                    checked(
                        "upload",
                        handle,
                        device.upload(handle, level, rect, desc.format, layout, UploadSource::Host(&data)),
                    );
                    drop(data);
                    if mipmaps {
                        checked("generate_mipmaps", handle, device.generate_mipmaps(handle));
                    }
                });
            }
            Staging::Mapped { buffer, .. } => {
                let len = desc.bytes();
                self.task.run("unlock mapped", move |device| {
                    let handle = load(&cell);
                    checked(
                        "flush_pixel_buffer",
                        handle,
                        device.flush_pixel_buffer(buffer, 0, len),
                    );
                    checked(
                        "upload",
                        handle,
                        device.upload(
                            handle,
                            level,
                            rect,
                            desc.format,
                            UnpackLayout::PACKED,
                            UploadSource::PixelBuffer { buffer, offset: 0 },
                        ),
                    );
                    checked(
                        "delete_pixel_buffer",
                        handle,
                        device.delete_pixel_buffer(buffer),
                    );
                    if mipmaps {
                        checked("generate_mipmaps", handle, device.generate_mipmaps(handle));
                    }
                });
            }
        }
        if mipmaps {
            self.note_mipmaps_generated();
        }
        Ok(())
    }

    /// Sets every texel of `level` to zero.
    pub fn clear(&mut self, level: u32) -> Result<(), TextureError> {
        let buffer = self.lock_level(level, LockFlags::CLEARED)?;
        self.unlock(buffer, WriteFlags::empty())
    }

    /**
    Regenerates the mip chain from level 0.

    Fails without touching the device when the texture is unallocated or its size
    cannot be mipmapped here.
    */
    pub fn generate_mipmaps(&mut self) -> Result<(), TextureError> {
        self.require_allocated("generate_mipmaps")?;
        if !self.can_use_mipmaps() {
            return Err(self.fail(
                "generate_mipmaps",
                TextureError::MipmapsUnsupported {
                    width: self.desc.width,
                    height: self.desc.height,
                },
            ));
        }
        let cell = self.handle.clone();
        self.task.run("generate_mipmaps", move |device| {
            let handle = load(&cell);
            checked("generate_mipmaps", handle, device.generate_mipmaps(handle));
        });
        self.note_mipmaps_generated();
        Ok(())
    }

    /// Applies `sampler` as per-texture state.  Does nothing on devices with sampler objects.
    pub fn set_compat_sampler(&mut self, sampler: &TextureSampler) {
        if self.task.capabilities().sampler_objects {
            return;
        }
        let params = sampler.params();
        self.compat_sampler = Some(params);
        if !self.is_allocated() {
            return;
        }
        let cell = self.handle.clone();
        self.task.run("set_compat_sampler", move |device| {
            let handle = load(&cell);
            checked(
                "set_sampler_params",
                handle,
                device.set_sampler_params(handle, params),
            );
        });
    }

    /// Reads `level` back from the device, tightly packed.  Blocks.
    pub fn read_level(&self, level: u32) -> Result<Pixmap, TextureError> {
        self.require_allocated("read_level")?;
        if level >= self.levels {
            return Err(self.fail(
                "read_level",
                TextureError::NoSuchLevel {
                    level,
                    levels: self.levels,
                },
            ));
        }
        let (width, height) = self.size(level);
        let cell = self.handle.clone();
        let bytes = self
            .task
            .run_wait("read_level", move |device| {
                device.read_pixels(load(&cell), level)
            })
            .map_err(|err| self.fail("read_level", err.into()))?
            .map_err(|err| self.fail("read_level", err.into()))?;
        let desc = self.desc.with_size(width, height);
        let actual = bytes.len();
        Pixmap::from_vec(desc, bytes).map_err(|_| {
            self.fail(
                "read_level",
                DeviceError::ShortSource {
                    expected: desc.bytes(),
                    actual,
                }
                .into(),
            )
        })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if !self.owns_handle || !self.is_allocated() {
            return;
        }
        let cell = self.handle.clone();
        self.task.run("delete texture", move |device| {
            let handle = load(&cell);
            store(&cell, TextureHandle::NONE);
            if !handle.is_none() {
                checked("delete_texture", handle, device.delete_texture(handle));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::soft::{DeviceCall, SoftDevice, SoftInspector};

    fn task(capabilities: Capabilities) -> (Task, SoftInspector) {
        let device = SoftDevice::new(capabilities);
        let inspector = device.inspector();
        let task = test_executors::sleep_on(Task::new("texture tests", move || Ok(device))).unwrap();
        (task, inspector)
    }

    #[test]
    fn best_alignment_uses_lowest_of_address_and_pitch() {
        let data = vec![0u8; 64];
        let base = data.as_ptr() as usize;
        // find an 8-aligned offset into the allocation
        let offset = (8 - base % 8) % 8;
        let desc = PixmapDesc::new(3, 2, PixelFormat::I8);
        let aligned = PixmapView::with_pitch(desc, &data[offset..], 8).unwrap();
        assert_eq!(Texture::best_alignment(&aligned), 8);
        let pitch6 = PixmapView::with_pitch(desc, &data[offset..], 6).unwrap();
        assert_eq!(Texture::best_alignment(&pitch6), 2);
        let odd = PixmapView::with_pitch(desc, &data[offset + 1..], 8).unwrap();
        assert_eq!(Texture::best_alignment(&odd), 1);
    }

    #[test]
    fn unallocated_texture_rejects_work() {
        let (task, inspector) = task(Capabilities::modern());
        let mut texture = Texture::unallocated(&task);
        assert_eq!(texture.generate_mipmaps(), Err(TextureError::Unallocated));
        assert!(matches!(
            texture.lock(0, RasterRect::full(1, 1), LockFlags::empty()),
            Err(TextureError::Unallocated)
        ));
        let pixmap = Pixmap::new(PixmapDesc::new(1, 1, PixelFormat::Rgba8888));
        assert_eq!(
            texture.write(0, &pixmap.view(), RasterCoord2D::ORIGIN, WriteFlags::empty()),
            Err(TextureError::Unallocated)
        );
        test_executors::sleep_on(task.flush()).unwrap();
        assert!(inspector.calls().is_empty());
    }

    #[test]
    fn zero_size_and_missing_formats_are_rejected() {
        let (task, _) = task(Capabilities::legacy());
        let mut texture = Texture::unallocated(&task);
        let zero = test_executors::sleep_on(texture.set_format(
            PixmapDesc::new(0, 4, PixelFormat::A8),
            1,
            ColorSpace::Linear,
            None,
        ));
        assert_eq!(zero, Err(TextureError::ZeroSize { width: 0, height: 4 }));
        let bgra = test_executors::sleep_on(texture.set_format(
            PixmapDesc::new(4, 4, PixelFormat::Bgra8888),
            1,
            ColorSpace::Linear,
            None,
        ));
        assert_eq!(
            bgra,
            Err(TextureError::UnsupportedFormat(PixelFormat::Bgra8888))
        );
    }

    #[test]
    fn drop_deletes_handle_but_not_external() {
        let (task, inspector) = task(Capabilities::modern());
        let desc = PixmapDesc::new(4, 4, PixelFormat::Rgba8888);
        let texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
        let handle = texture.handle();
        let external = Texture::adopt_external(&task, handle, desc);
        assert_eq!(external.binding().texture_type, TextureType::External);
        drop(external);
        test_executors::sleep_on(task.flush()).unwrap();
        assert_eq!(inspector.live_textures(), 1);
        drop(texture);
        test_executors::sleep_on(task.flush()).unwrap();
        assert_eq!(inspector.live_textures(), 0);
        assert_eq!(
            inspector.count(|c| *c == DeviceCall::DeleteTexture(handle)),
            1
        );
    }

    #[test]
    fn clear_uploads_zeroes() {
        let (task, inspector) = task(Capabilities::modern());
        let desc = PixmapDesc::new(2, 2, PixelFormat::I8);
        let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
        let pixels = Pixmap::from_vec(desc, vec![5, 6, 7, 8]).unwrap();
        texture
            .write(0, &pixels.view(), RasterCoord2D::ORIGIN, WriteFlags::empty())
            .unwrap();
        assert_eq!(
            inspector.level_bytes(texture.handle(), 0),
            Some(vec![5, 6, 7, 8])
        );
        texture.clear(0).unwrap();
        test_executors::sleep_on(task.flush()).unwrap();
        assert_eq!(
            inspector.level_bytes(texture.handle(), 0),
            Some(vec![0, 0, 0, 0])
        );
    }
}
