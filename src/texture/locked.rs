// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Staging memory returned by [crate::texture::Texture::lock].

use crate::coordinates::RasterRect;
use super::load;
use crate::imp::{BufferHandle, MappedRange, checked};
use crate::pixel_formats::PixmapDesc;
use crate::pixmap::{MutablePixmapView, PixmapView};
use crate::task::Task;
use std::ops::BitOr;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

/// Options for [crate::texture::Texture::lock].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockFlags(u8);

impl LockFlags {
    /// Zero mapped device memory, which otherwise keeps whatever it held.
    ///
    /// Host staging memory is always zeroed, with or without this flag.
    pub const CLEARED: LockFlags = LockFlags(1);
    /// Stage in a device-mapped pixel buffer when the device has them.
    pub const MAPPED: LockFlags = LockFlags(2);

    pub const fn empty() -> Self {
        LockFlags(0)
    }

    pub const fn contains(self, other: LockFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LockFlags {
    type Output = LockFlags;
    fn bitor(self, rhs: LockFlags) -> LockFlags {
        LockFlags(self.0 | rhs.0)
    }
}

#[derive(Debug)]
pub(crate) enum Staging {
    /// Host memory, freed after the upload.
    Host(Vec<u8>),
    /// A mapped pixel buffer, owned by the device.
    Mapped {
        buffer: BufferHandle,
        range: MappedRange,
    },
}

/**
Pixels waiting to be uploaded into one rectangle of a texture level.

Write through [LockedBuffer::pixmap_mut], then hand the buffer back to
[crate::texture::Texture::unlock], which consumes it.  The rows are tightly
packed.

The buffer keeps its [Task] alive, so mapped memory stays valid for as long as
the buffer exists.  Dropping a mapped buffer without unlocking it releases the
pixel buffer and uploads nothing.
*/
#[derive(Debug)]
pub struct LockedBuffer {
    pub(crate) task: Task,
    pub(crate) owner: Arc<AtomicU32>,
    pub(crate) level: u32,
    pub(crate) rect: RasterRect,
    pub(crate) desc: PixmapDesc,
    /// `None` only once unlock has taken it.
    pub(crate) staging: Option<Staging>,
}

impl LockedBuffer {
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The destination rectangle within the level.
    pub fn rect(&self) -> RasterRect {
        self.rect
    }

    pub fn desc(&self) -> PixmapDesc {
        self.desc
    }

    /// Whether the memory belongs to a device pixel buffer.
    pub fn is_mapped(&self) -> bool {
        matches!(self.staging, Some(Staging::Mapped { .. }))
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.staging {
            Some(Staging::Host(data)) => data.as_slice(),
            // SAFETY: `self.task` keeps the device alive, and the pixel buffer is only
            // deleted after the staging has been taken out of `self`.
            Some(Staging::Mapped { range, .. }) => unsafe {
                std::slice::from_raw_parts(range.as_ptr().as_ptr(), range.len())
            },
            None => &[],
        }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.staging {
            Some(Staging::Host(data)) => data.as_mut_slice(),
            // SAFETY: as above, and `&mut self` makes this the only access.
            Some(Staging::Mapped { range, .. }) => unsafe {
                std::slice::from_raw_parts_mut(range.as_ptr().as_ptr(), range.len())
            },
            None => &mut [],
        }
    }

    pub fn pixmap(&self) -> PixmapView<'_> {
        let desc = self.desc;
        PixmapView::tight(desc, self.bytes())
    }

    pub fn pixmap_mut(&mut self) -> MutablePixmapView<'_> {
        let desc = self.desc;
        MutablePixmapView::tight(desc, self.bytes_mut())
    }
}

impl Drop for LockedBuffer {
    fn drop(&mut self) {
        let Some(Staging::Mapped { buffer, .. }) = self.staging.take() else {
            return;
        };
        logwise::warn_sync!(
            "pixel buffer {buffer} dropped without unlock; releasing it",
            buffer = buffer.raw()
        );
        let owner = self.owner.clone();
        self.task.run("release pixel buffer", move |device| {
            let handle = load(&owner);
            checked(
                "delete_pixel_buffer",
                handle,
                device.delete_pixel_buffer(buffer),
            );
        });
    }
}
