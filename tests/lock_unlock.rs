// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Staging buffers in host memory and in mapped pixel buffers.

use texels_and_tasks::capabilities::Capabilities;
use texels_and_tasks::coordinates::RasterRect;
use texels_and_tasks::error::TextureError;
use texels_and_tasks::imp::UploadSourceKind;
use texels_and_tasks::imp::soft::{DeviceCall, SoftDevice, SoftInspector};
use texels_and_tasks::pixel_formats::{ColorSpace, PixelFormat, PixmapDesc};
use texels_and_tasks::task::Task;
use texels_and_tasks::texture::{LockFlags, Texture, TextureConfig, WriteFlags};

fn soft_task(capabilities: Capabilities) -> (Task, SoftInspector) {
    let device = SoftDevice::new(capabilities);
    let inspector = device.inspector();
    let task = test_executors::sleep_on(Task::new("lock_unlock", move || Ok(device))).unwrap();
    (task, inspector)
}

fn flush(task: &Task) {
    test_executors::sleep_on(task.flush()).unwrap();
}

#[test]
fn out_of_bounds_lock_is_rejected_before_anything_happens() {
    let (task, inspector) = soft_task(Capabilities::modern());
    let desc = PixmapDesc::new(8, 8, PixelFormat::Rgba8888);
    let texture =
        test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc).with_levels(0)))
            .unwrap();
    assert_eq!(texture.levels(), 4);
    flush(&task);
    inspector.clear_calls();

    let rect = RasterRect::new(1, 1, 2, 2);
    assert_eq!(
        texture.lock(2, rect, LockFlags::MAPPED).unwrap_err(),
        TextureError::OutOfBounds {
            rect,
            level: 2,
            width: 2,
            height: 2,
        }
    );
    assert_eq!(
        texture
            .lock(5, RasterRect::full(1, 1), LockFlags::empty())
            .unwrap_err(),
        TextureError::NoSuchLevel {
            level: 5,
            levels: 4
        }
    );
    flush(&task);
    assert!(inspector.calls().is_empty());
    assert_eq!(inspector.live_pixel_buffers(), 0);
}

#[test]
fn host_lock_uploads_its_rect_on_unlock() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(4, 2, PixelFormat::I8);
    let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let rect = RasterRect::new(1, 0, 2, 2);
    let mut buffer = texture.lock(0, rect, LockFlags::MAPPED).unwrap();
    //no pixel buffers here, so host memory
    assert!(!buffer.is_mapped());
    assert_eq!(buffer.rect(), rect);
    assert_eq!(buffer.desc(), PixmapDesc::new(2, 2, PixelFormat::I8));
    assert_eq!(buffer.bytes(), &[0, 0, 0, 0]);
    {
        let mut pixmap = buffer.pixmap_mut();
        pixmap.row_mut(0).copy_from_slice(&[9, 9]);
        pixmap.row_mut(1).copy_from_slice(&[7, 7]);
    }
    texture.unlock(buffer, WriteFlags::empty()).unwrap();
    flush(&task);
    assert_eq!(
        inspector.level_bytes(texture.handle(), 0),
        Some(vec![0, 9, 9, 0, 0, 7, 7, 0])
    );
    assert_eq!(
        inspector.count(|c| matches!(
            c,
            DeviceCall::Upload {
                source: UploadSourceKind::Host,
                ..
            }
        )),
        1
    );
}

#[test]
fn mapped_lock_goes_through_a_pixel_buffer() {
    let (task, inspector) = soft_task(Capabilities::modern());
    let desc = PixmapDesc::new(2, 2, PixelFormat::Rgba8888);
    let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    flush(&task);
    inspector.clear_calls();

    let mut buffer = texture
        .lock_level(0, LockFlags::MAPPED | LockFlags::CLEARED)
        .unwrap();
    assert!(buffer.is_mapped());
    assert_eq!(inspector.live_pixel_buffers(), 1);
    assert!(buffer.bytes().iter().all(|b| *b == 0));
    buffer.bytes_mut().fill(0x42);
    texture.unlock(buffer, WriteFlags::empty()).unwrap();
    flush(&task);

    assert_eq!(inspector.live_pixel_buffers(), 0);
    assert_eq!(inspector.level_bytes(texture.handle(), 0), Some(vec![0x42; 16]));
    let kinds: Vec<&'static str> = inspector
        .calls()
        .iter()
        .map(|c| match c {
            DeviceCall::CreatePixelBuffer { len: 16, .. } => "create",
            DeviceCall::MapPixelBuffer(_) => "map",
            DeviceCall::FlushPixelBuffer { len: 16, .. } => "flush",
            DeviceCall::Upload {
                source: UploadSourceKind::PixelBuffer,
                ..
            } => "upload",
            DeviceCall::DeletePixelBuffer(_) => "delete",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["create", "map", "flush", "upload", "delete"]);
}

#[test]
fn buffers_only_unlock_on_their_own_texture() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(2, 2, PixelFormat::Rgba8888);
    let first = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let mut second = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let buffer = first.lock_level(0, LockFlags::empty()).unwrap();
    assert_eq!(
        second.unlock(buffer, WriteFlags::empty()),
        Err(TextureError::ForeignBuffer)
    );
    flush(&task);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::Upload { .. })),
        0
    );
}

#[test]
fn clear_zeroes_one_level() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(4, 4, PixelFormat::I8);
    let mut texture =
        test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc).with_levels(0)))
            .unwrap();
    let mut buffer = texture.lock_level(1, LockFlags::empty()).unwrap();
    buffer.bytes_mut().fill(3);
    texture.unlock(buffer, WriteFlags::empty()).unwrap();
    flush(&task);
    assert_eq!(inspector.level_bytes(texture.handle(), 1), Some(vec![3; 4]));
    texture.clear(1).unwrap();
    flush(&task);
    assert_eq!(inspector.level_bytes(texture.handle(), 1), Some(vec![0; 4]));
}

#[test]
fn unallocated_textures_cannot_lock() {
    let (task, _) = soft_task(Capabilities::modern());
    let texture = Texture::unallocated(&task);
    assert_eq!(
        texture.lock_level(0, LockFlags::empty()).unwrap_err(),
        TextureError::Unallocated
    );
}

#[test]
fn dropping_a_mapped_buffer_releases_it() {
    let (task, inspector) = soft_task(Capabilities::modern());
    let desc = PixmapDesc::new(4, 4, PixelFormat::Rgba8888);
    let texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let buffer = texture.lock_level(0, LockFlags::MAPPED).unwrap();
    assert!(buffer.is_mapped());
    assert_eq!(inspector.live_pixel_buffers(), 1);
    drop(buffer);
    flush(&task);
    assert_eq!(inspector.live_pixel_buffers(), 0);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::Upload { .. })),
        0
    );
}

#[test]
fn foreign_mapped_buffers_are_released() {
    let (task, inspector) = soft_task(Capabilities::modern());
    let desc = PixmapDesc::new(2, 2, PixelFormat::Rgba8888);
    let first = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let mut second = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let buffer = first.lock_level(0, LockFlags::MAPPED).unwrap();
    assert_eq!(
        second.unlock(buffer, WriteFlags::empty()),
        Err(TextureError::ForeignBuffer)
    );
    flush(&task);
    assert_eq!(inspector.live_pixel_buffers(), 0);
}

#[test]
fn mapped_buffers_keep_the_device_alive() {
    let (task, inspector) = soft_task(Capabilities::modern());
    let desc = PixmapDesc::new(8, 8, PixelFormat::Rgba8888);
    let texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let mut buffer = texture.lock_level(0, LockFlags::MAPPED).unwrap();
    drop(texture);
    drop(task);
    //the buffer's own task clone still holds the device
    buffer.bytes_mut().fill(0x11);
    assert!(buffer.bytes().iter().all(|b| *b == 0x11));
    drop(buffer);
    assert_eq!(inspector.live_pixel_buffers(), 0);
    assert_eq!(inspector.live_textures(), 0);
}

#[test]
fn unlock_after_shrinking_uploads_nothing() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(64, 64, PixelFormat::I8);
    let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let handle = texture.handle();
    let buffer = texture.lock_level(0, LockFlags::empty()).unwrap();
    let small = PixmapDesc::new(16, 16, PixelFormat::I8);
    test_executors::sleep_on(texture.set_format(small, 1, ColorSpace::Linear, None)).unwrap();
    //same level count on mutable storage keeps the handle
    assert_eq!(texture.handle(), handle);
    flush(&task);
    inspector.clear_calls();

    assert_eq!(
        texture.unlock(buffer, WriteFlags::empty()),
        Err(TextureError::OutOfBounds {
            rect: RasterRect::full(64, 64),
            level: 0,
            width: 16,
            height: 16,
        })
    );
    flush(&task);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::Upload { .. })),
        0
    );
}

#[test]
fn unlock_after_format_change_releases_the_pixel_buffer() {
    let (task, inspector) = soft_task(Capabilities::modern());
    let desc = PixmapDesc::new(4, 4, PixelFormat::Rgba8888);
    let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let buffer = texture.lock_level(0, LockFlags::MAPPED).unwrap();
    let narrow = PixmapDesc::new(4, 4, PixelFormat::I8);
    test_executors::sleep_on(texture.set_format(narrow, 1, ColorSpace::Linear, None)).unwrap();
    flush(&task);
    inspector.clear_calls();

    assert_eq!(
        texture.unlock(buffer, WriteFlags::empty()),
        Err(TextureError::FormatMismatch {
            texture: PixelFormat::I8,
            pixmap: PixelFormat::Rgba8888,
        })
    );
    flush(&task);
    assert_eq!(inspector.live_pixel_buffers(), 0);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::Upload { .. })),
        0
    );
}
