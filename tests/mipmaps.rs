// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Mip chain generation and the level metadata that follows it.

use texels_and_tasks::capabilities::Capabilities;
use texels_and_tasks::coordinates::RasterCoord2D;
use texels_and_tasks::error::TextureError;
use texels_and_tasks::imp::soft::{DeviceCall, SoftDevice, SoftInspector};
use texels_and_tasks::pixel_formats::{PixelFormat, PixmapDesc};
use texels_and_tasks::pixmap::Pixmap;
use texels_and_tasks::sampler::{SamplerParams, TextureSampler};
use texels_and_tasks::task::Task;
use texels_and_tasks::texture::{LockFlags, Texture, TextureConfig, WriteFlags};

fn soft_task(capabilities: Capabilities) -> (Task, SoftInspector) {
    let device = SoftDevice::new(capabilities);
    let inspector = device.inspector();
    let task = test_executors::sleep_on(Task::new("mipmaps", move || Ok(device))).unwrap();
    (task, inspector)
}

fn flush(task: &Task) {
    test_executors::sleep_on(task.flush()).unwrap();
}

#[test]
fn non_power_of_two_on_legacy_device_is_refused_without_device_work() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(100, 60, PixelFormat::Rgba8888);
    let mut texture =
        test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc).with_levels(0)))
            .unwrap();
    assert_eq!(texture.levels(), 1);
    flush(&task);
    inspector.clear_calls();

    assert_eq!(
        texture.generate_mipmaps(),
        Err(TextureError::MipmapsUnsupported {
            width: 100,
            height: 60
        })
    );
    flush(&task);
    assert!(inspector.calls().is_empty());

    //the flag is ignored for sizes that cannot be mipmapped
    let pixels = Pixmap::new(desc);
    texture
        .write(0, &pixels.view(), RasterCoord2D::ORIGIN, WriteFlags::MAKE_MIPMAPS)
        .unwrap();
    flush(&task);
    assert_eq!(texture.levels(), 1);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::GenerateMipmaps(_))),
        0
    );
}

#[test]
fn make_mipmaps_extends_mutable_levels_eagerly() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(8, 8, PixelFormat::I8);
    let config = TextureConfig::new(desc).with_mipmaps(true);
    let mut texture = test_executors::sleep_on(Texture::new(&task, config)).unwrap();
    //mutable storage defines level 0 only and lets generation fill the rest
    assert_eq!(texture.levels(), 1);

    let pixels = Pixmap::from_vec(desc, vec![200; 64]).unwrap();
    texture
        .write(0, &pixels.view(), RasterCoord2D::ORIGIN, WriteFlags::MAKE_MIPMAPS)
        .unwrap();
    assert_eq!(texture.levels(), 4);
    assert_eq!(texture.size(3), (1, 1));
    flush(&task);
    let handle = texture.handle();
    assert_eq!(
        inspector.level_sizes(handle),
        vec![(8, 8), (4, 4), (2, 2), (1, 1)]
    );
    assert_eq!(inspector.level_bytes(handle, 3), Some(vec![200]));
    assert_eq!(
        inspector.count(|c| *c == DeviceCall::GenerateMipmaps(handle)),
        1
    );
    assert_eq!(texture.read_level(2).unwrap().into_vec(), vec![200; 4]);
}

#[test]
fn immutable_storage_keeps_its_allocated_levels() {
    let (task, inspector) = soft_task(Capabilities::modern());
    let desc = PixmapDesc::new(8, 8, PixelFormat::Rgba8888);
    let config = TextureConfig::new(desc).with_mipmaps(true);
    let mut texture = test_executors::sleep_on(Texture::new(&task, config)).unwrap();
    assert_eq!(texture.levels(), 4);

    let mut buffer = texture.lock_level(0, LockFlags::empty()).unwrap();
    for (i, byte) in buffer.bytes_mut().iter_mut().enumerate() {
        *byte = if (i / 4) % 2 == 0 { 0 } else { 100 };
    }
    texture.unlock(buffer, WriteFlags::MAKE_MIPMAPS).unwrap();
    assert_eq!(texture.levels(), 4);
    flush(&task);
    let handle = texture.handle();
    assert_eq!(inspector.level_bytes(handle, 3), Some(vec![50; 4]));
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::GenerateMipmaps(_))),
        1
    );
}

#[test]
fn explicit_generation_on_power_of_two_sizes() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(4, 2, PixelFormat::Rgba8888);
    let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    assert!(texture.can_use_mipmaps());
    texture.generate_mipmaps().unwrap();
    assert_eq!(texture.levels(), 3);
    flush(&task);
    assert_eq!(
        inspector.level_sizes(texture.handle()),
        vec![(4, 2), (2, 1), (1, 1)]
    );
}

#[test]
fn devices_without_generation_never_mipmap() {
    let (task, inspector) = soft_task(Capabilities::modern().with_mipmap_generation(false));
    let desc = PixmapDesc::new(16, 16, PixelFormat::Rgba8888);
    let mut texture = test_executors::sleep_on(Texture::new(
        &task,
        TextureConfig::new(desc).with_mipmaps(true),
    ))
    .unwrap();
    assert_eq!(texture.levels(), 1);
    assert!(texture.generate_mipmaps().is_err());
    flush(&task);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::GenerateMipmaps(_))),
        0
    );
}

#[test]
fn compat_sampler_is_per_texture_state_on_legacy_devices() {
    let (task, inspector) = soft_task(Capabilities::legacy());
    let desc = PixmapDesc::new(4, 4, PixelFormat::Rgba8888);
    let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let sampler =
        test_executors::sleep_on(TextureSampler::new(&task, SamplerParams::mipmapped())).unwrap();
    assert_eq!(sampler.object(), None);
    texture.set_compat_sampler(&sampler);
    flush(&task);
    assert_eq!(texture.compat_sampler(), Some(SamplerParams::mipmapped()));
    assert_eq!(
        inspector.sampler_params(texture.handle()),
        Some(SamplerParams::mipmapped())
    );

    let (task, inspector) = soft_task(Capabilities::modern());
    let mut texture = test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap();
    let sampler =
        test_executors::sleep_on(TextureSampler::new(&task, SamplerParams::mipmapped())).unwrap();
    assert!(sampler.object().is_some());
    texture.set_compat_sampler(&sampler);
    flush(&task);
    assert_eq!(inspector.sampler_params(texture.handle()), None);
    drop(sampler);
    flush(&task);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::DeleteSampler(_))),
        1
    );
}
