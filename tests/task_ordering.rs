// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Queue ordering, thread affinity, and shutdown.

use std::sync::Arc;
use std::thread;
use texels_and_tasks::capabilities::Capabilities;
use texels_and_tasks::error::{DeviceError, TaskError};
use texels_and_tasks::imp::soft::{DeviceCall, SoftDevice, SoftInspector};
use texels_and_tasks::pixel_formats::{PixelFormat, PixmapDesc};
use texels_and_tasks::task::Task;
use texels_and_tasks::texture::{Texture, TextureConfig};
use wasm_safe_mutex::Mutex;

fn soft_task(label: &str) -> (Task, SoftInspector) {
    let device = SoftDevice::new(Capabilities::modern());
    let inspector = device.inspector();
    let task = test_executors::sleep_on(Task::new(label, move || Ok(device))).unwrap();
    (task, inspector)
}

#[test]
fn jobs_from_one_producer_run_in_submission_order() {
    let (task, _) = soft_task("fifo");
    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..100u32 {
        let seen = seen.clone();
        task.run("push", move |_| seen.lock_sync().push(i));
    }
    test_executors::sleep_on(task.flush()).unwrap();
    assert_eq!(*seen.lock_sync(), (0..100).collect::<Vec<u32>>());
}

#[test]
fn producers_keep_their_own_order() {
    let (task, _) = soft_task("producers");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let task = task.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for i in 0..50u32 {
                    let seen = seen.clone();
                    task.run("push", move |_| seen.lock_sync().push((producer, i)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    test_executors::sleep_on(task.flush()).unwrap();
    let seen = seen.lock_sync().to_vec();
    assert_eq!(seen.len(), 200);
    for producer in 0..4 {
        let order: Vec<u32> = seen
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<u32>>());
    }
}

#[test]
fn every_job_runs_on_the_named_device_thread() {
    let (task, _) = soft_task("affinity");
    assert!(!task.is_queue_thread());
    let probe = task.clone();
    let (name, on_queue) = task
        .run_wait("probe", move |_| {
            (
                thread::current().name().map(str::to_string),
                probe.is_queue_thread(),
            )
        })
        .unwrap();
    assert_eq!(name.as_deref(), Some("texels_and_tasks device affinity"));
    assert!(on_queue);
}

#[test]
fn synchronous_and_asynchronous_jobs_share_one_order() {
    let (task, inspector) = soft_task("mixed");
    let created = test_executors::sleep_on(task.run_async("create", |device| device.create_texture()))
        .unwrap()
        .unwrap();
    task.run("delete", move |device| {
        device.delete_texture(created).unwrap();
    });
    let live = task.run_wait("count", |_| inspector.live_textures()).unwrap();
    assert_eq!(live, 0);
    assert_eq!(
        inspector.calls(),
        vec![
            DeviceCall::CreateTexture(created),
            DeviceCall::DeleteTexture(created)
        ]
    );
}

#[test]
fn device_errors_do_not_stop_the_queue() {
    let (task, _) = soft_task("errors");
    let failed = task
        .run_wait("bad delete", |device| {
            device.delete_texture(texels_and_tasks::imp::TextureHandle::from_raw(99))
        })
        .unwrap();
    assert!(matches!(failed, Err(DeviceError::InvalidHandle(_))));
    assert_eq!(task.run_wait("after", |_| 1), Ok(1));
}

#[test]
fn shutdown_drains_pending_deletions() {
    let (task, inspector) = soft_task("shutdown");
    let desc = PixmapDesc::new(4, 4, PixelFormat::Rgba8888);
    let textures: Vec<Texture> = (0..3)
        .map(|_| test_executors::sleep_on(Texture::new(&task, TextureConfig::new(desc))).unwrap())
        .collect();
    assert_eq!(inspector.live_textures(), 3);
    drop(textures);
    //joins the device thread after it drains
    drop(task);
    assert_eq!(inspector.live_textures(), 0);
    assert_eq!(
        inspector.count(|c| matches!(c, DeviceCall::DeleteTexture(_))),
        3
    );
}

#[test]
fn device_creation_failure_is_reported() {
    let result = test_executors::sleep_on(Task::new("broken", || {
        Err::<SoftDevice, _>(DeviceError::Unsupported("everything"))
    }));
    assert_eq!(result.unwrap_err(), TaskError::DeviceCreation);
}
