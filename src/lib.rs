// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! texels_and_tasks manages GPU texture storage for applications that render from
one thread and produce pixels on many.

A GPU context may only be touched from the thread that owns it.  This crate puts
that thread behind a [task::Task], a FIFO queue of closures that are the only
code allowed to make device calls.  A [texture::Texture] owns a device handle
plus the size, format and level metadata for it, and turns each operation into
work on its task.

# Storage models

Devices come in two shapes, described by [capabilities::Capabilities]:

| Strategy  | Allocation                     | Reconfiguration                          |
|-----------|--------------------------------|------------------------------------------|
| Immutable | one call, fixed level count    | new handle every time                    |
| Mutable   | one definition per level       | handle kept while the level count stays  |

[texture::Texture::set_format] picks the strategy from the capabilities, so
callers never branch on it.

# Uploads

Writes take one of two routes:

* the direct path, when the device can skip row padding or the pixmap has
  none, uploads straight from caller memory;
* the staging path repacks rows into a [texture::LockedBuffer] first.

[texture::Texture::lock] and [texture::Texture::unlock] expose the staging path
directly, optionally backed by a mapped device pixel buffer.

# Backends

[imp::soft::SoftDevice] implements the device contract in host memory and
records every call it receives, which is how the tests observe the queue.
With the `backend_wgpu` feature, [imp::wgpu::WgpuDevice] drives a
[wgpu](https://wgpu.rs) device.
*/

pub mod capabilities;
pub mod coordinates;
pub mod error;
pub mod imp;
pub mod pixel_formats;
pub mod pixmap;
pub mod sampler;
pub mod task;
pub mod texture;

pub use task::Task;
pub use texture::Texture;
