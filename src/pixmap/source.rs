// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Decoded-image input.

use crate::pixel_formats::PixmapDesc;
use crate::pixmap::{MutablePixmapView, Pixmap, PixmapView};

/// Something that can produce decoded pixels for a texture.
///
/// A source either exposes its pixels as a contiguous [PixmapView] (zero-copy), or
/// writes itself into a destination buffer on request.  Consumers prefer the view
/// and fall back to [PixmapSource::write_into].
pub trait PixmapSource {
    fn desc(&self) -> PixmapDesc;

    /// The pixels, if the source keeps them in host memory.
    fn pixmap_view(&self) -> Option<PixmapView<'_>> {
        None
    }

    /// Writes the pixels into `dest`, which has this source's desc.
    fn write_into(&self, dest: MutablePixmapView<'_>);
}

impl PixmapSource for Pixmap {
    fn desc(&self) -> PixmapDesc {
        Pixmap::desc(self)
    }

    fn pixmap_view(&self) -> Option<PixmapView<'_>> {
        Some(self.view())
    }

    fn write_into(&self, mut dest: MutablePixmapView<'_>) {
        dest.write(&self.view());
    }
}

impl PixmapSource for PixmapView<'_> {
    fn desc(&self) -> PixmapDesc {
        PixmapView::desc(self)
    }

    fn pixmap_view(&self) -> Option<PixmapView<'_>> {
        Some(*self)
    }

    fn write_into(&self, mut dest: MutablePixmapView<'_>) {
        dest.write(self);
    }
}

/// A source that generates pixels on demand, one texel at a time.
///
/// Never exposes a view, so uploads always go through a locked buffer.
pub struct GeneratedSource<F> {
    desc: PixmapDesc,
    generate: F,
}

impl<F> GeneratedSource<F>
where
    F: Fn(u32, u32, &mut [u8]),
{
    /// `generate(x, y, pixel)` fills the bytes of one pixel.
    pub fn new(desc: PixmapDesc, generate: F) -> Self {
        GeneratedSource { desc, generate }
    }
}

impl<F> PixmapSource for GeneratedSource<F>
where
    F: Fn(u32, u32, &mut [u8]),
{
    fn desc(&self) -> PixmapDesc {
        self.desc
    }

    fn write_into(&self, mut dest: MutablePixmapView<'_>) {
        let bpp = self.desc.format.bytes_per_pixel() as usize;
        for y in 0..self.desc.height.min(dest.height()) {
            let row = dest.row_mut(y);
            for (x, pixel) in row.chunks_exact_mut(bpp).enumerate() {
                (self.generate)(x as u32, y, pixel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_formats::PixelFormat;

    #[test]
    fn generated_source_fills_rows() {
        let desc = PixmapDesc::new(3, 2, PixelFormat::Ia88);
        let source = GeneratedSource::new(desc, |x, y, pixel: &mut [u8]| {
            pixel[0] = x as u8;
            pixel[1] = y as u8;
        });
        assert!(source.pixmap_view().is_none());
        let mut out = Pixmap::new(desc);
        source.write_into(out.view_mut());
        assert_eq!(out.into_vec(), vec![0, 0, 1, 0, 2, 0, 0, 1, 1, 1, 2, 1]);
    }
}
