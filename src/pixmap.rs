// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Host-memory pixel views.

A pixmap is a [PixmapDesc] plus bytes plus a row pitch.  The pitch may be larger
than the tightly packed row length; such a pixmap is *padded*, and whether a
device can upload it directly depends on
[crate::capabilities::Capabilities::strided_upload].

- [PixmapView] borrows immutable bytes.
- [MutablePixmapView] borrows mutable bytes, e.g. the memory of a
  [crate::texture::LockedBuffer].
- [Pixmap] owns its bytes, and is what the asynchronous upload path consumes.
*/

pub mod source;

use crate::coordinates::RasterRect;
use crate::pixel_formats::{PixelFormat, PixmapDesc};

/// A pixmap could not be constructed over the given bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PixmapError {
    #[error("pitch of {pitch} bytes is smaller than a {row}-byte row")]
    PitchTooSmall { pitch: usize, row: usize },
    #[error("{actual} bytes supplied, {required} required")]
    TooShort { required: usize, actual: usize },
    #[error("rect {rect:?} is outside the {width}x{height} pixmap")]
    OutOfBounds {
        rect: RasterRect,
        width: u32,
        height: u32,
    },
}

/// Number of bytes a pixmap with this shape spans.
///
/// The final row needs no padding after it.
const fn span_bytes(desc: &PixmapDesc, pitch: usize) -> usize {
    if desc.is_empty() {
        0
    } else {
        pitch * (desc.height as usize - 1) + desc.pitch_bytes()
    }
}

fn validate(desc: &PixmapDesc, pitch: usize, len: usize) -> Result<(), PixmapError> {
    let row = desc.pitch_bytes();
    if pitch < row {
        return Err(PixmapError::PitchTooSmall { pitch, row });
    }
    let required = span_bytes(desc, pitch);
    if len < required {
        return Err(PixmapError::TooShort {
            required,
            actual: len,
        });
    }
    Ok(())
}

fn sub_range(
    desc: &PixmapDesc,
    pitch: usize,
    rect: RasterRect,
) -> Result<(PixmapDesc, std::ops::Range<usize>), PixmapError> {
    if !rect.fits_within(desc.width, desc.height) {
        return Err(PixmapError::OutOfBounds {
            rect,
            width: desc.width,
            height: desc.height,
        });
    }
    let sub_desc = desc.with_size(rect.width, rect.height);
    let start = rect.y as usize * pitch + desc.format.pixel_bytes(rect.x as usize);
    Ok((sub_desc, start..start + span_bytes(&sub_desc, pitch)))
}

/// Borrowed, immutable pixels.
#[derive(Debug, Clone, Copy)]
pub struct PixmapView<'a> {
    desc: PixmapDesc,
    data: &'a [u8],
    pitch: usize,
}

impl<'a> PixmapView<'a> {
    /// A tightly packed view.
    pub fn new(desc: PixmapDesc, data: &'a [u8]) -> Result<Self, PixmapError> {
        Self::with_pitch(desc, data, desc.pitch_bytes())
    }

    /// A view whose rows start `pitch` bytes apart.
    pub fn with_pitch(
        desc: PixmapDesc,
        data: &'a [u8],
        pitch: usize,
    ) -> Result<Self, PixmapError> {
        validate(&desc, pitch, data.len())?;
        Ok(PixmapView {
            desc,
            data: &data[..span_bytes(&desc, pitch)],
            pitch,
        })
    }

    /// A tightly packed view over exactly `desc.bytes()` bytes.
    pub(crate) fn tight(desc: PixmapDesc, data: &'a [u8]) -> Self {
        debug_assert!(data.len() >= desc.bytes());
        PixmapView {
            desc,
            data,
            pitch: desc.pitch_bytes(),
        }
    }

    pub fn desc(&self) -> PixmapDesc {
        self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn pitch_bytes(&self) -> usize {
        self.pitch
    }

    /// Row pitch in whole pixels.
    pub fn pitch_pixels(&self) -> u32 {
        (self.pitch / self.desc.format.bytes_per_pixel() as usize) as u32
    }

    /// Whether rows carry bytes beyond `width` pixels.
    pub fn is_padded(&self) -> bool {
        self.pitch > self.desc.pitch_bytes()
    }

    /// Every byte the view spans, including inter-row padding.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Address of the first pixel.
    pub fn addr(&self) -> usize {
        self.data.as_ptr() as usize
    }

    /// Row `y`, without padding.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.pitch;
        &self.data[start..start + self.desc.pitch_bytes()]
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.desc.height).map(move |y| self.row(y))
    }

    /// A view of `rect`, keeping this view's pitch.
    pub fn sub_view(&self, rect: RasterRect) -> Result<PixmapView<'a>, PixmapError> {
        let (desc, range) = sub_range(&self.desc, self.pitch, rect)?;
        Ok(PixmapView {
            desc,
            data: &self.data[range],
            pitch: self.pitch,
        })
    }

    /// Copies the pixels into a new tightly packed [Pixmap].
    pub fn to_pixmap(&self) -> Pixmap {
        let mut data = Vec::with_capacity(self.desc.bytes());
        for row in self.rows() {
            data.extend_from_slice(row);
        }
        Pixmap {
            desc: self.desc,
            pitch: self.desc.pitch_bytes(),
            data,
        }
    }
}

/// Borrowed, mutable pixels.
#[derive(Debug)]
pub struct MutablePixmapView<'a> {
    desc: PixmapDesc,
    data: &'a mut [u8],
    pitch: usize,
}

impl<'a> MutablePixmapView<'a> {
    pub fn new(desc: PixmapDesc, data: &'a mut [u8]) -> Result<Self, PixmapError> {
        Self::with_pitch(desc, data, desc.pitch_bytes())
    }

    pub fn with_pitch(
        desc: PixmapDesc,
        data: &'a mut [u8],
        pitch: usize,
    ) -> Result<Self, PixmapError> {
        validate(&desc, pitch, data.len())?;
        let span = span_bytes(&desc, pitch);
        Ok(MutablePixmapView {
            desc,
            data: &mut data[..span],
            pitch,
        })
    }

    pub(crate) fn tight(desc: PixmapDesc, data: &'a mut [u8]) -> Self {
        debug_assert!(data.len() >= desc.bytes());
        MutablePixmapView {
            desc,
            data,
            pitch: desc.pitch_bytes(),
        }
    }

    pub fn desc(&self) -> PixmapDesc {
        self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn pitch_bytes(&self) -> usize {
        self.pitch
    }

    pub fn as_view(&self) -> PixmapView<'_> {
        PixmapView {
            desc: self.desc,
            data: &*self.data,
            pitch: self.pitch,
        }
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.pitch;
        let len = self.desc.pitch_bytes();
        &mut self.data[start..start + len]
    }

    /// Copies `src` into the top-left corner, row by row, dropping any padding in `src`.
    ///
    /// Copies the overlapping area only.  Both views must use the same pixel size.
    pub fn write(&mut self, src: &PixmapView<'_>) {
        debug_assert_eq!(
            src.format().bytes_per_pixel(),
            self.format().bytes_per_pixel()
        );
        let rows = src.height().min(self.height());
        let row_bytes = self
            .desc
            .format
            .pixel_bytes(src.width().min(self.width()) as usize);
        for y in 0..rows {
            self.row_mut(y)[..row_bytes].copy_from_slice(&src.row(y)[..row_bytes]);
        }
    }

    /// Sets every pixel to zero.
    pub fn clear(&mut self) {
        for y in 0..self.desc.height {
            self.row_mut(y).fill(0);
        }
    }
}

/// Owned pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    desc: PixmapDesc,
    data: Vec<u8>,
    pitch: usize,
}

impl Pixmap {
    /// A zeroed, tightly packed pixmap.
    pub fn new(desc: PixmapDesc) -> Self {
        Pixmap {
            desc,
            data: vec![0; desc.bytes()],
            pitch: desc.pitch_bytes(),
        }
    }

    /// Takes ownership of tightly packed bytes.
    pub fn from_vec(desc: PixmapDesc, data: Vec<u8>) -> Result<Self, PixmapError> {
        Self::from_vec_with_pitch(desc, data, desc.pitch_bytes())
    }

    /// Takes ownership of bytes whose rows start `pitch` bytes apart.
    pub fn from_vec_with_pitch(
        desc: PixmapDesc,
        data: Vec<u8>,
        pitch: usize,
    ) -> Result<Self, PixmapError> {
        validate(&desc, pitch, data.len())?;
        Ok(Pixmap { desc, data, pitch })
    }

    pub fn desc(&self) -> PixmapDesc {
        self.desc
    }

    pub fn pitch_bytes(&self) -> usize {
        self.pitch
    }

    pub fn view(&self) -> PixmapView<'_> {
        PixmapView {
            desc: self.desc,
            data: &self.data[..span_bytes(&self.desc, self.pitch)],
            pitch: self.pitch,
        }
    }

    pub fn view_mut(&mut self) -> MutablePixmapView<'_> {
        let span = span_bytes(&self.desc, self.pitch);
        MutablePixmapView {
            desc: self.desc,
            data: &mut self.data[..span],
            pitch: self.pitch,
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
