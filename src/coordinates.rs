// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Texel coordinates and rectangles.

All coordinates use the same raster convention:

```text
           x
      0 ────────▶
      │ ┌───────┐
    y │ │       │
      │ │       │
      │ │       │
      ▼ └───────┘
 ```
*/

/// A texel position within a texture level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterCoord2D {
    pub x: u32,
    pub y: u32,
}

impl RasterCoord2D {
    pub const ORIGIN: RasterCoord2D = RasterCoord2D { x: 0, y: 0 };

    pub const fn new(x: u32, y: u32) -> Self {
        RasterCoord2D { x, y }
    }
}

/// An axis-aligned rectangle of texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RasterRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        RasterRect {
            x,
            y,
            width,
            height,
        }
    }

    /// A rect of the given size anchored at `origin`.
    pub const fn at(origin: RasterCoord2D, width: u32, height: u32) -> Self {
        RasterRect::new(origin.x, origin.y, width, height)
    }

    /// A rect covering a whole `width` x `height` surface.
    pub const fn full(width: u32, height: u32) -> Self {
        RasterRect::new(0, 0, width, height)
    }

    pub const fn origin(&self) -> RasterCoord2D {
        RasterCoord2D::new(self.x, self.y)
    }

    /// Exclusive right edge.  Saturates instead of wrapping.
    pub const fn x2(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.  Saturates instead of wrapping.
    pub const fn y2(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the rect lies entirely inside a `width` x `height` surface.
    ///
    /// Edges that would overflow `u32` never fit.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        match (self.x.checked_add(self.width), self.y.checked_add(self.height)) {
            (Some(x2), Some(y2)) => x2 <= width && y2 <= height,
            _ => false,
        }
    }
}
