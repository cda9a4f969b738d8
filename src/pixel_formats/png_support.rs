// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! PNG decoding into [Pixmap]s.

use crate::pixel_formats::{PixelFormat, PixmapDesc};
use crate::pixmap::{Pixmap, PixmapView};
use png::{BitDepth, ColorType, Transformations};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum PngError {
    #[error(transparent)]
    Decoding(#[from] png::DecodingError),
    #[error(transparent)]
    Encoding(#[from] png::EncodingError),
    #[error("no pixel format for png color type {0:?}")]
    UnsupportedColor(ColorType),
}

/// The pixel format an 8-bit png color type decodes to.
pub fn pixel_format_for(color_type: ColorType) -> Option<PixelFormat> {
    match color_type {
        ColorType::Grayscale => Some(PixelFormat::I8),
        ColorType::GrayscaleAlpha => Some(PixelFormat::Ia88),
        ColorType::Rgb => Some(PixelFormat::Rgb888),
        ColorType::Rgba => Some(PixelFormat::Rgba8888),
        ColorType::Indexed => None,
    }
}

fn color_type_for(format: PixelFormat) -> Option<ColorType> {
    match format {
        PixelFormat::I8 | PixelFormat::A8 => Some(ColorType::Grayscale),
        PixelFormat::Ia88 => Some(ColorType::GrayscaleAlpha),
        PixelFormat::Rgb888 => Some(ColorType::Rgb),
        PixelFormat::Rgba8888 => Some(ColorType::Rgba),
        PixelFormat::Bgra8888
        | PixelFormat::Rgb565
        | PixelFormat::Rgba5551
        | PixelFormat::Rgba4444 => None,
    }
}

/// Decodes a png held in memory.
///
/// Palettes and low bit depths are expanded and 16-bit channels are stripped, so
/// the result is always 8 bits per channel.
pub fn decode_png(bytes: &[u8]) -> Result<Pixmap, PngError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;
    let (color_type, _) = reader.output_color_type();
    let format = pixel_format_for(color_type).ok_or(PngError::UnsupportedColor(color_type))?;
    let (width, height) = {
        let info = reader.info();
        (info.width, info.height)
    };
    let desc = PixmapDesc::new(width, height, format);
    let mut data = vec![0; desc.bytes()];
    let frame = reader.next_frame(&mut data)?;
    let pixmap = Pixmap::from_vec_with_pitch(desc, data, frame.line_size)
        .map_err(|_| PngError::UnsupportedColor(color_type))?;
    logwise::trace_sync!(
        "decoded png {width}x{height} as {format}",
        width = width,
        height = height,
        format = format.name()
    );
    Ok(pixmap)
}

/// Encodes a pixmap as an 8-bit png.
///
/// Handy for dumping texture contents while debugging.
pub fn encode_png(pixmap: &PixmapView<'_>) -> Result<Vec<u8>, PngError> {
    let color_type = color_type_for(pixmap.format()).ok_or(PngError::UnsupportedColor(
        ColorType::Indexed,
    ))?;
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, pixmap.width(), pixmap.height());
        encoder.set_color(color_type);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixmap.to_pixmap().into_vec())?;
        writer.finish()?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip() {
        let desc = PixmapDesc::new(3, 2, PixelFormat::Ia88);
        let bytes: Vec<u8> = (0..desc.bytes() as u8).collect();
        let pixmap = Pixmap::from_vec(desc, bytes.clone()).unwrap();
        let png = encode_png(&pixmap.view()).unwrap();
        let decoded = decode_png(&png).unwrap();
        assert_eq!(decoded.desc(), desc);
        assert_eq!(decoded.view().to_pixmap().into_vec(), bytes);
    }

    #[test]
    fn packed_formats_do_not_encode() {
        let pixmap = Pixmap::new(PixmapDesc::new(1, 1, PixelFormat::Rgb565));
        assert!(matches!(
            encode_png(&pixmap.view()),
            Err(PngError::UnsupportedColor(_))
        ));
    }
}
