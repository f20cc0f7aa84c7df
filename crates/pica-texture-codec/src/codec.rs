use crate::color::{decode_pixel, decode_pixel_4bit, encode_pixel};
use crate::error::CodecError;
use crate::morton::{linear_to_morton, morton_interleave, morton_to_linear};
use crate::{etc1, PixelFormat, SurfaceType};

/// Geometry of a rectangle of guest pixels handed to the codec.
///
/// `width` is the row pitch in pixels; `height` the number of rows. Offsets
/// passed alongside a layout are byte offsets from its first guest byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureLayout {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub tiled: bool,
}

impl TextureLayout {
    /// Size in bytes of the host buffer for this layout.
    pub fn linear_size(&self, convert: bool) -> usize {
        self.width as usize * self.height as usize * self.format.linear_bytes_per_pixel(convert) as usize
    }

    /// Size in bytes of the guest encoding.
    pub fn guest_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bits_per_pixel() as usize / 8
    }
}

fn linear_supported(format: PixelFormat) -> bool {
    matches!(
        format.surface_type(),
        SurfaceType::Color | SurfaceType::Depth | SurfaceType::DepthStencil
    )
}

pub fn can_decode(format: PixelFormat, tiled: bool) -> bool {
    format != PixelFormat::Invalid && (tiled || linear_supported(format))
}

pub fn can_encode(format: PixelFormat, tiled: bool) -> bool {
    can_decode(format, tiled) && !format.is_compressed()
}

/// Decodes guest bytes `source` (layout offsets `start..end`) into the host
/// buffer `dest`, which covers the whole layout.
pub fn decode_texture(
    layout: &TextureLayout,
    start: u32,
    end: u32,
    source: &[u8],
    dest: &mut [u8],
    convert: bool,
) -> Result<(), CodecError> {
    if !can_decode(layout.format, layout.tiled) {
        return Err(CodecError::Unimplemented {
            direction: "decode",
            format: layout.format,
            tiled: layout.tiled,
        });
    }
    if start >= end {
        return Ok(());
    }
    if layout.tiled {
        morton_to_linear(layout, convert, start, end, source, dest)
    } else {
        decode_linear(layout, convert, start, end, source, dest)
    }
}

/// Encodes the host buffer `source` back into guest bytes `dest`, which
/// receives exactly layout offsets `start..end`.
pub fn encode_texture(
    layout: &TextureLayout,
    start: u32,
    end: u32,
    source: &[u8],
    dest: &mut [u8],
    convert: bool,
) -> Result<(), CodecError> {
    if !can_encode(layout.format, layout.tiled) {
        return Err(CodecError::Unimplemented {
            direction: "encode",
            format: layout.format,
            tiled: layout.tiled,
        });
    }
    if start >= end {
        return Ok(());
    }
    if layout.tiled {
        linear_to_morton(layout, convert, start, end, source, dest)
    } else {
        encode_linear(layout, convert, start, end, source, dest)
    }
}

fn decode_linear(
    layout: &TextureLayout,
    convert: bool,
    start: u32,
    end: u32,
    source: &[u8],
    dest: &mut [u8],
) -> Result<(), CodecError> {
    let format = layout.format;
    let guest_bpp = (format.bits_per_pixel() / 8) as usize;
    let host_bpp = format.linear_bytes_per_pixel(convert) as usize;
    if start as usize % guest_bpp != 0 || end as usize % guest_bpp != 0 {
        return Err(CodecError::Misaligned { format, start, end });
    }

    let first = start as usize / guest_bpp;
    let count = (end - start) as usize / guest_bpp;
    let needed = (first + count) * host_bpp;
    if dest.len() < needed || source.len() < count * guest_bpp {
        return Err(CodecError::BufferTooSmall {
            needed: needed.max(count * guest_bpp),
            actual: dest.len().min(source.len()),
        });
    }

    for (i, pixel) in source.chunks_exact(guest_bpp).take(count).enumerate() {
        let at = (first + i) * host_bpp;
        decode_pixel(format, convert, pixel, &mut dest[at..at + host_bpp]);
    }
    Ok(())
}

fn encode_linear(
    layout: &TextureLayout,
    convert: bool,
    start: u32,
    end: u32,
    source: &[u8],
    dest: &mut [u8],
) -> Result<(), CodecError> {
    let format = layout.format;
    let guest_bpp = (format.bits_per_pixel() / 8) as usize;
    let host_bpp = format.linear_bytes_per_pixel(convert) as usize;

    let first = start as usize / guest_bpp;
    let last = (end as usize).div_ceil(guest_bpp);
    let len = (end - start) as usize;
    if source.len() < last * host_bpp || dest.len() < len {
        return Err(CodecError::BufferTooSmall {
            needed: (last * host_bpp).max(len),
            actual: source.len().min(dest.len()),
        });
    }

    // Whole pixels are encoded; partial ones at either end are cut out.
    let mut encoded = vec![0u8; (last - first) * guest_bpp];
    for (i, pixel) in encoded.chunks_exact_mut(guest_bpp).enumerate() {
        let at = (first + i) * host_bpp;
        encode_pixel(format, convert, &source[at..at + host_bpp], pixel);
    }
    let skip = start as usize - first * guest_bpp;
    dest[..len].copy_from_slice(&encoded[skip..skip + len]);
    Ok(())
}

/// Reads pixel `(x, y)` (y from the top) of a guest tile as RGBA8.
///
/// Depth formats return their raw converted bytes.
pub fn decode_texel(format: PixelFormat, tile: &[u8], x: u32, y: u32) -> [u8; 4] {
    let mut out = [0u8; 4];
    match format {
        PixelFormat::I4 | PixelFormat::A4 => {
            out = decode_pixel_4bit(format, tile, morton_interleave(x, y));
        }
        PixelFormat::Etc1 | PixelFormat::Etc1a4 => {
            out = etc1::decode_tile_texel(format, tile, x, y);
        }
        PixelFormat::Invalid => {}
        _ => {
            let guest_bpp = (format.bits_per_pixel() / 8) as usize;
            let offset = morton_interleave(x, y) as usize * guest_bpp;
            decode_pixel(format, true, &tile[offset..offset + guest_bpp], &mut out);
        }
    }
    out
}
