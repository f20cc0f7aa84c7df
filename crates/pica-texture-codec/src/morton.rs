//! Morton (Z-order) tiling.
//!
//! Guest surfaces are stored as a sequence of 8x8 tiles, left to right and
//! top to bottom. Inside a tile pixels follow the Morton curve given by
//! [`morton_interleave`]. Host buffers are row-major with the bottom row
//! first, so tile row 0 lands on the highest host row of its block.

use crate::color::{decode_pixel, decode_pixel_4bit, encode_pixel, encode_pixel_4bit};
use crate::error::CodecError;
use crate::{etc1, PixelFormat, TextureLayout};

const X_LUT: [u32; 8] = [0x00, 0x01, 0x04, 0x05, 0x10, 0x11, 0x14, 0x15];
const Y_LUT: [u32; 8] = [0x00, 0x02, 0x08, 0x0a, 0x20, 0x22, 0x28, 0x2a];

/// Index of pixel `(x, y)` inside its 8x8 tile.
#[inline]
pub const fn morton_interleave(x: u32, y: u32) -> u32 {
    X_LUT[(x % 8) as usize] + Y_LUT[(y % 8) as usize]
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PixelKind {
    Nibble,
    Block,
    Bytes,
}

fn pixel_kind(format: PixelFormat) -> PixelKind {
    match format {
        PixelFormat::I4 | PixelFormat::A4 => PixelKind::Nibble,
        PixelFormat::Etc1 | PixelFormat::Etc1a4 => PixelKind::Block,
        _ => PixelKind::Bytes,
    }
}

fn unswizzle_tile(format: PixelFormat, convert: bool, stride: u32, tile: &[u8], linear: &mut [u8]) {
    let guest_bpp = (format.bits_per_pixel() / 8) as usize;
    let host_bpp = format.linear_bytes_per_pixel(convert) as usize;
    let kind = pixel_kind(format);
    for y in 0..8 {
        for x in 0..8 {
            let at = (((7 - y) * stride + x) as usize) * host_bpp;
            let pixel = &mut linear[at..at + host_bpp];
            let index = morton_interleave(x, y);
            match kind {
                PixelKind::Nibble => pixel.copy_from_slice(&decode_pixel_4bit(format, tile, index)),
                PixelKind::Block => pixel.copy_from_slice(&etc1::decode_tile_texel(format, tile, x, y)),
                PixelKind::Bytes => {
                    let offset = index as usize * guest_bpp;
                    decode_pixel(format, convert, &tile[offset..offset + guest_bpp], pixel);
                }
            }
        }
    }
}

fn swizzle_tile(format: PixelFormat, convert: bool, stride: u32, linear: &[u8], tile: &mut [u8]) {
    let guest_bpp = (format.bits_per_pixel() / 8) as usize;
    let host_bpp = format.linear_bytes_per_pixel(convert) as usize;
    let nibbles = pixel_kind(format) == PixelKind::Nibble;
    for y in 0..8 {
        for x in 0..8 {
            let at = (((7 - y) * stride + x) as usize) * host_bpp;
            let pixel = &linear[at..at + host_bpp];
            let index = morton_interleave(x, y);
            if nibbles {
                encode_pixel_4bit(format, pixel, tile, index);
            } else {
                let offset = index as usize * guest_bpp;
                encode_pixel(format, convert, pixel, &mut tile[offset..offset + guest_bpp]);
            }
        }
    }
}

/// Walks the host buffer one tile at a time in guest order.
struct TileCursor {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    host_bpp: usize,
    offset: usize,
    finished: bool,
}

impl TileCursor {
    fn new(layout: &TextureLayout, host_bpp: usize, tile_start: u32) -> Result<Self, CodecError> {
        let TextureLayout { format, width, height, .. } = *layout;
        let begin_pixel = u64::from(tile_start) * 8 / u64::from(format.bits_per_pixel());
        let row_pixels = u64::from(width) * 8;
        let x = ((begin_pixel % row_pixels) / 8) as u32;
        let y = ((begin_pixel / row_pixels) * 8) as u32;
        if y + 8 > height {
            return Err(CodecError::InvalidLayout { format, width, height });
        }
        let offset = (((height - 8 - y) * width + x) as usize) * host_bpp;
        Ok(Self { x, y, width, height, host_bpp, offset, finished: false })
    }

    /// Span of host bytes touched by the tile at the cursor.
    fn span(&self) -> core::ops::Range<usize> {
        self.offset..self.offset + (7 * self.width as usize + 8) * self.host_bpp
    }

    fn advance(&mut self) {
        self.x = (self.x + 8) % self.width;
        self.offset += 8 * self.host_bpp;
        if self.x == 0 {
            self.y += 8;
            if self.y >= self.height {
                self.finished = true;
                return;
            }
            self.offset -= self.width as usize * 9 * self.host_bpp;
        }
    }
}

fn check_layout(layout: &TextureLayout, host_bpp: usize, linear_len: usize) -> Result<(), CodecError> {
    let TextureLayout { format, width, height, .. } = *layout;
    if width == 0 || height == 0 || width % 8 != 0 || height % 8 != 0 || format.bits_per_pixel() == 0 {
        return Err(CodecError::InvalidLayout { format, width, height });
    }
    let needed = width as usize * height as usize * host_bpp;
    if linear_len < needed {
        return Err(CodecError::BufferTooSmall { needed, actual: linear_len });
    }
    Ok(())
}

/// Converts the tiled bytes `tiled` (guest offsets `start..end` of the
/// layout) into the host buffer `linear`. Offsets must be tile aligned.
pub(crate) fn morton_to_linear(
    layout: &TextureLayout,
    convert: bool,
    start: u32,
    end: u32,
    tiled: &[u8],
    linear: &mut [u8],
) -> Result<(), CodecError> {
    let format = layout.format;
    let host_bpp = format.linear_bytes_per_pixel(convert) as usize;
    check_layout(layout, host_bpp, linear.len())?;

    let tile_size = format.tile_bytes();
    if start % tile_size != 0 || end % tile_size != 0 {
        return Err(CodecError::Misaligned { format, start, end });
    }

    let mut cursor = TileCursor::new(layout, host_bpp, start)?;
    let tile_size = tile_size as usize;
    let buffer_end = tiled.len().min((end - start) as usize);
    let mut tiled_offset = 0;
    while !cursor.finished && tiled_offset + tile_size <= buffer_end {
        let tile = &tiled[tiled_offset..tiled_offset + tile_size];
        unswizzle_tile(format, convert, layout.width, tile, &mut linear[cursor.span()]);
        tiled_offset += tile_size;
        cursor.advance();
    }
    Ok(())
}

/// Writes guest bytes `start..end` of the layout into `tiled` from the host
/// buffer `linear`. Boundary tiles that are only partially covered are
/// swizzled into a scratch tile and only the covered bytes are copied out.
pub(crate) fn linear_to_morton(
    layout: &TextureLayout,
    convert: bool,
    start: u32,
    end: u32,
    linear: &[u8],
    tiled: &mut [u8],
) -> Result<(), CodecError> {
    let format = layout.format;
    let host_bpp = format.linear_bytes_per_pixel(convert) as usize;
    check_layout(layout, host_bpp, linear.len())?;
    let len = (end - start) as usize;
    if tiled.len() < len {
        return Err(CodecError::BufferTooSmall { needed: len, actual: tiled.len() });
    }

    let tile_size = format.tile_bytes();
    let aligned_down_start = start - start % tile_size;
    let aligned_start = aligned_down_start + if start % tile_size != 0 { tile_size } else { 0 };
    let aligned_end = end - end % tile_size;

    let mut cursor = TileCursor::new(layout, host_bpp, aligned_down_start)?;
    let mut scratch = vec![0u8; tile_size as usize];
    let mut tiled_offset = 0usize;

    if start < aligned_start {
        swizzle_tile(format, convert, layout.width, &linear[cursor.span()], &mut scratch);
        let count = (aligned_start.min(end) - start) as usize;
        let from = (start - aligned_down_start) as usize;
        tiled[..count].copy_from_slice(&scratch[from..from + count]);
        tiled_offset += (aligned_start - start) as usize;
        cursor.advance();
    }

    if aligned_start < aligned_end {
        let buffer_end = (tiled_offset + (aligned_end - aligned_start) as usize).min(len);
        let tile_size = tile_size as usize;
        while !cursor.finished && tiled_offset + tile_size <= buffer_end {
            let tile = &mut tiled[tiled_offset..tiled_offset + tile_size];
            swizzle_tile(format, convert, layout.width, &linear[cursor.span()], tile);
            tiled_offset += tile_size;
            cursor.advance();
        }
    }

    if end > aligned_start.max(aligned_end) && !cursor.finished {
        scratch.fill(0);
        swizzle_tile(format, convert, layout.width, &linear[cursor.span()], &mut scratch);
        let count = (end - aligned_end) as usize;
        tiled[tiled_offset..tiled_offset + count].copy_from_slice(&scratch[..count]);
    }
    Ok(())
}
