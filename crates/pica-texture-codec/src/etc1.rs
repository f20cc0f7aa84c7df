//! ETC1 / ETC1A4 block decoding.
//!
//! An 8x8 tile holds four 4x4 sub-tiles, ordered left-to-right then
//! top-to-bottom. Each sub-tile is one little-endian 64-bit ETC1 word,
//! preceded by a 64-bit word of 4-bit alpha values for ETC1A4.

use crate::color::{convert_4_to_8, convert_5_to_8};
use crate::PixelFormat;

const MODIFIER_TABLE: [[i32; 2]; 8] = [
    [2, 8],
    [5, 17],
    [9, 29],
    [13, 42],
    [18, 60],
    [24, 80],
    [33, 106],
    [47, 183],
];

fn bits(value: u64, shift: u32, count: u32) -> u32 {
    ((value >> shift) & ((1u64 << count) - 1)) as u32
}

fn signed3(value: u32) -> i32 {
    if value & 0b100 != 0 {
        value as i32 - 8
    } else {
        value as i32
    }
}

/// Samples pixel `(x, y)` of one 4x4 ETC1 block. `x` runs left to right and
/// `y` top to bottom.
pub fn sample_subtile(raw: u64, x: u32, y: u32) -> [u8; 3] {
    let texel = 4 * x + y;
    // The flip bit splits the block horizontally instead of vertically.
    let column = if raw & (1 << 32) != 0 { y } else { x };
    let first_half = column < 2;

    let base: [i32; 3] = if raw & (1 << 33) != 0 {
        let mut r = bits(raw, 59, 5) as i32;
        let mut g = bits(raw, 51, 5) as i32;
        let mut b = bits(raw, 43, 5) as i32;
        if !first_half {
            r += signed3(bits(raw, 56, 3));
            g += signed3(bits(raw, 48, 3));
            b += signed3(bits(raw, 40, 3));
        }
        [r, g, b].map(|c| i32::from(convert_5_to_8((c & 0x1F) as u8)))
    } else if first_half {
        [bits(raw, 60, 4), bits(raw, 52, 4), bits(raw, 44, 4)]
            .map(|c| i32::from(convert_4_to_8(c as u8)))
    } else {
        [bits(raw, 56, 4), bits(raw, 48, 4), bits(raw, 40, 4)]
            .map(|c| i32::from(convert_4_to_8(c as u8)))
    };

    let table = if first_half {
        bits(raw, 37, 3)
    } else {
        bits(raw, 34, 3)
    };
    let subindex = bits(raw, texel, 1);
    let mut modifier = MODIFIER_TABLE[table as usize][subindex as usize];
    if bits(raw, 16 + texel, 1) != 0 {
        modifier = -modifier;
    }

    base.map(|c| (c + modifier).clamp(0, 255) as u8)
}

/// Decodes pixel `(x, y)` of an ETC1/ETC1A4 tile into RGBA8. `y` counts
/// rows from the top of the tile.
pub fn decode_tile_texel(format: PixelFormat, tile: &[u8], x: u32, y: u32) -> [u8; 4] {
    let has_alpha = format == PixelFormat::Etc1a4;
    let subtile_bytes = if has_alpha { 16 } else { 8 };
    let subtile_index = (x / 4 + 2 * (y / 4)) as usize;
    let offset = subtile_index * subtile_bytes;
    let (sx, sy) = (x % 4, y % 4);

    let read_word = |at: usize| {
        let mut word = [0u8; 8];
        word.copy_from_slice(&tile[at..at + 8]);
        u64::from_le_bytes(word)
    };

    let (alpha, color_offset) = if has_alpha {
        let packed = read_word(offset);
        let nibble = ((packed >> (4 * (sx * 4 + sy))) & 0xF) as u8;
        (convert_4_to_8(nibble), offset + 8)
    } else {
        (255, offset)
    };

    let [r, g, b] = sample_subtile(read_word(color_offset), sx, sy);
    [r, g, b, alpha]
}
