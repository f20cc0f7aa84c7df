//! Single-pixel conversions between guest encodings and host layouts.

use crate::PixelFormat;

#[inline]
pub const fn convert_1_to_8(value: u8) -> u8 {
    value * 255
}

#[inline]
pub const fn convert_4_to_8(value: u8) -> u8 {
    value * 17
}

#[inline]
pub const fn convert_5_to_8(value: u8) -> u8 {
    (value << 3) | (value >> 2)
}

#[inline]
pub const fn convert_6_to_8(value: u8) -> u8 {
    (value << 2) | (value >> 4)
}

#[inline]
pub const fn convert_8_to_1(value: u8) -> u8 {
    value >> 7
}

#[inline]
pub const fn convert_8_to_4(value: u8) -> u8 {
    value >> 4
}

#[inline]
pub const fn convert_8_to_5(value: u8) -> u8 {
    value >> 3
}

#[inline]
pub const fn convert_8_to_6(value: u8) -> u8 {
    value >> 2
}

const D24_MAX: f32 = 16_777_215.0;

fn average_rgb(rgba: &[u8]) -> u8 {
    ((u32::from(rgba[0]) + u32::from(rgba[1]) + u32::from(rgba[2])) / 3) as u8
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decodes one byte-aligned pixel.
///
/// `src` holds the guest bytes of the pixel and `dst` receives
/// `format.linear_bytes_per_pixel(convert)` bytes. Texture formats always
/// decode to RGBA8. 4-bit and ETC1 formats are handled at tile level.
pub fn decode_pixel(format: PixelFormat, convert: bool, src: &[u8], dst: &mut [u8]) {
    match (format, convert) {
        (PixelFormat::Rgba8, true) => dst[..4].copy_from_slice(&[src[3], src[2], src[1], src[0]]),
        (PixelFormat::Rgb8, true) => dst[..4].copy_from_slice(&[src[2], src[1], src[0], 255]),
        (PixelFormat::Rgb565, true) => {
            let p = read_u16(src);
            dst[..4].copy_from_slice(&[
                convert_5_to_8(((p >> 11) & 0x1F) as u8),
                convert_6_to_8(((p >> 5) & 0x3F) as u8),
                convert_5_to_8((p & 0x1F) as u8),
                255,
            ]);
        }
        (PixelFormat::Rgb5a1, true) => {
            let p = read_u16(src);
            dst[..4].copy_from_slice(&[
                convert_5_to_8(((p >> 11) & 0x1F) as u8),
                convert_5_to_8(((p >> 6) & 0x1F) as u8),
                convert_5_to_8(((p >> 1) & 0x1F) as u8),
                convert_1_to_8((p & 1) as u8),
            ]);
        }
        (PixelFormat::Rgba4, true) => {
            let p = read_u16(src);
            dst[..4].copy_from_slice(&[
                convert_4_to_8(((p >> 12) & 0xF) as u8),
                convert_4_to_8(((p >> 8) & 0xF) as u8),
                convert_4_to_8(((p >> 4) & 0xF) as u8),
                convert_4_to_8((p & 0xF) as u8),
            ]);
        }
        (PixelFormat::Ia8, _) => dst[..4].copy_from_slice(&[src[1], src[1], src[1], src[0]]),
        (PixelFormat::Rg8, _) => dst[..4].copy_from_slice(&[src[1], src[0], 0, 255]),
        (PixelFormat::I8, _) => dst[..4].copy_from_slice(&[src[0], src[0], src[0], 255]),
        (PixelFormat::A8, _) => dst[..4].copy_from_slice(&[0, 0, 0, src[0]]),
        (PixelFormat::Ia4, _) => {
            let i = convert_4_to_8(src[0] >> 4);
            let a = convert_4_to_8(src[0] & 0xF);
            dst[..4].copy_from_slice(&[i, i, i, a]);
        }
        (PixelFormat::D24, true) => {
            let depth = u32::from_le_bytes([src[0], src[1], src[2], 0]);
            let value = depth as f32 / D24_MAX;
            dst[..4].copy_from_slice(&value.to_le_bytes());
        }
        (PixelFormat::D24s8, _) => {
            dst[..4].copy_from_slice(&read_u32(src).rotate_left(8).to_le_bytes());
        }
        _ => {
            let guest = (format.bits_per_pixel() / 8) as usize;
            let host = format.linear_bytes_per_pixel(convert) as usize;
            dst[..guest].copy_from_slice(&src[..guest]);
            dst[guest..host].fill(0);
        }
    }
}

/// Inverse of [`decode_pixel`].
pub fn encode_pixel(format: PixelFormat, convert: bool, src: &[u8], dst: &mut [u8]) {
    match (format, convert) {
        (PixelFormat::Rgba8, true) => dst[..4].copy_from_slice(&[src[3], src[2], src[1], src[0]]),
        (PixelFormat::Rgb8, true) => dst[..3].copy_from_slice(&[src[2], src[1], src[0]]),
        (PixelFormat::Rgb565, true) => {
            let p = (u16::from(convert_8_to_5(src[0])) << 11)
                | (u16::from(convert_8_to_6(src[1])) << 5)
                | u16::from(convert_8_to_5(src[2]));
            dst[..2].copy_from_slice(&p.to_le_bytes());
        }
        (PixelFormat::Rgb5a1, true) => {
            let p = (u16::from(convert_8_to_5(src[0])) << 11)
                | (u16::from(convert_8_to_5(src[1])) << 6)
                | (u16::from(convert_8_to_5(src[2])) << 1)
                | u16::from(convert_8_to_1(src[3]));
            dst[..2].copy_from_slice(&p.to_le_bytes());
        }
        (PixelFormat::Rgba4, true) => {
            let p = (u16::from(convert_8_to_4(src[0])) << 12)
                | (u16::from(convert_8_to_4(src[1])) << 8)
                | (u16::from(convert_8_to_4(src[2])) << 4)
                | u16::from(convert_8_to_4(src[3]));
            dst[..2].copy_from_slice(&p.to_le_bytes());
        }
        (PixelFormat::Ia8, _) => dst[..2].copy_from_slice(&[src[3], average_rgb(src)]),
        (PixelFormat::Rg8, _) => dst[..2].copy_from_slice(&[src[1], src[0]]),
        (PixelFormat::I8, _) => dst[0] = average_rgb(src),
        (PixelFormat::A8, _) => dst[0] = src[3],
        (PixelFormat::Ia4, _) => {
            dst[0] = (convert_8_to_4(average_rgb(src)) << 4) | convert_8_to_4(src[3]);
        }
        (PixelFormat::D24, true) => {
            let value = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            let depth = (f64::from(value) * f64::from(D24_MAX))
                .round()
                .clamp(0.0, f64::from(D24_MAX)) as u32;
            dst[..3].copy_from_slice(&depth.to_le_bytes()[..3]);
        }
        (PixelFormat::D24s8, _) => {
            dst[..4].copy_from_slice(&read_u32(src).rotate_right(8).to_le_bytes());
        }
        _ => {
            let guest = (format.bits_per_pixel() / 8) as usize;
            dst[..guest].copy_from_slice(&src[..guest]);
        }
    }
}

/// Decodes the 4-bit pixel at `index` (Morton order) of a tile into RGBA8.
pub fn decode_pixel_4bit(format: PixelFormat, tile: &[u8], index: u32) -> [u8; 4] {
    let byte = tile[(index / 2) as usize];
    let nibble = if index % 2 == 1 { byte >> 4 } else { byte & 0xF };
    let value = convert_4_to_8(nibble);
    match format {
        PixelFormat::A4 => [0, 0, 0, value],
        _ => [value, value, value, 255],
    }
}

/// Writes the 4-bit pixel at `index` into a tile, keeping the other nibble.
pub fn encode_pixel_4bit(format: PixelFormat, rgba: &[u8], tile: &mut [u8], index: u32) {
    let nibble = match format {
        PixelFormat::A4 => convert_8_to_4(rgba[3]),
        _ => convert_8_to_4(average_rgb(rgba)),
    };
    let byte = &mut tile[(index / 2) as usize];
    *byte = if index % 2 == 1 {
        (*byte & 0x0F) | (nibble << 4)
    } else {
        (*byte & 0xF0) | nibble
    };
}
