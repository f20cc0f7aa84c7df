//! Pixel format tables.
//!
//! Discriminants match the values programmed into the GPU texture and
//! framebuffer registers, so a register value can be converted with
//! [`PixelFormat::from_texture_format`] and friends without a lookup table.

use core::fmt;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PixelFormat {
    Rgba8 = 0,
    Rgb8 = 1,
    Rgb5a1 = 2,
    Rgb565 = 3,
    Rgba4 = 4,
    Ia8 = 5,
    Rg8 = 6,
    I8 = 7,
    A8 = 8,
    Ia4 = 9,
    I4 = 10,
    A4 = 11,
    Etc1 = 12,
    Etc1a4 = 13,
    D16 = 14,
    D24 = 16,
    D24s8 = 17,
    Invalid = 255,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    Color,
    Texture,
    Depth,
    DepthStencil,
    Fill,
    Invalid,
}

/// Every valid format, in register order.
pub const ALL_FORMATS: [PixelFormat; 17] = [
    PixelFormat::Rgba8,
    PixelFormat::Rgb8,
    PixelFormat::Rgb5a1,
    PixelFormat::Rgb565,
    PixelFormat::Rgba4,
    PixelFormat::Ia8,
    PixelFormat::Rg8,
    PixelFormat::I8,
    PixelFormat::A8,
    PixelFormat::Ia4,
    PixelFormat::I4,
    PixelFormat::A4,
    PixelFormat::Etc1,
    PixelFormat::Etc1a4,
    PixelFormat::D16,
    PixelFormat::D24,
    PixelFormat::D24s8,
];

impl PixelFormat {
    /// Bits per pixel in guest memory.
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8 | Self::D24s8 => 32,
            Self::Rgb8 | Self::D24 => 24,
            Self::Rgb5a1 | Self::Rgb565 | Self::Rgba4 | Self::Ia8 | Self::Rg8 | Self::D16 => 16,
            Self::I8 | Self::A8 | Self::Ia4 | Self::Etc1a4 => 8,
            Self::I4 | Self::A4 | Self::Etc1 => 4,
            Self::Invalid => 0,
        }
    }

    /// Bytes per pixel of the non-converted host representation.
    pub const fn host_bytes_per_pixel(self) -> u32 {
        match self.surface_type() {
            SurfaceType::Texture => 4,
            _ if matches!(self, Self::D24) => 4,
            _ => self.bits_per_pixel() / 8,
        }
    }

    /// Bytes per pixel of the host buffer produced by the codec.
    pub const fn linear_bytes_per_pixel(self, convert: bool) -> u32 {
        if convert {
            4
        } else {
            self.host_bytes_per_pixel()
        }
    }

    /// Bytes of guest memory occupied by one 8x8 tile.
    pub const fn tile_bytes(self) -> u32 {
        self.bits_per_pixel() * 64 / 8
    }

    pub const fn surface_type(self) -> SurfaceType {
        match self {
            Self::Rgba8 | Self::Rgb8 | Self::Rgb5a1 | Self::Rgb565 | Self::Rgba4 => {
                SurfaceType::Color
            }
            Self::Ia8
            | Self::Rg8
            | Self::I8
            | Self::A8
            | Self::Ia4
            | Self::I4
            | Self::A4
            | Self::Etc1
            | Self::Etc1a4 => SurfaceType::Texture,
            Self::D16 | Self::D24 => SurfaceType::Depth,
            Self::D24s8 => SurfaceType::DepthStencil,
            Self::Invalid => SurfaceType::Invalid,
        }
    }

    pub const fn is_compressed(self) -> bool {
        matches!(self, Self::Etc1 | Self::Etc1a4)
    }

    pub const fn from_texture_format(value: u32) -> Self {
        match value {
            0 => Self::Rgba8,
            1 => Self::Rgb8,
            2 => Self::Rgb5a1,
            3 => Self::Rgb565,
            4 => Self::Rgba4,
            5 => Self::Ia8,
            6 => Self::Rg8,
            7 => Self::I8,
            8 => Self::A8,
            9 => Self::Ia4,
            10 => Self::I4,
            11 => Self::A4,
            12 => Self::Etc1,
            13 => Self::Etc1a4,
            _ => Self::Invalid,
        }
    }

    /// Colour buffer formats. RGB8 can't be a render target, but the value
    /// still maps onto the same layout.
    pub const fn from_color_format(value: u32) -> Self {
        if value <= 4 {
            Self::from_texture_format(value)
        } else {
            Self::Invalid
        }
    }

    pub const fn from_depth_format(value: u32) -> Self {
        match value {
            0 => Self::D16,
            2 => Self::D24,
            3 => Self::D24s8,
            _ => Self::Invalid,
        }
    }

    /// Formats accepted by the display transfer engine. RGB565 and RGB5A1
    /// are swapped relative to the texture encoding.
    pub const fn from_gpu_pixel_format(value: u32) -> Self {
        match value {
            0 => Self::Rgba8,
            1 => Self::Rgb8,
            2 => Self::Rgb565,
            3 => Self::Rgb5a1,
            4 => Self::Rgba4,
            _ => Self::Invalid,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgba8 => "RGBA8",
            Self::Rgb8 => "RGB8",
            Self::Rgb5a1 => "RGB5A1",
            Self::Rgb565 => "RGB565",
            Self::Rgba4 => "RGBA4",
            Self::Ia8 => "IA8",
            Self::Rg8 => "RG8",
            Self::I8 => "I8",
            Self::A8 => "A8",
            Self::Ia4 => "IA4",
            Self::I4 => "I4",
            Self::A4 => "A4",
            Self::Etc1 => "ETC1",
            Self::Etc1a4 => "ETC1A4",
            Self::D16 => "D16",
            Self::D24 => "D24",
            Self::D24s8 => "D24S8",
            Self::Invalid => "Invalid",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether the blit engine can copy between the two formats.
pub fn formats_blittable(source: PixelFormat, dest: PixelFormat) -> bool {
    let src = source.surface_type();
    let dst = dest.surface_type();
    let colorish = |ty| matches!(ty, SurfaceType::Color | SurfaceType::Texture);
    (colorish(src) && colorish(dst))
        || (src == SurfaceType::Depth && dst == SurfaceType::Depth)
        || (src == SurfaceType::DepthStencil && dst == SurfaceType::DepthStencil)
}
