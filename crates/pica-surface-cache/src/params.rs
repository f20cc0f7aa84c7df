//! Surface geometry.
//!
//! A [`SurfaceParams`] describes where a surface lives in guest memory and
//! how its bytes map to pixels. Everything here is pure arithmetic; the
//! cache uses these predicates to decide whether one surface can stand in
//! for (part of) another.

use core::fmt;

use pica_texture_codec::{PixelFormat, SurfaceType, TextureLayout};

use crate::interval::SurfaceInterval;
use crate::material::CustomPixelFormat;
use crate::rect::Rect;

pub const MAX_LEVELS: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureType {
    #[default]
    Texture2D,
    CubeMap,
}

pub(crate) fn align_down(value: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        value
    } else {
        value - value % alignment
    }
}

pub(crate) fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment == 0 || value % alignment == 0 {
        value
    } else {
        value + (alignment - value % alignment)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceParams {
    pub addr: u32,
    pub end: u32,
    pub size: u32,

    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub levels: u32,
    pub res_scale: u16,

    pub is_tiled: bool,
    pub texture_type: TextureType,
    pub pixel_format: PixelFormat,
    pub surface_type: SurfaceType,
    pub custom_format: Option<CustomPixelFormat>,
    pub mipmap_offsets: [u32; MAX_LEVELS],
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            addr: 0,
            end: 0,
            size: 0,
            width: 0,
            height: 0,
            stride: 0,
            levels: 1,
            res_scale: 1,
            is_tiled: false,
            texture_type: TextureType::Texture2D,
            pixel_format: PixelFormat::Invalid,
            surface_type: SurfaceType::Invalid,
            custom_format: None,
            mipmap_offsets: [0; MAX_LEVELS],
        }
    }
}

impl SurfaceParams {
    pub fn new(addr: u32, width: u32, height: u32, pixel_format: PixelFormat, is_tiled: bool) -> Self {
        let mut params = Self {
            addr,
            width,
            height,
            stride: width,
            pixel_format,
            is_tiled,
            ..Self::default()
        };
        params.update_params();
        params
    }

    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self.update_params();
        self
    }

    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self.update_params();
        self
    }

    pub fn with_res_scale(mut self, res_scale: u16) -> Self {
        self.res_scale = res_scale;
        self
    }

    /// Recomputes size, end, type and mip offsets from the dimensions.
    pub fn update_params(&mut self) {
        if self.stride == 0 {
            self.stride = self.width;
        }
        self.surface_type = self.pixel_format.surface_type();
        self.levels = self.levels.clamp(1, MAX_LEVELS as u32);

        if self.levels > 1 {
            debug_assert_eq!(self.stride, self.width, "mipmapped surfaces can't have a gap");
            let (mut width, mut height) = (self.width, self.height);
            let mut offset = self.addr;
            for level in 0..self.levels as usize {
                self.mipmap_offsets[level] = offset;
                offset = offset.wrapping_add(self.bytes_in_pixels(width * height));
                width >>= 1;
                height >>= 1;
            }
            self.size = offset.wrapping_sub(self.addr);
        } else {
            self.mipmap_offsets[0] = self.addr;
            let pixels = if self.is_tiled {
                self.stride * 8 * (self.height / 8).saturating_sub(1) + self.width * 8
            } else {
                self.stride * self.height.saturating_sub(1) + self.width
            };
            self.size = if self.width == 0 || self.height == 0 {
                0
            } else {
                self.bytes_in_pixels(pixels)
            };
        }
        self.end = self.addr.saturating_add(self.size);
    }

    pub fn interval(&self) -> SurfaceInterval {
        SurfaceInterval::new(self.addr, self.end)
    }

    pub fn overlaps(&self, addr: u32, size: u32) -> bool {
        self.interval().overlaps(&SurfaceInterval::from_size(addr, size))
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.pixel_format.bits_per_pixel()
    }

    pub fn bytes_in_pixels(&self, pixels: u32) -> u32 {
        pixels * self.bits_per_pixel() / 8
    }

    pub fn pixels_in_bytes(&self, bytes: u32) -> u32 {
        match self.bits_per_pixel() {
            0 => 0,
            bpp => bytes * 8 / bpp,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.custom_format.is_some()
    }

    pub fn layout(&self) -> TextureLayout {
        TextureLayout {
            format: self.pixel_format,
            width: self.stride,
            height: self.height,
            tiled: self.is_tiled,
        }
    }

    pub fn scaled_width(&self) -> u32 {
        self.width * u32::from(self.res_scale)
    }

    pub fn scaled_height(&self) -> u32 {
        self.height * u32::from(self.res_scale)
    }

    pub fn rect(&self, level: u32) -> Rect {
        Rect::from_extent(self.width >> level, self.height >> level)
    }

    pub fn scaled_rect(&self, level: u32) -> Rect {
        self.rect(level).scale(u32::from(self.res_scale))
    }

    /// Mip level containing `addr`. Addresses outside the surface map to
    /// level 0; an address on a level boundary belongs to the level that
    /// starts there.
    pub fn level_of(&self, addr: u32) -> u32 {
        if addr < self.addr || addr > self.end {
            return 0;
        }
        let mut level = self.levels.saturating_sub(1);
        while level > 0 && self.mipmap_offsets[level as usize] > addr {
            level -= 1;
        }
        level
    }

    pub fn level_interval(&self, level: u32) -> SurfaceInterval {
        debug_assert!(level < self.levels);
        let start = self.mipmap_offsets[level as usize];
        let end = if level + 1 >= self.levels {
            self.end
        } else {
            self.mipmap_offsets[level as usize + 1]
        };
        SurfaceInterval::new(start, end)
    }

    /// Smallest rectangle of this surface whose bytes cover `interval`,
    /// confined to the mip level containing its start.
    pub fn from_interval(&self, interval: SurfaceInterval) -> SurfaceParams {
        let mut params = *self;
        let level = self.level_of(interval.start);
        let level_start = self.mipmap_offsets[level as usize];

        params.width >>= level;
        params.stride >>= level;

        let tiled_size = if self.is_tiled { 8 } else { 1 };
        let stride_tiled_bytes = params.bytes_in_pixels(params.stride * tiled_size);
        let mut aligned_start =
            level_start + align_down(interval.start - level_start, stride_tiled_bytes);
        let mut aligned_end = level_start + align_up(interval.end - level_start, stride_tiled_bytes);

        if aligned_end - aligned_start > stride_tiled_bytes {
            params.addr = aligned_start;
            params.height = (aligned_end - aligned_start) / params.bytes_in_pixels(params.stride).max(1);
        } else {
            // Single row.
            let tiled_alignment = params.bytes_in_pixels(if self.is_tiled { 64 } else { 1 });
            aligned_start = level_start + align_down(interval.start - level_start, tiled_alignment);
            aligned_end = level_start + align_up(interval.end - level_start, tiled_alignment);
            params.addr = aligned_start;
            params.width = params.pixels_in_bytes(aligned_end - aligned_start) / tiled_size;
            params.stride = params.width;
            params.height = tiled_size;
        }
        params.levels = 1;
        params.update_params();
        params
    }

    /// Bytes of mip level `level` covered by the unscaled `rect`.
    pub fn sub_rect_interval(&self, rect: Rect, level: u32) -> SurfaceInterval {
        if rect.is_empty() {
            return SurfaceInterval::default();
        }
        let mut rect = rect;
        if self.is_tiled {
            rect.left = align_down(rect.left, 8) * 8;
            rect.bottom = align_down(rect.bottom, 8) / 8;
            rect.right = align_up(rect.right, 8) * 8;
            rect.top = align_up(rect.top, 8) / 8;
        }

        let stride_tiled = if self.is_tiled { self.stride * 8 } else { self.stride } >> level;
        let row = if self.is_tiled {
            ((self.height >> level) / 8).saturating_sub(rect.top)
        } else {
            rect.bottom
        };
        let pixel_offset = stride_tiled * row + rect.left;
        let pixels = (rect.height() - 1) * stride_tiled + rect.width();
        let base = self.mipmap_offsets[level as usize];
        SurfaceInterval::new(
            base + self.bytes_in_pixels(pixel_offset),
            base + self.bytes_in_pixels(pixel_offset + pixels),
        )
    }

    /// Unscaled rectangle of this surface occupied by `sub`.
    pub fn sub_rect(&self, sub: &SurfaceParams) -> Rect {
        let level = self.level_of(sub.addr);
        let begin_pixel = self.pixels_in_bytes(sub.addr - self.mipmap_offsets[level as usize]);
        let stride_lod = (self.stride >> level).max(1);

        if self.is_tiled {
            let x0 = (begin_pixel % (stride_lod * 8)) / 8;
            let y0 = (begin_pixel / (stride_lod * 8)) * 8;
            let height_lod = self.height >> level;
            return Rect::new(
                x0,
                height_lod.saturating_sub(y0),
                x0 + sub.width,
                height_lod.saturating_sub(y0 + sub.height),
            );
        }

        let x0 = begin_pixel % stride_lod;
        let y0 = begin_pixel / stride_lod;
        Rect::new(x0, y0 + sub.height, x0 + sub.width, y0)
    }

    pub fn scaled_sub_rect(&self, sub: &SurfaceParams) -> Rect {
        self.sub_rect(sub).scale(u32::from(self.res_scale))
    }

    /// Same placement, geometry and encoding, with at least `other`'s mips.
    pub fn exact_match(&self, other: &SurfaceParams) -> bool {
        other.addr == self.addr
            && other.width == self.width
            && other.height == self.height
            && other.stride == self.stride
            && other.pixel_format == self.pixel_format
            && self.pixel_format != PixelFormat::Invalid
            && other.is_tiled == self.is_tiled
            && self.levels >= other.levels
    }

    /// Whether `sub` is a rectangle inside one of this surface's levels.
    pub fn can_sub_rect(&self, sub: &SurfaceParams) -> bool {
        let level = self.level_of(sub.addr);
        let tile_bytes = self.bytes_in_pixels(if self.is_tiled { 64 } else { 1 });
        let rows = if self.is_tiled { 8 } else { 1 };
        sub.addr >= self.addr
            && sub.end <= self.end
            && sub.pixel_format == self.pixel_format
            && self.pixel_format != PixelFormat::Invalid
            && sub.is_tiled == self.is_tiled
            && (sub.addr - self.mipmap_offsets[level as usize]) % tile_bytes.max(1) == 0
            && (sub.stride == (self.stride >> level) || sub.height <= rows)
            && self.sub_rect(sub).right <= (self.stride >> level)
    }

    /// Whether `expanded` can be merged with this surface into one taller
    /// surface of the same stride.
    pub fn can_expand(&self, expanded: &SurfaceParams) -> bool {
        let rows = if self.is_tiled { 8 } else { 1 };
        self.pixel_format != PixelFormat::Invalid
            && self.pixel_format == expanded.pixel_format
            && self.addr <= expanded.end
            && expanded.addr <= self.end
            && self.is_tiled == expanded.is_tiled
            && self.stride == expanded.stride
            && self.levels == 1
            && self.addr.abs_diff(expanded.addr) % self.bytes_in_pixels(self.stride * rows).max(1) == 0
    }

    /// Whether the raw byte copy described by `copy` (width, stride and size
    /// in bytes) maps onto a rectangle of this surface.
    pub fn can_tex_copy(&self, copy: &SurfaceParams) -> bool {
        if self.pixel_format == PixelFormat::Invalid || self.addr > copy.addr || self.end < copy.end {
            return false;
        }

        if copy.width != copy.stride {
            let tile_stride = self.bytes_in_pixels(self.stride * if self.is_tiled { 8 } else { 1 });
            let tile_bytes = self.bytes_in_pixels(if self.is_tiled { 64 } else { 1 }).max(1);
            let offset = copy.addr - self.addr;
            return tile_stride != 0
                && offset % tile_bytes == 0
                && copy.width % tile_bytes == 0
                && (copy.height == 1 || copy.stride == tile_stride)
                && (offset % tile_stride) + copy.width <= tile_stride;
        }

        let copy_interval = copy.interval();
        let level_interval = self.level_interval(self.level_of(copy.addr));
        level_interval.contains(&copy_interval) && self.from_interval(copy_interval).interval() == copy_interval
    }

    /// Whether `other` covers bytes of this surface holding the same number
    /// of bits per pixel in a different format.
    pub fn can_reinterpret(&self, other: &SurfaceParams) -> bool {
        let tile_bytes = self.bytes_in_pixels(if self.is_tiled { 64 } else { 1 }).max(1);
        let rows = if self.is_tiled { 8 } else { 1 };
        other.addr >= self.addr
            && other.end <= self.end
            && self.pixel_format != PixelFormat::Invalid
            && other.pixel_format != PixelFormat::Invalid
            && other.pixel_format != self.pixel_format
            && self.bits_per_pixel() == other.bits_per_pixel()
            && other.is_tiled == self.is_tiled
            && (other.stride == self.stride || other.height <= rows)
            && (other.addr - self.addr) % tile_bytes == 0
            && self.sub_rect(other).right <= self.stride
    }

    pub fn debug_name(&self, scaled: bool) -> String {
        let (width, height) = if scaled {
            (self.scaled_width(), self.scaled_height())
        } else {
            (self.width, self.height)
        };
        format!(
            "Surface: {}x{} {} {} levels from {:#x} to {:#x} ({})",
            width,
            height,
            self.pixel_format,
            self.levels,
            self.addr,
            self.end,
            if scaled { "scaled" } else { "unscaled" }
        )
    }
}

impl fmt::Display for SurfaceParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_name(false))
    }
}
