//! GPU-side memory fills, display transfers and texture copies.

use pica_texture_codec::{formats_blittable, PixelFormat, SurfaceType};

use super::{RasterizerCache, ScaleMatch};
use crate::backend::{GraphicsBackend, TextureBlit, TextureCopy};
use crate::error::CacheError;
use crate::memory::GuestMemory;
use crate::params::{align_down, SurfaceParams};

/// Pattern written by a memory fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillValue {
    Bits16(u16),
    /// Bytes in memory order.
    Bits24([u8; 3]),
    Bits32(u32),
}

impl FillValue {
    fn pattern(self) -> ([u8; 4], u32) {
        match self {
            Self::Bits16(value) => {
                let [a, b] = value.to_le_bytes();
                ([a, b, 0, 0], 2)
            }
            Self::Bits24([a, b, c]) => ([a, b, c, 0], 3),
            Self::Bits32(value) => (value.to_le_bytes(), 4),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryFillConfig {
    pub start: u32,
    /// Exclusive.
    pub end: u32,
    pub value: FillValue,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferScaling {
    #[default]
    None,
    /// Halve horizontally.
    X,
    /// Halve in both directions.
    XY,
}

/// Raw texture copy registers. Widths and gaps are in 16-byte units,
/// `size` in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureCopyConfig {
    pub size: u32,
    pub input_width: u32,
    pub input_gap: u32,
    pub output_width: u32,
    pub output_gap: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayTransferConfig {
    pub input_addr: u32,
    pub output_addr: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub input_format: PixelFormat,
    pub output_format: PixelFormat,
    pub input_linear: bool,
    pub dont_swizzle: bool,
    pub flip_vertically: bool,
    pub crop_input_lines: bool,
    pub scaling: TransferScaling,
    pub texture_copy: TextureCopyConfig,
}

impl<B: GraphicsBackend, M: GuestMemory> RasterizerCache<B, M> {
    /// Records a memory fill as a fill surface. No texture is touched until
    /// another surface validates from it.
    pub fn accelerate_fill(&mut self, config: &MemoryFillConfig) -> Result<bool, CacheError> {
        if config.end <= config.start {
            return Ok(false);
        }
        let size = config.end - config.start;
        let mut params = SurfaceParams {
            addr: config.start,
            end: config.end,
            size,
            surface_type: SurfaceType::Fill,
            res_scale: u16::MAX,
            ..SurfaceParams::default()
        };
        params.mipmap_offsets[0] = config.start;

        let fill_id = self.create_surface(params)?;
        let (fill_data, fill_size) = config.value.pattern();
        let surface = &mut self.slot_surfaces[fill_id];
        surface.fill_data = fill_data;
        surface.fill_size = fill_size;
        surface.mark_valid(params.interval());

        self.register_surface(fill_id);
        self.invalidate_region(params.addr, size, fill_id)?;
        tracing::trace!(start = config.start, end = config.end, fill_size, "memory fill");
        Ok(true)
    }

    /// Performs a raw texture copy between cached surfaces. Returns `false`
    /// when the source isn't cached or the copy can't be expressed as one.
    pub fn accelerate_texture_copy(&mut self, config: &DisplayTransferConfig) -> Result<bool, CacheError> {
        let copy = &config.texture_copy;
        let copy_size = align_down(copy.size, 16);
        if copy_size == 0 {
            return Ok(false);
        }

        let mut input_gap = copy.input_gap * 16;
        let mut input_width = copy.input_width * 16;
        if input_width == 0 && input_gap != 0 {
            return Ok(false);
        }
        if input_gap == 0 || input_width >= copy_size {
            input_width = copy_size;
            input_gap = 0;
        }
        if copy_size % input_width != 0 {
            return Ok(false);
        }

        let mut output_gap = copy.output_gap * 16;
        let mut output_width = copy.output_width * 16;
        if output_width == 0 && output_gap != 0 {
            return Ok(false);
        }
        if output_gap == 0 || output_width >= copy_size {
            output_width = copy_size;
            output_gap = 0;
        }
        if copy_size % output_width != 0 {
            return Ok(false);
        }

        let mut src_params = SurfaceParams {
            addr: config.input_addr,
            stride: input_width + input_gap,
            width: input_width,
            height: copy_size / input_width,
            ..SurfaceParams::default()
        };
        src_params.size = (src_params.height - 1) * src_params.stride + src_params.width;
        src_params.end = src_params.addr + src_params.size;

        let (src_id, src_rect) = self.get_tex_copy_surface(&src_params)?;
        let Some(src) = self.slot_surfaces.get(src_id) else {
            return Ok(false);
        };
        let src_info = src.params;
        let res_scale = u32::from(src_info.res_scale);
        let tiled_rows = if src_info.is_tiled { 8 } else { 1 };
        let tile_bytes = if src_info.is_tiled { 64 } else { 1 };

        if output_gap != 0
            && (output_width != src_info.bytes_in_pixels(src_rect.width() / res_scale) * tiled_rows
                || output_gap % src_info.bytes_in_pixels(tile_bytes).max(1) != 0)
        {
            return Ok(false);
        }

        let mut dst_params = src_info;
        dst_params.addr = config.output_addr;
        dst_params.width = src_rect.width() / res_scale;
        let gap_pixels = src_info.pixels_in_bytes(if src_info.is_tiled { output_gap / 8 } else { output_gap });
        dst_params.stride = dst_params.width + gap_pixels;
        dst_params.height = src_rect.height() / res_scale;
        dst_params.levels = 1;
        dst_params.res_scale = src_info.res_scale;
        dst_params.update_params();

        // A partial copy only overwrites part of the destination.
        let load_gap = output_gap != 0;
        let (dst_id, dst_rect) = self.get_surface_sub_rect(&dst_params, ScaleMatch::Upscale, load_gap)?;
        let (Some(src), Some(dst)) = (self.slot_surfaces.get(src_id), self.slot_surfaces.get(dst_id)) else {
            return Ok(false);
        };
        if dst.params.surface_type == SurfaceType::Texture
            || !formats_blittable(src.params.pixel_format, dst.params.pixel_format)
        {
            return Ok(false);
        }
        let (Some(src_texture), Some(dst_texture)) = (src.texture, dst.texture) else {
            return Ok(false);
        };
        let src_level = src.params.level_of(src_params.addr);
        let same_extent = src_rect.width() == dst_rect.width() && src_rect.height() == dst_rect.height();

        if src.params.pixel_format == dst.params.pixel_format && same_extent {
            let copy = TextureCopy {
                src_level,
                dst_level: 0,
                src_layer: 0,
                dst_layer: 0,
                src_offset: (src_rect.left, src_rect.min_y()),
                dst_offset: (dst_rect.left, dst_rect.min_y()),
                extent: (src_rect.width(), src_rect.height()),
            };
            self.backend.copy(src_texture, dst_texture, &copy);
        } else {
            let blit = TextureBlit { src_level, dst_level: 0, src_rect, dst_rect };
            if !self.backend.blit(src_texture, dst_texture, &blit) {
                return Ok(false);
            }
        }
        self.stats.inc_copies();

        self.invalidate_region(dst_params.addr, dst_params.size, dst_id)?;
        Ok(true)
    }

    /// Performs a display transfer (scaled, format-converting, optionally
    /// flipped copy) between cached surfaces.
    pub fn accelerate_display_transfer(&mut self, config: &DisplayTransferConfig) -> Result<bool, CacheError> {
        // The input stride can't be narrower than the rows it produces.
        if config.input_width < config.output_width {
            tracing::debug!(
                input_width = config.input_width,
                output_width = config.output_width,
                "display transfer reads past its input rows"
            );
            return Ok(false);
        }
        let mut src_params = SurfaceParams::new(
            config.input_addr,
            config.output_width,
            config.output_height,
            config.input_format,
            !config.input_linear,
        )
        .with_stride(config.input_width);

        let mut dst_width = config.output_width;
        let mut dst_height = config.output_height;
        if config.scaling != TransferScaling::None {
            dst_width /= 2;
        }
        if config.scaling == TransferScaling::XY {
            dst_height /= 2;
        }
        let mut dst_params = SurfaceParams::new(
            config.output_addr,
            dst_width,
            dst_height,
            config.output_format,
            config.input_linear != config.dont_swizzle,
        );

        // The flip happens before the crop, so the first line of the output
        // comes from further into the input.
        if config.flip_vertically && config.crop_input_lines {
            let skipped = (config.input_width - config.output_width) * config.output_height.saturating_sub(1);
            src_params.addr += src_params.bytes_in_pixels(skipped);
            src_params.update_params();
        }

        let (src_id, mut src_rect) = self.get_surface_sub_rect(&src_params, ScaleMatch::Ignore, true)?;
        let Some(src) = self.slot_surfaces.get(src_id) else {
            return Ok(false);
        };
        let src_scale = src.params.res_scale;
        let src_format = src.params.pixel_format;

        if config.input_width > config.output_width {
            src_rect.right -= (config.input_width - config.output_width) * u32::from(src_scale);
        }

        dst_params.res_scale = src_scale;
        let (dst_id, dst_rect) = self.get_surface_sub_rect(&dst_params, ScaleMatch::Exact, false)?;
        let (Some(src), Some(dst)) = (self.slot_surfaces.get(src_id), self.slot_surfaces.get(dst_id)) else {
            return Ok(false);
        };
        if !formats_blittable(src_format, dst.params.pixel_format) {
            return Ok(false);
        }
        let (Some(src_texture), Some(dst_texture)) = (src.texture, dst.texture) else {
            return Ok(false);
        };

        if config.flip_vertically {
            src_rect.flip_vertically();
        }
        let blit = TextureBlit {
            src_level: src.params.level_of(src_params.addr),
            dst_level: 0,
            src_rect,
            dst_rect,
        };
        if !self.backend.blit(src_texture, dst_texture, &blit) {
            return Ok(false);
        }
        self.stats.inc_copies();

        self.invalidate_region(dst_params.addr, dst_params.size, dst_id)?;
        Ok(true)
    }
}
