//! Backend-independent surface state: which bytes are stale, what a fill
//! surface contains, and which replacement material is attached.

use std::sync::Arc;

use pica_texture_codec::{decode_texel, PixelFormat, SurfaceType};

use crate::backend::ClearValue;
use crate::interval::{IntervalSet, SurfaceInterval};
use crate::material::Material;
use crate::params::{align_down, align_up, SurfaceParams};

const D24_MAX: f32 = 16_777_215.0;

#[derive(Debug, Clone)]
pub struct SurfaceBase {
    pub params: SurfaceParams,
    invalid_regions: IntervalSet,
    modification_tick: u64,
    /// Pattern length in bytes for fill surfaces (2, 3 or 4).
    pub fill_size: u32,
    pub fill_data: [u8; 4],
    pub material: Option<Arc<Material>>,
}

impl SurfaceBase {
    /// A new surface starts out entirely invalid.
    pub fn new(params: SurfaceParams) -> Self {
        let mut invalid_regions = IntervalSet::new();
        invalid_regions.insert(params.interval());
        Self {
            params,
            invalid_regions,
            modification_tick: 0,
            fill_size: 0,
            fill_data: [0; 4],
            material: None,
        }
    }

    pub fn modification_tick(&self) -> u64 {
        self.modification_tick
    }

    pub fn invalid_regions(&self) -> &IntervalSet {
        &self.invalid_regions
    }

    pub fn is_custom(&self) -> bool {
        self.params.is_custom() && self.material.is_some()
    }

    pub fn is_region_valid(&self, interval: SurfaceInterval) -> bool {
        !self.invalid_regions.intersects(interval)
    }

    pub fn is_fully_invalid(&self) -> bool {
        self.invalid_regions.contains(self.params.interval())
    }

    pub fn overlaps(&self, addr: u32, size: u32) -> bool {
        self.params.overlaps(addr, size)
    }

    pub fn mark_valid(&mut self, interval: SurfaceInterval) {
        self.invalid_regions.remove(interval);
        self.modification_tick += 1;
    }

    pub fn mark_invalid(&mut self, interval: SurfaceInterval) {
        self.invalid_regions.insert(interval.intersect(&self.params.interval()));
        self.modification_tick += 1;
    }

    /// Whether this fill surface can produce `interval` of `dest` with a
    /// single clear.
    pub fn can_fill(&self, dest: &SurfaceParams, interval: SurfaceInterval) -> bool {
        if self.params.surface_type != SurfaceType::Fill
            || !self.is_region_valid(interval)
            || interval.start < self.params.addr
            || interval.end > self.params.end
            || dest.from_interval(interval).interval() != interval
        {
            return false;
        }
        if self.fill_size * 8 == dest.bits_per_pixel() {
            return true;
        }

        // The pattern has to repeat at the destination's pixel size.
        let fill_size = self.fill_size as usize;
        let dest_bpp = (dest.bits_per_pixel() / 8).max(1) as usize;
        let pattern: Vec<u8> = (0..dest_bpp)
            .flat_map(|_| self.fill_data[..fill_size].iter().copied())
            .collect();
        let first = &pattern[..dest_bpp];
        if (0..fill_size).any(|i| &pattern[i * dest_bpp..(i + 1) * dest_bpp] != first) {
            return false;
        }
        !(dest.bits_per_pixel() == 4 && (pattern[0] & 0xF) != (pattern[0] >> 4))
    }

    pub fn can_copy(&self, dest: &SurfaceParams, interval: SurfaceInterval) -> bool {
        if interval.is_empty() {
            return false;
        }
        let sub = dest.from_interval(interval);
        debug_assert_eq!(sub.interval(), interval);
        self.params.can_sub_rect(&sub) || self.can_fill(dest, interval)
    }

    /// Largest valid rectangle of `params` this surface can supply.
    pub fn copyable_interval(&self, params: &SurfaceParams) -> SurfaceInterval {
        let mut result = SurfaceInterval::default();
        let tile_align = params.bytes_in_pixels(if params.is_tiled { 64 } else { 1 });
        let stride_bytes = params.bytes_in_pixels(params.stride) * if params.is_tiled { 8 } else { 1 };
        let overlap = params.interval().intersect(&self.params.interval());

        let mut valid = IntervalSet::new();
        valid.insert(overlap);
        for invalid in self.invalid_regions.overlapping(overlap) {
            valid.remove(invalid);
        }

        for interval in valid.iter() {
            let aligned = SurfaceInterval::new(
                params.addr + align_up(interval.start - params.addr, tile_align),
                params.addr + align_down(interval.end - params.addr, tile_align),
            );
            if tile_align > interval.len() || aligned.is_empty() {
                continue;
            }

            let rect_start = params.addr + align_up(aligned.start - params.addr, stride_bytes);
            let rect_end = params.addr + align_down(aligned.end - params.addr, stride_bytes);
            let rect = if rect_start > rect_end {
                // Inside one row.
                aligned
            } else if rect_start == rect_end {
                // Two partial rows; keep the longer one.
                let first = SurfaceInterval::new(aligned.start, rect_start);
                let second = SurfaceInterval::new(rect_start, aligned.end);
                if first.len() > second.len() {
                    first
                } else {
                    second
                }
            } else {
                SurfaceInterval::new(rect_start, rect_end)
            };

            if rect.len() > result.len() {
                result = rect;
            }
        }
        result
    }

    /// Width and height of the backing texture.
    pub fn real_extent(&self, scaled: bool) -> (u32, u32) {
        if let Some((width, height, _)) = self.material.as_ref().and_then(|m| m.extent()) {
            if self.params.is_custom() {
                return (width, height);
            }
        }
        if scaled {
            (self.params.scaled_width(), self.params.scaled_height())
        } else {
            (self.params.width, self.params.height)
        }
    }

    /// Fill pattern as seen from `copy_addr`.
    fn fill_buffer(&self, copy_addr: u32) -> [u8; 4] {
        let fill_size = self.fill_size.max(1);
        let offset = (copy_addr - self.params.addr) % fill_size;
        core::array::from_fn(|i| self.fill_data[((offset + i as u32) % fill_size) as usize])
    }

    /// Clear value equivalent to this fill, read at `copy_addr` as `format`.
    pub fn make_clear_value(&self, copy_addr: u32, format: PixelFormat) -> ClearValue {
        let fill = self.fill_buffer(copy_addr);
        let word = u32::from_le_bytes(fill);
        match format.surface_type() {
            SurfaceType::Depth => {
                let depth = if format == PixelFormat::D16 {
                    (word & 0xFFFF) as f32 / 65535.0
                } else {
                    (word & 0xFF_FFFF) as f32 / D24_MAX
                };
                ClearValue::Depth(depth)
            }
            SurfaceType::DepthStencil => ClearValue::DepthStencil {
                depth: (word & 0xFF_FFFF) as f32 / D24_MAX,
                stencil: (word >> 24) as u8,
            },
            _ => {
                // Large enough for the biggest ETC1A4 block.
                let mut tile = [0u8; 16];
                for (i, byte) in tile.iter_mut().enumerate() {
                    *byte = fill[i % 4];
                }
                let texel = decode_texel(format, &tile, 0, 0);
                ClearValue::Color(texel.map(|c| f32::from(c) / 255.0))
            }
        }
    }
}
