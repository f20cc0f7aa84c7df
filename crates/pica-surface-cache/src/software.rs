//! CPU reference implementation of [`GraphicsBackend`].
//!
//! Textures are plain byte vectors at their scaled resolution. Scaling uses
//! nearest-neighbour sampling in both directions, so an upload followed by
//! a download returns the uploaded bytes for any integer scale.

use std::collections::HashMap;

use pica_texture_codec::color::{decode_pixel, encode_pixel};
use pica_texture_codec::{formats_blittable, PixelFormat, SurfaceType};

use crate::backend::{
    BackendError, ClearValue, FramebufferDesc, GraphicsBackend, SamplerParams, TextureBlit, TextureClear,
    TextureCopy, TextureDesc, TextureDownload, TextureUpload,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftwareTexture(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftwareSampler(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftwareFramebuffer(u32);

#[derive(Debug)]
struct TextureData {
    desc: TextureDesc,
    bpp: usize,
    /// Indexed by layer, then level.
    layers: Vec<Vec<Vec<u8>>>,
}

impl TextureData {
    fn level_width(&self, level: u32) -> u32 {
        (self.desc.width >> level).max(1) * u32::from(self.desc.res_scale)
    }

    fn level_height(&self, level: u32) -> u32 {
        (self.desc.height >> level).max(1) * u32::from(self.desc.res_scale)
    }

    fn offset(&self, level: u32, x: u32, y: u32) -> Option<usize> {
        if x >= self.level_width(level) || y >= self.level_height(level) {
            return None;
        }
        Some((y as usize * self.level_width(level) as usize + x as usize) * self.bpp)
    }

    fn pixel(&self, layer: u32, level: u32, x: u32, y: u32) -> Option<&[u8]> {
        let at = self.offset(level, x, y)?;
        self.layers.get(layer as usize)?.get(level as usize).map(|data| &data[at..at + self.bpp])
    }

    fn pixel_mut(&mut self, layer: u32, level: u32, x: u32, y: u32) -> Option<&mut [u8]> {
        let at = self.offset(level, x, y)?;
        let bpp = self.bpp;
        self.layers
            .get_mut(layer as usize)?
            .get_mut(level as usize)
            .map(|data| &mut data[at..at + bpp])
    }

    fn format(&self) -> PixelFormat {
        match self.desc.custom_format {
            Some(_) => PixelFormat::Rgba8,
            None => self.desc.format,
        }
    }

    /// Stored pixels hold RGBA8 rather than the guest layout.
    fn holds_rgba(&self) -> bool {
        self.desc.custom_format.is_some()
            || self.desc.converted
            || self.desc.format.surface_type() == SurfaceType::Texture
    }

    /// Reads a pixel as normalized colour, or `[depth, stencil, 0, 0]`.
    fn read_texel(&self, bytes: &[u8]) -> [f32; 4] {
        let format = self.format();
        match format.surface_type() {
            SurfaceType::Depth if format == PixelFormat::D16 => {
                [f32::from(u16::from_le_bytes([bytes[0], bytes[1]])) / 65535.0, 0.0, 0.0, 0.0]
            }
            SurfaceType::Depth if self.desc.converted => {
                [f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 0.0, 0.0, 0.0]
            }
            SurfaceType::Depth => {
                let depth = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
                [depth as f32 / 16_777_215.0, 0.0, 0.0, 0.0]
            }
            SurfaceType::DepthStencil => {
                let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                [(word >> 8) as f32 / 16_777_215.0, f32::from(word as u8), 0.0, 0.0]
            }
            _ => {
                let mut rgba = [0u8; 4];
                if self.holds_rgba() {
                    rgba.copy_from_slice(&bytes[..4]);
                } else {
                    decode_pixel(format, true, bytes, &mut rgba);
                }
                rgba.map(|c| f32::from(c) / 255.0)
            }
        }
    }

    fn write_texel(&self, value: [f32; 4], out: &mut [u8]) {
        let format = self.format();
        match format.surface_type() {
            SurfaceType::Depth if format == PixelFormat::D16 => {
                let depth = (value[0].clamp(0.0, 1.0) * 65535.0).round() as u16;
                out[..2].copy_from_slice(&depth.to_le_bytes());
                out[2..].fill(0);
            }
            SurfaceType::Depth if self.desc.converted => out[..4].copy_from_slice(&value[0].to_le_bytes()),
            SurfaceType::Depth => {
                let depth = (f64::from(value[0].clamp(0.0, 1.0)) * 16_777_215.0).round() as u32;
                out[..4].copy_from_slice(&depth.to_le_bytes());
            }
            SurfaceType::DepthStencil => {
                let depth = (f64::from(value[0].clamp(0.0, 1.0)) * 16_777_215.0).round() as u32;
                let stencil = value[1].clamp(0.0, 255.0) as u32;
                out[..4].copy_from_slice(&((depth << 8) | stencil).to_le_bytes());
            }
            _ => {
                let rgba = value.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
                if self.holds_rgba() {
                    out[..4].copy_from_slice(&rgba);
                } else {
                    encode_pixel(format, true, &rgba, out);
                }
            }
        }
    }
}

fn clear_texel(value: ClearValue) -> [f32; 4] {
    match value {
        ClearValue::Color(color) => color,
        ClearValue::Depth(depth) => [depth, 0.0, 0.0, 0.0],
        ClearValue::DepthStencil { depth, stencil } => [depth, f32::from(stencil), 0.0, 0.0],
    }
}

/// Maps row/column `t` of a destination span of `dst_len` onto a source
/// span, optionally mirrored.
fn map_coord(t: u32, dst_len: u32, src_min: u32, src_len: u32, mirrored: bool) -> u32 {
    let scaled = (u64::from(t) * u64::from(src_len) / u64::from(dst_len.max(1))) as u32;
    if mirrored {
        src_min + src_len - 1 - scaled
    } else {
        src_min + scaled
    }
}

#[derive(Debug, Default)]
pub struct SoftwareBackend {
    textures: HashMap<u32, TextureData>,
    samplers: Vec<SamplerParams>,
    framebuffers: HashMap<u32, FramebufferDesc<SoftwareTexture>>,
    next_id: u32,
    convert_colors: bool,
    memory_limit: Option<u64>,
    allocated_bytes: u64,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that exchanges colour formats in the converted RGBA8
    /// layout, like hosts that can't sample 16-bit colour natively.
    pub fn with_conversion() -> Self {
        Self {
            convert_colors: true,
            ..Self::default()
        }
    }

    /// Makes allocations fail once `limit` bytes are in use.
    pub fn set_memory_limit(&mut self, limit: Option<u64>) {
        self.memory_limit = limit;
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn texture_desc(&self, texture: SoftwareTexture) -> Option<&TextureDesc> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    /// Raw scaled pixels of one level, rows bottom-up.
    pub fn level_data(&self, texture: SoftwareTexture, layer: u32, level: u32) -> Option<&[u8]> {
        self.textures
            .get(&texture.0)?
            .layers
            .get(layer as usize)?
            .get(level as usize)
            .map(Vec::as_slice)
    }

    pub fn framebuffer(&self, framebuffer: SoftwareFramebuffer) -> Option<&FramebufferDesc<SoftwareTexture>> {
        self.framebuffers.get(&framebuffer.0)
    }

    pub fn sampler(&self, sampler: SoftwareSampler) -> Option<&SamplerParams> {
        self.samplers.get(sampler.0 as usize)
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsBackend for SoftwareBackend {
    type Texture = SoftwareTexture;
    type Sampler = SoftwareSampler;
    type Framebuffer = SoftwareFramebuffer;

    fn needs_conversion(&self, format: PixelFormat) -> bool {
        self.convert_colors && format.surface_type() == SurfaceType::Color
    }

    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<SoftwareTexture, BackendError> {
        if desc.custom_format.is_none() && desc.format == PixelFormat::Invalid {
            return Err(BackendError::UnsupportedFormat(desc.format));
        }
        let bpp = desc.bytes_per_pixel() as usize;
        let scale = usize::from(desc.res_scale);
        let level_sizes: Vec<usize> = (0..desc.levels.max(1))
            .map(|level| {
                let width = (desc.width >> level).max(1) as usize * scale;
                let height = (desc.height >> level).max(1) as usize * scale;
                width * height * bpp
            })
            .collect();
        let requested = level_sizes.iter().sum::<usize>() as u64 * u64::from(desc.layers.max(1));
        if let Some(limit) = self.memory_limit {
            if self.allocated_bytes + requested > limit {
                return Err(BackendError::OutOfMemory { requested });
            }
        }

        let layers = (0..desc.layers.max(1))
            .map(|_| level_sizes.iter().map(|size| vec![0u8; *size]).collect())
            .collect();
        let id = self.next_id();
        self.allocated_bytes += requested;
        self.textures.insert(id, TextureData { desc: *desc, bpp, layers });
        Ok(SoftwareTexture(id))
    }

    fn destroy_texture(&mut self, texture: SoftwareTexture) {
        if let Some(data) = self.textures.remove(&texture.0) {
            let bytes: usize = data.layers.iter().flatten().map(Vec::len).sum();
            self.allocated_bytes -= bytes as u64;
        }
    }

    fn upload(&mut self, texture: SoftwareTexture, upload: &TextureUpload<'_>) {
        let Some(data) = self.textures.get_mut(&texture.0) else {
            return;
        };
        let scale = u32::from(data.desc.res_scale);
        let bpp = data.bpp;
        let rect = upload.rect;
        let row_pixels = rect.width() as usize;
        for y in 0..rect.height() * scale {
            for x in 0..rect.width() * scale {
                let src = ((y / scale) as usize * row_pixels + (x / scale) as usize) * bpp;
                let Some(pixel) = upload.data.get(src..src + bpp) else {
                    continue;
                };
                let (dx, dy) = (rect.left * scale + x, rect.min_y() * scale + y);
                if let Some(dst) = data.pixel_mut(0, upload.level, dx, dy) {
                    dst.copy_from_slice(pixel);
                }
            }
        }
    }

    fn download(&mut self, texture: SoftwareTexture, download: &TextureDownload) -> Vec<u8> {
        let Some(data) = self.textures.get(&texture.0) else {
            return Vec::new();
        };
        let scale = u32::from(data.desc.res_scale);
        let rect = download.rect;
        let mut out = Vec::with_capacity(rect.width() as usize * rect.height() as usize * data.bpp);
        for y in rect.min_y()..rect.min_y() + rect.height() {
            for x in rect.left..rect.left + rect.width() {
                match data.pixel(0, download.level, x * scale, y * scale) {
                    Some(pixel) => out.extend_from_slice(pixel),
                    None => out.resize(out.len() + data.bpp, 0),
                }
            }
        }
        out
    }

    fn blit(&mut self, src: SoftwareTexture, dst: SoftwareTexture, blit: &TextureBlit) -> bool {
        let (Some(src_data), Some(dst_data)) = (self.textures.get(&src.0), self.textures.get(&dst.0)) else {
            return false;
        };
        if !formats_blittable(src_data.format(), dst_data.format()) {
            return false;
        }

        let same_layout = src_data.format() == dst_data.format() && src_data.bpp == dst_data.bpp;
        let (src_rect, dst_rect) = (blit.src_rect, blit.dst_rect);
        let mirrored = src_rect.is_flipped() != dst_rect.is_flipped();
        let mut writes = Vec::with_capacity(dst_rect.width() as usize * dst_rect.height() as usize);
        for ty in 0..dst_rect.height() {
            let sy = map_coord(ty, dst_rect.height(), src_rect.min_y(), src_rect.height(), mirrored);
            for tx in 0..dst_rect.width() {
                let sx = map_coord(tx, dst_rect.width(), src_rect.left, src_rect.width(), false);
                let Some(pixel) = src_data.pixel(0, blit.src_level, sx, sy) else {
                    continue;
                };
                let mut out = vec![0u8; dst_data.bpp];
                if same_layout {
                    out.copy_from_slice(pixel);
                } else {
                    dst_data.write_texel(src_data.read_texel(pixel), &mut out);
                }
                writes.push((dst_rect.left + tx, dst_rect.min_y() + ty, out));
            }
        }

        let Some(dst_data) = self.textures.get_mut(&dst.0) else {
            return false;
        };
        for (x, y, pixel) in writes {
            if let Some(target) = dst_data.pixel_mut(0, blit.dst_level, x, y) {
                target.copy_from_slice(&pixel);
            }
        }
        true
    }

    fn clear(&mut self, texture: SoftwareTexture, clear: &TextureClear) -> bool {
        let Some(data) = self.textures.get_mut(&texture.0) else {
            return false;
        };
        let mut pixel = vec![0u8; data.bpp];
        data.write_texel(clear_texel(clear.value), &mut pixel);
        let rect = clear.rect;
        for y in rect.min_y()..rect.min_y() + rect.height() {
            for x in rect.left..rect.left + rect.width() {
                if let Some(target) = data.pixel_mut(0, clear.level, x, y) {
                    target.copy_from_slice(&pixel);
                }
            }
        }
        true
    }

    fn copy(&mut self, src: SoftwareTexture, dst: SoftwareTexture, copy: &TextureCopy) {
        let Some(src_data) = self.textures.get(&src.0) else {
            return;
        };
        let (width, height) = copy.extent;
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = (copy.src_offset.0 + x, copy.src_offset.1 + y);
                if let Some(pixel) = src_data.pixel(copy.src_layer, copy.src_level, sx, sy) {
                    pixels.push((x, y, pixel.to_vec()));
                }
            }
        }
        let Some(dst_data) = self.textures.get_mut(&dst.0) else {
            return;
        };
        for (x, y, pixel) in pixels {
            let (dx, dy) = (copy.dst_offset.0 + x, copy.dst_offset.1 + y);
            if let Some(target) = dst_data.pixel_mut(copy.dst_layer, copy.dst_level, dx, dy) {
                if target.len() == pixel.len() {
                    target.copy_from_slice(&pixel);
                }
            }
        }
    }

    fn create_sampler(&mut self, params: &SamplerParams) -> SoftwareSampler {
        self.samplers.push(*params);
        SoftwareSampler(self.samplers.len() as u32 - 1)
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc<SoftwareTexture>) -> SoftwareFramebuffer {
        let id = self.next_id();
        self.framebuffers.insert(id, *desc);
        SoftwareFramebuffer(id)
    }

    fn destroy_framebuffer(&mut self, framebuffer: SoftwareFramebuffer) {
        self.framebuffers.remove(&framebuffer.0);
    }
}
