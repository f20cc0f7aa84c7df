//! The interface between the cache and a host graphics API.
//!
//! The cache decides *what* has to move between guest memory and host
//! textures; a [`GraphicsBackend`] only knows how to allocate textures and
//! move rectangles of already-decoded pixels around. Rectangles use a
//! bottom-left origin and pixel buffers store rows bottom-up, matching the
//! codec's linear layout.

use core::fmt::Debug;

use pica_texture_codec::PixelFormat;

use crate::material::{CustomPixelFormat, MaterialData};
use crate::params::TextureType;
use crate::rect::Rect;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("out of texture memory ({requested} bytes requested)")]
    OutOfMemory { requested: u64 },

    #[error("pixel format {0} is not supported by the backend")]
    UnsupportedFormat(PixelFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Unscaled size of level 0.
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub layers: u32,
    pub res_scale: u16,
    pub texture_type: TextureType,
    pub format: PixelFormat,
    /// Set when the texture stores a replacement material instead of guest
    /// pixels.
    pub custom_format: Option<CustomPixelFormat>,
    /// Whether pixels are exchanged in the converted 4-byte layout.
    pub converted: bool,
}

impl TextureDesc {
    /// Bytes per pixel of the buffers exchanged with `upload`/`download`.
    /// Custom textures are read back as RGBA8.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.custom_format {
            Some(_) => 4,
            None => self.format.linear_bytes_per_pixel(self.converted),
        }
    }

    pub fn scaled_width(&self) -> u32 {
        self.width * u32::from(self.res_scale)
    }

    pub fn scaled_height(&self) -> u32 {
        self.height * u32::from(self.res_scale)
    }
}

/// Uploads `data` (rows of `rect.width()` pixels, bottom-up) into the
/// unscaled `rect` of `level`. The backend scales it to the texture's
/// resolution.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    pub level: u32,
    pub rect: Rect,
    pub data: &'a [u8],
}

/// Reads back the unscaled `rect` of `level`.
#[derive(Debug, Clone, Copy)]
pub struct TextureDownload {
    pub level: u32,
    pub rect: Rect,
}

/// Scaled rectangles; either may be vertically flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBlit {
    pub src_level: u32,
    pub dst_level: u32,
    pub src_rect: Rect,
    pub dst_rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    Depth(f32),
    DepthStencil { depth: f32, stencil: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureClear {
    pub level: u32,
    /// Scaled.
    pub rect: Rect,
    pub value: ClearValue,
}

/// Raw texel copy between two textures of identical format and scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopy {
    pub src_level: u32,
    pub dst_level: u32,
    pub src_layer: u32,
    pub dst_layer: u32,
    /// Scaled offsets and extent.
    pub src_offset: (u32, u32),
    pub dst_offset: (u32, u32),
    pub extent: (u32, u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    ClampToBorder,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub mip_filter: TextureFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub border_color: u32,
    pub lod_min: u32,
    pub lod_max: u32,
    /// Signed 1.4.8 fixed point, as programmed.
    pub lod_bias: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc<T> {
    pub color: Option<(T, u32)>,
    pub depth: Option<(T, u32)>,
    pub depth_has_stencil: bool,
    /// Scaled.
    pub width: u32,
    pub height: u32,
}

pub trait GraphicsBackend {
    type Texture: Copy + Debug;
    type Sampler: Copy + Debug;
    type Framebuffer: Copy + Debug;

    /// Whether textures of `format` must be exchanged in the converted
    /// 4-byte layout.
    fn needs_conversion(&self, format: PixelFormat) -> bool;

    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<Self::Texture, BackendError>;
    fn destroy_texture(&mut self, texture: Self::Texture);

    fn upload(&mut self, texture: Self::Texture, upload: &TextureUpload<'_>);
    fn download(&mut self, texture: Self::Texture, download: &TextureDownload) -> Vec<u8>;

    /// Scaled blit with format conversion. Returns `false` if the formats
    /// can't be blitted.
    fn blit(&mut self, src: Self::Texture, dst: Self::Texture, blit: &TextureBlit) -> bool;
    fn clear(&mut self, texture: Self::Texture, clear: &TextureClear) -> bool;
    fn copy(&mut self, src: Self::Texture, dst: Self::Texture, copy: &TextureCopy);

    fn supports_custom_format(&self, format: CustomPixelFormat) -> bool {
        format == CustomPixelFormat::Rgba8
    }

    /// Uploads a decoded replacement material into `level`.
    fn upload_material(&mut self, texture: Self::Texture, material: &MaterialData, level: u32) {
        self.upload(
            texture,
            &TextureUpload {
                level,
                rect: Rect::from_extent(material.width >> level, material.height >> level),
                data: &material.color,
            },
        );
    }

    fn create_sampler(&mut self, params: &SamplerParams) -> Self::Sampler;
    fn create_framebuffer(&mut self, desc: &FramebufferDesc<Self::Texture>) -> Self::Framebuffer;
    fn destroy_framebuffer(&mut self, framebuffer: Self::Framebuffer);
}
