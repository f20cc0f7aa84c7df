//! `pica-surface-cache` keeps host textures in sync with the PICA200 guest
//! memory they mirror.
//!
//! The crate provides:
//! - [`RasterizerCache`]: surface lookup for textures, render targets and
//!   transfers, with lazy write-back of GPU-rendered data.
//! - [`GraphicsBackend`]: the small texture API the cache drives, with a CPU
//!   reference implementation in [`software`].
//! - [`GuestMemory`]: access to emulated physical memory.
//! - Replacement texture support through [`CustomTextureProvider`].
#![forbid(unsafe_code)]

pub mod backend;
mod cache;
mod error;
pub mod interval;
pub mod material;
pub mod memory;
pub mod params;
pub mod rect;
pub mod slot;
pub mod software;
pub mod stats;
pub mod surface;

pub use backend::{BackendError, ClearValue, GraphicsBackend, SamplerParams, TextureDesc};
pub use cache::{
    DisplayTransferConfig, FillValue, FramebufferConfig, FramebufferHelper, FramebufferParams, MatchFlags,
    MemoryFillConfig, RasterizerCache, RasterizerCacheOptions, ScaleMatch, Surface, TextureCopyConfig,
    TextureCubeConfig, TextureInfo, TransferScaling, ViewportRect,
};
pub use error::CacheError;
pub use interval::SurfaceInterval;
pub use material::{CustomPixelFormat, CustomTextureProvider, DecodeState, Material, MaterialData};
pub use memory::{GuestMemory, GuestMemoryError, VecGuestMemory};
pub use params::{SurfaceParams, TextureType};
pub use rect::Rect;
pub use slot::{FramebufferId, SamplerId, SurfaceId};
pub use stats::{CacheStats, CacheStatsSnapshot};
