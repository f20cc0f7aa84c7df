//! The surface cache.
//!
//! [`RasterizerCache`] maps guest memory ranges to host textures. Surfaces are
//! looked up through a coarse page table, kept coherent with guest memory via
//! per-surface invalid regions plus a global map of which surface owns the
//! latest copy of each byte, and destroyed lazily a few frames after they
//! stop being reachable.

mod custom;
mod framebuffer;
mod matching;
mod texture_cube;
mod transfer;
mod validate;

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};

use pica_texture_codec::{PixelFormat, SurfaceType};

use crate::backend::{GraphicsBackend, SamplerParams, TextureBlit, TextureCopy, TextureDesc};
use crate::error::CacheError;
use crate::interval::{IntervalMap, SurfaceInterval};
use crate::material::CustomTextureProvider;
use crate::memory::GuestMemory;
use crate::params::{SurfaceParams, TextureType};
use crate::rect::Rect;
use crate::slot::{FramebufferId, FramebufferSlot, SamplerId, SamplerSlot, SlotVector, SurfaceId, SurfaceSlot};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::surface::SurfaceBase;

pub use framebuffer::{FramebufferConfig, FramebufferHelper, FramebufferParams, ViewportRect};
pub use matching::{MatchFlags, ScaleMatch};
pub use texture_cube::TextureCubeConfig;
pub use transfer::{DisplayTransferConfig, FillValue, MemoryFillConfig, TextureCopyConfig, TransferScaling};

use custom::PendingUpload;
use framebuffer::CachedFramebuffer;
use texture_cube::TextureCube;

/// Page size of the surface lookup table.
const PAGE_BITS: u32 = 18;
/// Granularity at which guest memory is told about cached ranges.
const CACHED_PAGE_BITS: u32 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterizerCacheOptions {
    pub resolution_scale_factor: u16,
    /// Create sampled textures at `resolution_scale_factor` too.
    pub scale_textures: bool,
    /// Frames an unreferenced surface is kept before it is destroyed.
    pub gc_retention_frames: u64,
    pub use_custom_textures: bool,
    pub dump_textures: bool,
    pub max_custom_uploads_per_tick: usize,
}

impl Default for RasterizerCacheOptions {
    fn default() -> Self {
        Self {
            resolution_scale_factor: 1,
            scale_textures: false,
            gc_retention_frames: 2,
            use_custom_textures: false,
            dump_textures: false,
            max_custom_uploads_per_tick: 8,
        }
    }
}

/// Sampled texture as programmed in a texture unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureInfo {
    pub addr: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

pub struct Surface<B: GraphicsBackend> {
    base: SurfaceBase,
    texture: Option<B::Texture>,
    registered: bool,
}

impl<B: GraphicsBackend> Surface<B> {
    /// `None` for fill surfaces.
    pub fn texture(&self) -> Option<B::Texture> {
        self.texture
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

impl<B: GraphicsBackend> Deref for Surface<B> {
    type Target = SurfaceBase;

    fn deref(&self) -> &SurfaceBase {
        &self.base
    }
}

impl<B: GraphicsBackend> DerefMut for Surface<B> {
    fn deref_mut(&mut self) -> &mut SurfaceBase {
        &mut self.base
    }
}

pub struct RasterizerCache<B: GraphicsBackend, M: GuestMemory> {
    backend: B,
    memory: M,
    options: RasterizerCacheOptions,
    pending_options: Option<RasterizerCacheOptions>,
    custom: Option<Box<dyn CustomTextureProvider>>,
    stats: CacheStats,
    frame_tick: u64,

    slot_surfaces: SlotVector<SurfaceSlot, Surface<B>>,
    slot_samplers: SlotVector<SamplerSlot, B::Sampler>,
    slot_framebuffers: SlotVector<FramebufferSlot, CachedFramebuffer<B>>,
    samplers: HashMap<SamplerParams, SamplerId>,
    framebuffers: HashMap<FramebufferParams, FramebufferId>,
    texture_cubes: HashMap<TextureCubeConfig, TextureCube>,

    page_table: HashMap<u32, Vec<SurfaceId>>,
    cached_pages: HashMap<u32, u32>,
    dirty_regions: IntervalMap<SurfaceId>,
    sentenced: VecDeque<(SurfaceId, u64)>,
    custom_uploads: VecDeque<PendingUpload>,
    /// Attachments of the last framebuffer handed out.
    bound: Vec<SurfaceId>,
}

impl<B: GraphicsBackend, M: GuestMemory> RasterizerCache<B, M> {
    pub fn new(backend: B, memory: M, options: RasterizerCacheOptions) -> Self {
        Self {
            backend,
            memory,
            options,
            pending_options: None,
            custom: None,
            stats: CacheStats::new(),
            frame_tick: 0,
            slot_surfaces: SlotVector::new(),
            slot_samplers: SlotVector::new(),
            slot_framebuffers: SlotVector::new(),
            samplers: HashMap::new(),
            framebuffers: HashMap::new(),
            texture_cubes: HashMap::new(),
            page_table: HashMap::new(),
            cached_pages: HashMap::new(),
            dirty_regions: IntervalMap::new(),
            sentenced: VecDeque::new(),
            custom_uploads: VecDeque::new(),
            bound: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Raw guest memory access. Writes made here are invisible to the cache;
    /// use [`write_guest_memory`](Self::write_guest_memory) for CPU writes.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn options(&self) -> &RasterizerCacheOptions {
        &self.options
    }

    /// Takes effect on the next [`tick_frame`](Self::tick_frame).
    pub fn set_options(&mut self, options: RasterizerCacheOptions) {
        self.pending_options = Some(options);
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn frame_tick(&self) -> u64 {
        self.frame_tick
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface<B>> {
        self.slot_surfaces.get(id)
    }

    /// Surfaces reachable through lookups.
    pub fn registered(&self) -> impl Iterator<Item = (SurfaceId, &Surface<B>)> + '_ {
        self.slot_surfaces.iter().filter(|(_, surface)| surface.registered)
    }

    pub fn registered_surfaces(&self) -> usize {
        self.registered().count()
    }

    /// Surfaces waiting for the garbage collector.
    pub fn sentenced_surfaces(&self) -> usize {
        self.sentenced.len()
    }

    /// Surface holding the newest copy of the byte at `addr`, if it hasn't
    /// been written back yet.
    pub fn dirty_owner(&self, addr: u32) -> Option<SurfaceId> {
        self.dirty_regions
            .overlapping(SurfaceInterval::from_size(addr, 1))
            .first()
            .map(|(_, id)| *id)
    }

    /// Regions whose newest copy lives in a surface, with their owners.
    pub fn dirty_regions(&self) -> Vec<(SurfaceInterval, SurfaceId)> {
        self.dirty_regions.iter().collect()
    }

    /// CPU write: invalidates cached copies, then updates guest memory.
    pub fn write_guest_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), CacheError> {
        self.invalidate_region(addr, data.len() as u32, SurfaceId::NULL)?;
        if let Err(err) = self.memory.write(addr, data) {
            tracing::warn!(%err, "dropping CPU write outside guest memory");
        }
        Ok(())
    }

    /// CPU read: writes back dirty surfaces first.
    pub fn read_guest_memory(&mut self, addr: u32, dst: &mut [u8]) -> Result<(), CacheError> {
        self.flush_region(addr, dst.len() as u32, SurfaceId::NULL)?;
        if let Err(err) = self.memory.read(addr, dst) {
            tracing::warn!(%err, "CPU read outside guest memory");
            dst.fill(0);
        }
        Ok(())
    }

    pub fn get_surface(
        &mut self,
        params: &SurfaceParams,
        match_scale: ScaleMatch,
        load_if_create: bool,
    ) -> Result<SurfaceId, CacheError> {
        if params.width == 0 || params.height == 0 {
            return Ok(SurfaceId::NULL);
        }
        if params.is_tiled && (params.width % 8 != 0 || params.height % 8 != 0) {
            tracing::error!(
                addr = params.addr,
                width = params.width,
                height = params.height,
                "tiled surface size is not a multiple of 8"
            );
            return Err(CacheError::UnalignedTiledSurface {
                addr: params.addr,
                width: params.width,
                height: params.height,
            });
        }
        debug_assert_eq!(params.width, params.stride, "use get_surface_sub_rect for surfaces with a gap");

        let mut surface_id = self.find_match(params, MatchFlags::EXACT, match_scale, None);
        if surface_id.is_null() {
            let mut target_scale = params.res_scale;
            if match_scale != ScaleMatch::Exact {
                // A surface we could later expand into decides the scale. Depth
                // buffers are often read back as RGBA8, so look at those too.
                let mut find_params = *params;
                let mut formats = vec![params.pixel_format];
                if params.pixel_format == PixelFormat::Rgba8 {
                    formats.push(PixelFormat::D24s8);
                }
                for format in formats {
                    find_params.pixel_format = format;
                    let expandable = self.find_match(&find_params, MatchFlags::EXPAND, match_scale, None);
                    if let Some(surface) = self.slot_surfaces.get(expandable) {
                        target_scale = target_scale.max(surface.params.res_scale);
                    }
                }
            }
            surface_id = self.create_surface(params.with_res_scale(target_scale))?;
            self.register_surface(surface_id);
        }

        if load_if_create {
            self.validate_surface(surface_id, params.addr, params.size)?;
        }
        Ok(surface_id)
    }

    /// Like [`get_surface`](Self::get_surface), but accepts any surface that
    /// contains `params` and returns the scaled rectangle it occupies.
    pub fn get_surface_sub_rect(
        &mut self,
        params: &SurfaceParams,
        match_scale: ScaleMatch,
        load_if_create: bool,
    ) -> Result<(SurfaceId, Rect), CacheError> {
        if params.width == 0 || params.height == 0 {
            return Ok((SurfaceId::NULL, Rect::default()));
        }

        let mut surface_id = self.find_match(params, MatchFlags::SUB_RECT, match_scale, None);

        // The match failed only because of scaling: create a copy at the
        // requested scale so the old one stops being chosen.
        if surface_id.is_null() && match_scale != ScaleMatch::Ignore {
            let candidate = self.find_match(params, MatchFlags::SUB_RECT, ScaleMatch::Ignore, None);
            if let Some(surface) = self.slot_surfaces.get(candidate) {
                let new_params = surface.params.with_res_scale(params.res_scale);
                surface_id = self.create_surface(new_params)?;
                self.register_surface(surface_id);
            }
        }

        let mut aligned = *params;
        if params.is_tiled {
            aligned.width = params.width.next_multiple_of(8);
            aligned.height = params.height.next_multiple_of(8);
            aligned.stride = params.stride.next_multiple_of(8);
            aligned.update_params();
        }

        if surface_id.is_null() {
            let expandable = self.find_match(&aligned, MatchFlags::EXPAND, match_scale, None);
            if let Some(surface) = self.slot_surfaces.get(expandable) {
                aligned.width = aligned.stride;
                aligned.update_params();

                let mut new_params = surface.params;
                let start = aligned.addr.min(new_params.addr);
                let end = aligned.end.max(new_params.end);
                new_params.addr = start;
                new_params.height = (end - start) / aligned.bytes_in_pixels(aligned.stride).max(1);
                new_params.update_params();
                tracing::debug!(old = %surface.params, new = %new_params, "expanding surface");

                let new_id = self.create_surface(new_params)?;
                self.duplicate_surface(expandable, new_id);
                self.unregister_surface(expandable);
                self.register_surface(new_id);
                surface_id = new_id;
            }
        }

        if surface_id.is_null() {
            let mut new_params = aligned;
            new_params.width = aligned.stride;
            new_params.update_params();
            surface_id = self.get_surface(&new_params, match_scale, load_if_create)?;
        } else if load_if_create {
            self.validate_surface(surface_id, aligned.addr, aligned.size)?;
        }

        let rect = self
            .slot_surfaces
            .get(surface_id)
            .map(|surface| surface.params.scaled_sub_rect(params))
            .unwrap_or_default();
        Ok((surface_id, rect))
    }

    /// Surface for the source of a raw texture copy. `params` describes the
    /// copy in bytes: `width` and `stride` are byte counts per line.
    pub fn get_tex_copy_surface(&mut self, params: &SurfaceParams) -> Result<(SurfaceId, Rect), CacheError> {
        let surface_id = self.find_match(params, MatchFlags::TEX_COPY, ScaleMatch::Ignore, None);
        if surface_id.is_null() {
            return Ok((SurfaceId::NULL, Rect::default()));
        }
        self.validate_surface(surface_id, params.addr, params.size)?;

        let surface = &self.slot_surfaces[surface_id];
        let sub = if params.width != params.stride {
            let tiled_size = if surface.params.is_tiled { 8 } else { 1 };
            SurfaceParams {
                width: surface.params.pixels_in_bytes(params.width) / tiled_size,
                stride: surface.params.pixels_in_bytes(params.stride) / tiled_size,
                height: params.height * tiled_size,
                ..*params
            }
        } else {
            surface.params.from_interval(params.interval())
        };
        Ok((surface_id, surface.params.scaled_sub_rect(&sub)))
    }

    /// Surface for a sampled texture with `max_level + 1` mip levels.
    pub fn get_texture_surface(&mut self, info: &TextureInfo, max_level: u32) -> Result<SurfaceId, CacheError> {
        if info.addr == 0 {
            return Ok(SurfaceId::NULL);
        }
        let res_scale = if self.options.scale_textures {
            self.options.resolution_scale_factor
        } else {
            1
        };
        let mut params = SurfaceParams::new(info.addr, info.width, info.height, info.format, true)
            .with_levels(max_level + 1)
            .with_res_scale(res_scale);

        let min_width = info.width >> max_level;
        let min_height = info.height >> max_level;
        if min_width % 8 != 0 || min_height % 8 != 0 {
            if min_width % 4 != 0 || min_height % 4 != 0 {
                tracing::error!(min_width, min_height, "texture size is not a multiple of 4");
                return Ok(SurfaceId::NULL);
            }
            // Sample a copy cut out of an enclosing surface.
            let (src_id, src_rect) = self.get_surface_sub_rect(&params, ScaleMatch::Ignore, true)?;
            let Some(src) = self.slot_surfaces.get(src_id) else {
                return Ok(SurfaceId::NULL);
            };
            let src_texture = src.texture;
            let src_level = src.params.level_of(params.addr);
            params.res_scale = src.params.res_scale;

            let tmp_id = self.create_surface(params)?;
            self.sentenced.push_back((tmp_id, self.frame_tick));
            let tmp = &mut self.slot_surfaces[tmp_id];
            tmp.mark_valid(params.interval());
            if let (Some(src_texture), Some(dst_texture)) = (src_texture, tmp.texture) {
                let blit = TextureBlit {
                    src_level,
                    dst_level: 0,
                    src_rect,
                    dst_rect: params.scaled_rect(0),
                };
                self.backend.blit(src_texture, dst_texture, &blit);
            }
            return Ok(tmp_id);
        }
        if info.width != min_width << max_level || info.height != min_height << max_level {
            tracing::error!(
                width = info.width,
                height = info.height,
                max_level,
                "texture size does not support mip chain"
            );
            return Ok(SurfaceId::NULL);
        }
        self.get_surface(&params, ScaleMatch::Ignore, true)
    }

    pub fn get_sampler(&mut self, params: &SamplerParams) -> SamplerId {
        if let Some(id) = self.samplers.get(params) {
            return *id;
        }
        let sampler = self.backend.create_sampler(params);
        let id = self.slot_samplers.insert(sampler);
        self.samplers.insert(*params, id);
        id
    }

    pub fn sampler(&self, id: SamplerId) -> Option<B::Sampler> {
        self.slot_samplers.get(id).copied()
    }

    /// Advances the frame counter: applies finished replacement textures,
    /// collects garbage and applies pending option changes.
    pub fn tick_frame(&mut self) -> Result<(), CacheError> {
        self.process_custom_uploads()?;
        self.run_garbage_collector()?;

        if let Some(pending) = self.pending_options.take() {
            let rebuild = pending.resolution_scale_factor != self.options.resolution_scale_factor
                || pending.scale_textures != self.options.scale_textures
                || pending.use_custom_textures != self.options.use_custom_textures;
            self.options = pending;
            if rebuild {
                tracing::debug!(scale = pending.resolution_scale_factor, "rebuilding surface cache");
                self.unregister_all()?;
            }
        }
        Ok(())
    }

    /// Destroys sentenced surfaces older than the retention window.
    pub fn run_garbage_collector(&mut self) -> Result<(), CacheError> {
        self.frame_tick += 1;
        let retention = self.options.gc_retention_frames;
        let mut kept = VecDeque::with_capacity(self.sentenced.len());
        let mut swept = 0usize;
        while let Some((surface_id, tick)) = self.sentenced.pop_front() {
            if self.frame_tick - tick <= retention {
                kept.push_back((surface_id, tick));
                continue;
            }
            if self.bound.contains(&surface_id) {
                kept.push_back((surface_id, self.frame_tick));
                continue;
            }
            if self.slot_surfaces.contains(surface_id) {
                self.destroy_surface(surface_id)?;
                swept += 1;
            }
        }
        self.sentenced = kept;
        self.stats.inc_gc_sweeps();
        if swept > 0 {
            tracing::trace!(swept, frame = self.frame_tick, "garbage collected surfaces");
        }
        Ok(())
    }

    /// Writes back every dirty region.
    pub fn flush_all(&mut self) -> Result<(), CacheError> {
        self.flush_region(0, u32::MAX, SurfaceId::NULL)
    }

    /// Drops every surface, optionally writing dirty data back first.
    pub fn clear_all(&mut self, flush: bool) -> Result<(), CacheError> {
        if flush {
            self.flush_all()?;
        }
        let mut pages: Vec<u32> = self.cached_pages.keys().copied().collect();
        pages.sort_unstable();
        for page in pages {
            self.memory.mark_region_cached(page << CACHED_PAGE_BITS, 1 << CACHED_PAGE_BITS, false);
        }
        self.cached_pages.clear();
        self.dirty_regions.clear();
        self.page_table.clear();
        self.sentenced.clear();
        self.texture_cubes.clear();
        self.custom_uploads.clear();
        self.bound.clear();

        for id in self.slot_framebuffers.ids() {
            if let Some(framebuffer) = self.slot_framebuffers.remove(id) {
                self.backend.destroy_framebuffer(framebuffer.handle);
            }
        }
        self.framebuffers.clear();

        for id in self.slot_surfaces.ids() {
            if let Some(surface) = self.slot_surfaces.remove(id) {
                if let Some(texture) = surface.texture {
                    self.backend.destroy_texture(texture);
                }
                self.stats.inc_surfaces_destroyed();
            }
        }
        Ok(())
    }

    fn texture_desc(&self, params: &SurfaceParams) -> TextureDesc {
        TextureDesc {
            width: params.width,
            height: params.height,
            levels: params.levels,
            layers: if params.texture_type == TextureType::CubeMap { 6 } else { 1 },
            res_scale: params.res_scale,
            texture_type: params.texture_type,
            format: params.pixel_format,
            custom_format: None,
            converted: self.backend.needs_conversion(params.pixel_format),
        }
    }

    fn allocate(&mut self, params: &SurfaceParams, desc: &TextureDesc) -> Result<B::Texture, CacheError> {
        self.backend.allocate_texture(desc).map_err(|source| {
            tracing::error!(%source, surface = %params, "texture allocation failed");
            CacheError::Allocation {
                addr: params.addr,
                width: desc.width,
                height: desc.height,
                format: params.pixel_format,
                res_scale: desc.res_scale,
                source,
            }
        })
    }

    /// Creates an unregistered surface, reusing a sentenced one with the same
    /// parameters when possible. The new surface is entirely invalid.
    fn create_surface(&mut self, params: SurfaceParams) -> Result<SurfaceId, CacheError> {
        let reusable = self.sentenced.iter().position(|(id, _)| {
            self.slot_surfaces
                .get(*id)
                .is_some_and(|surface| !surface.registered && surface.params == params)
        });
        if let Some((surface_id, _)) = reusable.and_then(|pos| self.sentenced.remove(pos)) {
            self.flush_owned(surface_id)?;
            self.slot_surfaces[surface_id].mark_invalid(params.interval());
            tracing::trace!(surface = %params, "reusing sentenced surface");
            return Ok(surface_id);
        }

        let texture = if params.surface_type == SurfaceType::Fill {
            None
        } else {
            let desc = self.texture_desc(&params);
            Some(self.allocate(&params, &desc)?)
        };
        let surface_id = self.slot_surfaces.insert(Surface {
            base: SurfaceBase::new(params),
            texture,
            registered: false,
        });
        self.stats.inc_surfaces_created();
        tracing::trace!(surface = %params, ?surface_id, "created surface");
        Ok(surface_id)
    }

    fn register_surface(&mut self, surface_id: SurfaceId) {
        let surface = &mut self.slot_surfaces[surface_id];
        debug_assert!(!surface.registered, "surface registered twice");
        surface.registered = true;
        let (addr, size) = (surface.params.addr, surface.params.size);
        self.update_pages_cached_count(addr, size, true);
        for page in pages(addr, size, PAGE_BITS) {
            self.page_table.entry(page).or_default().push(surface_id);
        }
    }

    /// Removes a surface from lookups and hands it to the garbage collector.
    fn unregister_surface(&mut self, surface_id: SurfaceId) {
        let Some(surface) = self.slot_surfaces.get_mut(surface_id) else {
            return;
        };
        if !surface.registered {
            return;
        }
        surface.registered = false;
        let (addr, size, ty) = (surface.params.addr, surface.params.size, surface.params.surface_type);

        if ty != SurfaceType::Fill {
            self.remove_texture_cubes_of(surface_id);
            self.discard_custom_uploads(surface_id);
        }
        self.update_pages_cached_count(addr, size, false);
        for page in pages(addr, size, PAGE_BITS) {
            if let Some(list) = self.page_table.get_mut(&page) {
                list.retain(|id| *id != surface_id);
                if list.is_empty() {
                    self.page_table.remove(&page);
                }
            }
        }
        self.sentenced.push_back((surface_id, self.frame_tick));
    }

    fn unregister_all(&mut self) -> Result<(), CacheError> {
        self.flush_all()?;
        let registered: Vec<SurfaceId> = self.registered().map(|(id, _)| id).collect();
        for surface_id in registered {
            self.unregister_surface(surface_id);
        }
        for (_, cube) in self.texture_cubes.drain() {
            self.sentenced.push_back((cube.surface, self.frame_tick));
        }
        Ok(())
    }

    fn destroy_surface(&mut self, surface_id: SurfaceId) -> Result<(), CacheError> {
        self.flush_owned(surface_id)?;
        self.remove_framebuffers(surface_id);
        if let Some(surface) = self.slot_surfaces.remove(surface_id) {
            if let Some(texture) = surface.texture {
                self.backend.destroy_texture(texture);
            }
            self.stats.inc_surfaces_destroyed();
        }
        Ok(())
    }

    /// Writes back the regions `surface_id` still owns.
    fn flush_owned(&mut self, surface_id: SurfaceId) -> Result<(), CacheError> {
        for interval in self.dirty_regions.intervals_of(surface_id) {
            self.flush_region(interval.start, interval.len(), surface_id)?;
        }
        Ok(())
    }

    /// Copies the contents, invalid regions and dirty ownership of `src` into
    /// the larger `dst`.
    fn duplicate_surface(&mut self, src_id: SurfaceId, dst_id: SurfaceId) {
        let src = &self.slot_surfaces[src_id];
        let (src_params, src_texture) = (src.params, src.texture);
        let src_invalid: Vec<SurfaceInterval> = src.invalid_regions().iter().collect();
        let dst = &self.slot_surfaces[dst_id];
        debug_assert!(dst.params.addr <= src_params.addr && dst.params.end >= src_params.end);

        let src_rect = src_params.scaled_rect(0);
        let dst_rect = dst.params.scaled_sub_rect(&src_params);
        if let (Some(src_texture), Some(dst_texture)) = (src_texture, dst.texture) {
            let copy = TextureCopy {
                src_level: 0,
                dst_level: 0,
                src_layer: 0,
                dst_layer: 0,
                src_offset: (src_rect.left, src_rect.min_y()),
                dst_offset: (dst_rect.left, dst_rect.min_y()),
                extent: (src_rect.width(), src_rect.height()),
            };
            self.backend.copy(src_texture, dst_texture, &copy);
        }

        let dst = &mut self.slot_surfaces[dst_id];
        dst.mark_valid(src_params.interval());
        for interval in src_invalid {
            dst.mark_invalid(interval);
        }
        self.dirty_regions.replace_value(src_params.interval(), src_id, dst_id);
    }

    /// Keeps per-4KiB-page surface counts and tells guest memory when a
    /// page gains its first or loses its last surface.
    fn update_pages_cached_count(&mut self, addr: u32, size: u32, increment: bool) {
        for page in pages(addr, size, CACHED_PAGE_BITS) {
            let page_addr = page << CACHED_PAGE_BITS;
            if increment {
                let count = self.cached_pages.entry(page).or_insert(0);
                *count += 1;
                if *count == 1 {
                    self.memory.mark_region_cached(page_addr, 1 << CACHED_PAGE_BITS, true);
                }
            } else if let Some(count) = self.cached_pages.get_mut(&page) {
                *count -= 1;
                if *count == 0 {
                    self.cached_pages.remove(&page);
                    self.memory.mark_region_cached(page_addr, 1 << CACHED_PAGE_BITS, false);
                }
            }
        }
    }

    /// Whether any surface covers part of `[addr, addr + size)`.
    fn is_range_cached(&self, addr: u32, size: u32) -> bool {
        !self.cached_pages.is_empty()
            && pages(addr, size, CACHED_PAGE_BITS).any(|page| self.cached_pages.contains_key(&page))
    }

    /// Registered surfaces overlapping the range, in page then registration
    /// order.
    fn surfaces_in_region(&self, addr: u32, size: u32) -> Vec<SurfaceId> {
        let mut found: Vec<SurfaceId> = Vec::new();
        for page in pages(addr, size, PAGE_BITS) {
            let Some(list) = self.page_table.get(&page) else {
                continue;
            };
            for id in list {
                if found.contains(id) {
                    continue;
                }
                if self.slot_surfaces.get(*id).is_some_and(|s| s.overlaps(addr, size)) {
                    found.push(*id);
                }
            }
        }
        found
    }
}

/// Page indices touched by `[addr, addr + size)`.
fn pages(addr: u32, size: u32, bits: u32) -> impl Iterator<Item = u32> {
    let end = (u64::from(addr) + u64::from(size)).min(1 << 32);
    let first = addr >> bits;
    let last = (end.saturating_sub(1) >> bits) as u32;
    let count = if size == 0 { 0 } else { last - first + 1 };
    (first..).take(count as usize)
}
