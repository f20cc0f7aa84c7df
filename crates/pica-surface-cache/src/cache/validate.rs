//! Keeping surfaces and guest memory coherent.

use pica_texture_codec::{can_decode, can_encode, decode_texture, encode_texture, SurfaceType};

use super::{MatchFlags, RasterizerCache, ScaleMatch};
use crate::backend::{GraphicsBackend, TextureBlit, TextureClear, TextureDownload, TextureUpload};
use crate::error::CacheError;
use crate::interval::{IntervalSet, SurfaceInterval};
use crate::memory::GuestMemory;
use crate::params::SurfaceParams;
use crate::slot::SurfaceId;
use crate::surface::SurfaceBase;

impl<B: GraphicsBackend, M: GuestMemory> RasterizerCache<B, M> {
    /// Makes `[addr, addr + size)` of the surface valid, pulling data from
    /// overlapping surfaces where possible and from guest memory otherwise.
    pub fn validate_surface(&mut self, surface_id: SurfaceId, addr: u32, size: u32) -> Result<(), CacheError> {
        if size == 0 {
            return Ok(());
        }
        let Some(surface) = self.slot_surfaces.get(surface_id) else {
            return Ok(());
        };
        if surface.params.surface_type == SurfaceType::Fill {
            return Ok(());
        }

        let validate_interval = SurfaceInterval::from_size(addr, size);
        if surface.is_custom() && !surface.is_region_valid(validate_interval) {
            // Guest data can't be merged into a replacement texture.
            self.restore_native_texture(surface_id)?;
        }

        let surface = &self.slot_surfaces[surface_id];
        let mut regions = IntervalSet::new();
        for invalid in surface.invalid_regions().overlapping(validate_interval) {
            regions.insert(invalid.intersect(&validate_interval));
        }

        let levels = surface.params.levels;
        let mut level = 0;
        while level < levels {
            let surface_params = self.slot_surfaces[surface_id].params;
            let level_interval = surface_params.level_interval(level);
            let Some(region) = regions.first_overlap(level_interval) else {
                level += 1;
                continue;
            };
            let interval = region.intersect(&level_interval);
            let params = surface_params.from_interval(interval);
            let validated = self.validate_interval(surface_id, &params, interval)?;
            regions.remove(validated.intersect(&interval));
        }
        Ok(())
    }

    /// Fills one rectangle of invalid data. Returns the interval that became
    /// valid, which always overlaps `interval`.
    fn validate_interval(
        &mut self,
        surface_id: SurfaceId,
        params: &SurfaceParams,
        interval: SurfaceInterval,
    ) -> Result<SurfaceInterval, CacheError> {
        let is_fill = |surface: &SurfaceBase| surface.params.surface_type == SurfaceType::Fill;

        let copy_id =
            self.find_match_filtered(params, MatchFlags::COPY, ScaleMatch::Ignore, Some(interval), |s| !is_fill(s));
        if !copy_id.is_null() && copy_id != surface_id {
            let copy_interval = self.slot_surfaces[copy_id].copyable_interval(params);
            self.copy_surface(copy_id, surface_id, copy_interval);
            self.slot_surfaces[surface_id].mark_valid(copy_interval);
            return Ok(copy_interval);
        }

        if let Some(copy_interval) = self.reinterpret_surface(surface_id, params, interval)? {
            return Ok(copy_interval);
        }

        let fill_id = self.find_match_filtered(params, MatchFlags::COPY, ScaleMatch::Ignore, Some(interval), is_fill);
        if !fill_id.is_null() {
            let copy_interval = self.slot_surfaces[fill_id].copyable_interval(params);
            self.copy_surface(fill_id, surface_id, copy_interval);
            self.slot_surfaces[surface_id].mark_valid(copy_interval);
            return Ok(copy_interval);
        }

        // Nothing cached has it; write back anything newer and load from
        // guest memory.
        self.flush_region(params.addr, params.size, SurfaceId::NULL)?;
        self.upload_surface(surface_id, params.interval())?;
        self.slot_surfaces[surface_id].mark_valid(params.interval());
        Ok(params.interval())
    }

    /// Copies `copy_interval` from `src_id` into `dst_id`, by clear for fill
    /// sources and by blit otherwise.
    pub(super) fn copy_surface(&mut self, src_id: SurfaceId, dst_id: SurfaceId, copy_interval: SurfaceInterval) {
        let src = &self.slot_surfaces[src_id];
        let dst = &self.slot_surfaces[dst_id];
        let Some(dst_texture) = dst.texture else {
            return;
        };
        let subrect = dst.params.from_interval(copy_interval);
        let dst_rect = dst.params.scaled_sub_rect(&subrect);
        let dst_level = dst.params.level_of(copy_interval.start);

        if src.params.surface_type == SurfaceType::Fill {
            let clear = TextureClear {
                level: dst_level,
                rect: dst_rect,
                value: src.make_clear_value(copy_interval.start, dst.params.pixel_format),
            };
            self.backend.clear(dst_texture, &clear);
            self.stats.inc_fills();
            return;
        }

        let Some(src_texture) = src.texture else {
            return;
        };
        let blit = TextureBlit {
            src_level: src.params.level_of(copy_interval.start),
            dst_level,
            src_rect: src.params.scaled_sub_rect(&subrect),
            dst_rect,
        };
        if !self.backend.blit(src_texture, dst_texture, &blit) {
            tracing::warn!(src = %src.params, dst = %dst.params, "surface copy rejected by backend");
        }
        self.stats.inc_copies();
    }

    /// Validates from a surface holding the same bytes in another format of
    /// equal bit depth by re-encoding its pixels through guest form.
    fn reinterpret_surface(
        &mut self,
        surface_id: SurfaceId,
        params: &SurfaceParams,
        interval: SurfaceInterval,
    ) -> Result<Option<SurfaceInterval>, CacheError> {
        let donor_id = self.find_match(params, MatchFlags::REINTERPRET, ScaleMatch::Ignore, Some(interval));
        if donor_id.is_null() || donor_id == surface_id {
            return Ok(None);
        }
        let donor = &self.slot_surfaces[donor_id];
        let dst = &self.slot_surfaces[surface_id];
        let copy_interval = donor.copyable_interval(params);
        if copy_interval.is_empty() || donor.is_custom() {
            return Ok(None);
        }

        let src_sub = donor.params.from_interval(copy_interval);
        let dst_sub = dst.params.from_interval(copy_interval);
        let same_shape = src_sub.interval() == copy_interval
            && dst_sub.interval() == copy_interval
            && src_sub.width == dst_sub.width
            && src_sub.height == dst_sub.height
            && src_sub.stride == dst_sub.stride;
        if !same_shape
            || !can_encode(donor.params.pixel_format, donor.params.is_tiled)
            || !can_decode(dst.params.pixel_format, dst.params.is_tiled)
        {
            return Ok(None);
        }
        let (Some(src_texture), Some(dst_texture)) = (donor.texture, dst.texture) else {
            return Ok(None);
        };

        let src_level = donor.params.level_of(copy_interval.start);
        let src_rect = donor.params.sub_rect(&src_sub);
        let dst_level = dst.params.level_of(copy_interval.start);
        let dst_rect = dst.params.sub_rect(&dst_sub);
        tracing::debug!(src = %donor.params, dst = %dst.params, "reinterpreting surface");

        let pixels = self.backend.download(src_texture, &TextureDownload { level: src_level, rect: src_rect });
        let src_convert = self.backend.needs_conversion(src_sub.pixel_format);
        let src_layout = src_sub.layout();
        let mut host = vec![0u8; src_layout.linear_size(src_convert)];
        spread_rows(
            &pixels,
            &mut host,
            src_sub.width,
            src_sub.stride,
            src_sub.pixel_format.linear_bytes_per_pixel(src_convert),
        );
        let mut guest = vec![0u8; copy_interval.len() as usize];
        encode_texture(&src_layout, 0, copy_interval.len(), &host, &mut guest, src_convert)?;

        let dst_convert = self.backend.needs_conversion(dst_sub.pixel_format);
        let dst_layout = dst_sub.layout();
        let mut decoded = vec![0u8; dst_layout.linear_size(dst_convert)];
        decode_texture(&dst_layout, 0, copy_interval.len(), &guest, &mut decoded, dst_convert)?;
        let data = crop_rows(
            &decoded,
            dst_sub.width,
            dst_sub.stride,
            dst_sub.pixel_format.linear_bytes_per_pixel(dst_convert),
        );
        self.backend.upload(dst_texture, &TextureUpload { level: dst_level, rect: dst_rect, data: &data });

        self.slot_surfaces[surface_id].mark_valid(copy_interval);
        self.stats.inc_reinterpretations();
        Ok(Some(copy_interval))
    }

    /// Decodes `interval` from guest memory into the surface's texture.
    pub(super) fn upload_surface(&mut self, surface_id: SurfaceId, interval: SurfaceInterval) -> Result<(), CacheError> {
        let surface = &self.slot_surfaces[surface_id];
        let info = surface.params.from_interval(interval);
        let level = surface.params.level_of(info.addr);
        let whole_level = info.interval() == surface.params.level_interval(level);

        let mut guest = vec![0u8; info.size as usize];
        if let Err(err) = self.memory.read(info.addr, &mut guest) {
            tracing::warn!(%err, surface = %info, "skipping upload of unmapped surface");
            return Ok(());
        }

        let wants_hash = self.custom.is_some() && (self.options.dump_textures || self.options.use_custom_textures);
        let colour = matches!(surface.params.surface_type, SurfaceType::Color | SurfaceType::Texture);
        if wants_hash && colour {
            let hash = xxhash_rust::xxh3::xxh3_64(&guest);
            if self.options.dump_textures {
                if let Some(provider) = self.custom.as_ref() {
                    provider.dump(&info, level, &guest, hash);
                }
            }
            if self.options.use_custom_textures && whole_level && self.try_upload_custom(surface_id, level, hash)? {
                return Ok(());
            }
        }
        let Some(texture) = self.slot_surfaces[surface_id].texture else {
            return Ok(());
        };

        let convert = self.backend.needs_conversion(info.pixel_format);
        let layout = info.layout();
        let mut host = vec![0u8; layout.linear_size(convert)];
        decode_texture(&layout, 0, info.size, &guest, &mut host, convert)?;
        let data = crop_rows(&host, info.width, info.stride, info.pixel_format.linear_bytes_per_pixel(convert));

        let rect = self.slot_surfaces[surface_id].params.sub_rect(&info);
        self.backend.upload(texture, &TextureUpload { level, rect, data: &data });
        self.stats.inc_uploads();
        Ok(())
    }

    /// Encodes `interval` of the surface back into guest memory.
    fn download_surface(&mut self, surface_id: SurfaceId, interval: SurfaceInterval) -> Result<(), CacheError> {
        let surface = &self.slot_surfaces[surface_id];
        if surface.is_custom() {
            return Ok(());
        }
        let Some(texture) = surface.texture else {
            return Ok(());
        };
        let info = surface.params.from_interval(interval);
        let level = surface.params.level_of(info.addr);
        let rect = surface.params.sub_rect(&info);
        debug_assert!(info.addr <= interval.start && info.end >= interval.end);

        let pixels = self.backend.download(texture, &TextureDownload { level, rect });
        let convert = self.backend.needs_conversion(info.pixel_format);
        let layout = info.layout();
        let mut host = vec![0u8; layout.linear_size(convert)];

        if info.stride != info.width {
            // Keep what lies between the rows.
            let mut guest = vec![0u8; info.size as usize];
            match self.memory.read(info.addr, &mut guest) {
                Ok(()) => decode_texture(&layout, 0, info.size, &guest, &mut host, convert)?,
                Err(err) => tracing::warn!(%err, "surface gap is unmapped"),
            }
        }
        spread_rows(&pixels, &mut host, info.width, info.stride, info.pixel_format.linear_bytes_per_pixel(convert));

        let start = interval.start - info.addr;
        let end = interval.end - info.addr;
        let mut guest = vec![0u8; (end - start) as usize];
        encode_texture(&layout, start, end, &host, &mut guest, convert)?;
        if let Err(err) = self.memory.write(interval.start, &guest) {
            tracing::warn!(%err, surface = %info, "dropping download to unmapped memory");
        }
        self.stats.inc_downloads();
        Ok(())
    }

    fn download_fill(&mut self, surface_id: SurfaceId, interval: SurfaceInterval) {
        let surface = &self.slot_surfaces[surface_id];
        let fill_size = surface.fill_size.max(1);
        let bytes: Vec<u8> = (interval.start..interval.end)
            .map(|addr| surface.fill_data[((addr - surface.params.addr) % fill_size) as usize])
            .collect();
        if let Err(err) = self.memory.write(interval.start, &bytes) {
            tracing::warn!(%err, "dropping fill to unmapped memory");
        }
        self.stats.inc_downloads();
    }

    /// Writes back dirty regions overlapping `[addr, addr + size)`, only
    /// those owned by `filter` unless it is null.
    ///
    /// Accesses of 8 bytes or less write back whole regions so the next
    /// small access to the same surface doesn't need another download.
    pub fn flush_region(&mut self, addr: u32, size: u32, filter: SurfaceId) -> Result<(), CacheError> {
        if size == 0 {
            return Ok(());
        }
        let flush_interval = SurfaceInterval::from_size(addr, size);
        let mut flushed = IntervalSet::new();

        for (region, owner) in self.dirty_regions.overlapping(flush_interval) {
            if !filter.is_null() && owner != filter {
                continue;
            }
            let interval = if size <= 8 { region } else { region.intersect(&flush_interval) };
            let Some(surface) = self.slot_surfaces.get(owner) else {
                flushed.insert(interval);
                continue;
            };
            debug_assert!(surface.is_region_valid(interval), "dirty region of {} is invalid", surface.params);

            if surface.params.surface_type == SurfaceType::Fill {
                self.download_fill(owner, interval);
            } else {
                self.download_surface(owner, interval)?;
            }
            flushed.insert(interval);
        }

        for interval in flushed.iter() {
            self.dirty_regions.remove(interval);
        }
        Ok(())
    }

    /// Records a write to `[addr, addr + size)`.
    ///
    /// With a null `owner` the write came from the CPU: every overlapping
    /// surface loses that range. Otherwise `owner` now holds the only up to
    /// date copy and the range becomes its dirty region.
    pub fn invalidate_region(&mut self, addr: u32, size: u32, owner: SurfaceId) -> Result<(), CacheError> {
        if size == 0 {
            return Ok(());
        }
        if !self.is_range_cached(addr, size) {
            self.stats.inc_skipped_invalidations();
            return Ok(());
        }
        let invalid_interval = SurfaceInterval::from_size(addr, size);
        if let Some(region_owner) = self.slot_surfaces.get_mut(owner) {
            debug_assert!(region_owner.params.interval().contains(&invalid_interval));
            region_owner.mark_valid(invalid_interval);
        }
        let mut remove = Vec::new();

        for surface_id in self.surfaces_in_region(addr, size) {
            self.discard_custom_uploads(surface_id);
            if surface_id == owner {
                continue;
            }
            // Small CPU writes are usually pokes at data the CPU also reads.
            // Write the surface back and drop it instead of reloading it
            // over and over.
            if owner.is_null() && size <= 8 {
                let (surface_addr, surface_size) = {
                    let params = &self.slot_surfaces[surface_id].params;
                    (params.addr, params.size)
                };
                self.flush_region(surface_addr, surface_size, surface_id)?;
                remove.push(surface_id);
                continue;
            }

            let surface = &mut self.slot_surfaces[surface_id];
            let interval = surface.params.interval().intersect(&invalid_interval);
            surface.mark_invalid(interval);
            self.stats.inc_invalid_marks();
            if surface.is_fully_invalid() {
                remove.push(surface_id);
            }
        }

        if owner.is_null() {
            self.dirty_regions.remove(invalid_interval);
        } else {
            self.dirty_regions.set(invalid_interval, owner);
        }
        for surface_id in remove {
            self.unregister_surface(surface_id);
        }
        Ok(())
    }
}

/// Drops the gap between rows: `stride`-pixel rows in, `width`-pixel rows out.
fn crop_rows(host: &[u8], width: u32, stride: u32, bpp: u32) -> Vec<u8> {
    if width == stride {
        return host.to_vec();
    }
    let (row_in, row_out) = ((stride * bpp) as usize, (width * bpp) as usize);
    host.chunks(row_in).flat_map(|row| &row[..row_out.min(row.len())]).copied().collect()
}

/// Inverse of [`crop_rows`]; gap pixels of `host` are left as they are.
fn spread_rows(pixels: &[u8], host: &mut [u8], width: u32, stride: u32, bpp: u32) {
    let (row_in, row_out) = ((width * bpp) as usize, (stride * bpp) as usize);
    if row_in == 0 || row_out == 0 {
        return;
    }
    for (src, dst) in pixels.chunks(row_in).zip(host.chunks_mut(row_out)) {
        let len = src.len().min(dst.len());
        dst[..len].copy_from_slice(&src[..len]);
    }
}
